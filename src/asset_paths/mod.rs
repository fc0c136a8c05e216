//! Helpers for normalising reference strings and reasoning about asset paths.
//!
//! The responsibilities are split into focused submodules so that filtering references,
//! normalising them into canonical paths, and expanding origin candidates for missing
//! assets can be tested independently. The audit, the rewrite engine and the fetch
//! orchestrator all share this code.

mod candidates;
mod filters;
mod normalize;

pub use candidates::generate_origin_candidates;
pub use filters::{has_image_extension, should_ignore_asset_reference};
pub use normalize::{CanonicalPath, normalize};
