#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod asset_paths;
pub mod audit;
pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod mapping;
pub mod models;
pub mod project;
pub mod relinker;
pub mod resolve;
pub mod rewrite;
pub mod scanning;
pub mod selection;

pub use audit::Report;
pub use config::ProjectConfig;
pub use mapping::MappingTable;
pub use project::SiteLayout;
pub use relinker::{RewriteSummary, SiteRelinker};
pub use selection::DocumentInclusion;
