//! Existence checks for canonical paths against the local site tree.

use std::ffi::OsStr;
use std::fs;
use std::path::Path;

use percent_encoding::percent_decode_str;

use crate::asset_paths::CanonicalPath;
use crate::extract::{collect_anchor_targets, decode_document};
use crate::models::AssetRecord;
use crate::project::SiteLayout;

/// Outcome of checking one canonical path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
  /// The path belongs to the local tree; the record says whether it exists.
  Local(AssetRecord),
  /// The path is outside the checked tree (foreign host or outside the asset root).
  NotApplicable,
}

/// Check an asset reference under the configured asset root.
///
/// Lookups are exact and case-sensitive on every platform; query strings never take part.
pub fn resolve(path: &CanonicalPath, layout: &SiteLayout) -> Resolution {
  if !layout.origin_hosts.accepts(path.host()) || !path.is_under(&layout.asset_root) {
    return Resolution::NotApplicable;
  }

  let size = exact_file_size(&layout.root, path.path());
  Resolution::Local(AssetRecord::local(path.path(), size))
}

/// Check an internal page link.
///
/// `/faq/` resolves to `faq/index.html`; an extensionless `/faq` may be served by `faq`,
/// `faq.html` or `faq/index.html`.
pub fn resolve_page(path: &CanonicalPath, layout: &SiteLayout) -> Resolution {
  if !layout.origin_hosts.accepts(path.host()) {
    return Resolution::NotApplicable;
  }

  let size = locate_page(path.path(), layout).map(|(_, size)| size);
  Resolution::Local(AssetRecord::local(path.path(), size))
}

/// Whether the fragment of a page link names an element of the page it points at.
///
/// `None` when there is nothing to verify: no fragment, the implicit `#top`, or a page
/// that does not exist locally.
pub fn anchor_exists(path: &CanonicalPath, layout: &SiteLayout) -> Option<bool> {
  let fragment = path.fragment().filter(|fragment| *fragment != "top")?;
  let (page, _) = locate_page(path.path(), layout)?;
  let bytes = fs::read(layout.local_path(&page)).ok()?;
  let (text, _) = decode_document(Path::new(&page), &bytes);

  let targets = collect_anchor_targets(text);
  let decoded = percent_decode_str(fragment).decode_utf8_lossy();
  Some(targets.contains(fragment) || targets.contains(decoded.as_ref()))
}

// Canonical path of the file serving `page`, with its size.
fn locate_page(page: &str, layout: &SiteLayout) -> Option<(String, u64)> {
  let index = format!("index.{}", layout.document_extension);
  let has_extension = page
    .rsplit('/')
    .next()
    .is_some_and(|name| name.contains('.'));
  let candidates = if page.ends_with('/') {
    vec![format!("{page}{index}")]
  } else if has_extension {
    vec![page.to_string()]
  } else {
    vec![
      page.to_string(),
      format!("{page}.{}", layout.document_extension),
      format!("{page}/{index}"),
    ]
  };

  candidates.into_iter().find_map(|candidate| {
    let size = exact_file_size(&layout.root, &candidate)?;
    Some((candidate, size))
  })
}

fn exact_file_size(root: &Path, canonical_path: &str) -> Option<u64> {
  let mut current = root.to_path_buf();
  for segment in canonical_path.split('/').filter(|segment| !segment.is_empty()) {
    if segment == "." || segment == ".." {
      return None;
    }
    let listed = fs::read_dir(&current)
      .ok()?
      .filter_map(Result::ok)
      .any(|entry| entry.file_name().as_os_str() == OsStr::new(segment));
    if !listed {
      return None;
    }
    current.push(segment);
  }

  let metadata = fs::metadata(&current).ok()?;
  metadata.is_file().then(|| metadata.len())
}
