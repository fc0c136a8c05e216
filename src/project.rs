//! Owned description of the site tree being audited.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Hosts whose absolute URLs are treated as references into this site.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginHosts(BTreeSet<String>);

impl OriginHosts {
  /// Build from host names, lowercased.
  pub fn new<I, S>(hosts: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    let mut set = Self::default();
    set.extend(hosts);
    set
  }

  /// Add more hosts.
  pub fn extend<I, S>(&mut self, hosts: I)
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    self.0.extend(
      hosts
        .into_iter()
        .map(|host| host.as_ref().trim().to_ascii_lowercase())
        .filter(|host| !host.is_empty()),
    );
  }

  /// Relative references always belong to the site; absolute ones only for known hosts.
  pub fn accepts(&self, host: Option<&str>) -> bool {
    match host {
      None => true,
      Some(host) => self.0.contains(&host.to_ascii_lowercase()),
    }
  }

  /// Known hosts in order.
  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.0.iter().map(String::as_str)
  }
}

/// Path prefix that marks a reference as still pointing at the dynamic origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginMarker {
  /// Root-relative path prefix, e.g. `/wp-content/uploads/`.
  pub prefix: String,
  /// Category label, e.g. `wp_uploads`.
  pub label: String,
}

/// Filesystem layout and classification policy for one site.
#[derive(Debug, Clone)]
pub struct SiteLayout {
  /// Directory holding the site's documents.
  pub root: PathBuf,
  /// Root-relative asset prefix with leading and trailing slash, e.g. `/assets/`.
  pub asset_root: String,
  /// Extension of scanned documents, without the dot.
  pub document_extension: String,
  /// Hosts treated as the origin (and as this site).
  pub origin_hosts: OriginHosts,
  /// Markers sorted longest prefix first.
  pub origin_markers: Vec<OriginMarker>,
  /// Resolve anchor links outside the asset root as pages.
  pub check_page_links: bool,
}

impl SiteLayout {
  /// Layout with the conventional `/assets/` root and no origin policy.
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      asset_root: "/assets/".to_string(),
      document_extension: "html".to_string(),
      origin_hosts: OriginHosts::default(),
      origin_markers: Vec::new(),
      check_page_links: false,
    }
  }

  /// Replace the asset root, normalising slashes.
  pub fn with_asset_root(mut self, asset_root: &str) -> Self {
    self.asset_root = rooted_dir(asset_root);
    self
  }

  /// Replace the origin markers, keeping the longest prefix first.
  pub fn with_origin_markers(mut self, mut markers: Vec<OriginMarker>) -> Self {
    markers.sort_by(|a, b| {
      b.prefix
        .len()
        .cmp(&a.prefix.len())
        .then_with(|| a.prefix.cmp(&b.prefix))
    });
    self.origin_markers = markers;
    self
  }

  /// Filesystem location of a canonical path.
  pub fn local_path(&self, canonical_path: &str) -> PathBuf {
    let mut path = self.root.clone();
    for segment in canonical_path.split('/').filter(|segment| !segment.is_empty()) {
      path.push(segment);
    }
    path
  }

  /// Document path relative to the root with forward slashes, for reports.
  pub fn relative_document(&self, document: &Path) -> String {
    let relative = document.strip_prefix(&self.root).unwrap_or(document);
    relative.to_string_lossy().replace('\\', "/")
  }

  /// Category label of the first marker matching `path`.
  pub fn origin_category(&self, path: &str) -> Option<&str> {
    self
      .origin_markers
      .iter()
      .find(|marker| path.starts_with(&marker.prefix))
      .map(|marker| marker.label.as_str())
  }
}

/// Normalise a directory prefix to `/dir/` form.
pub(crate) fn rooted_dir(value: &str) -> String {
  let trimmed = value.trim().trim_matches('/');
  if trimmed.is_empty() {
    "/".to_string()
  } else {
    format!("/{trimmed}/")
  }
}
