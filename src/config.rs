//! Project configuration loader describing the site layout and relink policy.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::project::{OriginMarker, SiteLayout, rooted_dir};
use crate::selection::{DocumentScope, DocumentSelection};

/// Configuration file searched for in the site root.
pub const DEFAULT_CONFIG_FILE: &str = "relink.config.json";

/// Errors raised while loading or interpreting the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
  /// The configuration file could not be read.
  #[error("failed to read {}", path.display())]
  Io {
    /// Path that caused the error.
    path: PathBuf,
    /// Source I/O error.
    #[source]
    source: std::io::Error,
  },
  /// The configuration file is not valid JSON for [`ProjectConfig`].
  #[error("failed to parse {}", path.display())]
  Parse {
    /// Path that caused the error.
    path: PathBuf,
    /// Source parse error.
    #[source]
    source: serde_json::Error,
  },
  /// `origin_url` is not an absolute URL.
  #[error("invalid origin_url `{url}`")]
  InvalidOrigin {
    /// Configured value.
    url: String,
    /// Source parse error.
    #[source]
    source: url::ParseError,
  },
}

/// Origin path marker as written in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OriginMarkerConfig {
  /// Root-relative path prefix.
  pub prefix: String,
  /// Category label used in reports.
  pub label: String,
}

/// Settings for fetching missing assets from the origin.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
  /// Connect and read timeout per request.
  pub timeout_secs: u64,
  /// Minimum delay between two origin requests.
  pub delay_ms: u64,
  /// User-Agent header sent with every request.
  pub user_agent: String,
}

impl Default for FetchConfig {
  fn default() -> Self {
    Self {
      timeout_secs: 10,
      delay_ms: 500,
      user_agent: concat!("site-relink/", env!("CARGO_PKG_VERSION")).into(),
    }
  }
}

/// Settings for the human-readable report.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
  /// Referencing documents listed per entry before eliding the rest.
  pub sample_limit: usize,
}

impl Default for ReportConfig {
  fn default() -> Self {
    Self { sample_limit: 3 }
  }
}

/// Discoverable project configuration describing the site tree and relink policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
  /// Directory under the site root that holds local assets.
  pub asset_root: String,
  /// Extension of the documents to scan.
  pub document_extension: String,
  /// Include and exclude scopes, relative to the site root.
  pub scope: DocumentScope,
  /// Mapping table path relative to the site root.
  pub mapping_file: String,
  /// Base URL of the dynamic origin, used for backfilling.
  pub origin_url: Option<String>,
  /// Additional hosts whose absolute URLs belong to the site.
  pub origin_hosts: Vec<String>,
  /// Path prefixes that identify leftover origin references.
  pub origin_markers: Vec<OriginMarkerConfig>,
  /// Origin path templates tried when backfilling (`{name}`, `{path}`).
  pub candidate_templates: Vec<String>,
  /// Check anchor links outside the asset root against local pages.
  pub check_page_links: bool,
  /// Exit with a distinct status when unresolved references remain.
  pub fail_on_missing: bool,
  /// Fetch settings.
  pub fetch: FetchConfig,
  /// Report settings.
  pub report: ReportConfig,
}

impl Default for ProjectConfig {
  fn default() -> Self {
    Self {
      asset_root: "assets".into(),
      document_extension: "html".into(),
      scope: DocumentScope::default(),
      mapping_file: "relink.mapping.json".into(),
      origin_url: None,
      origin_hosts: Vec::new(),
      origin_markers: default_origin_markers(),
      candidate_templates: vec!["/wp-content/uploads/{name}".into()],
      check_page_links: false,
      fail_on_missing: false,
      fetch: FetchConfig::default(),
      report: ReportConfig::default(),
    }
  }
}

fn default_origin_markers() -> Vec<OriginMarkerConfig> {
  [
    ("/wp-content/uploads/", "wp_uploads"),
    ("/wp-content/themes/", "wp_themes"),
    ("/wp-includes/", "wp_includes"),
    ("/wp-content/", "wp_other"),
  ]
  .into_iter()
  .map(|(prefix, label)| OriginMarkerConfig {
    prefix: prefix.into(),
    label: label.into(),
  })
  .collect()
}

impl ProjectConfig {
  /// Load `relink.config.json` from the site root, falling back to defaults when absent.
  ///
  /// A file that exists but cannot be parsed is an error rather than a silent default.
  pub fn discover(site_root: &Path) -> Result<Self, ConfigError> {
    let candidate = site_root.join(DEFAULT_CONFIG_FILE);
    match Self::from_path(&candidate) {
      Err(ConfigError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
        Ok(Self::default())
      }
      other => other,
    }
  }

  /// Read configuration from a specific JSON file.
  pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  /// Parsed origin base URL, if configured.
  pub fn origin(&self) -> Result<Option<Url>, ConfigError> {
    self
      .origin_url
      .as_deref()
      .map(|url| {
        Url::parse(url).map_err(|source| ConfigError::InvalidOrigin {
          url: url.to_string(),
          source,
        })
      })
      .transpose()
  }

  /// Build the owned layout description for a site root.
  pub fn to_layout(&self, site_root: &Path) -> Result<SiteLayout, ConfigError> {
    let mut layout = SiteLayout::new(site_root)
      .with_asset_root(&self.asset_root)
      .with_origin_markers(
        self
          .origin_markers
          .iter()
          .map(|marker| OriginMarker {
            prefix: rooted_dir(&marker.prefix),
            label: marker.label.clone(),
          })
          .collect(),
      );
    layout.document_extension = self.document_extension.trim_start_matches('.').to_string();
    layout.check_page_links = self.check_page_links;
    layout.origin_hosts.extend(&self.origin_hosts);
    if let Some(origin) = self.origin()? {
      if let Some(host) = origin.host_str() {
        layout.origin_hosts.extend([match origin.port() {
          Some(port) => format!("{host}:{port}"),
          None => host.to_string(),
        }]);
      }
    }
    Ok(layout)
  }

  /// Document selection derived from the configured scopes.
  pub fn selection(&self) -> DocumentSelection {
    DocumentSelection::from(&self.scope)
  }

  /// Path of the mapping table for a site root.
  pub fn mapping_path(&self, site_root: &Path) -> PathBuf {
    site_root.join(&self.mapping_file)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::tempdir;

  #[test]
  fn missing_file_yields_defaults() {
    let temp = tempdir().expect("failed to create temp dir");
    let config = ProjectConfig::discover(temp.path()).expect("defaults expected");

    assert_eq!(config.asset_root, "assets");
    assert_eq!(config.report.sample_limit, 3);
    assert_eq!(config.fetch.timeout_secs, 10);
    assert!(!config.selection().is_included("fetched_pages/a/index.html"));
  }

  #[test]
  fn malformed_file_is_an_error() {
    let temp = tempdir().expect("failed to create temp dir");
    fs::write(temp.path().join(DEFAULT_CONFIG_FILE), "{ not json").unwrap();

    let err = ProjectConfig::discover(temp.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
  }

  #[test]
  fn explicit_path_must_exist() {
    let temp = tempdir().expect("failed to create temp dir");
    let err = ProjectConfig::from_path(&temp.path().join("custom.json")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
  }

  #[test]
  fn partial_file_keeps_remaining_defaults() {
    let temp = tempdir().expect("failed to create temp dir");
    fs::write(
      temp.path().join(DEFAULT_CONFIG_FILE),
      r#"{"asset_root": "/static/", "origin_url": "https://Origin.Example:8443/", "report": {}}"#,
    )
    .unwrap();

    let config = ProjectConfig::discover(temp.path()).unwrap();
    let layout = config.to_layout(temp.path()).unwrap();

    assert_eq!(layout.asset_root, "/static/");
    assert_eq!(layout.document_extension, "html");
    assert!(layout.origin_hosts.accepts(Some("origin.example:8443")));
    assert_eq!(layout.origin_category("/wp-includes/js/x.js"), Some("wp_includes"));
    assert_eq!(config.report.sample_limit, 3);
  }

  #[test]
  fn rejects_relative_origin_url() {
    let config = ProjectConfig {
      origin_url: Some("origin.example".into()),
      ..ProjectConfig::default()
    };
    assert!(matches!(config.origin(), Err(ConfigError::InvalidOrigin { .. })));
  }
}
