//! Helpers used to filter which parts of the site tree are scanned.

use std::collections::BTreeSet;

use serde::Deserialize;

/// Trait describing selection filters over site-relative paths.
pub trait DocumentInclusion {
  /// Returns `true` when the document at `relative_path` should be scanned.
  fn is_included(&self, relative_path: &str) -> bool;

  /// Returns `true` when the directory at `relative_dir` can be skipped entirely.
  fn prunes(&self, _relative_dir: &str) -> bool {
    false
  }
}

/// Scope lists as written in the project configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DocumentScope {
  /// When non-empty, only these directories or documents are scanned.
  #[serde(default)]
  pub include: Vec<String>,
  /// Directories or documents that are never scanned.
  #[serde(default)]
  pub exclude: Vec<String>,
}

impl Default for DocumentScope {
  fn default() -> Self {
    Self {
      include: Vec::new(),
      exclude: vec!["fetched_pages".into(), "node_modules".into()],
    }
  }
}

/// Selection helper deciding which documents take part in a run.
#[derive(Debug, Clone, Default)]
pub struct DocumentSelection {
  include: Option<BTreeSet<String>>,
  exclude: BTreeSet<String>,
}

impl DocumentSelection {
  /// Determine whether a document should be scanned.
  pub fn is_included(&self, relative_path: &str) -> bool {
    if self.is_excluded(relative_path) {
      return false;
    }

    match &self.include {
      Some(include) => include
        .iter()
        .any(|value| scope_matches(value, relative_path)),
      None => true,
    }
  }

  /// Whether an exclusion rule covers `relative_path`.
  pub fn is_excluded(&self, relative_path: &str) -> bool {
    self
      .exclude
      .iter()
      .any(|value| scope_matches(value, relative_path))
  }

  /// Returns true when no filtering rules are active.
  #[cfg(test)]
  fn is_unfiltered(&self) -> bool {
    self.include.as_ref().is_none() && self.exclude.is_empty()
  }
}

impl DocumentInclusion for DocumentSelection {
  fn is_included(&self, relative_path: &str) -> bool {
    DocumentSelection::is_included(self, relative_path)
  }

  fn prunes(&self, relative_dir: &str) -> bool {
    self.is_excluded(relative_dir)
  }
}

impl From<DocumentScope> for DocumentSelection {
  fn from(scope: DocumentScope) -> Self {
    let include = normalise_list(scope.include);
    let exclude = normalise_list(scope.exclude);

    Self {
      include: (!include.is_empty()).then_some(include),
      exclude,
    }
  }
}

impl From<&DocumentScope> for DocumentSelection {
  fn from(scope: &DocumentScope) -> Self {
    Self::from(scope.clone())
  }
}

/// Convert a list of raw scopes into a sorted, de-duplicated set.
///
/// Values are trimmed of whitespace and surrounding slashes; empty entries are discarded.
fn normalise_list(values: impl IntoIterator<Item = String>) -> BTreeSet<String> {
  values
    .into_iter()
    .map(|value| value.trim().trim_matches('/').to_string())
    .filter(|value| !value.is_empty())
    .collect()
}

fn scope_matches(rule: &str, candidate: &str) -> bool {
  if candidate == rule {
    return true;
  }

  candidate
    .strip_prefix(rule)
    .is_some_and(|suffix| suffix.starts_with('/'))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn scope(include: &[&str], exclude: &[&str]) -> DocumentScope {
    DocumentScope {
      include: include.iter().map(|value| value.to_string()).collect(),
      exclude: exclude.iter().map(|value| value.to_string()).collect(),
    }
  }

  #[test]
  fn defaults_to_including_everything() {
    let selection = DocumentSelection::default();
    assert!(selection.is_included("index.html"));
    assert!(selection.is_unfiltered());
  }

  #[test]
  fn default_scope_skips_fetched_pages() {
    let selection = DocumentSelection::from(DocumentScope::default());

    assert!(!selection.is_included("fetched_pages/about/index.html"));
    assert!(selection.prunes("fetched_pages"));
    assert!(selection.is_included("fetched_pages_notes.html"));
    assert!(selection.is_included("about/index.html"));
  }

  #[test]
  fn excludes_nested_paths_with_parent_scope() {
    let selection = DocumentSelection::from(scope(&[], &["news", "", " drafts/ "]));

    assert!(!selection.is_included("news"));
    assert!(!selection.is_included("news/2025/index.html"));
    assert!(!selection.is_included("drafts/a.html"));
    assert!(selection.is_included("newsletter/index.html"));
  }

  #[test]
  fn includes_nested_paths_with_parent_scope() {
    let selection = DocumentSelection::from(scope(&["faq"], &[]));

    assert!(selection.is_included("faq/index.html"));
    assert!(!selection.is_included("index.html"));
    assert!(!selection.prunes("about"));
  }

  #[test]
  fn allows_overriding_child_exclusions() {
    let selection = DocumentSelection::from(scope(&["news/featured"], &["news/featured/draft"]));

    assert!(!selection.is_included("news/index.html"));
    assert!(selection.is_included("news/featured/index.html"));
    assert!(!selection.is_included("news/featured/draft/index.html"));
  }

  #[test]
  fn normalises_whitespace_and_duplicates() {
    let normalised: Vec<String> = normalise_list(vec![
      "  a  ".into(),
      "/b/".into(),
      "a".into(),
      String::new(),
    ])
    .into_iter()
    .collect();

    assert_eq!(normalised, vec![String::from("a"), String::from("b")]);
  }

  #[test]
  fn scope_lists_deserialize_with_defaults() {
    let parsed: DocumentScope = serde_json::from_str(r#"{"include": ["faq"]}"#).unwrap();
    assert_eq!(parsed.include, vec!["faq".to_string()]);
    assert!(parsed.exclude.is_empty());
  }
}
