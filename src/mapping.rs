//! Curated origin-to-local mapping rules.
//!
//! The table is the only authority the rewrite engine consults. Exact rules win over
//! prefix rules and the longest matching prefix wins within its tier. Everything that
//! could make a lookup depend on declaration order, or make a rewritten value match
//! again, is rejected when the table is built.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde::{Deserialize, Serialize};

use crate::asset_paths::{CanonicalPath, normalize};
use crate::error::MappingError;

/// Characters escaped in path text derived from a matched reference.
const DERIVED_SEGMENT: &AsciiSet = &CONTROLS
  .add(b' ')
  .add(b'"')
  .add(b'\'')
  .add(b'<')
  .add(b'>')
  .add(b'`')
  .add(b'#')
  .add(b'?')
  .add(b',');

/// Rule mapping one origin path to one local path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExactRule {
  /// Origin path or absolute origin URL.
  pub pattern: String,
  /// Root-relative local path.
  pub replacement: String,
}

/// What a prefix rule carries over from the matched path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Keep {
  /// Only the last path segment: `/wp-content/uploads/2025/03/a.webp` -> `<replacement>a.webp`.
  #[default]
  Basename,
  /// Everything after the prefix: `/old/img/a.webp` -> `<replacement>img/a.webp`.
  Suffix,
}

/// Rule mapping every path below a prefix into a local directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixRule {
  /// Origin directory or absolute origin URL of a directory. Matching is by whole
  /// segments; a missing trailing `/` is implied.
  pub prefix: String,
  /// Root-relative local directory.
  pub replacement: String,
  /// Part of the matched path appended to `replacement`.
  #[serde(default)]
  pub keep: Keep,
}

/// On-disk layout of a mapping table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingFile {
  /// Exact rules.
  #[serde(default)]
  pub exact: Vec<ExactRule>,
  /// Prefix rules.
  #[serde(default)]
  pub prefix: Vec<PrefixRule>,
}

/// Validated mapping table.
#[derive(Debug, Clone, Default)]
pub struct MappingTable {
  exact: BTreeMap<String, String>,
  prefixes: Vec<PrefixRule>,
  pattern_hosts: BTreeSet<String>,
}

impl MappingTable {
  /// Table without rules; every lookup misses.
  pub fn empty() -> Self {
    Self::default()
  }

  /// Build and validate a table from its rules.
  pub fn from_rules(file: MappingFile) -> Result<Self, MappingError> {
    let mut table = Self::default();

    for rule in file.exact {
      let pattern = table.normalize_pattern(&rule.pattern)?;
      let replacement = local_replacement(&rule.replacement)?;
      if table.exact.insert(pattern.clone(), replacement).is_some() {
        return Err(MappingError::DuplicatePattern { pattern });
      }
    }

    for rule in file.prefix {
      let prefix = as_directory(table.normalize_pattern(&rule.prefix)?);
      let replacement = local_replacement(&rule.replacement)?;
      if let Some(existing) = table.prefixes.iter().find(|existing| existing.prefix == prefix) {
        return Err(MappingError::AmbiguousPrefix {
          prefix,
          first: existing.replacement.clone(),
          second: replacement,
        });
      }
      table.prefixes.push(PrefixRule {
        prefix,
        replacement,
        keep: rule.keep,
      });
    }

    table.prefixes.sort_by(|a, b| {
      b.prefix
        .len()
        .cmp(&a.prefix.len())
        .then_with(|| a.prefix.cmp(&b.prefix))
    });

    table.reject_chains()?;
    Ok(table)
  }

  /// Load a table from JSON, or YAML for `.yaml`/`.yml` files.
  pub fn load(path: &Path) -> Result<Self, MappingError> {
    let contents = fs::read_to_string(path).map_err(|source| MappingError::Io {
      path: path.to_path_buf(),
      source,
    })?;

    let is_yaml = path
      .extension()
      .and_then(|ext| ext.to_str())
      .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));

    let file: MappingFile = if is_yaml {
      serde_yaml::from_str(&contents).map_err(|source| MappingError::Yaml {
        path: path.to_path_buf(),
        source,
      })?
    } else {
      serde_json::from_str(&contents).map_err(|source| MappingError::Json {
        path: path.to_path_buf(),
        source,
      })?
    };

    Self::from_rules(file)
  }

  /// Like [`MappingTable::load`], but a missing file yields an empty table.
  pub fn load_or_empty(path: &Path) -> Result<Self, MappingError> {
    match Self::load(path) {
      Err(MappingError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
        Ok(Self::empty())
      }
      other => other,
    }
  }

  /// Local replacement for a reference, without query or fragment.
  pub fn lookup(&self, path: &CanonicalPath) -> Option<String> {
    self.lookup_path(path.path())
  }

  fn lookup_path(&self, path: &str) -> Option<String> {
    if let Some(replacement) = self.exact.get(path) {
      return Some(replacement.clone());
    }

    self.prefixes.iter().find_map(|rule| {
      let rest = path.strip_prefix(rule.prefix.as_str())?;
      let derived = match rule.keep {
        Keep::Basename => rest.rsplit('/').next().filter(|name| !name.is_empty())?,
        Keep::Suffix => rest,
      };
      let encoded = utf8_percent_encode(derived, DERIVED_SEGMENT).to_string();
      Some(if rule.replacement.ends_with('/') || encoded.is_empty() {
        format!("{}{encoded}", rule.replacement)
      } else {
        format!("{}/{encoded}", rule.replacement)
      })
    })
  }

  /// Origin paths whose exact rule maps onto `local_path`.
  pub fn origins_for(&self, local_path: &str) -> Vec<&str> {
    self
      .exact
      .iter()
      .filter(|(_, replacement)| normalize(replacement).path() == local_path)
      .map(|(pattern, _)| pattern.as_str())
      .collect()
  }

  /// Hosts named by absolute patterns; references to them are origin references.
  pub fn pattern_hosts(&self) -> impl Iterator<Item = &str> {
    self.pattern_hosts.iter().map(String::as_str)
  }

  /// Exact rules as `(pattern, replacement)` in pattern order.
  pub fn exact_rules(&self) -> impl Iterator<Item = (&str, &str)> {
    self
      .exact
      .iter()
      .map(|(pattern, replacement)| (pattern.as_str(), replacement.as_str()))
  }

  /// Prefix rules, longest prefix first.
  pub fn prefix_rules(&self) -> &[PrefixRule] {
    &self.prefixes
  }

  /// Total number of rules.
  pub fn len(&self) -> usize {
    self.exact.len() + self.prefixes.len()
  }

  /// Whether the table has no rules.
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  fn normalize_pattern(&mut self, raw: &str) -> Result<String, MappingError> {
    if raw.trim().is_empty() {
      return Err(MappingError::EmptyPattern);
    }
    let canonical = normalize(raw);
    if let Some(host) = canonical.host() {
      self.pattern_hosts.insert(host.to_string());
    }
    Ok(canonical.path().to_string())
  }

  fn reject_chains(&self) -> Result<(), MappingError> {
    for replacement in self.exact.values() {
      let target = normalize(replacement);
      if let Some(pattern) = self.matching_pattern(target.path()) {
        return Err(MappingError::Chained {
          replacement: replacement.clone(),
          pattern,
        });
      }
    }

    for rule in &self.prefixes {
      let target = as_directory(normalize(&rule.replacement).path().to_string());
      if let Some(pattern) = self.exact.keys().find(|pattern| pattern.starts_with(&target)) {
        return Err(MappingError::Chained {
          replacement: rule.replacement.clone(),
          pattern: pattern.clone(),
        });
      }
      if let Some(other) = self
        .prefixes
        .iter()
        .find(|other| target.starts_with(&other.prefix) || other.prefix.starts_with(&target))
      {
        return Err(MappingError::Chained {
          replacement: rule.replacement.clone(),
          pattern: other.prefix.clone(),
        });
      }
    }

    Ok(())
  }

  fn matching_pattern(&self, path: &str) -> Option<String> {
    if self.exact.contains_key(path) {
      return Some(path.to_string());
    }
    self
      .prefixes
      .iter()
      .find(|rule| path.starts_with(&rule.prefix))
      .map(|rule| rule.prefix.clone())
  }
}

// Prefixes cover whole segments: `/uploads` stands for `/uploads/`.
fn as_directory(mut path: String) -> String {
  if !path.ends_with('/') {
    path.push('/');
  }
  path
}

fn local_replacement(raw: &str) -> Result<String, MappingError> {
  let trimmed = raw.trim();
  let unsafe_char = trimmed
    .chars()
    .any(|c| c.is_whitespace() || matches!(c, '?' | '#' | '"' | '\'' | '<' | '>' | '`'));
  if !trimmed.starts_with('/') || trimmed.starts_with("//") || unsafe_char {
    return Err(MappingError::NonLocalReplacement(raw.to_string()));
  }
  Ok(trimmed.to_string())
}
