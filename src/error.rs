//! Error taxonomy shared by the extraction, mapping, fetch and write stages.

use std::path::PathBuf;

use thiserror::Error;

/// A document could not be lexically scanned past a certain point.
///
/// References recognized before `offset` are still reported; the run moves on to the
/// next document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}:{line}: {reason} (byte {offset})", document.display())]
pub struct ParseError {
  /// Document that failed to scan.
  pub document: PathBuf,
  /// Byte offset where scanning stopped.
  pub offset: usize,
  /// 1-based line of `offset`.
  pub line: usize,
  /// Human readable description of the lexical problem.
  pub reason: String,
}

/// Defects in the mapping table, detected when the table is loaded.
#[derive(Debug, Error)]
pub enum MappingError {
  /// Two exact rules share the same normalized pattern.
  #[error("ambiguous mapping: exact pattern `{pattern}` is declared more than once")]
  DuplicatePattern {
    /// Normalized pattern shared by both rules.
    pattern: String,
  },
  /// Two prefix rules share the same normalized prefix.
  #[error("ambiguous mapping: prefix `{prefix}` maps to both `{first}` and `{second}`")]
  AmbiguousPrefix {
    /// Normalized prefix shared by both rules.
    prefix: String,
    /// Replacement of the first declaration.
    first: String,
    /// Replacement of the second declaration.
    second: String,
  },
  /// A replacement could itself be matched by a rule, so rewriting would chain.
  #[error("mapping replacement `{replacement}` overlaps rule pattern `{pattern}`")]
  Chained {
    /// Replacement that can be matched again.
    replacement: String,
    /// Pattern or prefix that would match it.
    pattern: String,
  },
  /// Replacements must be local root-relative paths.
  #[error("mapping replacement `{0}` is not a local root-relative path")]
  NonLocalReplacement(String),
  /// Rule with an empty pattern.
  #[error("mapping rule with an empty pattern")]
  EmptyPattern,
  /// The mapping file could not be read.
  #[error("failed to read mapping table {}", path.display())]
  Io {
    /// Mapping file path.
    path: PathBuf,
    /// Source I/O error.
    #[source]
    source: std::io::Error,
  },
  /// The mapping file is not valid JSON.
  #[error("failed to parse mapping table {}", path.display())]
  Json {
    /// Mapping file path.
    path: PathBuf,
    /// Source parse error.
    #[source]
    source: serde_json::Error,
  },
  /// The mapping file is not valid YAML.
  #[error("failed to parse mapping table {}", path.display())]
  Yaml {
    /// Mapping file path.
    path: PathBuf,
    /// Source parse error.
    #[source]
    source: serde_yaml::Error,
  },
}

impl MappingError {
  /// Whether the defect is two rules competing at the same tier.
  pub fn is_ambiguity(&self) -> bool {
    matches!(self, Self::DuplicatePattern { .. } | Self::AmbiguousPrefix { .. })
  }
}

/// The fetch collaborator could not retrieve and persist an asset.
#[derive(Debug, Error)]
pub enum FetchError {
  /// The origin answered with a non-success status.
  #[error("{url} answered with HTTP {status}")]
  Status {
    /// Requested URL.
    url: String,
    /// HTTP status code.
    status: u16,
  },
  /// Connection, TLS or timeout failure.
  #[error("transport error for {url}: {message}")]
  Transport {
    /// Requested URL.
    url: String,
    /// Transport error description.
    message: String,
  },
  /// The origin answered with success but sent no bytes.
  #[error("{url} answered with an empty body")]
  EmptyBody {
    /// Requested URL.
    url: String,
  },
  /// The bytes could not be written to the target file.
  #[error("failed to write {}", path.display())]
  Io {
    /// Target path.
    path: PathBuf,
    /// Source I/O error.
    #[source]
    source: std::io::Error,
  },
  /// No candidate origin URL could be derived for the missing asset.
  #[error("no origin candidates for {0}")]
  NoCandidates(String),
}

/// A rewritten document could not be persisted. The original file is left untouched.
#[derive(Debug, Error)]
pub enum WriteFailure {
  /// The temporary file or the rename failed.
  #[error("failed to write {}", path.display())]
  Io {
    /// Document path.
    path: PathBuf,
    /// Source I/O error.
    #[source]
    source: std::io::Error,
  },
  /// The document changed on disk between reading and writing it.
  #[error("{} changed on disk while it was being rewritten", path.display())]
  Modified {
    /// Document path.
    path: PathBuf,
  },
}
