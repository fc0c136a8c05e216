//! Data structures produced while auditing and rewriting a site tree.

use std::collections::BTreeSet;
use std::fmt;
use std::ops::Range;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::ParseError;

/// Role a URL plays in the markup that references it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
  /// `img`/`source` sources, srcset entries, icons and lazy-load attributes.
  Image,
  /// `<link rel="stylesheet">` targets.
  Stylesheet,
  /// `<script src>` targets.
  Script,
  /// Any other `href`.
  AnchorLink,
  /// Path-like `content` values of `<meta>` tags.
  MetaContent,
}

impl ReferenceKind {
  /// Plural label used to build report categories such as `images_missing`.
  pub fn label(self) -> &'static str {
    match self {
      Self::Image => "images",
      Self::Stylesheet => "stylesheets",
      Self::Script => "scripts",
      Self::AnchorLink => "links",
      Self::MetaContent => "meta",
    }
  }
}

impl fmt::Display for ReferenceKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.label())
  }
}

/// One occurrence of a URL inside a document's markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
  /// URL text exactly as written in the attribute.
  pub raw_url: String,
  /// Classification of the reference.
  pub kind: ReferenceKind,
  /// Document the reference was found in.
  pub source_document: PathBuf,
  /// Lowercased attribute name carrying the URL.
  pub attribute: String,
  /// Byte range of `raw_url` within the document text.
  pub span: Range<usize>,
  /// 1-based line of the reference.
  pub line: usize,
  /// Width or density descriptor of a srcset entry.
  pub descriptor: Option<String>,
}

/// Existence information for one canonical path, folded across every reference to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetRecord {
  /// Canonical path without query string or fragment.
  pub canonical_path: String,
  /// Whether the file exists under the site root.
  pub exists_locally: bool,
  /// File size when the file exists.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub size_bytes: Option<u64>,
  /// Documents (relative to the site root) that reference the path.
  pub referenced_by: BTreeSet<String>,
  /// Reference kinds that pointed at the path.
  pub kinds: BTreeSet<ReferenceKind>,
  /// Origin category label such as `wp_uploads` for leftover origin paths.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub category: Option<String>,
  /// Replacement the mapping table would apply, if any.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub mapped_to: Option<String>,
}

impl AssetRecord {
  /// Record for a path that was checked against the filesystem.
  pub fn local(canonical_path: impl Into<String>, size_bytes: Option<u64>) -> Self {
    Self {
      canonical_path: canonical_path.into(),
      exists_locally: size_bytes.is_some(),
      size_bytes,
      referenced_by: BTreeSet::new(),
      kinds: BTreeSet::new(),
      category: None,
      mapped_to: None,
    }
  }

  /// Fold another record for the same path into this one.
  pub fn merge(&mut self, other: AssetRecord) {
    self.referenced_by.extend(other.referenced_by);
    self.kinds.extend(other.kinds);
    if self.mapped_to.is_none() {
      self.mapped_to = other.mapped_to;
    }
    if self.category.is_none() {
      self.category = other.category;
    }
  }
}

/// Outcome of rewriting a single document.
#[derive(Debug, Clone)]
pub struct RewriteResult {
  /// Document that was rewritten.
  pub document: PathBuf,
  /// Text as read from disk.
  pub original_text: String,
  /// Text after every applicable substitution.
  pub new_text: String,
  /// Number of reference spans replaced.
  pub substitution_count: usize,
  /// Set when the document could only be scanned partially.
  pub parse_error: Option<ParseError>,
}

impl RewriteResult {
  /// Only documents that actually changed are written back.
  pub fn should_write(&self) -> bool {
    self.substitution_count > 0 && self.new_text != self.original_text
  }
}

/// Non-fatal per-document problem collected during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentIssue {
  /// Document path relative to the site root.
  pub document: String,
  /// Description of the problem.
  pub message: String,
}
