//! Mapping-driven rewriting of reference spans inside documents.
//!
//! Only the byte span of a matched URL is replaced. Everything else in the document,
//! including srcset separators and descriptors, stays byte-identical.

use std::fs;
use std::io::Write;
use std::ops::Range;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::asset_paths::{normalize, should_ignore_asset_reference};
use crate::error::WriteFailure;
use crate::extract::ReferenceScanner;
use crate::mapping::MappingTable;
use crate::models::{Reference, RewriteResult};
use crate::project::OriginHosts;

/// Apply the mapping table to every reference in `text`.
///
/// Absolute references are only rewritten when their host is one of `hosts`. Query
/// strings are dropped from rewritten values; fragments are carried over.
pub fn rewrite(
  document: &Path,
  text: &str,
  table: &MappingTable,
  hosts: &OriginHosts,
) -> RewriteResult {
  let mut edits: Vec<(Range<usize>, String)> = Vec::new();
  let mut parse_error = None;

  for item in ReferenceScanner::new(document, text) {
    match item {
      Ok(reference) => {
        if let Some(replacement) = replacement_for(&reference, table, hosts) {
          edits.push((reference.span, replacement));
        }
      }
      Err(err) => parse_error = Some(err),
    }
  }

  let substitution_count = edits.len();
  let new_text = splice(text, edits);

  RewriteResult {
    document: document.to_path_buf(),
    original_text: text.to_string(),
    new_text,
    substitution_count,
    parse_error,
  }
}

/// Replacement value for a single reference, if a rule applies.
pub fn replacement_for(
  reference: &Reference,
  table: &MappingTable,
  hosts: &OriginHosts,
) -> Option<String> {
  if should_ignore_asset_reference(&reference.raw_url) {
    return None;
  }

  let canonical = normalize(&reference.raw_url);
  if !hosts.accepts(canonical.host()) {
    return None;
  }

  let mut replacement = table.lookup(&canonical)?;
  if let Some(fragment) = canonical.fragment() {
    replacement.push('#');
    replacement.push_str(fragment);
  }

  (replacement != reference.raw_url).then_some(replacement)
}

// Edits arrive in document order and never overlap.
fn splice(text: &str, edits: Vec<(Range<usize>, String)>) -> String {
  let mut output = String::with_capacity(text.len());
  let mut cursor = 0;
  for (span, replacement) in edits {
    output.push_str(&text[cursor..span.start]);
    output.push_str(&replacement);
    cursor = span.end;
  }
  output.push_str(&text[cursor..]);
  output
}

/// Write a rewritten document back atomically.
///
/// The new text goes to a temporary file next to the document, the document is re-read
/// to make sure nobody changed it since it was rewritten, and only then is the temporary
/// file renamed over it. On any failure the original file is left untouched.
pub fn persist_rewrite(result: &RewriteResult) -> Result<(), WriteFailure> {
  let path = &result.document;
  let io_failure = |source: std::io::Error| WriteFailure::Io {
    path: path.clone(),
    source,
  };

  let dir = path
    .parent()
    .filter(|parent| !parent.as_os_str().is_empty())
    .unwrap_or_else(|| Path::new("."));
  let mut temp = NamedTempFile::new_in(dir).map_err(io_failure)?;
  temp
    .write_all(result.new_text.as_bytes())
    .map_err(io_failure)?;
  temp.as_file().sync_all().map_err(io_failure)?;

  let current = fs::read_to_string(path).map_err(io_failure)?;
  if current != result.original_text {
    return Err(WriteFailure::Modified { path: path.clone() });
  }
  if let Ok(metadata) = fs::metadata(path) {
    temp
      .as_file()
      .set_permissions(metadata.permissions())
      .map_err(io_failure)?;
  }

  temp.persist(path).map_err(|err| io_failure(err.error))?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::mapping::{ExactRule, Keep, MappingFile, PrefixRule};
  use tempfile::tempdir;

  fn table() -> MappingTable {
    MappingTable::from_rules(MappingFile {
      exact: vec![
        ExactRule {
          pattern: "/wp-content/themes/t/img/logo.svg".into(),
          replacement: "/assets/img/logo.svg".into(),
        },
        ExactRule {
          pattern: "/old-faq/".into(),
          replacement: "/faq/".into(),
        },
      ],
      prefix: vec![PrefixRule {
        prefix: "/assets/old/".into(),
        replacement: "/assets/img/".into(),
        keep: Keep::Suffix,
      }],
    })
    .expect("valid table")
  }

  fn hosts() -> OriginHosts {
    OriginHosts::new(["origin.example"])
  }

  fn run(text: &str) -> RewriteResult {
    rewrite(Path::new("index.html"), text, &table(), &hosts())
  }

  #[test]
  fn rewrites_absolute_origin_image() {
    let result = run(r#"<img src="https://origin.example/wp-content/themes/t/img/logo.svg">"#);

    assert_eq!(result.new_text, r#"<img src="/assets/img/logo.svg">"#);
    assert_eq!(result.substitution_count, 1);
    assert!(result.should_write());
  }

  #[test]
  fn rewrites_srcset_entries_independently() {
    let result = run(r#"<img srcset="/assets/old/a.webp 300w, /assets/old/b.webp 768w">"#);

    assert_eq!(
      result.new_text,
      r#"<img srcset="/assets/img/a.webp 300w, /assets/img/b.webp 768w">"#
    );
    assert_eq!(result.substitution_count, 2);
  }

  #[test]
  fn second_pass_is_a_no_op() {
    let html = r#"<link rel="icon" href="https://origin.example/wp-content/themes/t/img/logo.svg?001">
<img srcset="/assets/old/a.webp 300w,/assets/old/b.webp 768w" src='/assets/old/a.webp'>"#;
    let first = run(html);
    let second = run(&first.new_text);

    assert_eq!(first.substitution_count, 4);
    assert_eq!(second.substitution_count, 0);
    assert_eq!(second.new_text, first.new_text);
    assert!(!second.should_write());
  }

  #[test]
  fn unmatched_documents_are_byte_identical() {
    let html = "<!doctype html>\n<img  srcset=\" /assets/img/a.webp   1x ,\n/assets/img/b.webp 2x \" >\r\n<a href=/contact/>x</a>";
    let result = run(html);

    assert_eq!(result.substitution_count, 0);
    assert_eq!(result.new_text, html);
  }

  #[test]
  fn leaves_text_comments_and_scripts_alone() {
    let html = r#"<p>/wp-content/themes/t/img/logo.svg</p>
<!-- <img src="/wp-content/themes/t/img/logo.svg"> -->
<script>var u = "/wp-content/themes/t/img/logo.svg";</script>"#;
    let result = run(html);

    assert_eq!(result.substitution_count, 0);
    assert_eq!(result.new_text, html);
  }

  #[test]
  fn keeps_fragments_and_drops_queries() {
    let result = run(r#"<a href='/old-faq/?lang=ja#q2'>FAQ</a><a href=/old-faq/>FAQ</a>"#);
    assert_eq!(
      result.new_text,
      r#"<a href='/faq/#q2'>FAQ</a><a href=/faq/>FAQ</a>"#
    );
  }

  #[test]
  fn rewrites_whole_unquoted_values_with_queries() {
    let first = run("<img src=/assets/old/a.png?ver=1 alt=x>");
    assert_eq!(first.new_text, "<img src=/assets/img/a.png alt=x>");
    assert_eq!(first.substitution_count, 1);

    let second = run(&first.new_text);
    assert_eq!(second.substitution_count, 0);
    assert_eq!(second.new_text, first.new_text);
  }

  #[test]
  fn never_rewrites_foreign_hosts() {
    let html = r#"<img src="https://cdn.example/wp-content/themes/t/img/logo.svg">"#;
    assert_eq!(run(html).new_text, html);
  }

  #[test]
  fn partially_scanned_documents_keep_their_tail() {
    let html = "<img src=\"/assets/old/a.webp\"><!-- <img src=\"/assets/old/b.webp\">";
    let result = run(html);

    assert_eq!(result.substitution_count, 1);
    assert!(result.parse_error.is_some());
    assert_eq!(
      result.new_text,
      "<img src=\"/assets/img/a.webp\"><!-- <img src=\"/assets/old/b.webp\">"
    );
  }

  #[test]
  fn persists_rewrites_atomically() {
    let temp = tempdir().expect("failed to create temp dir");
    let path = temp.path().join("index.html");
    let html = r#"<img src="/assets/old/a.webp">"#;
    fs::write(&path, html).unwrap();

    let result = rewrite(&path, html, &table(), &hosts());
    persist_rewrite(&result).expect("write should succeed");

    assert_eq!(fs::read_to_string(&path).unwrap(), r#"<img src="/assets/img/a.webp">"#);
    assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 1);
  }

  #[test]
  fn refuses_to_overwrite_concurrent_changes() {
    let temp = tempdir().expect("failed to create temp dir");
    let path = temp.path().join("index.html");
    let html = r#"<img src="/assets/old/a.webp">"#;
    fs::write(&path, html).unwrap();

    let result = rewrite(&path, html, &table(), &hosts());
    fs::write(&path, "edited elsewhere").unwrap();

    let err = persist_rewrite(&result).unwrap_err();
    assert!(matches!(err, WriteFailure::Modified { .. }));
    assert_eq!(fs::read_to_string(&path).unwrap(), "edited elsewhere");
    assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 1);
  }
}
