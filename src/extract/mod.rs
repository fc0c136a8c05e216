//! Reference extraction from document markup.
//!
//! [`ReferenceScanner`] walks one document lazily and yields every URL-bearing attribute
//! value as a [`Reference`]. The same stream feeds the audit and the rewrite engine so
//! both always agree on what counts as a reference.

mod lexer;
mod srcset;

use std::collections::{BTreeSet, VecDeque};
use std::path::Path;

pub use srcset::{SrcsetCandidate, parse_srcset};

use crate::asset_paths::has_image_extension;
use crate::error::ParseError;
use crate::models::{Reference, ReferenceKind};

use lexer::{Attribute, LexError, Tag};

/// Lazy scanner over the references of a single document.
///
/// A clone continues from the same position; [`ReferenceScanner::new`] restarts from the
/// top. After a lexical failure the scanner yields every reference recognised up to that
/// point, then one [`ParseError`], then stops.
#[derive(Debug, Clone)]
pub struct ReferenceScanner<'a> {
    document: &'a Path,
    text: &'a str,
    cursor: usize,
    line: usize,
    line_offset: usize,
    pending: VecDeque<Reference>,
    error: Option<ParseError>,
    finished: bool,
}

impl<'a> ReferenceScanner<'a> {
    /// Start scanning `text`, attributing references to `document`.
    pub fn new(document: &'a Path, text: &'a str) -> Self {
        Self {
            document,
            text,
            cursor: 0,
            line: 1,
            line_offset: 0,
            pending: VecDeque::new(),
            error: None,
            finished: false,
        }
    }

    fn advance(&mut self) {
        match lexer::next_tag(self.text, self.cursor) {
            Ok(None) => self.finished = true,
            Ok(Some(tag)) => {
                self.cursor = tag.end;
                self.collect(&tag);
                if tag.has_raw_text_body() {
                    match lexer::skip_raw_text(self.text, &tag) {
                        Ok(next) => self.cursor = next,
                        Err(err) => self.fail(err),
                    }
                }
            }
            Err(err) => self.fail(err),
        }
    }

    fn fail(&mut self, err: LexError) {
        let line = self.line_of(err.offset);
        self.error = Some(ParseError {
            document: self.document.to_path_buf(),
            offset: err.offset,
            line,
            reason: err.reason,
        });
        self.finished = true;
    }

    fn line_of(&mut self, offset: usize) -> usize {
        if offset < self.line_offset {
            return 1 + count_newlines(&self.text.as_bytes()[..offset]);
        }
        self.line += count_newlines(&self.text.as_bytes()[self.line_offset..offset]);
        self.line_offset = offset;
        self.line
    }

    fn collect(&mut self, tag: &Tag<'_>) {
        for attribute in &tag.attributes {
            if attribute.value.trim().is_empty() {
                continue;
            }

            match attribute.name.as_str() {
                "srcset" | "data-srcset" => self.push_srcset(attribute),
                name => {
                    if let Some(kind) = classify(tag, name, attribute.value) {
                        self.push(attribute, kind);
                    }
                }
            }
        }
    }

    fn push(&mut self, attribute: &Attribute<'_>, kind: ReferenceKind) {
        let line = self.line_of(attribute.value_range.start);
        self.pending.push_back(Reference {
            raw_url: attribute.value.to_string(),
            kind,
            source_document: self.document.to_path_buf(),
            attribute: attribute.name.clone(),
            span: attribute.value_range.clone(),
            line,
            descriptor: None,
        });
    }

    fn push_srcset(&mut self, attribute: &Attribute<'_>) {
        let base = attribute.value_range.start;
        for candidate in parse_srcset(attribute.value) {
            let start = base + candidate.url_range.start;
            let line = self.line_of(start);
            self.pending.push_back(Reference {
                raw_url: candidate.url.to_string(),
                kind: ReferenceKind::Image,
                source_document: self.document.to_path_buf(),
                attribute: attribute.name.clone(),
                span: start..base + candidate.url_range.end,
                line,
                descriptor: candidate.descriptor.map(str::to_string),
            });
        }
    }
}

impl Iterator for ReferenceScanner<'_> {
    type Item = Result<Reference, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(reference) = self.pending.pop_front() {
                return Some(Ok(reference));
            }
            if self.finished {
                return self.error.take().map(Err);
            }
            self.advance();
        }
    }
}

fn count_newlines(bytes: &[u8]) -> usize {
    bytes.iter().filter(|b| **b == b'\n').count()
}

fn classify(tag: &Tag<'_>, attribute: &str, value: &str) -> Option<ReferenceKind> {
    match attribute {
        "src" => match tag.name.as_str() {
            "script" => Some(ReferenceKind::Script),
            "img" | "source" | "image" => Some(ReferenceKind::Image),
            _ => has_image_extension(value).then_some(ReferenceKind::Image),
        },
        "href" => {
            let is_link = tag.name == "link";
            if is_link && rel_contains(tag, "stylesheet") {
                Some(ReferenceKind::Stylesheet)
            } else if (is_link || tag.name == "image") && has_image_extension(value) {
                Some(ReferenceKind::Image)
            } else {
                Some(ReferenceKind::AnchorLink)
            }
        }
        "content" if tag.name == "meta" && looks_like_url(value) => {
            Some(ReferenceKind::MetaContent)
        }
        name if name.starts_with("data-") && has_image_extension(value) => {
            Some(ReferenceKind::Image)
        }
        _ => None,
    }
}

fn rel_contains(tag: &Tag<'_>, token: &str) -> bool {
    tag.attribute("rel").is_some_and(|rel| {
        rel.split_ascii_whitespace()
            .any(|value| value.eq_ignore_ascii_case(token))
    })
}

fn looks_like_url(value: &str) -> bool {
    let value = value.trim();
    let lower = value.to_ascii_lowercase();
    value.starts_with('/') || lower.starts_with("http://") || lower.starts_with("https://")
}

/// All references of a document plus the parse error that cut scanning short, if any.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// References in document order.
    pub references: Vec<Reference>,
    /// Set when scanning stopped before the end of the document.
    pub error: Option<ParseError>,
}

/// Fragment targets a document defines: every `id`, plus `name` on `<a>` elements.
///
/// Collection stops quietly at the first lexical defect.
pub fn collect_anchor_targets(text: &str) -> BTreeSet<String> {
    let mut targets = BTreeSet::new();
    let mut cursor = 0;

    while let Ok(Some(tag)) = lexer::next_tag(text, cursor) {
        cursor = tag.end;
        for attribute in &tag.attributes {
            let is_target = attribute.name == "id" || (attribute.name == "name" && tag.name == "a");
            if is_target && !attribute.value.is_empty() {
                targets.insert(attribute.value.to_string());
            }
        }
        if tag.has_raw_text_body() {
            match lexer::skip_raw_text(text, &tag) {
                Ok(next) => cursor = next,
                Err(_) => break,
            }
        }
    }

    targets
}

/// Longest valid UTF-8 prefix of a document's bytes.
///
/// Scanning covers the returned text only. When the document holds an invalid byte the
/// error points at it; the bytes from there on are never scanned.
pub fn decode_document<'a>(document: &Path, bytes: &'a [u8]) -> (&'a str, Option<ParseError>) {
    match std::str::from_utf8(bytes) {
        Ok(text) => (text, None),
        Err(err) => {
            let offset = err.valid_up_to();
            let text = std::str::from_utf8(&bytes[..offset]).unwrap_or_default();
            let error = ParseError {
                document: document.to_path_buf(),
                offset,
                line: 1 + count_newlines(&bytes[..offset]),
                reason: format!("invalid UTF-8 byte 0x{:02X}", bytes[offset]),
            };
            (text, Some(error))
        }
    }
}

/// Eagerly drain a [`ReferenceScanner`].
pub fn extract_references(document: &Path, text: &str) -> Extraction {
    let mut extraction = Extraction::default();
    for item in ReferenceScanner::new(document, text) {
        match item {
            Ok(reference) => extraction.references.push(reference),
            Err(err) => extraction.error = Some(err),
        }
    }
    extraction
}
