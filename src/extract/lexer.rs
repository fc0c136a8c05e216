//! Best-effort lexical scanning of start tags and their attributes.
//!
//! Comments, declarations, closing tags and raw-text element bodies are skipped; only
//! start tags are materialised. This is not an HTML tree builder.

use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;

/// Lexical failure at a byte offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct LexError {
    pub offset: usize,
    pub reason: String,
}

impl LexError {
    fn new(offset: usize, reason: impl Into<String>) -> Self {
        Self {
            offset,
            reason: reason.into(),
        }
    }
}

/// Attribute of a start tag with its value located in the document.
#[derive(Debug, Clone)]
pub(super) struct Attribute<'a> {
    /// Lowercased attribute name.
    pub name: String,
    /// Value text without delimiters; empty for bare attributes.
    pub value: &'a str,
    /// Byte range of `value` within the document.
    pub value_range: Range<usize>,
}

/// Start tag found in a document.
#[derive(Debug, Clone)]
pub(super) struct Tag<'a> {
    /// Lowercased tag name.
    pub name: String,
    pub attributes: Vec<Attribute<'a>>,
    /// Offset of the `<`.
    pub start: usize,
    /// Offset just past the closing `>`.
    pub end: usize,
    pub self_closing: bool,
}

impl Tag<'_> {
    /// Value of the first attribute named `name`.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attribute| attribute.name == name)
            .map(|attribute| attribute.value)
    }

    /// Elements whose body is raw text rather than markup.
    pub fn has_raw_text_body(&self) -> bool {
        !self.self_closing && matches!(self.name.as_str(), "script" | "style")
    }
}

fn attribute_pattern() -> &'static Regex {
    static ATTRIBUTE: OnceLock<Regex> = OnceLock::new();
    ATTRIBUTE.get_or_init(|| {
        Regex::new(
            r#"([^\s"'<>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'<>`]+)))?"#,
        )
        .expect("invalid attribute regex")
    })
}

fn raw_text_end_pattern(name: &str) -> &'static Regex {
    static SCRIPT: OnceLock<Regex> = OnceLock::new();
    static STYLE: OnceLock<Regex> = OnceLock::new();
    if name == "style" {
        STYLE.get_or_init(|| Regex::new(r"(?i)</style\s*>").expect("invalid style end regex"))
    } else {
        SCRIPT.get_or_init(|| Regex::new(r"(?i)</script\s*>").expect("invalid script end regex"))
    }
}

/// Find the next start tag at or after `from`.
pub(super) fn next_tag(text: &str, from: usize) -> Result<Option<Tag<'_>>, LexError> {
    let bytes = text.as_bytes();
    let mut pos = from;

    while let Some(relative) = text[pos..].find('<') {
        let start = pos + relative;
        let rest = &text[start..];

        if rest.starts_with("<!--") {
            match rest[4..].find("-->") {
                Some(close) => {
                    pos = start + 4 + close + 3;
                    continue;
                }
                None => return Err(LexError::new(start, "unterminated comment")),
            }
        }

        if rest.starts_with("<!") || rest.starts_with("<?") || rest.starts_with("</") {
            match rest.find('>') {
                Some(close) => {
                    pos = start + close + 1;
                    continue;
                }
                None => return Err(LexError::new(start, "unterminated markup declaration")),
            }
        }

        if !bytes.get(start + 1).is_some_and(u8::is_ascii_alphabetic) {
            pos = start + 1;
            continue;
        }

        let name_len = rest[1..]
            .bytes()
            .take_while(|b| b.is_ascii_alphanumeric() || *b == b'-' || *b == b':')
            .count();
        let name_end = start + 1 + name_len;
        let name = text[start + 1..name_end].to_ascii_lowercase();

        let Some(end) = find_tag_end(bytes, name_end) else {
            return Err(LexError::new(start, format!("unterminated <{name}> tag")));
        };

        let inner = &text[name_end..end - 1];
        return Ok(Some(Tag {
            attributes: parse_attributes(inner, name_end),
            self_closing: inner.trim_end().ends_with('/'),
            name,
            start,
            end,
        }));
    }

    Ok(None)
}

/// Offset just past the closing tag of a raw-text element.
pub(super) fn skip_raw_text(text: &str, tag: &Tag<'_>) -> Result<usize, LexError> {
    raw_text_end_pattern(&tag.name)
        .find_at(text, tag.end)
        .map(|found| found.end())
        .ok_or_else(|| LexError::new(tag.start, format!("unterminated <{}> element", tag.name)))
}

fn find_tag_end(bytes: &[u8], from: usize) -> Option<usize> {
    let mut index = from;
    let mut after_equals = false;

    while index < bytes.len() {
        match bytes[index] {
            b'>' => return Some(index + 1),
            b'=' => after_equals = true,
            quote @ (b'"' | b'\'') if after_equals => {
                let close = bytes[index + 1..].iter().position(|b| *b == quote)?;
                index += close + 1;
                after_equals = false;
            }
            byte if byte.is_ascii_whitespace() => {}
            _ => after_equals = false,
        }
        index += 1;
    }

    None
}

fn parse_attributes(inner: &str, base: usize) -> Vec<Attribute<'_>> {
    attribute_pattern()
        .captures_iter(inner)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str().to_ascii_lowercase();
            let value = caps.get(2).or_else(|| caps.get(3)).or_else(|| caps.get(4));
            Some(match value {
                Some(value) => Attribute {
                    name,
                    value: value.as_str(),
                    value_range: base + value.start()..base + value.end(),
                },
                None => {
                    let at = base + caps.get(0)?.end();
                    Attribute {
                        name,
                        value: "",
                        value_range: at..at,
                    }
                }
            })
        })
        .collect()
}
