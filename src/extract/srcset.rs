//! Splitting `srcset` values into URL candidates without disturbing their formatting.

use std::ops::Range;

/// One `url descriptor` entry of a srcset value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrcsetCandidate<'a> {
    /// URL text of the entry.
    pub url: &'a str,
    /// Byte range of `url` within the srcset value.
    pub url_range: Range<usize>,
    /// Width or density descriptor (`300w`, `2x`) when present.
    pub descriptor: Option<&'a str>,
}

/// Parse a srcset attribute value into its candidates.
///
/// Follows the HTML candidate grammar closely enough for real markup: a URL runs until
/// whitespace, trailing commas on a URL end the candidate, and descriptors run until the
/// next comma. Only ranges are reported, so callers replacing URL spans keep every
/// separator and descriptor byte-identical.
pub fn parse_srcset(value: &str) -> Vec<SrcsetCandidate<'_>> {
    let bytes = value.as_bytes();
    let mut candidates = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        while pos < bytes.len() && (bytes[pos].is_ascii_whitespace() || bytes[pos] == b',') {
            pos += 1;
        }
        if pos >= bytes.len() {
            break;
        }

        let url_start = pos;
        while pos < bytes.len() && !bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        let mut url_end = pos;

        if bytes[url_end - 1] == b',' {
            while url_end > url_start && bytes[url_end - 1] == b',' {
                url_end -= 1;
            }
            if url_end > url_start {
                candidates.push(SrcsetCandidate {
                    url: &value[url_start..url_end],
                    url_range: url_start..url_end,
                    descriptor: None,
                });
            }
            continue;
        }

        let descriptor_start = pos;
        while pos < bytes.len() && bytes[pos] != b',' {
            pos += 1;
        }
        let descriptor = value[descriptor_start..pos].trim();

        candidates.push(SrcsetCandidate {
            url: &value[url_start..url_end],
            url_range: url_start..url_end,
            descriptor: (!descriptor.is_empty()).then_some(descriptor),
        });
    }

    candidates
}
