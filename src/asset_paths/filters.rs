use regex::Regex;

fn asset_reference_ignores() -> &'static [Regex] {
    use std::sync::OnceLock;

    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            vec![
                Regex::new(r"(?i)^data:").expect("invalid data URI regex"),
                Regex::new(r"(?i)^mailto:").expect("invalid mailto regex"),
                Regex::new(r"(?i)^tel:").expect("invalid tel regex"),
                Regex::new(r"(?i)^\s*javascript:").expect("invalid javascript regex"),
                Regex::new(r"^#").expect("invalid fragment regex"),
                Regex::new(r"^\s*$").expect("invalid blank regex"),
            ]
        })
        .as_slice()
}

fn non_web_scheme(value: &str) -> bool {
    use std::sync::OnceLock;

    static SCHEME: OnceLock<Regex> = OnceLock::new();
    SCHEME
        .get_or_init(|| {
            Regex::new(r"^\s*([A-Za-z][A-Za-z0-9+.-]*):").expect("invalid scheme regex")
        })
        .captures(value)
        .and_then(|caps| caps.get(1))
        .is_some_and(|scheme| {
            let scheme = scheme.as_str();
            !scheme.eq_ignore_ascii_case("http") && !scheme.eq_ignore_ascii_case("https")
        })
}

/// Determine whether a reference carries no resolvable path at all.
///
/// Data URIs, mail and phone links, script pseudo-URLs, any other non-web scheme and
/// in-page fragments never point at a file, so they are dropped before normalization.
pub fn should_ignore_asset_reference(value: &str) -> bool {
    non_web_scheme(value)
        || asset_reference_ignores()
            .iter()
            .any(|pattern| pattern.is_match(value))
}

/// Whether the path ends in a raster or vector image extension, ignoring query and fragment.
pub fn has_image_extension(value: &str) -> bool {
    use std::sync::OnceLock;

    static IMAGE: OnceLock<Regex> = OnceLock::new();
    IMAGE
        .get_or_init(|| {
            Regex::new(r"(?i)\.(?:svg|png|jpe?g|webp|gif|avif|ico|bmp)(?:[?#].*)?$")
                .expect("invalid image extension regex")
        })
        .is_match(value.trim())
}

#[cfg(test)]
mod tests {
    use super::{has_image_extension, should_ignore_asset_reference};

    #[test]
    fn keeps_http_urls() {
        assert!(!should_ignore_asset_reference("https://example.com/a.png"));
        assert!(!should_ignore_asset_reference("//cdn.example.com/a.png"));
    }

    #[test]
    fn ignores_data_uris() {
        assert!(should_ignore_asset_reference("data:image/png;base64,abc"));
    }

    #[test]
    fn ignores_mail_phone_and_script_links() {
        assert!(should_ignore_asset_reference("mailto:user@example.com"));
        assert!(should_ignore_asset_reference("tel:+62123"));
        assert!(should_ignore_asset_reference("JavaScript:void(0)"));
    }

    #[test]
    fn ignores_other_non_web_schemes() {
        assert!(should_ignore_asset_reference("sms:123"));
        assert!(should_ignore_asset_reference("skype:user?call"));
        assert!(should_ignore_asset_reference(" line:add"));
        assert!(!should_ignore_asset_reference("HTTP://origin.example/a.png"));
    }

    #[test]
    fn ignores_in_page_fragments_and_blanks() {
        assert!(should_ignore_asset_reference("#top"));
        assert!(should_ignore_asset_reference("  "));
    }

    #[test]
    fn keeps_relative_paths() {
        assert!(!should_ignore_asset_reference("images/photo.png"));
        assert!(!should_ignore_asset_reference("/faq/#faq-01"));
    }

    #[test]
    fn detects_image_extensions_with_cache_busters() {
        assert!(has_image_extension("/assets/img/logo.svg?001"));
        assert!(has_image_extension("photo.JPEG"));
        assert!(!has_image_extension("/assets/css/main.css"));
        assert!(!has_image_extension("/faq/"));
    }
}
