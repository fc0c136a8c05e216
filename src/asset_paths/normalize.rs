//! Canonical, root-relative form of raw reference strings.
//!
//! - Internal representation is always decoded and rooted at `/`
//! - Scheme and host are stripped from the path but kept aside for authority checks
//! - Query strings and fragments are retained separately and never take part in equality

use std::fmt;
use std::sync::OnceLock;

use percent_encoding::percent_decode_str;
use regex::Regex;
use url::Url;

/// Normalized reference target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalPath {
    host: Option<String>,
    path: String,
    query: Option<String>,
    fragment: Option<String>,
}

impl CanonicalPath {
    /// Host (with port, when explicit) the raw reference named, if it was absolute.
    ///
    /// References with a scheme other than http or https report `scheme:` here, so no
    /// host policy ever takes them for site-relative paths.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Decoded path, always starting with `/`. This is the equality key.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query string without the leading `?`.
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Fragment without the leading `#`.
    pub fn fragment(&self) -> Option<&str> {
        self.fragment.as_deref()
    }

    /// Last path segment, `None` for directory-style paths.
    pub fn file_name(&self) -> Option<&str> {
        self.path
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty())
    }

    /// Whether the path lives below `prefix` (a `/`-rooted directory prefix).
    pub fn is_under(&self, prefix: &str) -> bool {
        let prefix = prefix.trim_end_matches('/');
        self.path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
    }
}

impl fmt::Display for CanonicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)?;
        if let Some(query) = &self.query {
            write!(f, "?{query}")?;
        }
        if let Some(fragment) = &self.fragment {
            write!(f, "#{fragment}")?;
        }
        Ok(())
    }
}

fn scheme_pattern() -> &'static Regex {
    static SCHEME: OnceLock<Regex> = OnceLock::new();
    SCHEME.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*:").expect("invalid scheme regex"))
}

fn root_base() -> &'static Url {
    static BASE: OnceLock<Url> = OnceLock::new();
    BASE.get_or_init(|| Url::parse("http://relink.invalid/").expect("invalid base URL"))
}

/// Convert a raw attribute value into its canonical form.
///
/// Absolute (`https://host/...`) and protocol-relative (`//host/...`) URLs lose their
/// scheme and host; root-relative paths are kept; anything else is resolved against the
/// site root because the migrated tree is flat-rooted.
pub fn normalize(raw: &str) -> CanonicalPath {
    let trimmed = raw.trim();

    let parsed = if let Some(rest) = trimmed.strip_prefix("//") {
        Url::parse(&format!("https://{rest}")).ok()
    } else if scheme_pattern().is_match(trimmed) {
        Url::parse(trimmed).ok()
    } else if trimmed.starts_with('/') {
        root_base().join(trimmed).ok()
    } else {
        root_base().join(&format!("/{trimmed}")).ok()
    };

    let absolute = trimmed.starts_with("//") || scheme_pattern().is_match(trimmed);
    match parsed {
        Some(url) => from_url(&url, absolute),
        None => fallback(trimmed),
    }
}

fn from_url(url: &Url, absolute: bool) -> CanonicalPath {
    // `sms:123` has no host but must never pass for a site-relative `/123`.
    if absolute && !matches!(url.scheme(), "http" | "https") {
        return CanonicalPath {
            host: Some(format!("{}:", url.scheme())),
            path: rooted(&decode(url.path())),
            query: url.query().filter(|q| !q.is_empty()).map(str::to_string),
            fragment: url.fragment().filter(|f| !f.is_empty()).map(str::to_string),
        };
    }

    let host = if absolute {
        url.host_str().map(|host| match url.port() {
            Some(port) => format!("{}:{port}", host.to_ascii_lowercase()),
            None => host.to_ascii_lowercase(),
        })
    } else {
        None
    };

    CanonicalPath {
        host,
        path: rooted(&decode(url.path())),
        query: url.query().filter(|q| !q.is_empty()).map(str::to_string),
        fragment: url.fragment().filter(|f| !f.is_empty()).map(str::to_string),
    }
}

// Only reached for strings the URL parser rejects (e.g. broken hosts).
fn fallback(trimmed: &str) -> CanonicalPath {
    let (rest, fragment) = match trimmed.split_once('#') {
        Some((rest, fragment)) => (rest, Some(fragment.to_string())),
        None => (trimmed, None),
    };
    let (path, query) = match rest.split_once('?') {
        Some((path, query)) => (path, Some(query.to_string())),
        None => (rest, None),
    };

    let path = match path.split_once("://") {
        Some((_, after_scheme)) => after_scheme
            .find('/')
            .map(|index| &after_scheme[index..])
            .unwrap_or("/"),
        None => path,
    };

    CanonicalPath {
        host: None,
        path: rooted(&decode(path)),
        query: query.filter(|q| !q.is_empty()),
        fragment: fragment.filter(|f| !f.is_empty()),
    }
}

fn decode(path: &str) -> String {
    percent_decode_str(path)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| path.to_string())
}

fn rooted(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::normalize;

    #[test]
    fn strips_scheme_and_host_from_absolute_urls() {
        let canonical = normalize("https://origin.example/wp-content/themes/t/img/logo.svg?001");
        assert_eq!(canonical.host(), Some("origin.example"));
        assert_eq!(canonical.path(), "/wp-content/themes/t/img/logo.svg");
        assert_eq!(canonical.query(), Some("001"));
    }

    #[test]
    fn keeps_explicit_ports_with_the_host() {
        let canonical = normalize("http://localhost:8080/assets/css/main.css");
        assert_eq!(canonical.host(), Some("localhost:8080"));
        assert_eq!(canonical.path(), "/assets/css/main.css");
    }

    #[test]
    fn treats_protocol_relative_urls_as_absolute() {
        let canonical = normalize("//cdn.example.com/lib/jquery.min.js");
        assert_eq!(canonical.host(), Some("cdn.example.com"));
        assert_eq!(canonical.path(), "/lib/jquery.min.js");
    }

    #[test]
    fn keeps_root_relative_paths() {
        let canonical = normalize("/assets/img/x.png");
        assert_eq!(canonical.host(), None);
        assert_eq!(canonical.path(), "/assets/img/x.png");
        assert_eq!(canonical.to_string(), "/assets/img/x.png");
    }

    #[test]
    fn resolves_document_relative_paths_against_the_root() {
        assert_eq!(normalize("assets/img/x.png").path(), "/assets/img/x.png");
        assert_eq!(normalize("./assets/img/x.png").path(), "/assets/img/x.png");
        assert_eq!(normalize("../../assets/img/x.png").path(), "/assets/img/x.png");
    }

    #[test]
    fn query_strings_do_not_change_the_resource() {
        let busted = normalize("/assets/img/x.png?v=1");
        let plain = normalize("/assets/img/x.png");
        assert_eq!(busted.path(), plain.path());
        assert_ne!(busted, plain);
    }

    #[test]
    fn non_web_schemes_never_look_site_relative() {
        let sms = normalize("sms:123");
        assert_eq!(sms.host(), Some("sms:"));
        let skype = normalize("skype:user?call");
        assert_eq!(skype.host(), Some("skype:"));
        assert_eq!(skype.query(), Some("call"));
        assert!(!crate::project::OriginHosts::new(["origin.example"]).accepts(sms.host()));
    }

    #[test]
    fn keeps_fragments_separately() {
        let canonical = normalize("/faq/#faq-01");
        assert_eq!(canonical.path(), "/faq/");
        assert_eq!(canonical.fragment(), Some("faq-01"));
        assert_eq!(canonical.to_string(), "/faq/#faq-01");
    }

    #[test]
    fn decodes_percent_escapes_consistently() {
        assert_eq!(normalize("/assets/img/a%20b.png").path(), "/assets/img/a b.png");
        assert_eq!(normalize("/assets/img/a b.png").path(), "/assets/img/a b.png");
        assert_eq!(
            normalize("https://origin.example/assets/img/a%20b.png").path(),
            "/assets/img/a b.png"
        );
    }

    #[test]
    fn reports_file_names_and_prefixes() {
        let canonical = normalize("/assets/img/logo.svg");
        assert_eq!(canonical.file_name(), Some("logo.svg"));
        assert!(canonical.is_under("/assets/"));
        assert!(canonical.is_under("/assets"));
        assert!(!normalize("/assets-old/logo.svg").is_under("/assets/"));
        assert_eq!(normalize("/faq/").file_name(), None);
    }
}
