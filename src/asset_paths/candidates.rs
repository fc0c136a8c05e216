use std::collections::BTreeSet;

use url::Url;

use super::normalize::CanonicalPath;

/// Generate candidate origin URLs for backfilling a missing local asset.
///
/// Paths the mapping table already knows as origins of the local file come first, then
/// every configured template expanded with the file name (`{name}`) and the path below
/// the asset root (`{path}`), and finally the local path itself on the origin host.
/// Duplicates are dropped while keeping the first occurrence.
pub fn generate_origin_candidates(
    origin: &Url,
    local: &CanonicalPath,
    asset_root: &str,
    known_origins: &[&str],
    templates: &[String],
) -> Vec<String> {
    let mut builder = CandidateBuilder::new(origin, local, asset_root);

    builder.add_known_origins(known_origins);
    builder.add_template_candidates(templates);

    builder.finish()
}

struct CandidateBuilder<'a> {
    origin: &'a Url,
    local: &'a CanonicalPath,
    name: Option<&'a str>,
    below_root: Option<&'a str>,
    seen: BTreeSet<String>,
    result: Vec<String>,
}

impl<'a> CandidateBuilder<'a> {
    fn new(origin: &'a Url, local: &'a CanonicalPath, asset_root: &'a str) -> Self {
        let root = asset_root.trim_end_matches('/');
        let below_root = local
            .path()
            .strip_prefix(root)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|rest| !rest.is_empty());

        Self {
            origin,
            local,
            name: local.file_name(),
            below_root,
            seen: BTreeSet::new(),
            result: Vec::new(),
        }
    }

    fn add_known_origins(&mut self, known_origins: &[&str]) {
        for path in known_origins {
            self.push(path);
        }
    }

    fn add_template_candidates(&mut self, templates: &[String]) {
        let Some(name) = self.name else {
            return;
        };

        for template in templates {
            if template.contains("{path}") && self.below_root.is_none() {
                continue;
            }
            let expanded = template
                .replace("{name}", name)
                .replace("{path}", self.below_root.unwrap_or_default());
            self.push(&expanded);
        }
    }

    fn finish(mut self) -> Vec<String> {
        let local = self.local.path().to_string();
        self.push(&local);
        self.result
    }

    fn push(&mut self, path: &str) {
        let rooted = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        let Ok(url) = self.origin.join(&rooted) else {
            return;
        };
        let candidate = url.to_string();
        if self.seen.insert(candidate.clone()) {
            self.result.push(candidate);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::generate_origin_candidates;
    use crate::asset_paths::normalize;
    use url::Url;

    fn origin() -> Url {
        Url::parse("https://origin.example").unwrap()
    }

    fn templates() -> Vec<String> {
        vec![
            "/wp-content/uploads/{name}".to_string(),
            "/wp-content/themes/t/{path}".to_string(),
        ]
    }

    #[test]
    fn prefers_known_origins_then_templates() {
        let local = normalize("/assets/img/logo.svg");
        let candidates = generate_origin_candidates(
            &origin(),
            &local,
            "/assets/",
            &["/wp-content/themes/t/img/common/logo.svg"],
            &templates(),
        );

        assert_eq!(candidates, vec![
            "https://origin.example/wp-content/themes/t/img/common/logo.svg".to_string(),
            "https://origin.example/wp-content/uploads/logo.svg".to_string(),
            "https://origin.example/wp-content/themes/t/img/logo.svg".to_string(),
            "https://origin.example/assets/img/logo.svg".to_string(),
        ]);
    }

    #[test]
    fn deduplicates_candidates() {
        let local = normalize("/assets/img/logo.svg");
        let candidates = generate_origin_candidates(
            &origin(),
            &local,
            "/assets/",
            &["/wp-content/uploads/logo.svg"],
            &templates()[..1],
        );

        assert_eq!(candidates, vec![
            "https://origin.example/wp-content/uploads/logo.svg".to_string(),
            "https://origin.example/assets/img/logo.svg".to_string(),
        ]);
    }

    #[test]
    fn skips_templates_for_directory_paths() {
        let local = normalize("/assets/img/");
        let candidates = generate_origin_candidates(&origin(), &local, "/assets/", &[], &templates());
        assert_eq!(candidates, vec!["https://origin.example/assets/img/".to_string()]);
    }

    #[test]
    fn encodes_unsafe_characters() {
        let local = normalize("/assets/img/a b.png");
        let candidates = generate_origin_candidates(&origin(), &local, "/assets/", &[], &[]);
        assert_eq!(candidates, vec!["https://origin.example/assets/img/a%20b.png".to_string()]);
    }
}
