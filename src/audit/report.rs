//! Audit report aggregation and rendering.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::models::{AssetRecord, DocumentIssue, ReferenceKind};

const RULE: &str =
    "================================================================================";

/// Which part of the report a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    /// Asset under the asset root that exists.
    Existing,
    /// Asset (or checked page) that does not exist.
    Missing,
    /// Reference still pointing at a dynamic-origin path.
    Origin,
    /// Page link whose fragment names no element of the target page.
    MissingAnchor,
}

/// Aggregated findings of an audit run.
///
/// Every map is ordered so that two runs over the same tree render identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    /// Documents that were read.
    pub documents_scanned: usize,
    /// References considered after filtering `data:`, `mailto:` and similar values.
    pub references_scanned: usize,
    /// Local assets that exist, keyed by canonical path.
    pub existing: BTreeMap<String, AssetRecord>,
    /// Local assets or pages that do not exist, keyed by canonical path.
    pub missing: BTreeMap<String, AssetRecord>,
    /// Leftover dynamic-origin references, keyed by canonical path.
    pub origin: BTreeMap<String, AssetRecord>,
    /// Page links to fragments the target page does not define, keyed by `path#fragment`.
    pub missing_anchors: BTreeMap<String, AssetRecord>,
    /// Reference counts per kind.
    pub kind_counts: BTreeMap<ReferenceKind, usize>,
    /// References outside the checked tree (foreign hosts, unchecked paths).
    pub not_applicable: usize,
    /// Documents that could only be scanned partially or not at all.
    pub issues: Vec<DocumentIssue>,
}

impl Report {
    /// Insert or merge a record into a bucket.
    pub fn record(&mut self, bucket: Bucket, record: AssetRecord) {
        let map = match bucket {
            Bucket::Existing => &mut self.existing,
            Bucket::Missing => &mut self.missing,
            Bucket::Origin => &mut self.origin,
            Bucket::MissingAnchor => &mut self.missing_anchors,
        };
        merge_into(map, record);
    }

    /// Fold another report (usually a single document's findings) into this one.
    pub fn absorb(&mut self, other: Report) {
        self.documents_scanned += other.documents_scanned;
        self.references_scanned += other.references_scanned;
        self.not_applicable += other.not_applicable;
        for (kind, count) in other.kind_counts {
            *self.kind_counts.entry(kind).or_default() += count;
        }
        for record in other.existing.into_values() {
            merge_into(&mut self.existing, record);
        }
        for record in other.missing.into_values() {
            merge_into(&mut self.missing, record);
        }
        for record in other.origin.into_values() {
            merge_into(&mut self.origin, record);
        }
        for record in other.missing_anchors.into_values() {
            merge_into(&mut self.missing_anchors, record);
        }
        self.issues.extend(other.issues);
    }

    /// Distinct references that still need attention.
    pub fn unresolved_count(&self) -> usize {
        self.missing.len() + self.origin.len() + self.missing_anchors.len()
    }

    /// Records grouped into `{kind}_{category}` buckets such as `images_missing`.
    pub fn categories(&self) -> BTreeMap<String, Vec<&AssetRecord>> {
        let mut categories: BTreeMap<String, Vec<&AssetRecord>> = BTreeMap::new();
        for record in self.missing.values() {
            for kind in &record.kinds {
                categories
                    .entry(format!("{kind}_missing"))
                    .or_default()
                    .push(record);
            }
        }
        for record in self.missing_anchors.values() {
            for kind in &record.kinds {
                categories
                    .entry(format!("{kind}_missing_anchor"))
                    .or_default()
                    .push(record);
            }
        }
        for record in self.origin.values() {
            let category = record.category.as_deref().unwrap_or("origin");
            for kind in &record.kinds {
                categories
                    .entry(format!("{kind}_{category}"))
                    .or_default()
                    .push(record);
            }
        }
        categories
    }

    /// Human-readable report listing at most `sample_limit` documents per entry.
    pub fn render_text(&self, sample_limit: usize) -> String {
        ReportText {
            report: self,
            sample_limit,
        }
        .to_string()
    }

    /// Pretty-printed JSON form of the report.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn merge_into(map: &mut BTreeMap<String, AssetRecord>, record: AssetRecord) {
    match map.get_mut(&record.canonical_path) {
        Some(existing) => existing.merge(record),
        None => {
            map.insert(record.canonical_path.clone(), record);
        }
    }
}

struct ReportText<'a> {
    report: &'a Report,
    sample_limit: usize,
}

impl fmt::Display for ReportText<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.report;
        let categories = report.categories();

        writeln!(f, "{RULE}")?;
        writeln!(f, "REFERENCE AUDIT REPORT")?;
        writeln!(f, "{RULE}")?;

        for (category, records) in &categories {
            writeln!(f, "\n### {} ###\n", category.to_uppercase())?;
            for record in records {
                writeln!(f, "  {}", record.canonical_path)?;
                writeln!(f, "    Found in: {} file(s)", record.referenced_by.len())?;
                for document in record.referenced_by.iter().take(self.sample_limit) {
                    writeln!(f, "      - {document}")?;
                }
                if record.referenced_by.len() > self.sample_limit {
                    writeln!(
                        f,
                        "      ... and {} more",
                        record.referenced_by.len() - self.sample_limit
                    )?;
                }
                if let Some(mapped_to) = &record.mapped_to {
                    writeln!(f, "    Maps to: {mapped_to}")?;
                }
            }
        }

        writeln!(f, "\n{RULE}")?;
        writeln!(f, "SUMMARY")?;
        writeln!(f, "{RULE}\n")?;
        writeln!(f, "Documents scanned: {}", report.documents_scanned)?;
        writeln!(f, "References scanned: {}", report.references_scanned)?;
        writeln!(f, "Existing assets: {}", report.existing.len())?;
        writeln!(f, "Missing: {}", report.missing.len())?;
        writeln!(f, "Origin references: {}", report.origin.len())?;
        writeln!(f, "Missing anchors: {}", report.missing_anchors.len())?;
        writeln!(f, "Not applicable: {}", report.not_applicable)?;

        if !report.kind_counts.is_empty() {
            writeln!(f, "\nBy kind:")?;
            for (kind, count) in &report.kind_counts {
                writeln!(f, "  - {kind}: {count}")?;
            }
        }

        if !categories.is_empty() {
            writeln!(f, "\nBy category:")?;
            for (category, records) in &categories {
                writeln!(f, "  - {category}: {}", records.len())?;
            }
        }

        if !report.issues.is_empty() {
            writeln!(f, "\nIssues: {}", report.issues.len())?;
            for issue in &report.issues {
                writeln!(f, "  - {}: {}", issue.document, issue.message)?;
            }
        }

        Ok(())
    }
}
