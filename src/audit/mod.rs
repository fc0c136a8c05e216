//! Site-wide reference audit.
//!
//! Each document is scanned on its own into a partial [`Report`]; partial reports are
//! folded together with [`Report::absorb`], so nothing is shared between documents.

mod report;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, warn};

pub use report::{Bucket, Report};

use crate::asset_paths::{normalize, should_ignore_asset_reference};
use crate::extract::{decode_document, extract_references};
use crate::mapping::MappingTable;
use crate::models::{AssetRecord, DocumentIssue, Reference, ReferenceKind};
use crate::project::SiteLayout;
use crate::resolve::{Resolution, anchor_exists, resolve, resolve_page};
use crate::scanning::collect_documents;
use crate::selection::DocumentInclusion;

/// Audit every selected document under the layout's root.
///
/// Documents that fail to scan are recorded as issues and the run moves on. A document
/// with invalid UTF-8 is audited up to the first bad byte.
pub fn audit<S: DocumentInclusion>(
    layout: &SiteLayout,
    selection: &S,
    table: &MappingTable,
) -> Result<Report> {
    let documents = collect_documents(layout, selection)
        .with_context(|| format!("failed to scan {}", layout.root.display()))?;

    let mut report = Report::default();
    for document in documents {
        let partial = match fs::read(&document) {
            Ok(bytes) => {
                let (text, encoding_error) = decode_document(&document, &bytes);
                let mut partial = audit_document(layout, table, &document, text);
                if let Some(err) = encoding_error {
                    warn!("{err}");
                    partial.issues.push(DocumentIssue {
                        document: layout.relative_document(&document),
                        message: format!("line {}: {}", err.line, err.reason),
                    });
                }
                partial
            }
            Err(err) => {
                warn!("skipping {}: {err}", document.display());
                Report {
                    issues: vec![DocumentIssue {
                        document: layout.relative_document(&document),
                        message: format!("failed to read: {err}"),
                    }],
                    ..Report::default()
                }
            }
        };
        report.absorb(partial);
    }

    Ok(report)
}

/// Findings for a single document.
pub fn audit_document(
    layout: &SiteLayout,
    table: &MappingTable,
    document: &Path,
    text: &str,
) -> Report {
    let relative = layout.relative_document(document);
    let extraction = extract_references(document, text);

    let mut report = Report {
        documents_scanned: 1,
        ..Report::default()
    };

    for reference in &extraction.references {
        classify_reference(layout, table, &relative, reference, &mut report);
    }

    if let Some(err) = extraction.error {
        warn!("{err}");
        report.issues.push(DocumentIssue {
            document: relative,
            message: format!("line {}: {}", err.line, err.reason),
        });
    }

    report
}

fn classify_reference(
    layout: &SiteLayout,
    table: &MappingTable,
    document: &str,
    reference: &Reference,
    report: &mut Report,
) {
    if should_ignore_asset_reference(&reference.raw_url) {
        return;
    }

    report.references_scanned += 1;
    *report.kind_counts.entry(reference.kind).or_default() += 1;

    let canonical = normalize(&reference.raw_url);
    let mapped_to = table.lookup(&canonical);

    let mut resolution = resolve(&canonical, layout);
    let mut bucket_for_missing = Bucket::Missing;
    let mut page_link = false;

    if resolution == Resolution::NotApplicable && layout.origin_hosts.accepts(canonical.host()) {
        if let Some(label) = layout.origin_category(canonical.path()) {
            let mut record = AssetRecord::local(canonical.path(), None);
            record.category = Some(label.to_string());
            resolution = Resolution::Local(record);
            bucket_for_missing = Bucket::Origin;
        } else if layout.check_page_links && reference.kind == ReferenceKind::AnchorLink {
            resolution = resolve_page(&canonical, layout);
            page_link = true;
        }
    }

    if page_link && anchor_exists(&canonical, layout) == Some(false) {
        let target = format!(
            "{}#{}",
            canonical.path(),
            canonical.fragment().unwrap_or_default()
        );
        let mut record = AssetRecord::local(target, None);
        record.referenced_by.insert(document.to_string());
        record.kinds.insert(reference.kind);
        report.record(Bucket::MissingAnchor, record);
    }

    match resolution {
        Resolution::NotApplicable => {
            debug!("{document}: {} is outside the checked tree", reference.raw_url);
            report.not_applicable += 1;
        }
        Resolution::Local(mut record) => {
            record.referenced_by.insert(document.to_string());
            record.kinds.insert(reference.kind);
            record.mapped_to = mapped_to;
            let bucket = if record.exists_locally {
                Bucket::Existing
            } else {
                bucket_for_missing
            };
            report.record(bucket, record);
        }
    }
}
