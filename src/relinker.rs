//! Site-wide orchestration of audits, rewrites and backfills.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::audit::{self, Report};
use crate::config::ProjectConfig;
use crate::extract::decode_document;
use crate::fetch::{self, BackfillOptions, BackfillSummary, Fetcher, RateLimiter};
use crate::mapping::MappingTable;
use crate::models::DocumentIssue;
use crate::project::SiteLayout;
use crate::rewrite::{persist_rewrite, rewrite};
use crate::scanning::collect_documents;
use crate::selection::DocumentSelection;

/// Document changed (or, in a dry run, that would change) by a rewrite pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangedDocument {
  /// Document path relative to the site root.
  pub document: String,
  /// Reference spans replaced.
  pub substitutions: usize,
}

/// Outcome of rewriting every selected document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RewriteSummary {
  /// Documents that were read.
  pub documents_scanned: usize,
  /// Documents with at least one substitution.
  pub changed: Vec<ChangedDocument>,
  /// Documents that could not be read or only partially scanned.
  pub issues: Vec<DocumentIssue>,
  /// Documents whose rewrite could not be persisted.
  pub write_failures: Vec<DocumentIssue>,
}

impl RewriteSummary {
  /// Total substitutions across all documents.
  pub fn substitution_count(&self) -> usize {
    self
      .changed
      .iter()
      .map(|document| document.substitutions)
      .sum()
  }
}

/// High-level helper binding a site layout, its document selection and its mapping table.
pub struct SiteRelinker {
  layout: SiteLayout,
  selection: DocumentSelection,
  table: MappingTable,
}

impl SiteRelinker {
  /// Create a relinker. Hosts named by absolute mapping patterns count as origin hosts.
  pub fn new(mut layout: SiteLayout, selection: DocumentSelection, table: MappingTable) -> Self {
    layout.origin_hosts.extend(table.pattern_hosts());
    Self {
      layout,
      selection,
      table,
    }
  }

  /// Build a relinker for `site_root` from its configuration.
  ///
  /// The mapping table comes from `mapping_override` when given (and must exist), else
  /// from the configured mapping file (and may be absent). A defective table is an error.
  pub fn from_config(
    site_root: &Path,
    config: &ProjectConfig,
    mapping_override: Option<&Path>,
  ) -> Result<Self> {
    let layout = config.to_layout(site_root)?;
    let mapping_path = mapping_override
      .map(Path::to_path_buf)
      .unwrap_or_else(|| config.mapping_path(site_root));
    let loaded = match mapping_override {
      Some(path) => MappingTable::load(path),
      None => MappingTable::load_or_empty(&mapping_path),
    };
    let table = match loaded {
      Ok(table) => table,
      Err(err) if err.is_ambiguity() => {
        return Err(err).with_context(|| {
          format!(
            "{} declares competing rules; remove one of them",
            mapping_path.display()
          )
        });
      }
      Err(err) => return Err(err.into()),
    };
    debug!("loaded {} mapping rules", table.len());
    Ok(Self::new(layout, config.selection(), table))
  }

  /// Site layout in effect, including origin hosts contributed by the mapping table.
  pub fn layout(&self) -> &SiteLayout {
    &self.layout
  }

  /// Mapping table in effect.
  pub fn table(&self) -> &MappingTable {
    &self.table
  }

  /// Selected documents in path order.
  pub fn documents(&self) -> Result<Vec<PathBuf>> {
    collect_documents(&self.layout, &self.selection)
      .with_context(|| format!("failed to scan {}", self.layout.root.display()))
  }

  /// Audit every selected document.
  pub fn audit(&self) -> Result<Report> {
    audit::audit(&self.layout, &self.selection, &self.table)
  }

  /// Apply the mapping table to every selected document.
  ///
  /// With `dry_run` nothing is written; the summary lists what would change. Write
  /// failures are collected per document so the remaining documents are still processed.
  /// Documents that are not valid UTF-8 are reported and never written.
  pub fn rewrite_site(&self, dry_run: bool) -> Result<RewriteSummary> {
    let mut summary = RewriteSummary::default();

    for document in self.documents()? {
      let relative = self.layout.relative_document(&document);
      let bytes = match fs::read(&document) {
        Ok(bytes) => bytes,
        Err(err) => {
          warn!("skipping {relative}: {err}");
          summary.issues.push(DocumentIssue {
            document: relative,
            message: format!("failed to read: {err}"),
          });
          continue;
        }
      };
      summary.documents_scanned += 1;

      // Rewriting a decoded prefix would drop the rest of the file.
      let text = match decode_document(&document, &bytes) {
        (text, None) => text,
        (_, Some(err)) => {
          warn!("not rewriting {relative}: {err}");
          summary.issues.push(DocumentIssue {
            document: relative,
            message: format!("line {}: {}; left unchanged", err.line, err.reason),
          });
          continue;
        }
      };

      let result = rewrite(&document, text, &self.table, &self.layout.origin_hosts);
      if let Some(err) = &result.parse_error {
        warn!("{err}");
        summary.issues.push(DocumentIssue {
          document: relative.clone(),
          message: format!("line {}: {}", err.line, err.reason),
        });
      }

      if !result.should_write() {
        continue;
      }

      if dry_run {
        info!(
          "would rewrite {relative} ({} substitutions)",
          result.substitution_count
        );
      } else if let Err(err) = persist_rewrite(&result) {
        warn!("{err}");
        summary.write_failures.push(DocumentIssue {
          document: relative,
          message: err.to_string(),
        });
        continue;
      } else {
        info!(
          "rewrote {relative} ({} substitutions)",
          result.substitution_count
        );
      }

      summary.changed.push(ChangedDocument {
        document: relative,
        substitutions: result.substitution_count,
      });
    }

    Ok(summary)
  }

  /// Fetch the missing assets of `report` from the origin.
  pub fn backfill<F: Fetcher>(
    &self,
    report: &Report,
    options: &BackfillOptions<'_>,
    fetcher: &F,
    limiter: &mut RateLimiter,
  ) -> BackfillSummary {
    fetch::backfill(report, &self.layout, &self.table, options, fetcher, limiter)
  }
}
