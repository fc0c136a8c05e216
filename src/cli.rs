//! Command-line interface definition for the `site-relink` binary.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

/// Audit and repair asset references of a migrated static site.
#[derive(Debug, Parser)]
#[command(name = "site-relink", version, about)]
pub struct Cli {
  /// Site root containing the documents and the asset tree.
  #[arg(short, long, global = true, default_value = ".")]
  pub root: PathBuf,

  /// Configuration file (defaults to `relink.config.json` in the site root).
  #[arg(short, long, global = true)]
  pub config: Option<PathBuf>,

  /// Mapping table overriding the configured one.
  #[arg(short, long, global = true)]
  pub mapping: Option<PathBuf>,

  /// Increase log verbosity (-v debug, -vv trace).
  #[arg(short, long, global = true, action = ArgAction::Count)]
  pub verbose: u8,

  /// Only log errors.
  #[arg(short, long, global = true, conflicts_with = "verbose")]
  pub quiet: bool,

  /// Operation to run.
  #[command(subcommand)]
  pub command: Command,
}

/// Operations offered by the binary.
#[derive(Debug, Subcommand)]
pub enum Command {
  /// Report existing, missing and leftover origin references.
  Audit(AuditArgs),
  /// Rewrite references using the mapping table.
  Rewrite(RewriteArgs),
  /// Fetch missing assets from the origin.
  Fetch(FetchArgs),
  /// Validate and list the mapping table.
  Rules,
}

/// Output format of the audit report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
  /// Human-readable text grouped by category.
  Text,
  /// Pretty-printed JSON.
  Json,
}

/// Arguments of `audit`.
#[derive(Debug, Args)]
pub struct AuditArgs {
  /// Report format.
  #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
  pub format: ReportFormat,

  /// Write the report to a file instead of stdout.
  #[arg(short, long)]
  pub output: Option<PathBuf>,

  /// Exit with status 3 when unresolved references remain.
  #[arg(long)]
  pub fail_on_missing: bool,
}

/// Arguments of `rewrite`.
#[derive(Debug, Args)]
pub struct RewriteArgs {
  /// Report what would change without writing.
  #[arg(long)]
  pub dry_run: bool,
}

/// Arguments of `fetch`.
#[derive(Debug, Args)]
pub struct FetchArgs {
  /// Origin base URL overriding `origin_url` from the configuration.
  #[arg(long)]
  pub origin: Option<String>,

  /// Maximum number of assets to attempt.
  #[arg(long)]
  pub limit: Option<usize>,

  /// Print candidate URLs without fetching.
  #[arg(long)]
  pub dry_run: bool,
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::CommandFactory;

  #[test]
  fn definition_is_consistent() {
    Cli::command().debug_assert();
  }

  #[test]
  fn parses_global_flags_after_subcommand() {
    let cli = Cli::parse_from([
      "site-relink",
      "audit",
      "--root",
      "site",
      "--format",
      "json",
      "--fail-on-missing",
      "-vv",
    ]);

    assert_eq!(cli.root, PathBuf::from("site"));
    assert_eq!(cli.verbose, 2);
    match cli.command {
      Command::Audit(args) => {
        assert_eq!(args.format, ReportFormat::Json);
        assert!(args.fail_on_missing);
      }
      other => panic!("unexpected command {other:?}"),
    }
  }

  #[test]
  fn fetch_accepts_limit_and_origin() {
    let cli = Cli::parse_from([
      "site-relink",
      "fetch",
      "--origin",
      "https://origin.example",
      "--limit",
      "5",
      "--dry-run",
    ]);

    match cli.command {
      Command::Fetch(args) => {
        assert_eq!(args.limit, Some(5));
        assert!(args.dry_run);
        assert_eq!(args.origin.as_deref(), Some("https://origin.example"));
      }
      other => panic!("unexpected command {other:?}"),
    }
  }
}
