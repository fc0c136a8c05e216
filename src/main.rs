use std::fs;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::warn;
use tracing_subscriber::{filter::LevelFilter, fmt};
use url::Url;

use site_relink::cli::{AuditArgs, Cli, Command, FetchArgs, ReportFormat, RewriteArgs};
use site_relink::config::ProjectConfig;
use site_relink::fetch::{BackfillOptions, HttpFetcher, RateLimiter};
use site_relink::mapping::Keep;
use site_relink::relinker::SiteRelinker;

const EXIT_FAILURE: u8 = 1;
const EXIT_UNRESOLVED: u8 = 3;

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(determine_log_level(&cli));

  match run(cli) {
    Ok(code) => code,
    Err(err) => {
      eprintln!("error: {err:#}");
      ExitCode::from(EXIT_FAILURE)
    }
  }
}

fn determine_log_level(cli: &Cli) -> LevelFilter {
  if cli.quiet {
    return LevelFilter::ERROR;
  }
  match cli.verbose {
    0 => LevelFilter::INFO,
    1 => LevelFilter::DEBUG,
    _ => LevelFilter::TRACE,
  }
}

fn init_tracing(level: LevelFilter) {
  let subscriber = fmt()
    .with_max_level(level)
    .with_target(false)
    .with_writer(std::io::stderr)
    .finish();

  if tracing::subscriber::set_global_default(subscriber).is_err() {
    tracing::warn!("Tracing subscriber already set; skipping re-initialization.");
  }
}

fn run(cli: Cli) -> Result<ExitCode> {
  let config = match &cli.config {
    Some(path) => ProjectConfig::from_path(path)?,
    None => ProjectConfig::discover(&cli.root)?,
  };
  let relinker = SiteRelinker::from_config(&cli.root, &config, cli.mapping.as_deref())?;

  match cli.command {
    Command::Audit(args) => run_audit(&relinker, &config, args),
    Command::Rewrite(args) => run_rewrite(&relinker, args),
    Command::Fetch(args) => run_fetch(&relinker, &config, args),
    Command::Rules => run_rules(&relinker),
  }
}

fn run_audit(relinker: &SiteRelinker, config: &ProjectConfig, args: AuditArgs) -> Result<ExitCode> {
  let report = relinker.audit()?;

  let mut rendered = match args.format {
    ReportFormat::Text => report.render_text(config.report.sample_limit),
    ReportFormat::Json => report.to_json().context("failed to serialise report")?,
  };
  if !rendered.ends_with('\n') {
    rendered.push('\n');
  }

  match &args.output {
    Some(path) => fs::write(path, &rendered)
      .with_context(|| format!("failed to write {}", path.display()))?,
    None => print!("{rendered}"),
  }

  let unresolved = report.unresolved_count();
  if unresolved > 0 && (args.fail_on_missing || config.fail_on_missing) {
    warn!("{unresolved} unresolved references remain");
    return Ok(ExitCode::from(EXIT_UNRESOLVED));
  }
  Ok(ExitCode::SUCCESS)
}

fn run_rewrite(relinker: &SiteRelinker, args: RewriteArgs) -> Result<ExitCode> {
  let summary = relinker.rewrite_site(args.dry_run)?;

  let verb = if args.dry_run { "would rewrite" } else { "rewrote" };
  for changed in &summary.changed {
    println!("{verb} {} ({} substitutions)", changed.document, changed.substitutions);
  }
  println!(
    "{} documents scanned, {} changed, {} substitutions, {} issues",
    summary.documents_scanned,
    summary.changed.len(),
    summary.substitution_count(),
    summary.issues.len()
  );

  if !summary.write_failures.is_empty() {
    for failure in &summary.write_failures {
      eprintln!("{}: {}", failure.document, failure.message);
    }
    bail!("{} documents could not be written", summary.write_failures.len());
  }
  Ok(ExitCode::SUCCESS)
}

fn run_fetch(relinker: &SiteRelinker, config: &ProjectConfig, args: FetchArgs) -> Result<ExitCode> {
  let origin_text = args
    .origin
    .or_else(|| config.origin_url.clone())
    .context("no origin URL: pass --origin or set origin_url in the configuration")?;
  let origin =
    Url::parse(&origin_text).with_context(|| format!("invalid origin URL {origin_text}"))?;

  let report = relinker.audit()?;
  let options = BackfillOptions {
    origin: &origin,
    templates: &config.candidate_templates,
    limit: args.limit,
    dry_run: args.dry_run,
  };
  let fetcher = HttpFetcher::new(&config.fetch);
  let mut limiter = RateLimiter::new(Duration::from_millis(config.fetch.delay_ms));
  let summary = relinker.backfill(&report, &options, &fetcher, &mut limiter);

  for plan in &summary.planned {
    println!("{}", plan.canonical_path);
    for candidate in &plan.candidates {
      println!("  {candidate}");
    }
  }
  for fetched in &summary.fetched {
    println!("fetched {} from {} ({} bytes)", fetched.canonical_path, fetched.url, fetched.bytes);
  }
  for failed in &summary.failed {
    println!("failed {}: {}", failed.canonical_path, failed.error);
  }
  println!(
    "{} fetched, {} failed, {} planned, {} already present, {} deferred",
    summary.fetched.len(),
    summary.failed.len(),
    summary.planned.len(),
    summary.already_present,
    summary.deferred
  );

  if config.fail_on_missing && !summary.failed.is_empty() {
    return Ok(ExitCode::from(EXIT_UNRESOLVED));
  }
  Ok(ExitCode::SUCCESS)
}

fn run_rules(relinker: &SiteRelinker) -> Result<ExitCode> {
  let table = relinker.table();
  for (pattern, replacement) in table.exact_rules() {
    println!("exact   {pattern} -> {replacement}");
  }
  for rule in table.prefix_rules() {
    let keep = match rule.keep {
      Keep::Basename => "basename",
      Keep::Suffix => "suffix",
    };
    println!("prefix  {} -> {} (keep {keep})", rule.prefix, rule.replacement);
  }
  let hosts: Vec<&str> = relinker.layout().origin_hosts.iter().collect();
  println!("{} rules, origin hosts: [{}]", table.len(), hosts.join(", "));
  Ok(ExitCode::SUCCESS)
}
