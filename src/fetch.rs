//! Backfilling missing local assets from the dynamic origin.
//!
//! Requests go out one at a time, never faster than the configured delay, and each
//! candidate URL is tried once per run. Downloads land in a temporary file next to the
//! target and are renamed into place only after the last byte arrived.

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use url::Url;

use crate::asset_paths::{generate_origin_candidates, normalize};
use crate::audit::Report;
use crate::config::FetchConfig;
use crate::error::FetchError;
use crate::mapping::MappingTable;
use crate::project::SiteLayout;

/// Retrieves the bytes behind a URL and persists them at a local path.
pub trait Fetcher {
  /// Fetch `url` into `target`, returning the number of bytes written.
  fn fetch(&self, url: &str, target: &Path) -> Result<u64, FetchError>;
}

/// Blocking HTTP fetcher with connect/read timeouts.
pub struct HttpFetcher {
  agent: ureq::Agent,
}

impl HttpFetcher {
  /// Build a fetcher from the configured timeout and User-Agent.
  pub fn new(config: &FetchConfig) -> Self {
    let timeout = Duration::from_secs(config.timeout_secs.max(1));
    let agent = ureq::AgentBuilder::new()
      .timeout_connect(timeout)
      .timeout_read(timeout)
      .user_agent(&config.user_agent)
      .build();
    Self { agent }
  }
}

impl Fetcher for HttpFetcher {
  fn fetch(&self, url: &str, target: &Path) -> Result<u64, FetchError> {
    match self.agent.get(url).call() {
      Ok(response) => persist_download(url, target, response.into_reader()),
      Err(ureq::Error::Status(status, _)) => Err(FetchError::Status {
        url: url.to_string(),
        status,
      }),
      Err(ureq::Error::Transport(err)) => Err(FetchError::Transport {
        url: url.to_string(),
        message: err.to_string(),
      }),
    }
  }
}

/// Copy the body of `url` from `reader` into `target` through a temporary sibling file.
///
/// Either the complete, non-empty stream ends up at `target` or nothing does.
pub fn persist_download(url: &str, target: &Path, mut reader: impl Read) -> Result<u64, FetchError> {
  let io_failure = |source: io::Error| FetchError::Io {
    path: target.to_path_buf(),
    source,
  };

  let dir = target
    .parent()
    .filter(|parent| !parent.as_os_str().is_empty())
    .unwrap_or_else(|| Path::new("."));
  fs::create_dir_all(dir).map_err(io_failure)?;

  let mut temp = NamedTempFile::new_in(dir).map_err(io_failure)?;
  let written = io::copy(&mut reader, &mut temp).map_err(io_failure)?;
  if written == 0 {
    return Err(FetchError::EmptyBody {
      url: url.to_string(),
    });
  }
  temp.flush().map_err(io_failure)?;
  temp.as_file().sync_all().map_err(io_failure)?;
  temp
    .persist(target)
    .map_err(|err| io_failure(err.error))?;
  Ok(written)
}

/// Enforces a minimum delay between consecutive requests.
#[derive(Debug)]
pub struct RateLimiter {
  delay: Duration,
  last: Option<Instant>,
}

impl RateLimiter {
  /// Limiter allowing one request per `delay`.
  pub fn new(delay: Duration) -> Self {
    Self { delay, last: None }
  }

  /// Block until the next request may be issued.
  pub fn wait(&mut self) {
    if let Some(last) = self.last {
      let elapsed = last.elapsed();
      if elapsed < self.delay {
        thread::sleep(self.delay - elapsed);
      }
    }
    self.last = Some(Instant::now());
  }
}

/// Parameters of a backfill run.
#[derive(Debug, Clone)]
pub struct BackfillOptions<'a> {
  /// Base URL of the origin.
  pub origin: &'a Url,
  /// Origin path templates (`{name}`, `{path}`).
  pub templates: &'a [String],
  /// Maximum number of assets to attempt.
  pub limit: Option<usize>,
  /// Only plan candidates without issuing requests.
  pub dry_run: bool,
}

/// Asset written by a backfill run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchedAsset {
  /// Canonical local path.
  pub canonical_path: String,
  /// URL that served the bytes.
  pub url: String,
  /// Bytes written.
  pub bytes: u64,
}

/// Asset that no candidate could provide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchFailure {
  /// Canonical local path.
  pub canonical_path: String,
  /// Last error encountered.
  pub error: String,
}

/// Candidate URLs planned for one asset in a dry run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedFetch {
  /// Canonical local path.
  pub canonical_path: String,
  /// Candidate URLs in the order they would be tried.
  pub candidates: Vec<String>,
}

/// Outcome of a backfill run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillSummary {
  /// Assets now present locally.
  pub fetched: Vec<FetchedAsset>,
  /// Assets no candidate could provide.
  pub failed: Vec<FetchFailure>,
  /// Dry-run plans.
  pub planned: Vec<PlannedFetch>,
  /// Assets that appeared locally since the audit.
  pub already_present: usize,
  /// Assets left untouched because the limit was reached.
  pub deferred: usize,
}

/// Try to fetch every missing asset of `report` from the origin.
///
/// Only assets under the asset root are considered. Candidates come from the mapping
/// table's reverse exact rules, then the templates, then the local path on the origin;
/// the first success wins.
pub fn backfill<F: Fetcher>(
  report: &Report,
  layout: &SiteLayout,
  table: &MappingTable,
  options: &BackfillOptions<'_>,
  fetcher: &F,
  limiter: &mut RateLimiter,
) -> BackfillSummary {
  let mut summary = BackfillSummary::default();
  let mut attempted = 0;

  for canonical_path in report.missing.keys() {
    let canonical = normalize(canonical_path);
    if !canonical.is_under(&layout.asset_root) {
      continue;
    }

    let target = layout.local_path(canonical_path);
    if target.is_file() {
      debug!("{canonical_path} already present");
      summary.already_present += 1;
      continue;
    }

    if options.limit.is_some_and(|limit| attempted >= limit) {
      summary.deferred += 1;
      continue;
    }
    attempted += 1;

    let candidates = generate_origin_candidates(
      options.origin,
      &canonical,
      &layout.asset_root,
      &table.origins_for(canonical_path),
      options.templates,
    );

    if options.dry_run {
      summary.planned.push(PlannedFetch {
        canonical_path: canonical_path.clone(),
        candidates,
      });
      continue;
    }

    match fetch_first(canonical_path, &candidates, &target, fetcher, limiter) {
      Ok((url, bytes)) => {
        info!("fetched {canonical_path} from {url} ({bytes} bytes)");
        summary.fetched.push(FetchedAsset {
          canonical_path: canonical_path.clone(),
          url,
          bytes,
        });
      }
      Err(err) => {
        warn!("could not fetch {canonical_path}: {err}");
        summary.failed.push(FetchFailure {
          canonical_path: canonical_path.clone(),
          error: err.to_string(),
        });
      }
    }
  }

  summary
}

fn fetch_first<F: Fetcher>(
  canonical_path: &str,
  candidates: &[String],
  target: &Path,
  fetcher: &F,
  limiter: &mut RateLimiter,
) -> Result<(String, u64), FetchError> {
  let mut last_error = None;
  for url in candidates {
    limiter.wait();
    match fetcher.fetch(url, target) {
      Ok(bytes) => return Ok((url.clone(), bytes)),
      Err(err) => {
        debug!("{url}: {err}");
        last_error = Some(err);
      }
    }
  }
  Err(last_error.unwrap_or_else(|| FetchError::NoCandidates(canonical_path.to_string())))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::mapping::{ExactRule, MappingFile};
  use crate::models::AssetRecord;
  use std::cell::RefCell;
  use tempfile::tempdir;

  struct MockFetcher {
    serves: Vec<&'static str>,
    body: &'static [u8],
    requested: RefCell<Vec<String>>,
  }

  impl MockFetcher {
    fn serving(serves: Vec<&'static str>) -> Self {
      Self {
        serves,
        body: b"bytes",
        requested: RefCell::new(Vec::new()),
      }
    }
  }

  impl Fetcher for MockFetcher {
    fn fetch(&self, url: &str, target: &Path) -> Result<u64, FetchError> {
      self.requested.borrow_mut().push(url.to_string());
      if self.serves.iter().any(|served| *served == url) {
        persist_download(url, target, self.body)
      } else {
        Err(FetchError::Status {
          url: url.to_string(),
          status: 404,
        })
      }
    }
  }

  struct FailingReader {
    sent: bool,
  }

  impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
      if self.sent {
        return Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset"));
      }
      self.sent = true;
      buf[..4].copy_from_slice(b"part");
      Ok(4)
    }
  }

  fn report(paths: &[&str]) -> Report {
    let mut report = Report::default();
    for path in paths {
      report
        .missing
        .insert(path.to_string(), AssetRecord::local(*path, None));
    }
    report
  }

  fn origin() -> Url {
    Url::parse("https://origin.example").unwrap()
  }

  fn no_delay() -> RateLimiter {
    RateLimiter::new(Duration::ZERO)
  }

  #[test]
  fn interrupted_downloads_leave_no_file() {
    let temp = tempdir().expect("failed to create temp dir");
    let target = temp.path().join("assets/img/a.png");

    let err = persist_download("https://origin.example/a.png", &target, FailingReader {
      sent: false,
    })
    .unwrap_err();

    match err {
      FetchError::Io { source, .. } => assert_eq!(source.kind(), io::ErrorKind::ConnectionReset),
      other => panic!("unexpected error: {other}"),
    }
    assert!(!target.exists());
    assert_eq!(fs::read_dir(target.parent().unwrap()).unwrap().count(), 0);
  }

  #[test]
  fn empty_bodies_are_failures_and_leave_no_file() {
    let temp = tempdir().expect("failed to create temp dir");
    let layout = SiteLayout::new(temp.path());
    let origin = origin();
    let options = BackfillOptions {
      origin: &origin,
      templates: &[],
      limit: None,
      dry_run: false,
    };
    let mut fetcher = MockFetcher::serving(vec!["https://origin.example/assets/img/empty.png"]);
    fetcher.body = &b""[..];

    let summary = backfill(
      &report(&["/assets/img/empty.png"]),
      &layout,
      &MappingTable::empty(),
      &options,
      &fetcher,
      &mut no_delay(),
    );

    assert!(summary.fetched.is_empty());
    assert_eq!(summary.failed.len(), 1);
    assert!(summary.failed[0].error.contains("empty body"));
    let dir = temp.path().join("assets/img");
    assert!(!dir.join("empty.png").exists());
    assert_eq!(fs::read_dir(dir).unwrap().count(), 0);
  }

  #[test]
  fn tries_candidates_in_order_until_one_succeeds() {
    let temp = tempdir().expect("failed to create temp dir");
    let layout = SiteLayout::new(temp.path());
    let table = MappingTable::from_rules(MappingFile {
      exact: vec![ExactRule {
        pattern: "/wp-content/themes/t/img/logo.svg".into(),
        replacement: "/assets/img/logo.svg".into(),
      }],
      prefix: Vec::new(),
    })
    .unwrap();
    let templates = vec!["/wp-content/uploads/{name}".to_string()];
    let origin = origin();
    let options = BackfillOptions {
      origin: &origin,
      templates: &templates,
      limit: None,
      dry_run: false,
    };
    let fetcher = MockFetcher::serving(vec!["https://origin.example/wp-content/uploads/logo.svg"]);

    let summary = backfill(
      &report(&["/assets/img/logo.svg", "/wp-content/uploads/x.png"]),
      &layout,
      &table,
      &options,
      &fetcher,
      &mut no_delay(),
    );

    assert_eq!(fetcher.requested.borrow().clone(), vec![
      "https://origin.example/wp-content/themes/t/img/logo.svg".to_string(),
      "https://origin.example/wp-content/uploads/logo.svg".to_string(),
    ]);
    assert_eq!(summary.fetched.len(), 1);
    assert_eq!(summary.fetched[0].bytes, 5);
    assert_eq!(
      fs::read(temp.path().join("assets/img/logo.svg")).unwrap(),
      b"bytes"
    );
  }

  #[test]
  fn failures_are_reported_once() {
    let temp = tempdir().expect("failed to create temp dir");
    let layout = SiteLayout::new(temp.path());
    let origin = origin();
    let options = BackfillOptions {
      origin: &origin,
      templates: &[],
      limit: None,
      dry_run: false,
    };
    let fetcher = MockFetcher::serving(Vec::new());

    let summary = backfill(
      &report(&["/assets/img/gone.png"]),
      &layout,
      &MappingTable::empty(),
      &options,
      &fetcher,
      &mut no_delay(),
    );

    assert_eq!(fetcher.requested.borrow().len(), 1);
    assert_eq!(summary.failed.len(), 1);
    assert!(summary.failed[0].error.contains("404"));
    assert!(!temp.path().join("assets/img/gone.png").exists());
  }

  #[test]
  fn limit_and_dry_run_stop_requests() {
    let temp = tempdir().expect("failed to create temp dir");
    let layout = SiteLayout::new(temp.path());
    let origin = origin();
    let options = BackfillOptions {
      origin: &origin,
      templates: &[],
      limit: Some(1),
      dry_run: true,
    };
    let fetcher = MockFetcher::serving(Vec::new());

    let summary = backfill(
      &report(&["/assets/img/a.png", "/assets/img/b.png"]),
      &layout,
      &MappingTable::empty(),
      &options,
      &fetcher,
      &mut no_delay(),
    );

    assert!(fetcher.requested.borrow().is_empty());
    assert_eq!(summary.planned.len(), 1);
    assert_eq!(summary.planned[0].candidates, vec![
      "https://origin.example/assets/img/a.png".to_string()
    ]);
    assert_eq!(summary.deferred, 1);
  }

  #[test]
  fn rate_limiter_spaces_requests() {
    let mut limiter = RateLimiter::new(Duration::from_millis(30));
    let start = Instant::now();
    limiter.wait();
    limiter.wait();
    limiter.wait();
    assert!(start.elapsed() >= Duration::from_millis(60));
  }
}
