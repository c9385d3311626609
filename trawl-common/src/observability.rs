//! Tracing setup for hosts that embed the fetch engine.
//!
//! Fetch events are grouped under a handful of targets so a host can tune
//! them independently of its dependencies:
//!
//! | target           | emitted by                                   |
//! |------------------|----------------------------------------------|
//! | `trawl::fetch`   | dispatcher start/done/error per request      |
//! | `trawl::http`    | HTTP strategy requests and failures          |
//! | `trawl::browser` | allocator, CDP steps and teardown            |
//! | `trawl::cookies` | cookie injection and the rendered jar        |
//! | `trawl::scope`   | budget expiry and cancellation               |
//! | `http.raw`       | full request/response dumps (`TRAWL_HTTP_RAW`) |
//!
//! [`init_logging`] installs one daily-rolling file sink (plus optional
//! stderr) the first time it is called; later calls return the same path.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::Context;
use chrono::Local;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Targets that carry fetch-level events.
pub const FETCH_TARGETS: [&str; 5] = [
    "trawl::fetch",
    "trawl::http",
    "trawl::browser",
    "trawl::cookies",
    "trawl::scope",
];

/// Target of raw HTTP exchange dumps.
pub const RAW_TARGET: &str = "http.raw";

const LOG_DIR_ENV: &str = "TRAWL_LOG_DIR";
const LOG_FORMAT_ENV: &str = "TRAWL_LOG_FORMAT";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// `TRAWL_LOG_FORMAT=json` selects JSON; anything else is text.
    pub fn from_env() -> Self {
        match std::env::var(LOG_FORMAT_ENV) {
            Ok(raw) if raw.trim().eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Sink and verbosity for [`init_logging`].
///
/// `RUST_LOG`, when set, replaces [`LogConfig::directives`] entirely.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// File name stem; the sink writes `<file_stem>.log.<date>`.
    pub file_stem: &'static str,
    /// Explicit directory. Falls back to `TRAWL_LOG_DIR`, then
    /// `~/.local/share/trawl`.
    pub log_dir: Option<PathBuf>,
    pub format: LogFormat,
    pub stderr: bool,
    /// Level for everything outside the fetch targets (reqwest, hyper,
    /// chromiumoxide and the host itself).
    pub base_level: LevelFilter,
    /// Level for [`FETCH_TARGETS`].
    pub fetch_level: LevelFilter,
    /// Let [`RAW_TARGET`] events through. They are only produced when
    /// `TRAWL_HTTP_RAW` is set.
    pub raw_http: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file_stem: "trawl",
            log_dir: None,
            format: LogFormat::Text,
            stderr: false,
            base_level: LevelFilter::WARN,
            fetch_level: LevelFilter::INFO,
            raw_http: false,
        }
    }
}

impl LogConfig {
    /// Verbose fetch logging mirrored to stderr, format from `TRAWL_LOG_FORMAT`.
    pub fn for_tests(file_stem: &'static str) -> Self {
        Self {
            file_stem,
            format: LogFormat::from_env(),
            stderr: true,
            fetch_level: LevelFilter::DEBUG,
            raw_http: true,
            ..Self::default()
        }
    }

    /// Filter directives used when `RUST_LOG` is unset.
    ///
    /// ```
    /// use trawl_common::observability::LogConfig;
    ///
    /// assert_eq!(
    ///     LogConfig::default().directives(),
    ///     "warn,trawl::fetch=info,trawl::http=info,trawl::browser=info,\
    ///      trawl::cookies=info,trawl::scope=info,http.raw=off"
    /// );
    /// ```
    pub fn directives(&self) -> String {
        let fetch = level_name(self.fetch_level);
        let mut out = level_name(self.base_level);
        for target in FETCH_TARGETS {
            out.push_str(&format!(",{target}={fetch}"));
        }
        let raw = if self.raw_http {
            LevelFilter::DEBUG
        } else {
            LevelFilter::OFF
        };
        out.push_str(&format!(",{RAW_TARGET}={}", level_name(raw)));
        out
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.directives()))
    }
}

fn level_name(level: LevelFilter) -> String {
    level.to_string().to_ascii_lowercase()
}

/// Install the global subscriber and return today's log file path.
pub fn init_logging(config: LogConfig) -> anyhow::Result<PathBuf> {
    if let Some(path) = LOG_PATH.get() {
        return Ok(path.clone());
    }

    let dir = resolve_log_dir(config.log_dir.as_deref());
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("creating log directory {}", dir.display()))?;

    let file_name = format!("{}.log", config.file_stem);
    let path = dir.join(format!("{file_name}.{}", Local::now().format("%Y-%m-%d")));

    let (writer, guard) = tracing_appender::non_blocking(rolling::daily(&dir, &file_name));
    let file_layer = match config.format {
        LogFormat::Text => fmt::layer().with_writer(writer).with_ansi(false).boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(writer).boxed(),
    };
    let stderr_layer = config.stderr.then(|| match config.format {
        LogFormat::Text => fmt::layer().with_writer(std::io::stderr).boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(std::io::stderr).boxed(),
    });

    tracing_subscriber::registry()
        .with(config.filter())
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .context("installing tracing subscriber")?;

    let _ = LOG_GUARD.set(guard);
    let _ = LOG_PATH.set(path.clone());
    Ok(path)
}

fn resolve_log_dir(explicit: Option<&Path>) -> PathBuf {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let chosen = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(LOG_DIR_ENV).map(PathBuf::from));

    match (chosen, home) {
        (Some(dir), Some(home)) => match dir.strip_prefix("~") {
            Ok(rest) => home.join(rest),
            Err(_) => dir,
        },
        (Some(dir), None) => dir,
        (None, Some(home)) => home.join(".local/share/trawl"),
        (None, None) => PathBuf::from("trawl-logs"),
    }
}
