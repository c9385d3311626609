//! Page acquisition entry point.
//!
//! [`Fetcher::fetch`] picks exactly one strategy per request from
//! `DriverOptions::use_browser` and returns the decoded page:
//!
//! - [`Strategy::Http`]: one GET through [`trawl_http::HttpFetcher`]
//! - [`Strategy::Browser`]: a rendered page through [`trawl_drivers::BrowserFetcher`]
//!
//! There is no fallback between strategies; whatever the selected strategy
//! returns reaches the caller, tagged as a [`DispatchError`].
//!
//! ```no_run
//! # async fn demo() -> Result<(), trawl_fetch::DispatchError> {
//! use trawl_common::{GlobalSettings, SourceConfig};
//! use trawl_fetch::{FetchRequest, Fetcher};
//! use trawl_runtime::CancellationToken;
//!
//! let settings = GlobalSettings::default();
//! let source = SourceConfig::default();
//! let request = FetchRequest::new("https://example.com/", &source, &settings);
//! let page = Fetcher::new().fetch(&CancellationToken::new(), &request).await?;
//! let html = page.into_string().unwrap_or_default();
//! # let _ = html;
//! # Ok(()) }
//! ```

pub mod error;

use std::fmt;
use std::time::Duration;

use trawl_common::{DriverOptions, FetchError, GlobalSettings, PageStream, SourceConfig};
use trawl_drivers::BrowserFetcher;
use trawl_http::HttpFetcher;
use trawl_runtime::CancellationToken;

pub use error::DispatchError;

/// Inputs of one fetch.
#[derive(Debug, Clone, Copy)]
pub struct FetchRequest<'a> {
    pub url: &'a str,
    pub source: &'a SourceConfig,
    pub settings: &'a GlobalSettings,
}

impl<'a> FetchRequest<'a> {
    pub fn new(url: &'a str, source: &'a SourceConfig, settings: &'a GlobalSettings) -> Self {
        Self {
            url,
            source,
            settings,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Http,
    Browser,
}

impl StrategyKind {
    /// ```
    /// use trawl_common::{DriverOptions, SourceConfig};
    /// use trawl_fetch::StrategyKind;
    ///
    /// assert_eq!(StrategyKind::for_source(&SourceConfig::default()), StrategyKind::Http);
    /// let source = SourceConfig {
    ///     driver: Some(DriverOptions { use_browser: true, ..Default::default() }),
    /// };
    /// assert_eq!(StrategyKind::for_source(&source), StrategyKind::Browser);
    /// ```
    pub fn for_source(source: &SourceConfig) -> Self {
        if source.uses_browser() {
            Self::Browser
        } else {
            Self::Http
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Http => "http",
            Self::Browser => "browser",
        })
    }
}

/// The strategy selected for one request.
#[derive(Debug)]
pub enum Strategy<'a> {
    Http(&'a HttpFetcher),
    Browser(&'a BrowserFetcher, &'a DriverOptions),
}

impl<'a> Strategy<'a> {
    pub fn select(fetcher: &'a Fetcher, source: &'a SourceConfig) -> Self {
        match &source.driver {
            Some(opts) if opts.use_browser => Self::Browser(&fetcher.browser, opts),
            _ => Self::Http(&fetcher.http),
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::Http(_) => StrategyKind::Http,
            Self::Browser(..) => StrategyKind::Browser,
        }
    }

    pub async fn fetch(
        &self,
        cancel: &CancellationToken,
        request: &FetchRequest<'_>,
    ) -> Result<PageStream, FetchError> {
        match self {
            Self::Http(http) => {
                http.fetch(cancel, request.url, request.source, request.settings)
                    .await
            }
            Self::Browser(browser, opts) => {
                browser
                    .fetch(cancel, request.url, opts, request.settings)
                    .await
            }
        }
    }
}

/// Holds one instance of each strategy. Cheap to clone and safe to share
/// across concurrent fetches.
#[derive(Debug, Clone, Default)]
pub struct Fetcher {
    http: HttpFetcher,
    browser: BrowserFetcher,
}

impl Fetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strategies(http: HttpFetcher, browser: BrowserFetcher) -> Self {
        Self { http, browser }
    }

    /// Override the per-fetch budget of both strategies.
    pub fn with_timeout(self, dur: Duration) -> Self {
        Self {
            http: self.http.with_timeout(dur),
            browser: self.browser.with_timeout(dur),
        }
    }

    pub async fn fetch(
        &self,
        cancel: &CancellationToken,
        request: &FetchRequest<'_>,
    ) -> Result<PageStream, DispatchError> {
        let strategy = Strategy::select(self, request.source);
        let kind = strategy.kind();
        let fetch_id = format!("f{}", uuid::Uuid::new_v4().simple());
        tracing::info!(
            target: "trawl::fetch",
            %fetch_id,
            strategy=%kind,
            url=%request.url,
            "fetch.start"
        );

        match strategy.fetch(cancel, request).await {
            Ok(page) => {
                tracing::info!(
                    target: "trawl::fetch",
                    %fetch_id,
                    strategy=%kind,
                    encoding=page.encoding().name(),
                    "fetch.done"
                );
                Ok(page)
            }
            Err(source) => {
                tracing::warn!(
                    target: "trawl::fetch",
                    %fetch_id,
                    strategy=%kind,
                    url=%request.url,
                    error=%source,
                    interrupted=source.is_interrupted(),
                    "fetch.error"
                );
                Err(DispatchError {
                    strategy: kind,
                    url: request.url.to_string(),
                    source,
                })
            }
        }
    }
}
