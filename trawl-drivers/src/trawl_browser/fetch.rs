//! Browser fetch strategy.

use std::time::{Duration, Instant};

use reqwest::Client;
use tracing::{info, warn};
use trawl_common::{
    resolve_cookies, DriverOptions, FetchError, GlobalSettings, PageStream, FETCH_TIMEOUT,
};
use trawl_runtime::{CancellationToken, FetchScope};
use url::Url;

use crate::trawl_browser::driver::TrawlDriver;
use crate::trawl_browser::endpoint::{BrowserEndpoint, ConnectTarget};
use crate::trawl_browser::script::{build_script, open_and_execute};

/// Renders a page in a headless browser and returns its outer markup.
///
/// The discovery client is the only state and may be shared between
/// concurrent fetches.
#[derive(Clone, Debug)]
pub struct BrowserFetcher {
    pub timeout: Duration,
    client: Client,
}

impl Default for BrowserFetcher {
    fn default() -> Self {
        Self {
            timeout: FETCH_TIMEOUT,
            client: Client::new(),
        }
    }
}

impl BrowserFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Budget for the whole fetch, allocation included.
    pub fn with_timeout(mut self, dur: Duration) -> Self {
        self.timeout = dur;
        self
    }

    /// Use `client` for remote endpoint discovery.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub async fn fetch(
        &self,
        cancel: &CancellationToken,
        url: &str,
        opts: &DriverOptions,
        settings: &GlobalSettings,
    ) -> Result<PageStream, FetchError> {
        let target_url = Url::parse(url.trim())
            .map_err(|e| FetchError::Config(format!("invalid url {url:?}: {e}")))?;
        let endpoint = BrowserEndpoint::parse(&settings.browser_endpoint)?;
        let scope = FetchScope::new(cancel, self.timeout);

        let cookies = resolve_cookies(&opts.cookies, &target_url)?;
        let steps = build_script(&target_url, opts, cookies);

        info!(
            target: "trawl::browser",
            url=%target_url,
            endpoint=endpoint.kind(),
            steps=steps.len(),
            "browser.fetch.start"
        );
        let t0 = Instant::now();

        let target = scope.run(ConnectTarget::resolve(endpoint, &self.client)).await?;
        let driver = scope
            .run(TrawlDriver::allocate(target, scope.remaining()))
            .await?;

        let outcome = open_and_execute(driver.new_page(), &steps, &scope).await;
        driver.close().await;

        let dur_ms = t0.elapsed().as_millis() as u64;
        match outcome {
            Ok(html) => {
                info!(
                    target: "trawl::browser",
                    url=%target_url,
                    duration_ms=dur_ms,
                    html_len=html.len(),
                    "browser.fetch.done"
                );
                Ok(PageStream::from_text(html))
            }
            Err(err) => {
                warn!(
                    target: "trawl::browser",
                    url=%target_url,
                    duration_ms=dur_ms,
                    error=%err,
                    "browser.fetch.error"
                );
                Err(err)
            }
        }
    }
}
