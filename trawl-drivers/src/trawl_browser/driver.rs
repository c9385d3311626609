use std::path::PathBuf;
use std::time::Duration;

use chromiumoxide::{Browser, BrowserConfig, Handler};
use futures::StreamExt;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use trawl_common::{FetchError, Phase};

use crate::trawl_browser::endpoint::ConnectTarget;
use crate::trawl_browser::error::BrowserError;
use crate::trawl_browser::page::TrawlPage;
use crate::trawl_browser::script::TEARDOWN_TIMEOUT;

/// One browser session, owned by a single fetch.
///
/// Holds the CDP connection, its event-handler task and, for spawned
/// browsers, the profile directory. Call [`TrawlDriver::close`] when done;
/// dropping the guard without closing still stops the handler task and
/// removes the profile directory.
pub struct TrawlDriver {
    browser: Option<Browser>,
    handler: Option<JoinHandle<()>>,
    profile: Option<TempDir>,
    spawned: bool,
}

impl TrawlDriver {
    /// Launch or attach according to `target`. `request_timeout` bounds each
    /// CDP round-trip.
    pub async fn allocate(
        target: ConnectTarget,
        request_timeout: Duration,
    ) -> Result<Self, FetchError> {
        match target {
            ConnectTarget::Launch {
                executable,
                profile,
            } => {
                let config = launch_config(executable, &profile, request_timeout)
                    .map_err(|e| e.at(Phase::Allocate))?;
                let (browser, handler) = Browser::launch(config)
                    .await
                    .map_err(|e| BrowserError::LaunchFailed(e.to_string()).at(Phase::Allocate))?;
                info!(
                    target: "trawl::browser",
                    profile=%profile.path().display(),
                    "launched local browser"
                );
                Ok(Self {
                    browser: Some(browser),
                    handler: Some(spawn_handler(handler)),
                    profile: Some(profile),
                    spawned: true,
                })
            }
            ConnectTarget::Remote(ws_url) => {
                let (browser, handler) = Browser::connect(ws_url.as_str()).await.map_err(|e| {
                    BrowserError::ConnectFailed(format!("{ws_url}: {e}")).at(Phase::Connect)
                })?;
                info!(target: "trawl::browser", %ws_url, "connected to remote browser");
                Ok(Self {
                    browser: Some(browser),
                    handler: Some(spawn_handler(handler)),
                    profile: None,
                    spawned: false,
                })
            }
        }
    }

    /// Open a blank page target.
    pub async fn new_page(&self) -> Result<TrawlPage, FetchError> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| FetchError::automation(Phase::Connect, "browser already closed"))?;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::from(e).at(Phase::Connect))?;
        Ok(TrawlPage::new(page))
    }

    /// Close the browser (spawned only), stop the handler and remove the
    /// profile directory. Failures are logged, never returned.
    pub async fn close(mut self) {
        let spawned = self.spawned;
        let browser = self.browser.take();
        let shutdown = async move {
            let Some(mut browser) = browser else {
                return;
            };
            if !spawned {
                return;
            }
            if let Err(e) = browser.close().await {
                warn!(target: "trawl::browser", error=%e, "browser close failed");
            }
            match browser.wait().await {
                Ok(status) => debug!(target: "trawl::browser", ?status, "browser process exited"),
                Err(e) => warn!(target: "trawl::browser", error=%e, "browser process wait failed"),
            }
        };
        if tokio::time::timeout(TEARDOWN_TIMEOUT, shutdown).await.is_err() {
            warn!(target: "trawl::browser", "browser shutdown timed out");
        }

        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
        if let Some(profile) = self.profile.take() {
            let path = profile.path().to_path_buf();
            if let Err(e) = profile.close() {
                warn!(target: "trawl::browser", profile=%path.display(), error=%e, "profile removal failed");
            }
        }
        debug!(target: "trawl::browser", "browser session released");
    }
}

impl Drop for TrawlDriver {
    fn drop(&mut self) {
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
    }
}

fn launch_config(
    executable: Option<PathBuf>,
    profile: &TempDir,
    request_timeout: Duration,
) -> Result<BrowserConfig, BrowserError> {
    let mut builder = BrowserConfig::builder()
        .user_data_dir(profile.path())
        .request_timeout(request_timeout)
        .arg("--disable-gpu")
        .arg("--disable-dev-shm-usage")
        .arg("--no-first-run");
    if let Some(path) = executable {
        builder = builder.chrome_executable(path);
    }
    builder.build().map_err(BrowserError::LaunchFailed)
}

fn spawn_handler(mut handler: Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                debug!(target: "trawl::browser", error=%e, "browser event error");
            }
        }
        debug!(target: "trawl::browser", "browser event handler exited");
    })
}
