use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, EnableParams, Headers, SetCookiesParams, SetExtraHttpHeadersParams,
    TimeSinceEpoch,
};
use chromiumoxide::Page;
use serde_json::{Map, Value};
use tracing::debug;
use trawl_common::ResolvedCookie;

use crate::trawl_browser::error::BrowserError;

/// Lifetime given to injected cookies.
const COOKIE_TTL_DAYS: i64 = 365;

/// The page operations the automation script needs.
#[async_trait]
pub trait AutomationPage: Send + Sync {
    async fn enable_network(&self) -> Result<(), BrowserError>;

    async fn set_cookies(&self, cookies: &[ResolvedCookie]) -> Result<(), BrowserError>;

    async fn set_extra_headers(&self, headers: &[(String, String)]) -> Result<(), BrowserError>;

    async fn navigate(&self, url: &str) -> Result<(), BrowserError>;

    /// Resolve `xpath` once and mouse-click the first node of that result.
    /// Returns the number of matches; with zero matches nothing is clicked.
    async fn click_first_match(&self, xpath: &str) -> Result<usize, BrowserError>;

    async fn outer_html(&self) -> Result<String, BrowserError>;

    /// Names of cookies visible to the current page. Diagnostic only.
    async fn cookie_names(&self) -> Result<Vec<String>, BrowserError>;

    /// Close the page target.
    async fn close(&self) -> Result<(), BrowserError>;
}

/// CDP-backed page target.
#[derive(Clone, Debug)]
pub struct TrawlPage {
    pub(crate) page: Page,
}

impl TrawlPage {
    pub fn new(page: Page) -> Self {
        Self { page }
    }
}

#[async_trait]
impl AutomationPage for TrawlPage {
    async fn enable_network(&self) -> Result<(), BrowserError> {
        self.page.execute(EnableParams::default()).await?;
        Ok(())
    }

    async fn set_cookies(&self, cookies: &[ResolvedCookie]) -> Result<(), BrowserError> {
        if cookies.is_empty() {
            return Ok(());
        }
        let expires = (chrono::Utc::now() + chrono::Duration::days(COOKIE_TTL_DAYS)).timestamp();
        let params = cookies
            .iter()
            .map(|c| cookie_param(c, expires as f64))
            .collect::<Result<Vec<_>, _>>()?;
        self.page.execute(SetCookiesParams::new(params)).await?;
        Ok(())
    }

    async fn set_extra_headers(&self, headers: &[(String, String)]) -> Result<(), BrowserError> {
        let map: Map<String, Value> = headers
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        self.page
            .execute(SetExtraHttpHeadersParams::new(Headers::new(Value::Object(
                map,
            ))))
            .await?;
        Ok(())
    }

    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        self.page.goto(url).await?;
        Ok(())
    }

    async fn click_first_match(&self, xpath: &str) -> Result<usize, BrowserError> {
        let matches = self.page.find_xpaths(xpath).await?;
        if let Some(first) = matches.first() {
            first.click().await?;
        }
        Ok(matches.len())
    }

    async fn outer_html(&self) -> Result<String, BrowserError> {
        self.page
            .evaluate("document.documentElement.outerHTML")
            .await
            .map_err(|e| BrowserError::JsEvalFailed(e.to_string()))?
            .into_value()
            .map_err(|e| BrowserError::JsEvalFailed(format!("{e:?}")))
    }

    async fn cookie_names(&self) -> Result<Vec<String>, BrowserError> {
        let cookies = self.page.get_cookies().await?;
        Ok(cookies.into_iter().map(|c| c.name).collect())
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.page.clone().close().await?;
        debug!(target: "trawl::browser", "page target closed");
        Ok(())
    }
}

fn cookie_param(cookie: &ResolvedCookie, expires: f64) -> Result<CookieParam, BrowserError> {
    let mut builder = CookieParam::builder()
        .name(cookie.name.clone())
        .value(cookie.value.clone())
        .expires(TimeSinceEpoch::new(expires))
        .http_only(false)
        .secure(false);
    if cookie.domain.is_empty() {
        builder = builder.url(cookie.cookie_url.as_str());
    } else {
        builder = builder.domain(cookie.domain.clone());
    }
    if let Some(path) = &cookie.path {
        builder = builder.path(path.clone());
    }
    builder.build().map_err(BrowserError::InvalidParams)
}
