//! Common types and utilities shared across Trawl crates.
//!
//! This crate defines the fetch data model, the error taxonomy, cookie
//! resolution, the decoded page stream, and observability helpers used
//! throughout the Trawl workspace. It is intentionally lightweight so that
//! both fetch strategies can depend on it without pulling in each other's
//! transport stacks.
//!
//! # Overview
//!
//! - [`GlobalSettings`]: process-wide defaults (TLS policy, user agent, browser endpoint)
//! - [`SourceConfig`] and [`DriverOptions`]: per-target fetch configuration
//! - [`FetchError`]: shared error taxonomy, see [`error`]
//! - [`PageStream`]: lazily decoded page content, see [`stream`]
//! - [`cookies`]: declarative cookie resolution shared by both strategies
//! - [`observability`]: centralised tracing/logging initialisation
//!
//! # Examples
//!
//! ```rust
//! use trawl_common::{DriverOptions, SourceConfig};
//! use std::time::Duration;
//!
//! let source = SourceConfig {
//!     driver: Some(DriverOptions {
//!         use_browser: true,
//!         ..Default::default()
//!     }),
//! };
//! assert!(source.uses_browser());
//! assert_eq!(
//!     source.driver.as_ref().unwrap().settle_duration(),
//!     Duration::from_secs(2)
//! );
//! ```
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod cookies;
pub mod error;
pub mod observability;
pub mod stream;

pub use cookies::{resolve_cookies, ResolvedCookie};
pub use error::{FetchError, Phase, Result};
pub use stream::PageStream;

/// Budget for one whole fetch, strategy-agnostic. Includes body transfer.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Settle duration applied after navigation or a click when none is configured.
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(2);

/// Resolve a configured settle time in seconds; unset or non-positive means default.
pub fn settle_or_default(secs: i64) -> Duration {
    if secs > 0 {
        Duration::from_secs(secs as u64)
    } else {
        DEFAULT_SETTLE
    }
}

/// Process-wide defaults supplied by the configuration store.
///
/// Read-only from the fetch engine's perspective and passed explicitly down
/// the call chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalSettings {
    /// Validate TLS certificates on the HTTP path.
    pub verify_tls: bool,
    /// `User-Agent` for HTTP fetches; empty means "do not set".
    pub user_agent: String,
    /// Empty spawns the local browser binary. Otherwise an `http(s)://`
    /// discovery endpoint, a `ws(s)://` debugger address, or a path to a
    /// browser executable.
    pub browser_endpoint: String,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            verify_tls: true,
            user_agent: String::new(),
            browser_endpoint: String::new(),
        }
    }
}

/// Per-target fetch configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Presence is required for the browser strategy; `None` behaves like
    /// `use_browser: false`.
    #[serde(default)]
    pub driver: Option<DriverOptions>,
}

impl SourceConfig {
    pub fn uses_browser(&self) -> bool {
        self.driver.as_ref().is_some_and(|d| d.use_browser)
    }

    /// Cookies declared for this source, shared by both strategies.
    pub fn cookies(&self) -> &[CookieGroup] {
        self.driver
            .as_ref()
            .map(|d| d.cookies.as_slice())
            .unwrap_or_default()
    }

    /// Extra headers after last-write-wins merging.
    pub fn headers(&self) -> Vec<(String, String)> {
        self.driver
            .as_ref()
            .map(DriverOptions::effective_headers)
            .unwrap_or_default()
    }
}

/// Settings selecting and configuring the browser automation path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverOptions {
    #[serde(alias = "use_cdp", alias = "useCDP", alias = "usecdp")]
    pub use_browser: bool,
    /// Seconds to settle after navigation; `<= 0` means [`DEFAULT_SETTLE`].
    pub sleep: i64,
    pub headers: Vec<HeaderSpec>,
    pub cookies: Vec<CookieGroup>,
    pub clicks: Vec<ClickAction>,
}

impl DriverOptions {
    pub fn settle_duration(&self) -> Duration {
        settle_or_default(self.sleep)
    }

    /// Merge declared headers in order. Empty keys are skipped and a later
    /// entry replaces an earlier one with the same (ASCII case-insensitive) key.
    ///
    /// ```
    /// use trawl_common::{DriverOptions, HeaderSpec};
    ///
    /// let opts = DriverOptions {
    ///     headers: vec![
    ///         HeaderSpec::new("Accept", "text/html"),
    ///         HeaderSpec::new("", "ignored"),
    ///         HeaderSpec::new("accept", "*/*"),
    ///     ],
    ///     ..Default::default()
    /// };
    /// assert_eq!(
    ///     opts.effective_headers(),
    ///     vec![("accept".to_string(), "*/*".to_string())]
    /// );
    /// ```
    pub fn effective_headers(&self) -> Vec<(String, String)> {
        let mut merged: Vec<(String, String)> = Vec::with_capacity(self.headers.len());
        for h in &self.headers {
            if h.key.is_empty() {
                continue;
            }
            match merged
                .iter_mut()
                .find(|(k, _)| k.eq_ignore_ascii_case(&h.key))
            {
                Some(slot) => *slot = (h.key.clone(), h.value.clone()),
                None => merged.push((h.key.clone(), h.value.clone())),
            }
        }
        merged
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderSpec {
    #[serde(alias = "Key")]
    pub key: String,
    #[serde(default, alias = "Value")]
    pub value: String,
}

impl HeaderSpec {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A click on the first node matched by an XPath expression.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickAction {
    pub xpath: String,
    /// Seconds to settle after the click; `<= 0` means [`DEFAULT_SETTLE`].
    pub sleep: i64,
}

impl ClickAction {
    pub fn settle_duration(&self) -> Duration {
        settle_or_default(self.sleep)
    }
}

/// Cookies scoped to one URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieGroup {
    /// URL the cookies are validated and stored against; the fetch URL when absent.
    #[serde(alias = "CookieURL")]
    pub cookie_url: Option<String>,
    #[serde(alias = "Cookies")]
    pub cookies: Vec<CookieSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieSpec {
    pub name: String,
    pub value: String,
    /// When > 0, `value` is replaced by a random alphanumeric string of this length.
    pub value_random: usize,
    pub domain: String,
    pub path: Option<String>,
}
