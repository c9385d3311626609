//! Browser endpoint classification and remote discovery.
//!
//! `GlobalSettings::browser_endpoint` selects one of three allocation modes by
//! scheme prefix (ASCII case-insensitive):
//!
//! | value            | mode                                      |
//! |------------------|-------------------------------------------|
//! | empty            | spawn the auto-detected Chrome/Chromium   |
//! | `http(s)://…`    | discover the debugger WebSocket, then connect |
//! | `ws(s)://…`      | connect directly                          |
//! | anything else    | spawn the executable at that path         |

use std::path::PathBuf;

use reqwest::Client;
use serde_json::Value;
use tempfile::TempDir;
use tracing::debug;
use trawl_common::error::error_chain;
use trawl_common::{FetchError, Phase};
use url::Url;

/// Field of the discovery response naming the browser's debugger address.
pub const DISCOVERY_FIELD: &str = "webSocketDebuggerUrl";

const PROFILE_PREFIX: &str = "trawl-browser-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserEndpoint {
    Spawn { executable: Option<PathBuf> },
    Discover(Url),
    Direct(String),
}

impl BrowserEndpoint {
    /// ```
    /// use trawl_drivers::trawl_browser::endpoint::BrowserEndpoint;
    ///
    /// assert!(matches!(
    ///     BrowserEndpoint::parse("WS://127.0.0.1:9222/devtools/browser/x").unwrap(),
    ///     BrowserEndpoint::Direct(_)
    /// ));
    /// assert_eq!(
    ///     BrowserEndpoint::parse("").unwrap(),
    ///     BrowserEndpoint::Spawn { executable: None }
    /// );
    /// ```
    pub fn parse(raw: &str) -> Result<Self, FetchError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Self::Spawn { executable: None });
        }

        let lower = raw.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            let url = Url::parse(raw).map_err(|e| {
                FetchError::Config(format!("invalid discovery endpoint {raw:?}: {e}"))
            })?;
            return Ok(Self::Discover(url));
        }
        if lower.starts_with("ws://") || lower.starts_with("wss://") {
            let ws = Url::parse(raw).map_err(|e| {
                FetchError::Config(format!("invalid websocket endpoint {raw:?}: {e}"))
            })?;
            return Ok(Self::Direct(ws.to_string()));
        }

        Ok(Self::Spawn {
            executable: Some(PathBuf::from(raw)),
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Spawn { .. } => "spawn",
            Self::Discover(_) => "discover",
            Self::Direct(_) => "direct",
        }
    }
}

/// Where the driver attaches once discovery is done.
#[derive(Debug)]
pub enum ConnectTarget {
    /// Launch a local browser with a fresh profile directory owned by the target.
    Launch {
        executable: Option<PathBuf>,
        profile: TempDir,
    },
    Remote(String),
}

impl ConnectTarget {
    pub async fn resolve(endpoint: BrowserEndpoint, client: &Client) -> Result<Self, FetchError> {
        match endpoint {
            BrowserEndpoint::Spawn { executable } => {
                let profile = tempfile::Builder::new()
                    .prefix(PROFILE_PREFIX)
                    .tempdir()
                    .map_err(|e| {
                        FetchError::automation(Phase::Allocate, format!("profile directory: {e}"))
                    })?;
                debug!(target: "trawl::browser", profile=%profile.path().display(), "created profile directory");
                Ok(Self::Launch {
                    executable,
                    profile,
                })
            }
            BrowserEndpoint::Discover(url) => {
                discover_websocket_url(client, &url).await.map(Self::Remote)
            }
            BrowserEndpoint::Direct(ws) => Ok(Self::Remote(ws)),
        }
    }
}

/// GET the discovery endpoint and return its `webSocketDebuggerUrl` verbatim.
pub async fn discover_websocket_url(client: &Client, url: &Url) -> Result<String, FetchError> {
    let resp = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| FetchError::Network(format!("discovery {url}: {}", error_chain(&e))))?;

    let status = resp.status();
    if status.as_u16() >= 400 {
        return Err(FetchError::HttpStatus {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("").to_string(),
        });
    }

    let body = resp
        .bytes()
        .await
        .map_err(|e| FetchError::Network(format!("discovery {url}: {}", error_chain(&e))))?;
    let ws = websocket_url_from(&body)
        .map_err(|why| FetchError::Config(format!("discovery {url}: {why}")))?;
    debug!(target: "trawl::browser", discovery=%url, ws_url=%ws, "resolved debugger websocket");
    Ok(ws)
}

fn websocket_url_from(body: &[u8]) -> Result<String, String> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| format!("response is not JSON: {e}"))?;
    let Value::Object(map) = value else {
        return Err("response is not a JSON object".into());
    };
    match map.get(DISCOVERY_FIELD) {
        Some(Value::String(ws)) => Ok(ws.clone()),
        Some(_) => Err(format!("{DISCOVERY_FIELD} is not a string")),
        None => Err(format!("{DISCOVERY_FIELD} is missing")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_are_case_insensitive() {
        assert!(matches!(
            BrowserEndpoint::parse("HTTP://127.0.0.1:9222/json/version").unwrap(),
            BrowserEndpoint::Discover(_)
        ));
        assert!(matches!(
            BrowserEndpoint::parse("wss://remote.test/devtools/browser/1").unwrap(),
            BrowserEndpoint::Direct(_)
        ));
    }

    #[test]
    fn direct_endpoints_get_a_lowercase_scheme() {
        assert_eq!(
            BrowserEndpoint::parse("WS://127.0.0.1:9222/devtools/browser/x").unwrap(),
            BrowserEndpoint::Direct("ws://127.0.0.1:9222/devtools/browser/x".into())
        );
        assert_eq!(
            BrowserEndpoint::parse("Wss://127.0.0.1/devtools/browser/y").unwrap(),
            BrowserEndpoint::Direct("wss://127.0.0.1/devtools/browser/y".into())
        );
    }

    #[test]
    fn other_values_are_executable_paths() {
        assert_eq!(
            BrowserEndpoint::parse("/usr/bin/chromium").unwrap(),
            BrowserEndpoint::Spawn {
                executable: Some(PathBuf::from("/usr/bin/chromium"))
            }
        );
    }

    #[test]
    fn malformed_urls_are_config_errors() {
        for raw in ["http://", "ws://[::1"] {
            assert!(
                matches!(BrowserEndpoint::parse(raw), Err(FetchError::Config(_))),
                "{raw}"
            );
        }
    }

    #[test]
    fn discovery_body_must_name_a_string_websocket() {
        assert_eq!(
            websocket_url_from(br#"{"webSocketDebuggerUrl":"ws://host/devtools/x"}"#).unwrap(),
            "ws://host/devtools/x"
        );
        assert!(websocket_url_from(b"[]").is_err());
        assert!(websocket_url_from(b"not json").is_err());
        assert!(websocket_url_from(br#"{"webSocketDebuggerUrl":7}"#).is_err());
        assert!(websocket_url_from(br#"{"Browser":"Chrome"}"#).is_err());
    }

    #[tokio::test]
    async fn spawn_targets_own_a_fresh_profile() {
        let target = ConnectTarget::resolve(
            BrowserEndpoint::Spawn { executable: None },
            &Client::new(),
        )
        .await
        .unwrap();
        let ConnectTarget::Launch { profile, .. } = target else {
            panic!("expected a launch target");
        };
        let path = profile.path().to_path_buf();
        assert!(path.is_dir());
        assert!(path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(PROFILE_PREFIX)));
        drop(profile);
        assert!(!path.exists());
    }
}
