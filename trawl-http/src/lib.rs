//! HTTP fetch strategy: one GET per fetch with a seeded cookie jar.
//!
//! - Headers: `User-Agent` from [`GlobalSettings`], then per-source headers (last wins)
//! - TLS verification follows `GlobalSettings::verify_tls`
//! - Redirects are followed up to [`MAX_REDIRECTS`]; one more aborts the fetch
//! - Status >= 400 fails the fetch; the body is not returned
//! - The body is buffered, then decoded lazily via [`PageStream`]
//! - Optional *raw* request/response logging via `TRAWL_HTTP_RAW=1`
//!
//! Example (no_run):
//! ```no_run
//! # async fn demo() -> Result<(), trawl_common::FetchError> {
//! use trawl_common::{GlobalSettings, SourceConfig};
//! use trawl_runtime::CancellationToken;
//!
//! let fetcher = trawl_http::HttpFetcher::new();
//! let page = fetcher
//!     .fetch(
//!         &CancellationToken::new(),
//!         "https://example.com/",
//!         &SourceConfig::default(),
//!         &GlobalSettings::default(),
//!     )
//!     .await?;
//! println!("{}", page.encoding().name());
//! # Ok(()) }
//! ```
//!
//! Security: `authorization` and `cookie` header values are never logged.
//!
//! Observability: structured `tracing` events are emitted for request start,
//! headers added, response metadata, final errors, cookie jar contents, and
//! (optionally) raw request/response lines (target `http.raw`).

pub mod charset;
pub mod jar;

pub use jar::SourceCookieJar;

use std::env;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::{Client, Method, Url, redirect};
use trawl_common::error::error_chain;
use trawl_common::{
    FETCH_TIMEOUT, FetchError, GlobalSettings, PageStream, SourceConfig, resolve_cookies,
};
use trawl_runtime::{CancellationToken, FetchScope};

/// Redirects followed before the fetch aborts.
pub const MAX_REDIRECTS: usize = 20;

// ==============================
// Raw logging toggles
// ==============================

const RAW_ENV: &str = "TRAWL_HTTP_RAW";
const RAW_MAX_BODY: usize = 64 * 1024; // cap raw body logs (64 KiB)

fn raw_enabled() -> bool {
    matches!(
        env::var(RAW_ENV).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

fn is_sensitive(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "authorization" | "proxy-authorization" | "cookie" | "set-cookie"
    )
}

/// Render a best-effort curl command for repro/debug, with secrets redacted.
fn make_curl(method: &Method, url: &Url, headers: &HeaderMap) -> String {
    let mut parts = vec!["curl".to_string(), format!("-X{}", method)];
    for (name, val) in headers.iter() {
        let v = if is_sensitive(name.as_str()) {
            "<redacted>".to_string()
        } else {
            val.to_str().unwrap_or("").to_string()
        };
        parts.push(format!(
            "-H '{}: {}'",
            name.as_str(),
            v.replace('\'', r"'\''")
        ));
    }
    parts.push(format!("'{}'", url.as_str()));
    parts.join(" ")
}

/// Redact sensitive headers for logging
fn redact_headers(h: &HeaderMap) -> Vec<(String, String)> {
    h.iter()
        .map(|(k, v)| {
            let key = k.as_str().to_string();
            let val = if is_sensitive(&key) {
                "<redacted>".to_string()
            } else {
                v.to_str().unwrap_or("").to_string()
            };
            (key, val)
        })
        .collect()
}

fn snip_body(body: &[u8]) -> String {
    let mut snip = String::from_utf8_lossy(body).to_string();
    if snip.len() > 500 {
        let mut cut = 500;
        while !snip.is_char_boundary(cut) {
            cut -= 1;
        }
        snip.truncate(cut);
        snip.push_str("...");
    }
    snip
}

// ==============================
// Fetcher
// ==============================

/// Stateless HTTP strategy. A fresh client and cookie jar are built per
/// fetch, so nothing request-scoped outlives a call.
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    pub timeout: Duration,
    pub max_redirects: usize,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self {
            timeout: FETCH_TIMEOUT,
            max_redirects: MAX_REDIRECTS,
        }
    }
}

impl HttpFetcher {
    /// ```
    /// use std::time::Duration;
    ///
    /// let fetcher = trawl_http::HttpFetcher::new();
    /// assert_eq!(fetcher.timeout, Duration::from_secs(60));
    /// assert_eq!(fetcher.max_redirects, 20);
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the whole-fetch budget (request and body transfer).
    pub fn with_timeout(mut self, dur: Duration) -> Self {
        self.timeout = dur;
        self
    }

    /// GET `url` and return its decoded body.
    pub async fn fetch(
        &self,
        cancel: &CancellationToken,
        url: &str,
        source: &SourceConfig,
        settings: &GlobalSettings,
    ) -> Result<PageStream, FetchError> {
        let url = parse_target(url)?;
        let scope = FetchScope::new(cancel, self.timeout);

        let cookies = resolve_cookies(source.cookies(), &url)?;
        let jar = Arc::new(SourceCookieJar::seeded(&cookies));
        jar.trace(&cookies, "jar cookies set from source");

        let client = self.build_client(Arc::clone(&jar), settings)?;
        let headers = build_headers(settings, source)?;

        let req_id = format!("r{}", uuid::Uuid::new_v4().simple());
        tracing::debug!(
            target: "trawl::http",
            req_id=%req_id,
            method=%Method::GET,
            host_path=%format!("{}{}", url.host_str().unwrap_or("-"), url.path()),
            timeout_ms=self.timeout.as_millis() as u64,
            verify_tls=settings.verify_tls,
            header_count=headers.len(),
            cookie_count=cookies.len(),
            "http.request.start"
        );
        if raw_enabled() {
            let curl = make_curl(&Method::GET, &url, &headers);
            tracing::debug!(target: "http.raw", %req_id, %curl, "request");
        }

        let t0 = Instant::now();
        let outcome = scope
            .run(async {
                let resp = client
                    .get(url.clone())
                    .headers(headers)
                    .send()
                    .await
                    .map_err(|e| self.classify(e))?;

                let status = resp.status();
                if status.as_u16() >= 400 {
                    return Err(FetchError::HttpStatus {
                        status: status.as_u16(),
                        reason: status.canonical_reason().unwrap_or("").to_string(),
                    });
                }

                let final_url = resp.url().clone();
                let resp_headers = resp.headers().clone();
                let body = resp.bytes().await.map_err(|e| self.classify(e))?;
                Ok((status, final_url, resp_headers, body))
            })
            .await;
        let dur_ms = t0.elapsed().as_millis() as u64;

        let (status, final_url, resp_headers, body) = match outcome {
            Ok(parts) => parts,
            Err(err) => {
                tracing::warn!(
                    target: "trawl::http",
                    req_id=%req_id,
                    url=%url,
                    duration_ms=dur_ms,
                    error=%err,
                    "http.error"
                );
                return Err(err);
            }
        };

        let content_type = resp_headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());
        tracing::debug!(
            target: "trawl::http",
            req_id=%req_id,
            %status,
            final_url=%final_url,
            duration_ms=dur_ms,
            body_len=body.len(),
            content_type=?content_type,
            "http.response.headers"
        );

        if raw_enabled() {
            let hdrs = redact_headers(&resp_headers);
            let truncated = body.len() > RAW_MAX_BODY;
            let text = String::from_utf8_lossy(&body[..body.len().min(RAW_MAX_BODY)]);
            tracing::info!(
                target: "http.raw",
                %req_id,
                status=%status,
                duration_ms=dur_ms,
                headers=?hdrs,
                body=%text,
                truncated
            );
        }
        tracing::trace!(
            target: "trawl::http",
            req_id=%req_id,
            body_snippet=%snip_body(&body),
            "http.response.body_snippet"
        );

        jar.trace(&cookies, "jar cookies found for source urls");

        let encoding = charset::resolve_encoding(&body, content_type);
        if encoding == encoding_rs::REPLACEMENT {
            return Err(FetchError::Decode(format!(
                "content type {:?} names an undecodable character set",
                content_type.unwrap_or_default()
            )));
        }
        tracing::debug!(target: "trawl::http", req_id=%req_id, encoding=encoding.name(), "http.response.decode");
        Ok(PageStream::new(body.to_vec(), encoding))
    }

    fn build_client(
        &self,
        jar: Arc<SourceCookieJar>,
        settings: &GlobalSettings,
    ) -> Result<Client, FetchError> {
        let max = self.max_redirects;
        let policy = redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() > max {
                attempt.error(format!("stopped after {max} redirects"))
            } else {
                attempt.follow()
            }
        });

        Client::builder()
            .cookie_provider(jar)
            .danger_accept_invalid_certs(!settings.verify_tls)
            .redirect(policy)
            .timeout(self.timeout)
            .build()
            .map_err(|e| FetchError::Config(format!("http client build failed: {}", error_chain(&e))))
    }

    fn classify(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else if err.is_redirect() {
            FetchError::RedirectLimit(self.max_redirects)
        } else if err.is_builder() {
            FetchError::Config(error_chain(&err))
        } else {
            FetchError::Network(error_chain(&err))
        }
    }
}

fn parse_target(raw: &str) -> Result<Url, FetchError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(FetchError::Config("empty url".into()));
    }
    let url = Url::parse(raw).map_err(|e| FetchError::Config(format!("invalid url {raw:?}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(FetchError::Config(format!(
            "unsupported scheme {other:?} in {raw:?}"
        ))),
    }
}

/// `User-Agent` first, then per-source headers which may override it.
fn build_headers(settings: &GlobalSettings, source: &SourceConfig) -> Result<HeaderMap, FetchError> {
    let mut headers = HeaderMap::new();
    if !settings.user_agent.is_empty() {
        let ua = HeaderValue::from_str(&settings.user_agent)
            .map_err(|e| FetchError::Config(format!("invalid user agent: {e}")))?;
        headers.insert(USER_AGENT, ua);
    }
    for (key, value) in source.headers() {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| FetchError::Config(format!("invalid header name {key:?}: {e}")))?;
        let val = HeaderValue::from_str(&value)
            .map_err(|e| FetchError::Config(format!("invalid value for header {key:?}: {e}")))?;
        let shown = if is_sensitive(name.as_str()) {
            "<redacted>"
        } else {
            value.as_str()
        };
        tracing::debug!(target: "trawl::http", header=%name, value=%shown, "adding header");
        headers.insert(name, val);
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use trawl_common::{DriverOptions, HeaderSpec};

    fn source_with_headers(headers: Vec<HeaderSpec>) -> SourceConfig {
        SourceConfig {
            driver: Some(DriverOptions {
                headers,
                ..Default::default()
            }),
        }
    }

    #[test]
    fn source_headers_override_user_agent() {
        let settings = GlobalSettings {
            user_agent: "Global/1.0".into(),
            ..Default::default()
        };
        let source = source_with_headers(vec![
            HeaderSpec::new("User-Agent", "Source/2.0"),
            HeaderSpec::new("Accept-Language", "en"),
        ]);
        let headers = build_headers(&settings, &source).unwrap();
        assert_eq!(headers.get(USER_AGENT).unwrap(), "Source/2.0");
        assert_eq!(headers.get("accept-language").unwrap(), "en");
    }

    #[test]
    fn empty_user_agent_is_not_set() {
        let headers = build_headers(&GlobalSettings::default(), &SourceConfig::default()).unwrap();
        assert!(headers.get(USER_AGENT).is_none());
    }

    #[test]
    fn invalid_header_name_is_a_config_error() {
        let source = source_with_headers(vec![HeaderSpec::new("bad header", "x")]);
        assert!(matches!(
            build_headers(&GlobalSettings::default(), &source),
            Err(FetchError::Config(_))
        ));
    }

    #[test]
    fn targets_must_be_http() {
        assert!(matches!(parse_target(""), Err(FetchError::Config(_))));
        assert!(matches!(parse_target("ftp://x.test/"), Err(FetchError::Config(_))));
        assert!(parse_target(" http://example.test/page ").is_ok());
    }

    #[test]
    fn curl_and_header_logs_redact_secrets() {
        let mut h = HeaderMap::new();
        h.insert("cookie", HeaderValue::from_static("sid=secret"));
        h.insert(USER_AGENT, HeaderValue::from_static("UA"));
        let url = Url::parse("http://example.test/").unwrap();
        let curl = make_curl(&Method::GET, &url, &h);
        assert!(!curl.contains("secret"));
        assert!(curl.contains("UA"));
        assert!(redact_headers(&h).contains(&("cookie".into(), "<redacted>".into())));
    }

    #[test]
    fn snippets_truncate_on_char_boundaries() {
        let body = "é".repeat(400);
        let snip = snip_body(body.as_bytes());
        assert!(snip.ends_with("..."));
        assert!(snip.len() <= 503);
    }
}
