//! Per-fetch cookie jar with public-suffix checks.
//!
//! Wraps a [`cookie_store::CookieStore`] so it can be handed to `reqwest` as
//! the cookie provider for a single fetch. Cookies whose `Domain` attribute
//! is a public suffix (e.g. `co.uk`) are rejected unless the suffix is the
//! request host itself, in which case they become host-only.

use std::sync::{Mutex, MutexGuard, PoisonError};

use cookie::Cookie as RawCookie;
use cookie_store::CookieStore;
use reqwest::header::HeaderValue;
use tracing::debug;
use trawl_common::ResolvedCookie;
use trawl_common::cookies::cookie_urls;
use url::Url;

#[derive(Debug, Default)]
pub struct SourceCookieJar {
    store: Mutex<CookieStore>,
}

impl SourceCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a jar holding the declared cookies, each stored against its cookie URL.
    pub fn seeded(cookies: &[ResolvedCookie]) -> Self {
        let jar = Self::new();
        {
            let mut store = jar.lock();
            for c in cookies {
                let mut builder = RawCookie::build((c.name.clone(), c.value.clone()));
                if !c.domain.is_empty() {
                    builder = builder.domain(c.domain.clone());
                }
                if let Some(path) = &c.path {
                    builder = builder.path(path.clone());
                }
                insert(&mut store, builder.build(), &c.cookie_url);
            }
        }
        jar
    }

    /// `(name, value)` pairs that would be sent to `url`.
    pub fn request_cookies(&self, url: &Url) -> Vec<(String, String)> {
        self.lock()
            .get_request_values(url)
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect()
    }

    /// Log the jar contents for each distinct cookie URL.
    pub fn trace(&self, cookies: &[ResolvedCookie], label: &str) {
        for url in cookie_urls(cookies) {
            let names: Vec<String> = self
                .request_cookies(url)
                .into_iter()
                .map(|(n, _)| n)
                .collect();
            debug!(target: "trawl::cookies", cookie_url=%url, cookies=?names, "{label}");
        }
    }

    fn lock(&self) -> MutexGuard<'_, CookieStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl reqwest::cookie::CookieStore for SourceCookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let mut store = self.lock();
        for header in cookie_headers {
            let Ok(raw) = header.to_str() else {
                continue;
            };
            match RawCookie::parse(raw.to_owned()) {
                Ok(cookie) => insert(&mut store, cookie, url),
                Err(e) => debug!(target: "trawl::cookies", url=%url, error=%e, "ignoring malformed set-cookie"),
            }
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let joined = self
            .lock()
            .get_request_values(url)
            .map(|(n, v)| format!("{n}={v}"))
            .collect::<Vec<_>>()
            .join("; ");
        if joined.is_empty() {
            return None;
        }
        HeaderValue::from_str(&joined).ok()
    }
}

fn insert(store: &mut CookieStore, mut cookie: RawCookie<'static>, url: &Url) {
    if !public_suffix_allowed(&mut cookie, url) {
        debug!(
            target: "trawl::cookies",
            url=%url,
            name=%cookie.name(),
            domain=?cookie.domain(),
            "rejecting cookie scoped to a public suffix"
        );
        return;
    }
    if let Err(e) = store.insert_raw(&cookie, url) {
        debug!(target: "trawl::cookies", url=%url, name=%cookie.name(), error=%e, "cookie not stored");
    }
}

fn public_suffix_allowed(cookie: &mut RawCookie<'static>, url: &Url) -> bool {
    let Some(domain) = cookie
        .domain()
        .map(|d| d.trim_start_matches('.').to_ascii_lowercase())
    else {
        return true;
    };
    if domain.is_empty() {
        cookie.unset_domain();
        return true;
    }
    let is_suffix = psl::suffix_str(&domain).is_some_and(|s| s.eq_ignore_ascii_case(&domain));
    if !is_suffix {
        return true;
    }
    if url.host_str().is_some_and(|h| h.eq_ignore_ascii_case(&domain)) {
        cookie.unset_domain();
        return true;
    }
    false
}
