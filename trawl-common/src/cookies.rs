//! Declarative cookie resolution shared by the HTTP jar and the browser session.
//!
//! [`resolve_cookies`] turns the configured [`CookieGroup`]s into concrete
//! cookies bound to a parsed URL. Random values are generated once here so
//! both strategies see the same value within a fetch.

use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::debug;
use url::Url;

use crate::{CookieGroup, FetchError};

/// A cookie ready to be installed into a jar or a browser session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCookie {
    /// URL the cookie is validated and stored against.
    pub cookie_url: Url,
    pub name: String,
    pub value: String,
    /// Domain attribute; empty means host-only for `cookie_url`.
    pub domain: String,
    pub path: Option<String>,
}

/// Resolve cookie groups against the URL being fetched.
///
/// Groups without a `cookie_url` are scoped to `fetch_url`. Cookies with an
/// empty name are skipped.
///
/// ```
/// use trawl_common::{resolve_cookies, CookieGroup, CookieSpec};
/// use url::Url;
///
/// let url = Url::parse("https://example.test/page").unwrap();
/// let groups = vec![CookieGroup {
///     cookie_url: None,
///     cookies: vec![CookieSpec {
///         name: "session".into(),
///         value: "abc".into(),
///         ..Default::default()
///     }],
/// }];
/// let cookies = resolve_cookies(&groups, &url).unwrap();
/// assert_eq!(cookies[0].cookie_url, url);
/// assert_eq!(cookies[0].value, "abc");
/// ```
pub fn resolve_cookies(
    groups: &[CookieGroup],
    fetch_url: &Url,
) -> Result<Vec<ResolvedCookie>, FetchError> {
    let mut out = Vec::new();
    for group in groups {
        let cookie_url = match group.cookie_url.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Url::parse(raw)
                .map_err(|e| FetchError::Config(format!("invalid cookie url {raw:?}: {e}")))?,
            _ => fetch_url.clone(),
        };

        for spec in &group.cookies {
            if spec.name.is_empty() {
                debug!(target: "trawl::cookies", cookie_url=%cookie_url, "skipping cookie without name");
                continue;
            }
            let value = if spec.value_random > 0 {
                random_value(spec.value_random)
            } else {
                spec.value.clone()
            };
            out.push(ResolvedCookie {
                cookie_url: cookie_url.clone(),
                name: spec.name.clone(),
                value,
                domain: spec.domain.trim().to_string(),
                path: spec.path.clone().filter(|p| !p.is_empty()),
            });
        }
    }
    Ok(out)
}

/// Distinct cookie URLs in first-seen order, used to report jar contents.
pub fn cookie_urls(cookies: &[ResolvedCookie]) -> Vec<&Url> {
    let mut urls: Vec<&Url> = Vec::new();
    for c in cookies {
        if !urls.contains(&&c.cookie_url) {
            urls.push(&c.cookie_url);
        }
    }
    urls
}

fn random_value(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
