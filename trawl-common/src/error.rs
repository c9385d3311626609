//! Error taxonomy shared by both fetch strategies.

use std::fmt;
use std::time::Duration;

/// Browser pipeline phase a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Allocate,
    Connect,
    EnableNetwork,
    Cookies,
    Headers,
    Navigate,
    Settle,
    Interact,
    Extract,
    Teardown,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Allocate => "allocate",
            Phase::Connect => "connect",
            Phase::EnableNetwork => "enable-network",
            Phase::Cookies => "cookies",
            Phase::Headers => "headers",
            Phase::Navigate => "navigate",
            Phase::Settle => "settle",
            Phase::Interact => "interact",
            Phase::Extract => "extract",
            Phase::Teardown => "teardown",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by a fetch. None of them are retried internally.
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    /// Malformed URL, endpoint or header, or an unusable discovery response.
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection refused/reset, DNS or TLS failure.
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a status >= 400. The body is discarded.
    #[error("http error {status}:{reason}")]
    HttpStatus { status: u16, reason: String },

    #[error("stopped after {0} redirects")]
    RedirectLimit(usize),

    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("fetch cancelled")]
    Cancelled,

    /// Browser session failure. Click targets that match nothing are not errors.
    #[error("automation error during {phase}: {message}")]
    Automation { phase: Phase, message: String },

    #[error("decode error: {0}")]
    Decode(String),
}

impl FetchError {
    pub fn automation(phase: Phase, message: impl fmt::Display) -> Self {
        Self::Automation {
            phase,
            message: message.to_string(),
        }
    }

    /// Timeout and cancellation are handled identically; only the message differs.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Cancelled)
    }
}

/// Convenient alias for results that use [`FetchError`].
pub type Result<T> = std::result::Result<T, FetchError>;

/// Render an error together with its `source()` chain.
///
/// ```
/// use trawl_common::error::error_chain;
///
/// let err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
/// assert_eq!(error_chain(&err), "boom");
/// ```
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut cur = err.source();
    while let Some(src) = cur {
        let msg = src.to_string();
        if !out.contains(&msg) {
            out.push_str(": ");
            out.push_str(&msg);
        }
        cur = src.source();
    }
    out
}
