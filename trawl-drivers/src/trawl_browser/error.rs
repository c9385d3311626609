//! Browser error types.

use thiserror::Error;
use trawl_common::{FetchError, Phase};

/// Errors raised while talking to a browser. Callers attach the pipeline
/// [`Phase`] with [`BrowserError::at`].
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("browser connection failed: {0}")]
    ConnectFailed(String),

    #[error("JavaScript evaluation failed: {0}")]
    JsEvalFailed(String),

    #[error("invalid CDP parameters: {0}")]
    InvalidParams(String),

    #[error("CDP error: {0}")]
    Cdp(String),

    #[error("profile directory: {0}")]
    Profile(#[from] std::io::Error),
}

impl From<chromiumoxide::error::CdpError> for BrowserError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        BrowserError::Cdp(err.to_string())
    }
}

impl BrowserError {
    pub fn at(self, phase: Phase) -> FetchError {
        FetchError::automation(phase, self)
    }
}
