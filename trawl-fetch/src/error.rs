use trawl_common::FetchError;

use crate::StrategyKind;

/// A failed fetch, tagged with the strategy that ran and the target URL.
#[derive(thiserror::Error, Debug)]
#[error("{strategy} fetch of {url} failed: {source}")]
pub struct DispatchError {
    pub strategy: StrategyKind,
    pub url: String,
    #[source]
    pub source: FetchError,
}

impl DispatchError {
    pub fn is_interrupted(&self) -> bool {
        self.source.is_interrupted()
    }

    pub fn into_inner(self) -> FetchError {
        self.source
    }
}
