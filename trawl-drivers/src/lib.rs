//! Driver layer for browser automation over the Chrome DevTools Protocol.
//!
//! This crate obtains a browser session for one fetch, drives it through the
//! automation script and tears every spawned resource down again.
//!
//! - [`trawl_browser::endpoint`]: endpoint classification and discovery
//! - [`trawl_browser::driver::TrawlDriver`]: allocation guard around a `chromiumoxide` browser
//! - [`trawl_browser::page::TrawlPage`]: CDP-backed [`AutomationPage`]
//! - [`trawl_browser::script`]: the ordered step pipeline
//! - [`BrowserFetcher`]: the browser fetch strategy
pub mod trawl_browser;

pub use trawl_browser::error::BrowserError;
pub use trawl_browser::fetch::BrowserFetcher;
pub use trawl_browser::page::AutomationPage;
