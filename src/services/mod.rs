//! Platform adapters.
//!
//! Every source is reached through the one [`PlatformAdapter`] contract.
//! Sources that are plain paginated listings implement [`ListingSource`]
//! (page URLs and a body parser) and hand the walking, retrying and
//! status bookkeeping to [`paginate`].
//!
//! - Devpost (`DevpostAdapter`): HTML tiles
//! - MLH (`MlhAdapter`): HTML season page
//! - Unstop (`UnstopAdapter`): JSON search API

mod devpost;
mod mlh;
mod unstop;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scraper::Selector;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{AdapterOutcome, AdapterResult, Config, Platform, RawItem};
use crate::utils::http::HttpFetcher;

pub use devpost::DevpostAdapter;
pub use mlh::MlhAdapter;
pub use unstop::UnstopAdapter;

/// Capability every source adapter provides.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// Fetch the listings current at `now`.
    ///
    /// Never fails: errors are folded into the returned status, and any
    /// items gathered before a failure are kept.
    async fn fetch(&self, now: DateTime<Utc>, cancel: &CancellationToken) -> AdapterOutcome;
}

/// One parsed page of a listing.
#[derive(Debug, Default)]
pub struct ListingPage {
    pub items: Vec<RawItem>,
    /// Rows that were present but could not be parsed
    pub skipped: usize,
    /// Whether the source says more pages follow, if it says at all
    pub has_more: Option<bool>,
}

/// Page addressing and parsing for a paginated source.
pub trait ListingSource: Send + Sync {
    fn platform(&self) -> Platform;

    /// URL of page `page` (1-based), or `None` past the last page.
    fn page_url(&self, page: usize) -> Option<String>;

    fn parse_page(&self, body: &str, page_url: &Url) -> Result<ListingPage>;
}

/// Paging limits shared by listing adapters.
#[derive(Debug, Clone, Copy)]
pub struct PageLimits {
    pub max_pages: usize,
    pub request_delay: Duration,
}

impl PageLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_pages: config.crawler.max_pages.max(1),
            request_delay: Duration::from_millis(config.crawler.request_delay_ms),
        }
    }
}

impl Default for PageLimits {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Walk a listing page by page until it runs dry.
///
/// Stops on an empty page, `has_more == Some(false)`, the page limit,
/// cancellation or a fetch/parse failure. Items from pages already
/// fetched are always returned.
pub async fn paginate<S: ListingSource + ?Sized>(
    source: &S,
    fetcher: &HttpFetcher,
    limits: PageLimits,
    cancel: &CancellationToken,
) -> AdapterOutcome {
    let platform = source.platform();
    let mut items = Vec::new();
    let mut skipped = 0;
    let mut pages_fetched = 0;
    let mut failure: Option<AppError> = None;

    for page in 1..=limits.max_pages {
        if cancel.is_cancelled() {
            failure = Some(AppError::Cancelled);
            break;
        }
        let Some(url) = source.page_url(page) else {
            break;
        };
        if page > 1 && !limits.request_delay.is_zero() {
            tokio::time::sleep(limits.request_delay).await;
        }

        let parsed = match fetcher.get_text(&url, cancel).await {
            Ok(body) => Url::parse(&url)
                .map_err(AppError::from)
                .and_then(|page_url| source.parse_page(&body, &page_url)),
            Err(e) => Err(e),
        };

        match parsed {
            Ok(listing) => {
                pages_fetched += 1;
                skipped += listing.skipped;
                let empty = listing.items.is_empty();
                log::debug!("{} page {}: {} items", platform, page, listing.items.len());
                items.extend(listing.items);
                if empty || listing.has_more == Some(false) {
                    break;
                }
            }
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }

    let result = match failure {
        Some(AppError::Cancelled) if !items.is_empty() => {
            AdapterResult::partial("cancelled before the listing was exhausted")
        }
        Some(AppError::Cancelled) => AdapterResult::failed("cancelled"),
        Some(e) => {
            log::warn!(
                "{} failed after {} page(s), keeping {} items: {}",
                platform,
                pages_fetched,
                items.len(),
                e
            );
            AdapterResult::failed(AppError::fetch(platform, e).to_string())
        }
        None if skipped > 0 => AdapterResult::partial(format!("{skipped} rows could not be parsed")),
        None => AdapterResult::ok(),
    };

    AdapterOutcome {
        platform,
        items,
        result,
        pages_fetched,
    }
}

/// Parse a CSS selector, mapping errors to `AppError::Selector`.
pub(crate) fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| AppError::selector(selector, e))
}

/// Collapse the text content of an element.
pub(crate) fn element_text(element: &scraper::ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build one adapter per platform enabled in `config`.
pub fn build_adapters(config: &Config, fetcher: &HttpFetcher) -> Vec<Arc<dyn PlatformAdapter>> {
    let limits = PageLimits::from_config(config);
    config
        .platforms
        .enabled()
        .into_iter()
        .map(|platform| -> Arc<dyn PlatformAdapter> {
            match platform {
                Platform::Devpost => Arc::new(DevpostAdapter::new(fetcher.clone(), limits)),
                Platform::Mlh => Arc::new(MlhAdapter::new(fetcher.clone(), limits)),
                Platform::Unstop => Arc::new(UnstopAdapter::new(fetcher.clone(), limits)),
            }
        })
        .collect()
}
