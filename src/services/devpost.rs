// src/services/devpost.rs

//! Devpost listing adapter.
//!
//! Parses the tile grid of `/hackathons`. Each tile is an `a.tile-anchor`
//! with the title in `h3`, the submission window in `.submission-period`
//! and themes in `.theme-label`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scraper::Html;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Result;
use crate::models::{AdapterOutcome, Platform, RawItem};
use crate::services::{
    ListingPage, ListingSource, PageLimits, PlatformAdapter, element_text, paginate,
    parse_selector,
};
use crate::utils::http::HttpFetcher;
use crate::utils::resolve_url;

pub struct DevpostAdapter {
    fetcher: HttpFetcher,
    limits: PageLimits,
    base_url: String,
}

impl DevpostAdapter {
    pub fn new(fetcher: HttpFetcher, limits: PageLimits) -> Self {
        Self::with_base_url(fetcher, limits, Platform::Devpost.default_base_url())
    }

    pub fn with_base_url(fetcher: HttpFetcher, limits: PageLimits, base_url: &str) -> Self {
        Self {
            fetcher,
            limits,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl ListingSource for DevpostAdapter {
    fn platform(&self) -> Platform {
        Platform::Devpost
    }

    fn page_url(&self, page: usize) -> Option<String> {
        Some(format!(
            "{}/hackathons?status[]=upcoming&status[]=open&page={}",
            self.base_url, page
        ))
    }

    fn parse_page(&self, body: &str, page_url: &Url) -> Result<ListingPage> {
        let document = Html::parse_document(body);
        let tile_sel = parse_selector("a.tile-anchor")?;
        let title_sel = parse_selector("h3")?;
        let period_sel = parse_selector(".submission-period")?;
        let theme_sel = parse_selector(".theme-label")?;
        let info_sel = parse_selector(".info")?;

        let mut page = ListingPage::default();
        for tile in document.select(&tile_sel) {
            let name = tile
                .select(&title_sel)
                .next()
                .map(|h| element_text(&h))
                .unwrap_or_default();
            if name.is_empty() {
                page.skipped += 1;
                continue;
            }

            let mut item = RawItem::new(Platform::Devpost, name);
            if let Some(href) = tile.value().attr("href") {
                item.url = Some(resolve_url(page_url, href));
            }
            item.start_date = tile
                .select(&period_sel)
                .next()
                .map(|p| element_text(&p))
                .filter(|p| !p.is_empty());

            item.tags = tile.select(&theme_sel).map(|t| element_text(&t)).collect();
            let online = tile
                .select(&info_sel)
                .any(|i| element_text(&i).to_lowercase().contains("online"));
            if online {
                item.tags.push("online".into());
            }

            page.items.push(item);
        }
        Ok(page)
    }
}

#[async_trait]
impl PlatformAdapter for DevpostAdapter {
    fn platform(&self) -> Platform {
        Platform::Devpost
    }

    async fn fetch(&self, _now: DateTime<Utc>, cancel: &CancellationToken) -> AdapterOutcome {
        paginate(self, &self.fetcher, self.limits, cancel).await
    }
}
