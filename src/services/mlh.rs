// src/services/mlh.rs

//! Major League Hacking season adapter.
//!
//! MLH publishes one page per season (`/seasons/2026/events`). A season
//! starts in late summer, so from August onwards the listing of interest
//! belongs to next year's season. The season is worked out from the run
//! clock on every fetch.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
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

const SEASON_ROLLOVER_MONTH: u32 = 8;

pub struct MlhAdapter {
    fetcher: HttpFetcher,
    limits: PageLimits,
    base_url: String,
    /// Fixed season; follows the run clock when unset
    season: Option<i32>,
}

impl MlhAdapter {
    pub fn new(fetcher: HttpFetcher, limits: PageLimits) -> Self {
        Self {
            fetcher,
            limits,
            base_url: Platform::Mlh.default_base_url().to_string(),
            season: None,
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_season(mut self, season: i32) -> Self {
        self.season = Some(season);
        self
    }

    /// Season polled by a run at `now`.
    pub fn season_at(&self, now: DateTime<Utc>) -> i32 {
        self.season.unwrap_or_else(|| season_for(now.year(), now.month()))
    }

    fn listing(&self, season: i32) -> SeasonListing<'_> {
        SeasonListing {
            base_url: &self.base_url,
            season,
        }
    }
}

/// MLH season label for a calendar month.
pub fn season_for(year: i32, month: u32) -> i32 {
    if month >= SEASON_ROLLOVER_MONTH {
        year + 1
    } else {
        year
    }
}

/// One season's event page.
struct SeasonListing<'a> {
    base_url: &'a str,
    season: i32,
}

impl ListingSource for SeasonListing<'_> {
    fn platform(&self) -> Platform {
        Platform::Mlh
    }

    fn page_url(&self, page: usize) -> Option<String> {
        (page == 1).then(|| format!("{}/seasons/{}/events", self.base_url, self.season))
    }

    fn parse_page(&self, body: &str, page_url: &Url) -> Result<ListingPage> {
        let document = Html::parse_document(body);
        let event_sel = parse_selector(".event")?;
        let name_sel = parse_selector(".event-name")?;
        let link_sel = parse_selector("a.event-link")?;
        let start_sel = parse_selector("meta[itemprop='startDate']")?;
        let end_sel = parse_selector("meta[itemprop='endDate']")?;
        let date_sel = parse_selector(".event-date")?;
        let format_sel = parse_selector(".event-hybrid-notes span")?;
        let city_sel = parse_selector("[itemprop='city']")?;

        let mut page = ListingPage {
            has_more: Some(false),
            ..ListingPage::default()
        };

        for event in document.select(&event_sel) {
            let link = event.select(&link_sel).next();
            let name = event
                .select(&name_sel)
                .next()
                .map(|n| element_text(&n))
                .filter(|n| !n.is_empty())
                .or_else(|| {
                    link.and_then(|l| l.value().attr("title"))
                        .map(|t| t.trim().to_string())
                })
                .unwrap_or_default();
            if name.is_empty() {
                page.skipped += 1;
                continue;
            }

            let mut item = RawItem::new(Platform::Mlh, name);
            item.url = link
                .and_then(|l| l.value().attr("href"))
                .map(|href| resolve_url(page_url, href));

            let meta = |sel: &scraper::Selector| {
                event
                    .select(sel)
                    .next()
                    .and_then(|m| m.value().attr("content"))
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
            };
            item.start_date = meta(&start_sel).or_else(|| {
                event
                    .select(&date_sel)
                    .next()
                    .map(|d| element_text(&d))
                    .filter(|d| !d.is_empty())
            });
            item.end_date = meta(&end_sel);

            item.tags = event
                .select(&format_sel)
                .chain(event.select(&city_sel))
                .map(|t| element_text(&t))
                .filter(|t| !t.is_empty())
                .collect();

            page.items.push(item);
        }
        Ok(page)
    }
}

#[async_trait]
impl PlatformAdapter for MlhAdapter {
    fn platform(&self) -> Platform {
        Platform::Mlh
    }

    async fn fetch(&self, now: DateTime<Utc>, cancel: &CancellationToken) -> AdapterOutcome {
        let season = self.season_at(now);
        log::debug!("MLH: polling season {}", season);
        paginate(&self.listing(season), &self.fetcher, self.limits, cancel).await
    }
}
