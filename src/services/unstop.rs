// src/services/unstop.rs

//! Unstop adapter backed by the public opportunity search API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Result;
use crate::models::{AdapterOutcome, Platform, RawItem};
use crate::services::{ListingPage, ListingSource, PageLimits, PlatformAdapter, paginate};
use crate::utils::http::HttpFetcher;

const PER_PAGE: usize = 15;

pub struct UnstopAdapter {
    fetcher: HttpFetcher,
    limits: PageLimits,
    base_url: String,
}

/// The API answers either with a bare list or a paginator envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SearchData {
    Paged {
        data: Vec<Value>,
        current_page: Option<u64>,
        last_page: Option<u64>,
    },
    Flat(Vec<Value>),
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    data: SearchData,
}

#[derive(Debug, Deserialize)]
struct UnstopOpportunity {
    id: Option<Value>,
    title: Option<String>,
    name: Option<String>,
    public_url: Option<String>,
    seo_url: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    #[serde(default)]
    filters: Vec<UnstopFilter>,
    region: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UnstopFilter {
    name: Option<String>,
}

impl UnstopAdapter {
    pub fn new(fetcher: HttpFetcher, limits: PageLimits) -> Self {
        Self::with_base_url(fetcher, limits, Platform::Unstop.default_base_url())
    }

    pub fn with_base_url(fetcher: HttpFetcher, limits: PageLimits, base_url: &str) -> Self {
        Self {
            fetcher,
            limits,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn to_item(&self, row: UnstopOpportunity) -> Option<RawItem> {
        let name = row
            .title
            .or(row.name)
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())?;

        let id = row.id.and_then(|id| match id {
            Value::String(s) if !s.trim().is_empty() => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });
        let url = row
            .public_url
            .or(row.seo_url)
            .filter(|u| !u.trim().is_empty())
            .map(|u| self.absolute(&u))
            .or_else(|| id.map(|id| format!("{}/hackathons/{}", self.base_url, id)));

        let mut item = RawItem::new(Platform::Unstop, name);
        item.url = url;
        item.start_date = row.start_date;
        item.end_date = row.end_date;
        item.tags = row
            .filters
            .into_iter()
            .filter_map(|f| f.name)
            .chain(row.region)
            .collect();
        Some(item)
    }

    /// `public_url` is usually site-relative (`hackathons/slug-123`).
    fn absolute(&self, link: &str) -> String {
        let link = link.trim();
        if link.starts_with("http://") || link.starts_with("https://") {
            link.to_string()
        } else {
            format!("{}/{}", self.base_url, link.trim_start_matches('/'))
        }
    }
}

impl ListingSource for UnstopAdapter {
    fn platform(&self) -> Platform {
        Platform::Unstop
    }

    fn page_url(&self, page: usize) -> Option<String> {
        Some(format!(
            "{}/api/public/opportunity/search-new?opportunity=hackathons&per_page={}&page={}",
            self.base_url, PER_PAGE, page
        ))
    }

    fn parse_page(&self, body: &str, _page_url: &Url) -> Result<ListingPage> {
        let response: SearchResponse = serde_json::from_str(body)?;
        let (rows, has_more) = match response.data {
            SearchData::Paged {
                data,
                current_page,
                last_page,
            } => {
                let has_more = current_page.zip(last_page).map(|(c, l)| c < l);
                (data, has_more)
            }
            SearchData::Flat(data) => (data, None),
        };

        let mut page = ListingPage {
            has_more,
            ..ListingPage::default()
        };
        for row in rows {
            let item = serde_json::from_value::<UnstopOpportunity>(row)
                .ok()
                .and_then(|row| self.to_item(row));
            match item {
                Some(item) => page.items.push(item),
                None => page.skipped += 1,
            }
        }
        Ok(page)
    }
}

#[async_trait]
impl PlatformAdapter for UnstopAdapter {
    fn platform(&self) -> Platform {
        Platform::Unstop
    }

    async fn fetch(&self, _now: DateTime<Utc>, cancel: &CancellationToken) -> AdapterOutcome {
        paginate(self, &self.fetcher, self.limits, cancel).await
    }
}
