//! Bing：解析 HTML 结果页（li.b_algo）

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;

use crate::search::html::{bing_target, clean_text};
use crate::search::{ProviderError, SearchHit, SearchProvider};

const SEARCH_URL: &str = "https://www.bing.com/search";

static BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<li[^>]*class="[^"]*\bb_algo\b[^"]*"[^>]*>(.*?)</li>"#).expect("valid block regex")
});
static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<h2[^>]*>\s*<a[^>]*href="([^"]+)"[^>]*>(.*?)</a>\s*</h2>"#).expect("valid link regex")
});
static SNIPPET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<p[^>]*>(.*?)</p>").expect("valid snippet regex"));

pub struct BingProvider {
    client: Client,
}

impl BingProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SearchProvider for BingProvider {
    fn name(&self) -> &str {
        "bing"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, ProviderError> {
        let resp = self
            .client
            .get(SEARCH_URL)
            .query(&[("q", query), ("setlang", "en-us"), ("ensearch", "1")])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ProviderError::Status(resp.status().as_u16()));
        }
        let page = resp.text().await?;
        Ok(parse_results(&page, max_results))
    }
}

pub fn parse_results(page: &str, max_results: usize) -> Vec<SearchHit> {
    BLOCK_RE
        .captures_iter(page)
        .filter_map(|block| {
            let block = &block[1];
            let link = LINK_RE.captures(block)?;
            let title = clean_text(&link[2]);
            if title.is_empty() {
                return None;
            }
            let href = link[1].trim().replace("&amp;", "&");
            let url = bing_target(&href).unwrap_or(href);
            let snippet = SNIPPET_RE
                .captures(block)
                .map(|c| clean_text(&c[1]))
                .unwrap_or_default();
            Some(SearchHit { title, url, snippet })
        })
        .take(max_results)
        .collect()
}
