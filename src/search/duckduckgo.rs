//! DuckDuckGo：先查 Instant Answer JSON，结果不足时解析 HTML 结果页

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;

use crate::search::html::{clean_text, duckduckgo_target};
use crate::search::{ProviderError, SearchHit, SearchProvider};

const INSTANT_URL: &str = "https://api.duckduckgo.com/";
const HTML_URL: &str = "https://html.duckduckgo.com/html/";

static RESULT_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a[^>]*class="[^"]*result__a[^"]*"[^>]*href="([^"]+)"[^>]*>(.*?)</a>"#)
        .expect("valid result link regex")
});

static RESULT_SNIPPET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<(?:a|div|span)[^>]*class="[^"]*result__snippet[^"]*"[^>]*>(.*?)</(?:a|div|span)>"#)
        .expect("valid result snippet regex")
});

pub struct DuckDuckGoProvider {
    client: Client,
}

impl DuckDuckGoProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn instant_answer(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, ProviderError> {
        let resp = self
            .client
            .get(INSTANT_URL)
            .query(&[("q", query), ("format", "json"), ("no_html", "1"), ("no_redirect", "1")])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ProviderError::Status(resp.status().as_u16()));
        }
        let payload: Value = resp.json().await?;
        Ok(parse_instant_answer(&payload, query, max_results))
    }

    async fn html_results(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, ProviderError> {
        let resp = self.client.get(HTML_URL).query(&[("q", query)]).send().await?;
        if !resp.status().is_success() {
            return Err(ProviderError::Status(resp.status().as_u16()));
        }
        let page = resp.text().await?;
        Ok(parse_html_results(&page, max_results))
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoProvider {
    fn name(&self) -> &str {
        "duckduckgo"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, ProviderError> {
        let mut hits = match self.instant_answer(query, max_results).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::debug!(error = %e, "DuckDuckGo instant answer failed, trying HTML results");
                Vec::new()
            }
        };
        if hits.len() < max_results {
            hits.extend(self.html_results(query, max_results).await?);
        }
        Ok(hits)
    }
}

/// 解析 Instant Answer：摘要 + RelatedTopics（含嵌套 Topics）
pub fn parse_instant_answer(payload: &Value, query: &str, max_results: usize) -> Vec<SearchHit> {
    let mut hits = Vec::new();
    let text = |key: &str| payload.get(key).and_then(Value::as_str).map(clean_text).unwrap_or_default();

    let abstract_text = text("AbstractText");
    let abstract_url = payload
        .get("AbstractURL")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();
    if !abstract_text.is_empty() && !abstract_url.is_empty() {
        let heading = Some(text("Heading")).filter(|h| !h.is_empty()).unwrap_or_else(|| query.to_string());
        hits.push(SearchHit {
            title: heading,
            url: abstract_url,
            snippet: abstract_text,
        });
    }

    let related = payload.get("RelatedTopics").and_then(Value::as_array).cloned().unwrap_or_default();
    let topics = related.iter().flat_map(|row| match row.get("Topics").and_then(Value::as_array) {
        Some(nested) => nested.clone(),
        None => vec![row.clone()],
    });
    for topic in topics {
        if hits.len() >= max_results {
            break;
        }
        let text = topic.get("Text").and_then(Value::as_str).map(clean_text).unwrap_or_default();
        let url = topic.get("FirstURL").and_then(Value::as_str).unwrap_or_default().trim().to_string();
        if text.is_empty() || url.is_empty() {
            continue;
        }
        let title = text.split(" - ").next().unwrap_or("Related").trim().to_string();
        hits.push(SearchHit { title, url, snippet: text });
    }
    hits
}

pub fn parse_html_results(page: &str, max_results: usize) -> Vec<SearchHit> {
    let snippets: Vec<String> = RESULT_SNIPPET_RE
        .captures_iter(page)
        .map(|c| clean_text(&c[1]))
        .collect();

    RESULT_LINK_RE
        .captures_iter(page)
        .enumerate()
        .filter_map(|(idx, caps)| {
            let href = caps[1].trim();
            let title = clean_text(&caps[2]);
            if href.is_empty() || title.is_empty() {
                return None;
            }
            let url = duckduckgo_target(href).unwrap_or_else(|| href.to_string());
            let snippet = snippets.get(idx).cloned().unwrap_or_default();
            Some(SearchHit { title, url, snippet })
        })
        .take(max_results)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_instant_answer_flattens_topics() {
        let payload = json!({
            "Heading": "Rust",
            "AbstractText": "Rust is a language.",
            "AbstractURL": "https://en.wikipedia.org/wiki/Rust",
            "RelatedTopics": [
                {"Text": "Cargo - the package manager", "FirstURL": "https://doc.rust-lang.org/cargo"},
                {"Name": "Group", "Topics": [
                    {"Text": "Crates.io - registry", "FirstURL": "https://crates.io"}
                ]},
                {"Text": "", "FirstURL": "https://skip.me"}
            ]
        });
        let hits = parse_instant_answer(&payload, "rust", 10);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].title, "Rust");
        assert_eq!(hits[1].title, "Cargo");
        assert_eq!(hits[2].url, "https://crates.io");
    }

    #[test]
    fn test_parse_html_results_unwraps_redirects() {
        let page = r#"
            <div class="result"><a rel="nofollow" class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2Fa&amp;rut=1">Example <b>A</b></a>
            <a class="result__snippet" href="x">First &amp; best</a></div>
            <div class="result"><a class="result__a" href="https://example.com/b">Example B</a>
            <a class="result__snippet" href="y">Second</a></div>
        "#;
        let hits = parse_html_results(page, 5);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].url, "https://example.com/a");
        assert_eq!(hits[0].title, "Example A");
        assert_eq!(hits[0].snippet, "First & best");
        assert_eq!(hits[1].url, "https://example.com/b");
    }
}
