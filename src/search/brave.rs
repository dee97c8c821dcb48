//! Brave Search API（需 X-Subscription-Token）

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::search::html::clean_text;
use crate::search::{ProviderError, SearchHit, SearchProvider};

const SEARCH_URL: &str = "https://api.search.brave.com/res/v1/web/search";

pub struct BraveProvider {
    client: Client,
    api_key: String,
}

impl BraveProvider {
    pub fn new(client: Client, api_key: &str) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl SearchProvider for BraveProvider {
    fn name(&self) -> &str {
        "brave"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, ProviderError> {
        let count = max_results.to_string();
        let resp = self
            .client
            .get(SEARCH_URL)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .query(&[("q", query), ("count", count.as_str()), ("text_decorations", "false")])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ProviderError::Status(resp.status().as_u16()));
        }
        let payload: Value = resp.json().await?;
        Ok(parse_results(&payload))
    }
}

pub fn parse_results(payload: &Value) -> Vec<SearchHit> {
    payload
        .pointer("/web/results")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| {
                    let title = clean_text(row.get("title")?.as_str()?);
                    let url = row.get("url")?.as_str()?.trim().to_string();
                    if title.is_empty() || url.is_empty() {
                        return None;
                    }
                    let snippet = row
                        .get("description")
                        .and_then(Value::as_str)
                        .map(clean_text)
                        .unwrap_or_default();
                    Some(SearchHit { title, url, snippet })
                })
                .collect()
        })
        .unwrap_or_default()
}
