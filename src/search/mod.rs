//! 网页搜索：后端抽象、降级链与具体后端（DuckDuckGo / Bing / Brave）

pub mod bing;
pub mod brave;
pub mod duckduckgo;
pub mod fallback;
pub mod html;
pub mod provider;

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE};
use reqwest::Client;

pub use bing::BingProvider;
pub use brave::BraveProvider;
pub use duckduckgo::DuckDuckGoProvider;
pub use fallback::{AttemptFailure, ExhaustedError, ProviderFallbackChain, ProviderHits};
pub use provider::{ProviderError, SearchHit, SearchProvider};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// 搜索后端共用的 HTTP 客户端：浏览器 UA、英文优先
pub fn http_client(timeout: Duration) -> Client {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.8"));
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .build()
        .unwrap_or_default()
}

/// 按名称列表构建后端；未知名称被忽略，brave 缺少 API Key 时跳过
pub fn build_providers(
    names: &[String],
    brave_api_key: Option<&str>,
    timeout: Duration,
) -> Vec<Arc<dyn SearchProvider>> {
    let client = http_client(timeout);
    let mut providers: Vec<Arc<dyn SearchProvider>> = Vec::new();
    let mut seen: Vec<String> = Vec::new();

    for name in names.iter().map(|n| n.trim().to_ascii_lowercase()) {
        if name.is_empty() || seen.contains(&name) {
            continue;
        }
        match name.as_str() {
            "duckduckgo" => providers.push(Arc::new(DuckDuckGoProvider::new(client.clone()))),
            "bing" => providers.push(Arc::new(BingProvider::new(client.clone()))),
            "brave" => match brave_api_key.map(str::trim).filter(|k| !k.is_empty()) {
                Some(key) => providers.push(Arc::new(BraveProvider::new(client.clone(), key))),
                None => {
                    tracing::warn!("Brave search configured without an API key, skipping");
                    continue;
                }
            },
            other => {
                tracing::warn!(provider = other, "Unknown search provider, skipping");
                continue;
            }
        }
        seen.push(name);
    }
    providers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_providers_keeps_order_and_skips_unusable() {
        let names: Vec<String> = ["Bing", "brave", "duckduckgo", "bing", "yahoo"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let providers = build_providers(&names, None, Duration::from_secs(5));
        let names: Vec<&str> = providers.iter().map(|p| p.name()).collect();
        assert_eq!(names, ["bing", "duckduckgo"]);

        let with_key = build_providers(&["brave".to_string()], Some("key"), Duration::from_secs(5));
        assert_eq!(with_key[0].name(), "brave");
    }
}
