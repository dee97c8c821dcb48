//! 搜索后端抽象

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// 单次搜索尝试的失败原因
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Request(String),

    #[error("unreadable response: {0}")]
    Parse(String),

    #[error("empty results")]
    EmptyResults,
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Request(format!("timeout: {e}"))
        } else if let Some(status) = e.status() {
            ProviderError::Status(status.as_u16())
        } else if e.is_decode() {
            ProviderError::Parse(e.to_string())
        } else {
            ProviderError::Request(e.to_string())
        }
    }
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, ProviderError>;
}
