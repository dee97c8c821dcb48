//! 搜索后端降级链
//!
//! 按配置顺序尝试每个后端；每个后端最多尝试 1 + retries 次，每次受超时约束。
//! 返回空结果也算一次失败。第一个拿到非空结果的后端即为最终结果，后续后端不再调用。
//! 全部失败时返回 ExhaustedError，其中按顺序记录每一次尝试的失败原因。

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::timeout;

use crate::search::html::dedupe_hits;
use crate::search::{ProviderError, SearchHit, SearchProvider};

#[derive(Clone, Debug, PartialEq)]
pub struct AttemptFailure {
    pub provider: String,
    /// 从 1 开始
    pub attempt: u32,
    pub error: ProviderError,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} attempt {}: {}", self.provider, self.attempt, self.error)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("all search providers failed: {}", summarize(.attempts))]
pub struct ExhaustedError {
    pub attempts: Vec<AttemptFailure>,
}

fn summarize(attempts: &[AttemptFailure]) -> String {
    if attempts.is_empty() {
        return "no providers configured".to_string();
    }
    let start = attempts.len().saturating_sub(6);
    attempts[start..]
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// 命中的后端与其结果
#[derive(Clone, Debug, PartialEq)]
pub struct ProviderHits {
    pub provider: String,
    pub hits: Vec<SearchHit>,
}

pub struct ProviderFallbackChain {
    providers: Vec<Arc<dyn SearchProvider>>,
    timeout: Duration,
    retries: u32,
}

impl ProviderFallbackChain {
    pub fn new(providers: Vec<Arc<dyn SearchProvider>>, timeout: Duration, retries: u32) -> Self {
        Self {
            providers,
            timeout,
            retries,
        }
    }

    pub async fn search(&self, query: &str, max_results: usize) -> Result<ProviderHits, ExhaustedError> {
        let cap = max_results.max(1);
        let mut attempts = Vec::new();

        for provider in &self.providers {
            for attempt in 1..=self.retries + 1 {
                let outcome = match timeout(self.timeout, provider.search(query, cap)).await {
                    Ok(Ok(hits)) => {
                        let hits = dedupe_hits(hits, cap);
                        if hits.is_empty() {
                            Err(ProviderError::EmptyResults)
                        } else {
                            Ok(hits)
                        }
                    }
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(ProviderError::Timeout(self.timeout)),
                };

                match outcome {
                    Ok(hits) => {
                        tracing::info!(
                            provider = provider.name(),
                            attempt,
                            hits = hits.len(),
                            failed_attempts = attempts.len(),
                            "Search provider succeeded"
                        );
                        return Ok(ProviderHits {
                            provider: provider.name().to_string(),
                            hits,
                        });
                    }
                    Err(error) => {
                        tracing::warn!(provider = provider.name(), attempt, error = %error, "Search attempt failed");
                        attempts.push(AttemptFailure {
                            provider: provider.name().to_string(),
                            attempt,
                            error,
                        });
                    }
                }
            }
        }

        Err(ExhaustedError { attempts })
    }
}
