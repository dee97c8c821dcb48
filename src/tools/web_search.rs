//! 网页搜索工具：通过后端降级链检索，结果作为引用来源返回

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::search::ProviderFallbackChain;
use crate::tools::schema::{arg_str, arg_usize, ArgKind, Args, ToolSchema};
use crate::tools::{Tool, ToolContext, ToolError, ToolItem, ToolOutput};

pub struct WebSearchTool {
    chain: Arc<ProviderFallbackChain>,
    max_results: usize,
}

impl WebSearchTool {
    pub fn new(chain: Arc<ProviderFallbackChain>, max_results: usize) -> Self {
        Self {
            chain,
            max_results: max_results.max(1),
        }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn label(&self) -> &str {
        "Web Search"
    }

    fn description(&self) -> &str {
        "Search the public web for current information. Returns titles, snippets and source URLs."
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new()
            .required("query", ArgKind::String, "Search terms")
            .optional("max_results", ArgKind::Integer, "Maximum number of results")
    }

    async fn invoke(&self, ctx: &ToolContext, args: &Args) -> Result<ToolOutput, ToolError> {
        let query = arg_str(args, "query")
            .or_else(|| Some(ctx.user_text.trim()).filter(|t| !t.is_empty()))
            .ok_or_else(|| ToolError::InvalidArgs("query must not be empty".into()))?;
        let max_results = arg_usize(args, "max_results")
            .unwrap_or(self.max_results)
            .clamp(1, self.max_results);

        tracing::info!(query = %query, max_results, "web search");
        match self.chain.search(query, max_results).await {
            Ok(found) => {
                let items = found
                    .hits
                    .into_iter()
                    .map(|hit| ToolItem::new(hit.title, hit.url, hit.snippet))
                    .collect();
                Ok(ToolOutput::items(items).with_meta(json!({ "provider": found.provider, "query": query })))
            }
            Err(exhausted) => Err(ToolError::NoResults(exhausted.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{ProviderError, SearchHit, SearchProvider};
    use std::time::Duration;

    struct StaticProvider(Vec<SearchHit>);

    #[async_trait]
    impl SearchProvider for StaticProvider {
        fn name(&self) -> &str {
            "static"
        }
        async fn search(&self, _q: &str, max: usize) -> Result<Vec<SearchHit>, ProviderError> {
            Ok(self.0.iter().take(max).cloned().collect())
        }
    }

    fn tool(hits: Vec<SearchHit>) -> WebSearchTool {
        let chain = ProviderFallbackChain::new(
            vec![Arc::new(StaticProvider(hits))],
            Duration::from_secs(1),
            0,
        );
        WebSearchTool::new(Arc::new(chain), 3)
    }

    fn args(v: serde_json::Value) -> Args {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_returns_items_with_provider() {
        let hits = (0..5)
            .map(|i| SearchHit {
                title: format!("T{i}"),
                url: format!("https://example.com/{i}"),
                snippet: "s".into(),
            })
            .collect();
        let out = tool(hits)
            .invoke(&ToolContext::default(), &args(json!({"query": "rust", "max_results": 10})))
            .await
            .unwrap();
        assert_eq!(out.items.len(), 3);
        assert_eq!(out.meta["provider"], "static");
    }

    #[tokio::test]
    async fn test_exhausted_is_no_results() {
        let err = tool(Vec::new())
            .invoke(&ToolContext::default(), &args(json!({"query": "nothing"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NoResults(_)));
        assert!(err.to_string().starts_with("No results found"));
    }

    #[tokio::test]
    async fn test_falls_back_to_user_text() {
        let hits = vec![SearchHit {
            title: "T".into(),
            url: "https://example.com".into(),
            snippet: "s".into(),
        }];
        let ctx = ToolContext {
            user_text: "latest rust release".into(),
            ..ToolContext::default()
        };
        let out = tool(hits).invoke(&ctx, &args(json!({"query": "  "}))).await.unwrap();
        assert_eq!(out.meta["query"], "latest rust release");
    }
}
