//! 运行时构建器：由 AppConfig 组装 LLM、工具注册表、执行器、消息存储与编排器
//!
//! 二进制与集成测试共用同一套组装逻辑；测试可用 with_* 注入脚本化 LLM、假账号与内存存储。

use std::sync::Arc;
use std::time::Duration;

use crate::config::{AppConfig, StoreBackend};
use crate::confirmation::ConfirmationStore;
use crate::core::orchestrator::Orchestrator;
use crate::core::responder::{Responder, DEFAULT_SYSTEM_PROMPT};
use crate::core::AgentError;
use crate::integrations::{ConnectedAccounts, InMemoryAccounts};
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient};
use crate::memory::{InMemoryMessageStore, MessageStore, SqliteMessageStore};
use crate::planner::Planner;
use crate::search::{build_providers, ProviderFallbackChain};
use crate::tools::{
    GoogleCalendarTool, GoogleDriveTool, GoogleGmailTool, ToolExecutor, ToolRegistry,
    WebSearchTool,
};

/// OpenAI 兼容后端：默认端点、API Key 环境变量、默认模型
fn provider_defaults(provider: &str) -> Option<(Option<&'static str>, &'static str, &'static str)> {
    match provider {
        "openai" => Some((None, "OPENAI_API_KEY", "gpt-4o-mini")),
        "deepseek" => Some((Some("https://api.deepseek.com/v1"), "DEEPSEEK_API_KEY", "deepseek-chat")),
        "groq" => Some((
            Some("https://api.groq.com/openai/v1"),
            "GROQ_API_KEY",
            "llama-3.1-8b-instant",
        )),
        _ => None,
    }
}

/// 根据配置与环境变量选择 LLM 后端（OpenAI / DeepSeek / Groq / 自定义端点 / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.trim().to_lowercase();
    if provider == "mock" {
        tracing::info!("Using Mock LLM");
        return Arc::new(MockLlmClient);
    }
    let Some((default_base, key_env, default_model)) = provider_defaults(&provider) else {
        tracing::warn!(provider = %provider, "Unknown LLM provider, using Mock LLM");
        return Arc::new(MockLlmClient);
    };

    let api_key = cfg
        .llm
        .api_key
        .clone()
        .filter(|k| !k.trim().is_empty())
        .or_else(|| std::env::var(key_env).ok().filter(|k| !k.trim().is_empty()));
    let Some(api_key) = api_key else {
        tracing::warn!(provider = %provider, env = key_env, "No API key set, using Mock LLM");
        return Arc::new(MockLlmClient);
    };

    let model = cfg.llm.model.clone().unwrap_or_else(|| default_model.to_string());
    let base_url = cfg.llm.base_url.as_deref().or(default_base);
    tracing::info!(provider = %provider, model = %model, "Using OpenAI-compatible LLM");
    Arc::new(OpenAiClient::new(base_url, &model, &api_key, cfg.llm.temperature))
}

pub struct StewardBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    accounts: Option<Arc<dyn ConnectedAccounts>>,
    store: Option<Arc<dyn MessageStore>>,
    registry: Option<ToolRegistry>,
    system_prompt: String,
}

impl StewardBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            accounts: None,
            store: None,
            registry: None,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_accounts(mut self, accounts: Arc<dyn ConnectedAccounts>) -> Self {
        self.accounts = Some(accounts);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn MessageStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// 替换默认工具集（测试中注册假工具）
    pub fn with_registry(mut self, registry: ToolRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_system_prompt(mut self, prompt: &str) -> Self {
        self.system_prompt = prompt.to_string();
        self
    }

    /// 从文件加载直接回复的系统提示词，找不到时保留默认值
    pub fn with_system_prompt_from_file(mut self) -> Self {
        if let Some(prompt) = ["config/prompts/system.md", "../config/prompts/system.md"]
            .into_iter()
            .find_map(|p| std::fs::read_to_string(p).ok())
            .filter(|p| !p.trim().is_empty())
        {
            self.system_prompt = prompt;
        }
        self
    }

    /// 默认工具集：web_search、google_calendar、google_gmail、google_drive
    pub fn build_tool_registry(&self) -> ToolRegistry {
        let tools = &self.config.tools;
        let tool_timeout = Duration::from_secs(tools.tool_timeout_secs.max(1));
        let search_timeout = Duration::from_secs(tools.search.timeout_secs.max(1));

        let providers = build_providers(
            &tools.search.providers,
            tools.search.brave_api_key.as_deref(),
            search_timeout,
        );
        let chain = Arc::new(ProviderFallbackChain::new(
            providers,
            search_timeout,
            tools.search.retries,
        ));

        let mut registry = ToolRegistry::new();
        registry.register(WebSearchTool::new(chain, tools.search.max_results));
        registry.register(GoogleCalendarTool::new(
            &tools.calendar.time_zone,
            tools.calendar.default_duration_minutes,
            tools.calendar.max_results,
            tool_timeout,
        ));
        registry.register(GoogleGmailTool::new(
            &tools.gmail.allowed_recipient_domains,
            tools.gmail.max_results,
            tool_timeout,
        ));
        registry.register(GoogleDriveTool::new(tools.drive.max_results, tool_timeout));
        registry
    }

    pub fn build_accounts(&self) -> Arc<dyn ConnectedAccounts> {
        Arc::new(InMemoryAccounts::new(self.config.accounts.connected.clone()))
    }

    pub fn build_store(&self) -> Result<Arc<dyn MessageStore>, AgentError> {
        match self.config.store.backend {
            StoreBackend::Memory => Ok(Arc::new(InMemoryMessageStore::new(
                self.config.store.max_messages_per_thread,
            ))),
            StoreBackend::Sqlite => {
                let path = self.config.sqlite_path();
                tracing::info!(path = %path.display(), "Opening SQLite message store");
                let store = SqliteMessageStore::open(&path)
                    .map_err(|e| AgentError::Persistence(e.to_string()))?;
                Ok(Arc::new(store))
            }
        }
    }

    pub fn build(mut self) -> Result<Orchestrator, AgentError> {
        let llm = self
            .llm
            .clone()
            .unwrap_or_else(|| create_llm_from_config(&self.config));
        let accounts = self.accounts.clone().unwrap_or_else(|| self.build_accounts());
        let store = match self.store.clone() {
            Some(store) => store,
            None => self.build_store()?,
        };
        let registry = match self.registry.take() {
            Some(registry) => registry,
            None => self.build_tool_registry(),
        };
        tracing::info!(tools = ?registry.tool_names(), "Tool registry ready");

        let cfg = self.config;
        let executor = ToolExecutor::new(
            Arc::new(registry),
            accounts,
            Duration::from_secs(cfg.tools.tool_timeout_secs.max(1)),
        );
        let planner = Planner::new(llm.clone(), cfg.planner_settings());
        let responder = Responder::new(
            llm,
            Duration::from_secs(cfg.llm.timeouts.request.max(1)),
            self.system_prompt,
        );

        Ok(Orchestrator::new(planner, executor, responder, store)
            .with_confirmation(
                ConfirmationStore::new(cfg.confirmation.on_conflicting_draft),
                cfg.confirmation.token_policy(),
            )
            .with_verification(cfg.verification.enabled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_tools() {
        let builder = StewardBuilder::new(AppConfig::default());
        let registry = builder.build_tool_registry();
        assert_eq!(
            registry.tool_names(),
            vec!["google_calendar", "google_drive", "google_gmail", "web_search"]
        );
    }

    #[test]
    fn test_mock_llm_without_key() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "mock".into();
        let llm = create_llm_from_config(&cfg);
        assert_eq!(llm.token_usage(), (0, 0, 0));

        cfg.llm.provider = "something-else".into();
        let _ = create_llm_from_config(&cfg);
    }

    #[tokio::test]
    async fn test_build_with_sqlite_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "mock".into();
        cfg.store.backend = StoreBackend::Sqlite;
        cfg.store.path = dir.path().join("steward.db");
        let orchestrator = StewardBuilder::new(cfg).build().unwrap();
        assert_eq!(orchestrator.executor().registry().len(), 4);
    }
}
