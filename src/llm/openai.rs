//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；支持 OpenAI、DeepSeek、Groq、自建代理等。

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::llm::LlmClient;
use crate::memory::{Message, Role};

/// 累计 token 计数（prompt, completion）；total 由两者相加得出
#[derive(Debug, Default)]
pub struct TokenUsage {
    prompt: AtomicU64,
    completion: AtomicU64,
}

impl TokenUsage {
    fn record(&self, prompt: u32, completion: u32) {
        self.prompt.fetch_add(u64::from(prompt), Ordering::Relaxed);
        self.completion.fetch_add(u64::from(completion), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> (u64, u64, u64) {
        let prompt = self.prompt.load(Ordering::Relaxed);
        let completion = self.completion.load(Ordering::Relaxed);
        (prompt, completion, prompt + completion)
    }
}

pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
    usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: &str, temperature: f32) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(url) = base_url {
            config = config.with_api_base(url);
        }

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            temperature,
            usage: TokenUsage::default(),
        }
    }
}

fn to_request_messages(messages: &[Message]) -> Result<Vec<ChatCompletionRequestMessage>, OpenAIError> {
    let mut out = Vec::with_capacity(messages.len());
    for message in messages {
        let content = message.content.as_str();
        out.push(match message.role {
            Role::System => ChatCompletionRequestSystemMessageArgs::default()
                .content(content)
                .build()?
                .into(),
            Role::User => ChatCompletionRequestUserMessageArgs::default()
                .content(content)
                .build()?
                .into(),
            Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                .content(content)
                .build()?
                .into(),
        });
    }
    Ok(out)
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.snapshot()
    }

    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let started = Instant::now();
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(self.temperature)
            .messages(to_request_messages(messages).map_err(|e| e.to_string())?)
            .build()
            .map_err(|e| e.to_string())?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| format!("{} request failed: {e}", self.model))?;

        if let Some(usage) = &response.usage {
            self.usage.record(usage.prompt_tokens, usage.completion_tokens);
        }
        tracing::debug!(
            model = %self.model,
            messages = messages.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "LLM completion finished"
        );

        let Some(choice) = response.choices.into_iter().next() else {
            return Err(format!("{} returned no choices", self.model));
        };
        Ok(choice.message.content.unwrap_or_default())
    }
}
