//! Mock / 脚本化 LLM 客户端（用于测试与无 API Key 的本地运行）
//!
//! - MockLlmClient：规划请求一律返回 direct_response，回复请求回显最后一条用户消息
//! - ScriptedLlmClient：按顺序返回预置结果，可注入延迟，并记录每次收到的消息

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::llm::LlmClient;
use crate::memory::{Message, Role};

fn last_user(messages: &[Message]) -> &str {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or("(no input)")
}

/// Mock 客户端：无 API Key 时使用
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let is_planning = messages
            .first()
            .map(|m| m.role == Role::System && m.content.contains("\"mode\""))
            .unwrap_or(false);

        if is_planning {
            return Ok(r#"{"mode":"direct_response","reason":"Mock planner","confidence":0.5,"steps":[]}"#.to_string());
        }
        Ok(format!("Echo from Mock: {}", last_user(messages)))
    }
}

/// 脚本化客户端：每次 complete 弹出一条预置结果；脚本耗尽时返回错误
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<Result<String, String>>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLlmClient {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(responses.into_iter().map(|s| Ok(s.into())).collect()),
            ..Self::default()
        }
    }

    /// 每次调用前等待 delay（用于超时测试）
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push(&self, response: impl Into<String>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Ok(response.into()));
        }
    }

    pub fn push_error(&self, error: impl Into<String>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Err(error.into()));
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 每次调用收到的完整消息列表
    pub fn seen(&self) -> Vec<Vec<Message>> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(messages.to_vec());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.script
            .lock()
            .map_err(|_| "script mutex poisoned".to_string())?
            .pop_front()
            .unwrap_or_else(|| Err("script exhausted".to_string()))
    }
}
