//! 直接回复：决策为 direct_response 时，用最近上下文向 LLM 请求一次普通回答

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::llm::LlmClient;
use crate::memory::{Message, Role};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Steward, a concise and helpful assistant. \
Answer the user directly. You cannot take actions in this reply: never claim that you created \
calendar events, sent emails or changed files.";

pub const FALLBACK_REPLY: &str =
    "I'm having trouble answering right now. Please try again in a moment.";

pub struct Responder {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
    system_prompt: String,
}

impl Responder {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Duration, system_prompt: impl Into<String>) -> Self {
        Self {
            llm,
            timeout,
            system_prompt: system_prompt.into(),
        }
    }

    pub async fn answer(&self, context: &[Message]) -> String {
        let mut messages = Vec::with_capacity(context.len() + 1);
        messages.push(Message::system(self.system_prompt.clone()));
        messages.extend(context.iter().filter(|m| m.role != Role::System).cloned());

        match timeout(self.timeout, self.llm.complete(&messages)).await {
            Ok(Ok(text)) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(Ok(_)) => {
                tracing::warn!("Responder returned empty text");
                FALLBACK_REPLY.to_string()
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Responder LLM call failed");
                FALLBACK_REPLY.to_string()
            }
            Err(_) => {
                tracing::warn!(timeout_secs = self.timeout.as_secs_f32(), "Responder timed out");
                FALLBACK_REPLY.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;

    #[tokio::test]
    async fn test_answer_drops_stored_system_messages() {
        let llm = Arc::new(ScriptedLlmClient::new(["  Hello!  "]));
        let responder = Responder::new(llm.clone(), Duration::from_secs(1), "be brief");
        let out = responder
            .answer(&[Message::system("stale"), Message::user("hi")])
            .await;
        assert_eq!(out, "Hello!");
        let seen = llm.seen();
        assert_eq!(seen[0], vec![Message::system("be brief"), Message::user("hi")]);
    }

    #[tokio::test]
    async fn test_timeout_and_errors_fall_back() {
        let slow = Arc::new(ScriptedLlmClient::new(["late"]).with_delay(Duration::from_millis(200)));
        let responder = Responder::new(slow, Duration::from_millis(20), "x");
        assert_eq!(responder.answer(&[Message::user("hi")]).await, FALLBACK_REPLY);

        let broken = Arc::new(ScriptedLlmClient::new(Vec::<String>::new()));
        let responder = Responder::new(broken, Duration::from_secs(1), "x");
        assert_eq!(responder.answer(&[Message::user("hi")]).await, FALLBACK_REPLY);
    }
}
