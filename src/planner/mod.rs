//! Planner：把对话上下文与能力清单交给 LLM，产出经过校验的 PlanDecision
//!
//! - 上下文只取最近 context_messages 条（有界窗口）
//! - 输出无法解析时可再请求一次“修复”
//! - 超时、LLM 错误、计划非法一律收敛为 fail-closed 的直接回复决策，从不向上抛错

pub mod parse;
pub mod plan;
pub mod schema;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::{Message, Role};
use crate::tools::CapabilityDescriptor;

pub use parse::{extract_json_object, validate_plan};
pub use plan::{PlanAction, PlanDecision, ToolStep};

#[derive(Clone, Debug)]
pub struct PlannerSettings {
    pub timeout: Duration,
    pub max_steps: usize,
    pub context_messages: usize,
    /// 输出无法解析时是否追加一次修复调用
    pub repair: bool,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            max_steps: 4,
            context_messages: 12,
            repair: true,
        }
    }
}

pub struct Planner {
    llm: Arc<dyn LlmClient>,
    settings: PlannerSettings,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, settings: PlannerSettings) -> Self {
        Self { llm, settings }
    }

    pub fn settings(&self) -> &PlannerSettings {
        &self.settings
    }

    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    /// 产出决策；所有失败收敛为 fail-closed
    pub async fn decide(
        &self,
        context: &[Message],
        capabilities: &[CapabilityDescriptor],
    ) -> PlanDecision {
        let outcome = match timeout(self.settings.timeout, self.plan(context, capabilities)).await {
            Ok(result) => result,
            Err(_) => Err(AgentError::DecisionTimeout(self.settings.timeout)),
        };

        match outcome {
            Ok(plan) => {
                tracing::debug!(
                    action = plan.action().as_str(),
                    steps = plan.steps().len(),
                    confidence = plan.confidence(),
                    "Plan decided"
                );
                plan
            }
            Err(e) => {
                tracing::warn!(error = %e, kind = ?e.kind(), "Planner failed closed");
                PlanDecision::fail_closed(format!("Planner unavailable ({e}); answering directly."))
            }
        }
    }

    async fn plan(
        &self,
        context: &[Message],
        capabilities: &[CapabilityDescriptor],
    ) -> Result<PlanDecision, AgentError> {
        let messages = self.build_messages(context, capabilities);
        let raw = self
            .llm
            .complete(&messages)
            .await
            .map_err(AgentError::LlmError)?;

        let parsed = match extract_json_object(&raw) {
            Some(obj) => Some(obj),
            None if self.settings.repair => {
                tracing::info!("Planner output was not JSON, requesting repair");
                let repaired = self
                    .llm
                    .complete(&schema::repair_messages(&raw))
                    .await
                    .map_err(AgentError::LlmError)?;
                extract_json_object(&repaired)
            }
            None => None,
        };

        let obj = parsed.ok_or_else(|| {
            AgentError::MalformedPlan("planner output contained no JSON object".into())
        })?;
        validate_plan(&obj, self.settings.max_steps)
    }

    fn build_messages(&self, context: &[Message], capabilities: &[CapabilityDescriptor]) -> Vec<Message> {
        let conversation: Vec<&Message> = context.iter().filter(|m| m.role != Role::System).collect();
        let window = self.settings.context_messages.max(1);
        let start = conversation.len().saturating_sub(window);

        let mut messages = Vec::with_capacity(window + 1);
        messages.push(Message::system(schema::planner_system_prompt(
            capabilities,
            self.settings.max_steps,
        )));
        messages.extend(conversation[start..].iter().map(|m| (*m).clone()));
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;

    fn planner(llm: Arc<ScriptedLlmClient>, settings: PlannerSettings) -> Planner {
        Planner::new(llm, settings)
    }

    #[tokio::test]
    async fn test_decides_pipeline() {
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"mode":"tool_pipeline","reason":"needs search","confidence":0.9,"steps":[{"id":"s1","tool":"web_search","args":{"query":"rust 2024"}}]}"#,
        ]));
        let plan = planner(llm, PlannerSettings::default())
            .decide(&[Message::user("what's new in rust?")], &[])
            .await;
        assert_eq!(plan.action(), PlanAction::ToolPipeline);
        assert_eq!(plan.steps()[0].tool_name(), "web_search");
    }

    #[tokio::test]
    async fn test_timeout_fails_closed() {
        let llm = Arc::new(
            ScriptedLlmClient::new([r#"{"mode":"tool_pipeline","steps":[{"tool":"web_search"}]}"#])
                .with_delay(Duration::from_millis(200)),
        );
        let settings = PlannerSettings {
            timeout: Duration::from_millis(20),
            ..PlannerSettings::default()
        };
        let plan = planner(llm, settings).decide(&[Message::user("hi")], &[]).await;
        assert!(plan.is_direct());
        assert_eq!(plan.confidence(), 0.0);
    }

    #[tokio::test]
    async fn test_repair_pass_recovers() {
        let llm = Arc::new(ScriptedLlmClient::new([
            "I think we should search the web.",
            r#"{"mode":"direct_response","reason":"repaired","confidence":0.7,"steps":[]}"#,
        ]));
        let plan = planner(Arc::clone(&llm), PlannerSettings::default())
            .decide(&[Message::user("hi")], &[])
            .await;
        assert_eq!(plan.rationale(), "repaired");
        assert_eq!(llm.calls(), 2);
    }

    #[tokio::test]
    async fn test_malformed_without_repair_fails_closed() {
        let llm = Arc::new(ScriptedLlmClient::new(["not json"]));
        let settings = PlannerSettings {
            repair: false,
            ..PlannerSettings::default()
        };
        let plan = planner(Arc::clone(&llm), settings)
            .decide(&[Message::user("hi")], &[])
            .await;
        assert!(plan.is_direct());
        assert_eq!(plan.confidence(), 0.0);
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_llm_error_fails_closed() {
        let llm = Arc::new(ScriptedLlmClient::default());
        llm.push_error("503 upstream");
        let plan = planner(llm, PlannerSettings::default())
            .decide(&[Message::user("hi")], &[])
            .await;
        assert!(plan.is_direct());
        assert!(plan.rationale().contains("503 upstream"));
    }

    #[tokio::test]
    async fn test_context_window_is_bounded() {
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"mode":"direct_response","steps":[]}"#,
        ]));
        let context: Vec<Message> = (0..10).map(|i| Message::user(format!("m{i}"))).collect();
        let settings = PlannerSettings {
            context_messages: 4,
            ..PlannerSettings::default()
        };
        planner(Arc::clone(&llm), settings).decide(&context, &[]).await;

        let seen = llm.seen();
        let sent = &seen[0];
        assert_eq!(sent.len(), 5);
        assert_eq!(sent[0].role, Role::System);
        assert_eq!(sent[1].content, "m6");
        assert_eq!(sent[4].content, "m9");
    }
}
