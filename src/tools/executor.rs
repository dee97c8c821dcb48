//! 工具执行器
//!
//! 对每个步骤依次执行：查找工具 → 校验参数 → 按授权范围取令牌 → 在超时内调用。
//! 单个步骤失败不影响其余步骤；结果顺序与计划一致。每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::core::AgentError;
use crate::integrations::ConnectedAccounts;
use crate::planner::ToolStep;
use crate::tools::{Tool, ToolContext, ToolError, ToolRegistry, ToolResult};

/// 本轮调用方身份
#[derive(Clone, Debug, Default)]
pub struct TurnContext {
    pub thread_id: String,
    pub user_id: String,
    pub user_text: String,
}

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    accounts: Arc<dyn ConnectedAccounts>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(
        registry: Arc<ToolRegistry>,
        accounts: Arc<dyn ConnectedAccounts>,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            accounts,
            timeout,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// 按计划顺序执行全部步骤，结果与步骤一一对应
    pub async fn run(&self, steps: &[ToolStep], turn: &TurnContext) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(steps.len());
        for step in steps {
            results.push(self.run_step(step, turn).await);
        }
        results
    }

    pub async fn run_step(&self, step: &ToolStep, turn: &TurnContext) -> ToolResult {
        let start = Instant::now();
        let result = match self.registry.validate(step.tool_name(), step.args()) {
            Ok(tool) => self.invoke(tool, step, turn).await,
            Err(e) => ToolResult::failed(step.id(), step.tool_name(), step.reason(), e.kind(), e.to_string()),
        };

        let audit = serde_json::json!({
            "event": "tool_audit",
            "thread_id": turn.thread_id,
            "step_id": step.id(),
            "tool": step.tool_name(),
            "write": result.write,
            "status": result.status,
            "error_kind": result.error.as_ref().map(|e| e.kind),
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(&serde_json::Value::Object(step.args().clone())),
        });
        tracing::info!(audit = %audit.to_string(), "tool");
        result
    }

    /// 检查本次调用所需的授权是否可用；返回令牌（无需授权时为 None）
    pub async fn check_capability(
        &self,
        tool: &dyn Tool,
        user_id: &str,
    ) -> Result<Option<String>, AgentError> {
        let Some(scope) = tool.required_scope() else {
            return Ok(None);
        };
        match self.accounts.access_token(user_id, scope).await {
            Some(token) => Ok(Some(token)),
            None => Err(AgentError::CapabilityUnavailable(format!(
                "{} is not connected for this account. Connect it (needs {} access) and try again.",
                tool.label(),
                scope.as_str()
            ))),
        }
    }

    async fn invoke(&self, tool: Arc<dyn Tool>, step: &ToolStep, turn: &TurnContext) -> ToolResult {
        let write = tool.is_write(step.args());
        let access_token = match self.check_capability(tool.as_ref(), &turn.user_id).await {
            Ok(token) => token,
            Err(e) => {
                return ToolResult::failed(step.id(), step.tool_name(), step.reason(), e.kind(), e.to_string())
                    .as_write(write)
            }
        };

        let ctx = ToolContext {
            thread_id: turn.thread_id.clone(),
            user_id: turn.user_id.clone(),
            user_text: turn.user_text.clone(),
            access_token,
        };

        let outcome = match timeout(self.timeout, tool.invoke(&ctx, step.args())).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ToolError::Timeout(format!(
                "{} did not respond within {}s",
                tool.label(),
                self.timeout.as_secs_f32()
            ))),
        };

        let result = match outcome {
            Ok(output) => ToolResult::ok(step.id(), step.tool_name(), step.reason(), output),
            Err(e) => ToolResult::failed(step.id(), step.tool_name(), step.reason(), e.kind(), e.to_string()),
        };
        result.as_write(write)
    }
}

/// 失败结果的便捷构造（编排器在执行前拒绝步骤时使用）
pub fn rejected(step: &ToolStep, error: &AgentError) -> ToolResult {
    ToolResult::failed(step.id(), step.tool_name(), step.reason(), error.kind(), error.to_string())
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ErrorKind;
    use crate::integrations::{ConnectedAccount, InMemoryAccounts, Scope};
    use crate::tools::schema::{ArgKind, Args, ToolSchema};
    use crate::tools::{ToolItem, ToolOutput, ToolStatus};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct LookupTool;

    #[async_trait]
    impl Tool for LookupTool {
        fn name(&self) -> &str {
            "lookup"
        }
        fn label(&self) -> &str {
            "Lookup"
        }
        fn description(&self) -> &str {
            "Looks things up"
        }
        fn schema(&self) -> ToolSchema {
            ToolSchema::new().required("query", ArgKind::String, "")
        }
        async fn invoke(&self, _ctx: &ToolContext, args: &Args) -> Result<ToolOutput, ToolError> {
            match args.get("query").and_then(Value::as_str) {
                Some("fail") => Err(ToolError::Failed("upstream 500".into())),
                Some("slow") => {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok(ToolOutput::default())
                }
                Some(q) => Ok(ToolOutput::items(vec![ToolItem::new(q, format!("https://example.com/{q}"), "")])),
                None => Err(ToolError::InvalidArgs("query".into())),
            }
        }
    }

    struct CalendarProbe;

    #[async_trait]
    impl Tool for CalendarProbe {
        fn name(&self) -> &str {
            "calendar_probe"
        }
        fn label(&self) -> &str {
            "Calendar"
        }
        fn description(&self) -> &str {
            ""
        }
        fn schema(&self) -> ToolSchema {
            ToolSchema::new()
        }
        fn required_scope(&self) -> Option<Scope> {
            Some(Scope::Calendar)
        }
        async fn invoke(&self, ctx: &ToolContext, _args: &Args) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput::default().with_meta(json!({ "token": ctx.access_token })))
        }
    }

    fn executor(accounts: Vec<ConnectedAccount>) -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(LookupTool);
        registry.register(CalendarProbe);
        ToolExecutor::new(
            Arc::new(registry),
            Arc::new(InMemoryAccounts::new(accounts)),
            Duration::from_millis(50),
        )
    }

    fn step(id: &str, tool: &str, args: Value) -> ToolStep {
        ToolStep::new(id, tool, args.as_object().cloned().unwrap_or_default(), "test")
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_order() {
        let results = executor(vec![])
            .run(
                &[
                    step("s1", "lookup", json!({"query": "a"})),
                    step("s2", "lookup", json!({"query": "fail"})),
                    step("s3", "missing_tool", json!({})),
                    step("s4", "lookup", json!({"query": "b"})),
                ],
                &TurnContext::default(),
            )
            .await;

        let ids: Vec<&str> = results.iter().map(|r| r.step_id.as_str()).collect();
        assert_eq!(ids, ["s1", "s2", "s3", "s4"]);
        assert_eq!(results[0].status, ToolStatus::Ok);
        assert_eq!(results[1].error.as_ref().unwrap().kind, ErrorKind::ExternalFailure);
        assert_eq!(results[2].error.as_ref().unwrap().kind, ErrorKind::NotFound);
        assert_eq!(results[3].citations[0].url, "https://example.com/b");
    }

    #[tokio::test]
    async fn test_invalid_args_fail_validation() {
        let result = executor(vec![])
            .run_step(&step("s1", "lookup", json!({"q": "typo"})), &TurnContext::default())
            .await;
        assert_eq!(result.error.unwrap().kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_timeout_maps_to_external_timeout() {
        let result = executor(vec![])
            .run_step(&step("s1", "lookup", json!({"query": "slow"})), &TurnContext::default())
            .await;
        assert_eq!(result.error.unwrap().kind, ErrorKind::ExternalTimeout);
    }

    #[tokio::test]
    async fn test_missing_account_is_capability_unavailable() {
        let turn = TurnContext {
            user_id: "u1".into(),
            ..TurnContext::default()
        };
        let result = executor(vec![])
            .run_step(&step("s1", "calendar_probe", json!({})), &turn)
            .await;
        let err = result.error.unwrap();
        assert_eq!(err.kind, ErrorKind::CapabilityUnavailable);
        assert!(err.message.contains("Calendar"));

        let connected = executor(vec![ConnectedAccount {
            user_id: "u1".into(),
            provider: "google".into(),
            access_token: "tok-1".into(),
            scopes: [Scope::Calendar].into_iter().collect(),
            expires_at: None,
        }]);
        let result = connected
            .run_step(&step("s1", "calendar_probe", json!({})), &turn)
            .await;
        assert!(result.is_ok());
        assert_eq!(result.payload["meta"]["token"], "tok-1");
    }
}
