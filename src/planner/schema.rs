//! 计划输出的 JSON Schema 与提示词
//!
//! schemars 由 PlanFormat 生成 Schema 注入 system prompt，减少 LLM 输出格式错误。

use std::collections::HashMap;

use schemars::{schema_for, JsonSchema};

use crate::memory::Message;
use crate::tools::CapabilityDescriptor;

/// 计划格式（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct PlanFormat {
    /// "direct_response" 或 "tool_pipeline"
    mode: String,
    /// 一句话说明为什么这样决策
    reason: String,
    /// 0 到 1
    confidence: f32,
    steps: Vec<StepFormat>,
}

#[allow(dead_code)]
#[derive(JsonSchema)]
struct StepFormat {
    /// 步骤 id，如 step_1
    id: String,
    /// 可用工具名之一
    tool: String,
    /// 工具参数，须符合该工具的 parameters
    args: HashMap<String, serde_json::Value>,
    reason: String,
    /// 对用户表述所做的推断（例如 "day"、"time"）
    assumptions: Vec<String>,
}

pub fn plan_schema_json() -> String {
    let schema = schema_for!(PlanFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

pub fn planner_system_prompt(capabilities: &[CapabilityDescriptor], max_steps: usize) -> String {
    let tools = serde_json::to_string_pretty(capabilities).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"You are the planning component of a personal assistant. Decide whether the latest user message can be answered directly or needs tools.

Return ONLY one JSON object with the fields "mode", "reason", "confidence" and "steps", matching this schema:
{schema}

Rules:
- Use "mode": "direct_response" with an empty "steps" list when no tool is needed.
- Use "mode": "tool_pipeline" when tools are needed. Use at most {max_steps} steps, only the tools listed below, and arguments that match each tool's parameters.
- Use web_search for current events, prices, schedules, or any fact that may have changed recently.
- Creating calendar events and sending email are write actions. They are drafted and the user confirms them later. Never claim they are done.
- When you interpret the user's wording (a relative day, a 12-hour time, a default title), list the interpreted field names in the step's "assumptions".

Available tools:
{tools}"#,
        schema = plan_schema_json(),
    )
}

pub fn repair_messages(raw_output: &str) -> Vec<Message> {
    vec![
        Message::system(format!(
            "Rewrite the following planner output as a single valid JSON object with the fields \"mode\", \"reason\", \"confidence\" and \"steps\". Return JSON only, no commentary.\nSchema:\n{}",
            plan_schema_json()
        )),
        Message::user(raw_output.to_string()),
    ]
}
