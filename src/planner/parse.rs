//! 从 LLM 原始输出中提取并校验计划
//!
//! 提取顺序：整段解析 → ```json 代码块 → 第一个 '{' 到最后一个 '}'。
//! 校验时补默认值（理由、置信度、步骤 id），超出步数上限的步骤被截断。

use serde_json::{Map, Value};

use crate::core::AgentError;
use crate::planner::{PlanDecision, ToolStep};
use crate::tools::schema::Args;

pub const DEFAULT_REASON: &str = "Planner decision generated.";
pub const DEFAULT_CONFIDENCE: f32 = 0.5;

pub fn extract_json_object(output: &str) -> Option<Map<String, Value>> {
    let trimmed = output.trim();
    if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(trimmed) {
        return Some(obj);
    }

    if let Some(start) = trimmed.find("```json").map(|i| i + 7).or_else(|| trimmed.find("```").map(|i| i + 3)) {
        let rest = &trimmed[start..];
        let block = rest.find("```").map(|end| &rest[..end]).unwrap_or(rest);
        if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(block.trim()) {
            return Some(obj);
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&trimmed[start..=end]) {
        Ok(Value::Object(obj)) => Some(obj),
        _ => None,
    }
}

/// 把 JSON 对象校验为 PlanDecision
pub fn validate_plan(obj: &Map<String, Value>, max_steps: usize) -> Result<PlanDecision, AgentError> {
    let mode = obj
        .get("mode")
        .and_then(Value::as_str)
        .map(|m| m.trim().to_ascii_lowercase())
        .ok_or_else(|| AgentError::MalformedPlan("missing 'mode'".into()))?;

    let reason = obj
        .get("reason")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(DEFAULT_REASON)
        .to_string();

    let confidence = match obj.get("confidence") {
        Some(Value::Number(n)) => n.as_f64().map(|f| f as f32).unwrap_or(DEFAULT_CONFIDENCE),
        Some(Value::String(s)) => s.trim().parse::<f32>().unwrap_or(DEFAULT_CONFIDENCE),
        _ => DEFAULT_CONFIDENCE,
    };

    match mode.as_str() {
        "direct_response" | "direct" | "respond" => Ok(PlanDecision::direct(reason, confidence)),
        "tool_pipeline" | "tools" | "pipeline" => {
            let raw_steps = match obj.get("steps") {
                Some(Value::Array(items)) => items.as_slice(),
                Some(_) => return Err(AgentError::MalformedPlan("'steps' must be a list".into())),
                None => &[],
            };
            let cap = max_steps.max(1);
            if raw_steps.len() > cap {
                tracing::warn!(
                    requested = raw_steps.len(),
                    max_steps = cap,
                    "Plan truncated to step limit"
                );
            }
            let mut steps: Vec<ToolStep> = Vec::new();
            for (index, raw) in raw_steps.iter().take(cap).enumerate() {
                let step = parse_step(raw, index + 1)?;
                let step = if steps.iter().any(|s| s.id() == step.id()) {
                    let fallback_id = format!("step_{}", index + 1);
                    ToolStep::new(fallback_id, step.tool_name(), step.args().clone(), step.reason())
                        .with_assumptions(step.assumptions().to_vec())
                } else {
                    step
                };
                steps.push(step);
            }
            PlanDecision::pipeline(reason, confidence, steps)
        }
        other => Err(AgentError::MalformedPlan(format!("unknown mode '{other}'"))),
    }
}

fn parse_step(raw: &Value, ordinal: usize) -> Result<ToolStep, AgentError> {
    let obj = raw
        .as_object()
        .ok_or_else(|| AgentError::MalformedPlan(format!("step {ordinal} is not an object")))?;

    let tool = obj
        .get("tool")
        .or_else(|| obj.get("tool_name"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AgentError::MalformedPlan(format!("step {ordinal} has no tool")))?;

    let args: Args = match obj.get("args") {
        Some(Value::Object(map)) => map.clone(),
        None | Some(Value::Null) => Args::new(),
        Some(_) => {
            return Err(AgentError::MalformedPlan(format!(
                "step {ordinal} args must be an object"
            )))
        }
    };

    let id = obj
        .get("id")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .unwrap_or_else(|| format!("step_{ordinal}"));

    let reason = obj
        .get("reason")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .unwrap_or_else(|| format!("Step {ordinal}"));

    let assumptions = obj
        .get("assumptions")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    Ok(ToolStep::new(id, tool, args, reason).with_assumptions(assumptions))
}
