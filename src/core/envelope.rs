//! 响应信封：每轮对话返回给调用方的结构化结果

use serde::{Deserialize, Serialize};

use crate::planner::PlanDecision;
use crate::tools::{Citation, ToolResult};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecisionSummary {
    /// direct_response / tool_pipeline
    pub action: String,
    pub reason: String,
    pub confidence: f32,
}

impl DecisionSummary {
    pub fn new(action: impl Into<String>, reason: impl Into<String>, confidence: f32) -> Self {
        Self {
            action: action.into(),
            reason: reason.into(),
            confidence,
        }
    }
}

impl From<&PlanDecision> for DecisionSummary {
    fn from(plan: &PlanDecision) -> Self {
        Self::new(plan.action().as_str(), plan.rationale(), plan.confidence())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub thread_id: String,
    pub response_text: String,
    pub decision: DecisionSummary,
    pub sources: Vec<Citation>,
    pub tool_pipeline: Vec<ToolResult>,
}

impl ResponseEnvelope {
    /// 本轮是否有某个写工具执行成功
    pub fn write_succeeded(&self, tool_name: &str) -> bool {
        self.tool_pipeline
            .iter()
            .any(|r| r.write && r.is_ok() && r.tool_name == tool_name)
    }
}
