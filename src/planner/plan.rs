//! 计划决策类型
//!
//! PlanDecision 只能经构造函数产生：direct_response 一定没有步骤，tool_pipeline 一定至少一个步骤。
//! 产出后不可变，执行器只能拒绝步骤，不能改写。

use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::tools::schema::Args;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanAction {
    DirectResponse,
    ToolPipeline,
}

impl PlanAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanAction::DirectResponse => "direct_response",
            PlanAction::ToolPipeline => "tool_pipeline",
        }
    }
}

/// 单个工具步骤
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolStep {
    id: String,
    tool_name: String,
    args: Args,
    reason: String,
    /// 规划时所做的推断（如“明天”“下午三点”），写操作起草时并入草稿假设
    #[serde(skip_serializing_if = "Vec::is_empty")]
    assumptions: Vec<String>,
}

impl ToolStep {
    pub fn new(
        id: impl Into<String>,
        tool_name: impl Into<String>,
        args: Args,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            tool_name: tool_name.into(),
            args,
            reason: reason.into(),
            assumptions: Vec::new(),
        }
    }

    pub fn with_assumptions(mut self, assumptions: Vec<String>) -> Self {
        self.assumptions = assumptions;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    pub fn args(&self) -> &Args {
        &self.args
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn assumptions(&self) -> &[String] {
        &self.assumptions
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlanDecision {
    action: PlanAction,
    rationale: String,
    confidence: f32,
    steps: Vec<ToolStep>,
}

impl PlanDecision {
    pub fn direct(rationale: impl Into<String>, confidence: f32) -> Self {
        Self {
            action: PlanAction::DirectResponse,
            rationale: rationale.into(),
            confidence: clamp_confidence(confidence),
            steps: Vec::new(),
        }
    }

    pub fn pipeline(
        rationale: impl Into<String>,
        confidence: f32,
        steps: Vec<ToolStep>,
    ) -> Result<Self, AgentError> {
        if steps.is_empty() {
            return Err(AgentError::MalformedPlan(
                "tool_pipeline requires at least one step".into(),
            ));
        }
        Ok(Self {
            action: PlanAction::ToolPipeline,
            rationale: rationale.into(),
            confidence: clamp_confidence(confidence),
            steps,
        })
    }

    /// 规划失败时的保守决策：直接回复，零置信度
    pub fn fail_closed(rationale: impl Into<String>) -> Self {
        Self::direct(rationale, 0.0)
    }

    pub fn action(&self) -> PlanAction {
        self.action
    }

    pub fn is_direct(&self) -> bool {
        self.action == PlanAction::DirectResponse
    }

    pub fn rationale(&self) -> &str {
        &self.rationale
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn steps(&self) -> &[ToolStep] {
        &self.steps
    }
}

fn clamp_confidence(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
