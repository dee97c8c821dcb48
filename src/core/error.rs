//! 错误类型
//!
//! AgentError 覆盖一轮对话中可能出现的全部失败；ErrorKind 是其可序列化的分类，
//! 随失败步骤一起写入响应信封，调用方据此区分“能力缺失”“外部超时”“参数非法”等。

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tools::schema::ValidationError;

/// 响应信封中的错误分类
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    CapabilityUnavailable,
    ExternalTimeout,
    ExternalFailure,
    DecisionTimeout,
    MalformedPlan,
    DraftConflict,
    Persistence,
    Internal,
}

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Invalid arguments for {tool}: {source}")]
    Validation {
        tool: String,
        #[source]
        source: ValidationError,
    },

    #[error("Unknown tool: {0}")]
    ToolNotFound(String),

    #[error("{0}")]
    CapabilityUnavailable(String),

    #[error("External call timed out: {0}")]
    ExternalTimeout(String),

    #[error("External call failed: {0}")]
    ExternalFailure(String),

    #[error("Planner did not decide within {0:?}")]
    DecisionTimeout(Duration),

    #[error("Malformed plan: {0}")]
    MalformedPlan(String),

    #[error("A pending {pending} draft blocks a new {requested} draft")]
    DraftConflict { pending: String, requested: String },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Config error: {0}")]
    ConfigError(String),
}

impl AgentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::Validation { .. } => ErrorKind::Validation,
            AgentError::ToolNotFound(_) => ErrorKind::NotFound,
            AgentError::CapabilityUnavailable(_) => ErrorKind::CapabilityUnavailable,
            AgentError::ExternalTimeout(_) => ErrorKind::ExternalTimeout,
            AgentError::ExternalFailure(_) | AgentError::LlmError(_) => ErrorKind::ExternalFailure,
            AgentError::DecisionTimeout(_) => ErrorKind::DecisionTimeout,
            AgentError::MalformedPlan(_) => ErrorKind::MalformedPlan,
            AgentError::DraftConflict { .. } => ErrorKind::DraftConflict,
            AgentError::Persistence(_) => ErrorKind::Persistence,
            AgentError::ConfigError(_) => ErrorKind::Internal,
        }
    }
}
