//! 工具调用的输入输出类型
//!
//! ToolOutput 是工具自身的返回；ToolResult 是执行器为每个步骤产出的记录（成功 / 失败 / 跳过），
//! 顺序与计划步骤一致，并进入响应信封的 tool_pipeline。

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::core::ErrorKind;

/// 调用上下文：会话、用户、本轮原文，以及执行器按授权范围取到的访问令牌
#[derive(Clone, Debug, Default)]
pub struct ToolContext {
    pub thread_id: String,
    pub user_id: String,
    pub user_text: String,
    pub access_token: Option<String>,
}

/// 工具返回的单条结果（搜索结果、日历事件、邮件线程、文件等）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolItem {
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub snippet: String,
}

impl ToolItem {
    pub fn new(title: impl Into<String>, url: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            snippet: snippet.into(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ToolOutput {
    pub items: Vec<ToolItem>,
    /// 工具特定的附加信息（如命中的搜索后端、创建的事件 id）
    pub meta: Value,
}

impl ToolOutput {
    pub fn items(items: Vec<ToolItem>) -> Self {
        Self {
            items,
            meta: Value::Null,
        }
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = meta;
        self
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("{0}")]
    InvalidArgs(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    Failed(String),

    #[error("No results found ({0})")]
    NoResults(String),
}

impl ToolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ToolError::InvalidArgs(_) => ErrorKind::Validation,
            ToolError::Unauthorized(_) => ErrorKind::CapabilityUnavailable,
            ToolError::Timeout(_) => ErrorKind::ExternalTimeout,
            ToolError::Failed(_) | ToolError::NoResults(_) => ErrorKind::ExternalFailure,
        }
    }
}

/// 引用来源
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    pub url: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Ok,
    Failed,
    Skipped,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepError {
    pub kind: ErrorKind,
    pub message: String,
}

/// 单个步骤的执行记录
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub step_id: String,
    pub tool_name: String,
    pub reason: String,
    pub status: ToolStatus,
    /// 该步骤是否为写操作
    pub write: bool,
    pub payload: Value,
    pub citations: Vec<Citation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
}

impl ToolResult {
    fn base(step_id: &str, tool_name: &str, reason: &str, status: ToolStatus) -> Self {
        Self {
            step_id: step_id.to_string(),
            tool_name: tool_name.to_string(),
            reason: reason.to_string(),
            status,
            write: false,
            payload: Value::Null,
            citations: Vec::new(),
            error: None,
        }
    }

    pub fn ok(step_id: &str, tool_name: &str, reason: &str, output: ToolOutput) -> Self {
        let citations = output
            .items
            .iter()
            .filter(|item| item.url.starts_with("http://") || item.url.starts_with("https://"))
            .map(|item| Citation {
                title: item.title.clone(),
                url: item.url.clone(),
            })
            .collect();
        Self {
            payload: json!({ "items": output.items, "meta": output.meta }),
            citations,
            ..Self::base(step_id, tool_name, reason, ToolStatus::Ok)
        }
    }

    pub fn failed(
        step_id: &str,
        tool_name: &str,
        reason: &str,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: Some(StepError {
                kind,
                message: message.into(),
            }),
            ..Self::base(step_id, tool_name, reason, ToolStatus::Failed)
        }
    }

    pub fn skipped(step_id: &str, tool_name: &str, reason: &str, payload: Value) -> Self {
        Self {
            payload,
            ..Self::base(step_id, tool_name, reason, ToolStatus::Skipped)
        }
    }

    pub fn as_write(mut self, write: bool) -> Self {
        self.write = write;
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == ToolStatus::Ok
    }

    /// 成功结果中的条目（失败 / 跳过时为空）
    pub fn items(&self) -> Vec<ToolItem> {
        self.payload
            .get("items")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_result_collects_http_citations_only() {
        let output = ToolOutput::items(vec![
            ToolItem::new("Rust", "https://www.rust-lang.org", "home"),
            ToolItem::new("Local", "", "no link"),
        ]);
        let result = ToolResult::ok("step_1", "web_search", "look it up", output);
        assert!(result.is_ok());
        assert_eq!(result.citations.len(), 1);
        assert_eq!(result.items().len(), 2);
    }

    #[test]
    fn test_failed_serializes_error_kind() {
        let result = ToolResult::failed(
            "step_2",
            "google_calendar",
            "",
            ErrorKind::CapabilityUnavailable,
            "not connected",
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"]["kind"], "capability_unavailable");
        assert!(result.items().is_empty());
    }
}
