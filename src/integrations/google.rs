//! Google REST API 调用
//!
//! 统一处理 Bearer 鉴权与错误映射：401/403 视为授权失效（能力不可用），404 为资源不存在，
//! 其余非 2xx 带上 API 返回的 error.message。

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;

use crate::tools::{ToolContext, ToolError};

#[derive(Clone)]
pub struct GoogleApi {
    client: Client,
    service: &'static str,
}

impl GoogleApi {
    pub fn new(service: &'static str, timeout: Duration) -> Self {
        let client = Client::builder().timeout(timeout).build().unwrap_or_default();
        Self { client, service }
    }

    pub async fn get_json(&self, url: &str, token: &str, query: &[(&str, String)]) -> Result<Value, ToolError> {
        self.send(self.client.get(url).query(query), token).await
    }

    pub async fn post_json(&self, url: &str, token: &str, body: &Value) -> Result<Value, ToolError> {
        self.send(self.client.post(url).json(body), token).await
    }

    async fn send(&self, request: RequestBuilder, token: &str) -> Result<Value, ToolError> {
        let resp = request
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ToolError::Timeout(format!("{} request timed out", self.service))
                } else {
                    ToolError::Failed(format!("{} API failed: {e}", self.service))
                }
            })?;

        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        if status.is_success() {
            return Ok(body);
        }
        Err(map_status(self.service, status, &body))
    }
}

/// 取出执行器注入的访问令牌
pub fn require_token<'a>(ctx: &'a ToolContext, service: &str) -> Result<&'a str, ToolError> {
    ctx.access_token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ToolError::Unauthorized(format!("{service} is not connected. Please connect Google first.")))
}

pub fn map_status(service: &str, status: StatusCode, body: &Value) -> ToolError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ToolError::Unauthorized(format!("{service} authorization failed. Please reconnect Google."))
        }
        StatusCode::NOT_FOUND => ToolError::Failed(format!("{service} could not find the requested resource.")),
        _ => {
            let detail = body
                .pointer("/error/message")
                .and_then(Value::as_str)
                .map(|m| format!(": {}", m.trim()))
                .unwrap_or_default();
            ToolError::Failed(format!("{service} API failed ({}){detail}.", status.as_u16()))
        }
    }
}
