//! 工具注册表
//!
//! 所有工具实现 Tool trait（名称 / 展示名 / 描述 / 参数 Schema / 授权范围 / 写操作判定 / 调用），
//! 由 ToolRegistry 按名注册、查找与校验；descriptors 生成 Planner 看到的能力清单（按名称排序，保证提示稳定）。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::core::AgentError;
use crate::integrations::Scope;
use crate::tools::schema::{Args, ToolSchema};
use crate::tools::{ToolContext, ToolError, ToolOutput};

#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（计划步骤中的 "tool" 字段）
    fn name(&self) -> &str;

    /// 面向用户的展示名，如 "Google Calendar"
    fn label(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    fn schema(&self) -> ToolSchema;

    /// 需要的授权范围；None 表示无需账号
    fn required_scope(&self) -> Option<Scope> {
        None
    }

    /// 按参数判定本次调用是否产生外部副作用（写操作必须先经用户确认）
    fn is_write(&self, _args: &Args) -> bool {
        false
    }

    async fn invoke(&self, ctx: &ToolContext, args: &Args) -> Result<ToolOutput, ToolError>;
}

/// Planner 看到的能力描述
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CapabilityDescriptor {
    pub name: String,
    pub label: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<dyn Tool>, AgentError> {
        self.get(name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))
    }

    /// 查找并校验参数
    pub fn validate(&self, name: &str, args: &Args) -> Result<Arc<dyn Tool>, AgentError> {
        let tool = self.lookup(name)?;
        tool.schema()
            .validate(args)
            .map_err(|source| AgentError::Validation {
                tool: name.to_string(),
                source,
            })?;
        Ok(tool)
    }

    /// 未注册的工具不算写操作（执行时会以 NotFound 失败）
    pub fn is_write(&self, name: &str, args: &Args) -> bool {
        self.get(name).map(|t| t.is_write(args)).unwrap_or(false)
    }

    /// 展示名；未注册时退回工具名
    pub fn label(&self, name: &str) -> String {
        self.get(name)
            .map(|t| t.label().to_string())
            .unwrap_or_else(|| name.to_string())
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn descriptors(&self) -> Vec<CapabilityDescriptor> {
        self.tool_names()
            .into_iter()
            .filter_map(|name| self.tools.get(&name).cloned())
            .map(|tool| CapabilityDescriptor {
                name: tool.name().to_string(),
                label: tool.label().to_string(),
                description: tool.description().to_string(),
                parameters: tool.schema().to_json(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
