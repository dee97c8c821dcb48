//! Steward - 对话智能体的决策与执行层
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **confirmation**: 写操作确认门（口令识别、草稿规范化、按会话的状态机）
//! - **core**: 编排器、运行时组装、回复合成、成功声明守卫、来源核验
//! - **integrations**: 已连接账号与 Google REST 调用
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock / 脚本化）
//! - **memory**: 对话消息与持久化（内存 / SQLite）
//! - **observability**: 日志初始化
//! - **planner**: 上下文 → 经过校验的计划决策
//! - **search**: 搜索后端与按序降级链
//! - **tools**: 工具 trait、注册表、执行器与内置工具

pub mod config;
pub mod confirmation;
pub mod core;
pub mod integrations;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod planner;
pub mod search;
pub mod tools;

pub use crate::core::{AgentError, Orchestrator, ResponseEnvelope, StewardBuilder, Turn};
