//! 工具箱：参数 Schema、注册表、执行器，以及网页搜索 / Google 日历 / Gmail / 云端硬盘工具

pub mod calendar;
pub mod drive;
pub mod executor;
pub mod gmail;
pub mod registry;
pub mod schema;
pub mod types;
pub mod web_search;

pub use calendar::GoogleCalendarTool;
pub use drive::GoogleDriveTool;
pub use executor::{ToolExecutor, TurnContext};
pub use gmail::GoogleGmailTool;
pub use registry::{CapabilityDescriptor, Tool, ToolRegistry};
pub use schema::{Args, ToolSchema};
pub use types::{Citation, StepError, ToolContext, ToolError, ToolItem, ToolOutput, ToolResult, ToolStatus};
pub use web_search::WebSearchTool;
