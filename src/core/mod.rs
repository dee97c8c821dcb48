//! 核心编排层：错误分类、运行时组装、单轮主流程、回复合成与安全守卫

pub mod builder;
pub mod claims;
pub mod envelope;
pub mod error;
pub mod orchestrator;
pub mod render;
pub mod responder;
pub mod verification;

pub use builder::{create_llm_from_config, StewardBuilder};
pub use envelope::{DecisionSummary, ResponseEnvelope};
pub use error::{AgentError, ErrorKind};
pub use orchestrator::{Orchestrator, Turn};
pub use responder::Responder;
