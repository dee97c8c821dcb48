//! 写操作确认门
//!
//! 写操作先进入草稿，只有用户回复确认口令后才执行：
//! - tokens：确认 / 取消口令识别
//! - draft：从计划步骤生成草稿提案（字段规范化、假设记录）
//! - store：按会话保存草稿的状态机

pub mod draft;
pub mod store;
pub mod tokens;

pub use draft::{proposal_from_step, DraftProposal};
pub use store::{ConfirmationStore, ConflictPolicy, DraftGuard, DraftState, PendingDraft};
pub use tokens::{ReplyIntent, TokenPolicy};
