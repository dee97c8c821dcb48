//! 写操作确认状态机
//!
//! 每个会话至多一个待确认草稿：
//!
//! ```text
//! NONE --propose--> DRAFTED --confirm--> CONFIRMED --complete(ok)--> NONE
//!                      |  ^                  |
//!                      |  +--complete(err)---+
//!                      +--cancel--> CANCELLED --> NONE
//! ```
//!
//! 会话级 tokio Mutex 保证同一会话的并发轮次串行地读写草稿，不同会话互不阻塞。
//! 持锁期间由 [`DraftGuard`] 独占访问。句柄释放时若草稿为空且无人等待，会话条目随之移除。

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::confirmation::DraftProposal;
use crate::core::AgentError;
use crate::tools::schema::Args;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DraftState {
    None,
    Drafted,
    Confirmed,
    Cancelled,
}

/// 新写操作与另一工具的待确认草稿冲突时的处理方式
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    #[default]
    Reject,
    Replace,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PendingDraft {
    pub tool_name: String,
    pub fields: Args,
    pub assumptions: BTreeSet<String>,
    pub state: DraftState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PendingDraft {
    fn new(tool_name: String) -> Self {
        let now = Utc::now();
        Self {
            tool_name,
            fields: Args::new(),
            assumptions: BTreeSet::new(),
            state: DraftState::Drafted,
            created_at: now,
            updated_at: now,
        }
    }

    /// 合并一次提案：
    /// - 新给出的字段覆盖旧值；若该字段本次不是推断得来，则从假设中移除
    /// - 本次的假设并入
    /// - 默认值只填补仍然缺失的字段，并记为假设
    fn merge(&mut self, proposal: DraftProposal) {
        for (key, value) in proposal.fields {
            if value.is_null() {
                continue;
            }
            if !proposal.assumptions.contains(&key) {
                self.assumptions.remove(&key);
            }
            self.fields.insert(key, value);
        }
        self.assumptions.extend(proposal.assumptions);
        for (key, value) in proposal.defaults {
            if !self.fields.contains_key(&key) {
                self.fields.insert(key.clone(), value);
                self.assumptions.insert(key);
            }
        }
        self.updated_at = Utc::now();
    }
}

type Slot = Arc<AsyncMutex<Option<PendingDraft>>>;
type Slots = Arc<Mutex<HashMap<String, Slot>>>;

/// 按会话保存待确认草稿
#[derive(Debug, Default)]
pub struct ConfirmationStore {
    slots: Slots,
    policy: ConflictPolicy,
}

impl ConfirmationStore {
    pub fn new(policy: ConflictPolicy) -> Self {
        Self {
            slots: Slots::default(),
            policy,
        }
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    fn slot(&self, conversation_id: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            slots
                .entry(conversation_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(None))),
        )
    }

    /// 取得会话草稿的独占访问；同一会话的其他调用在此等待
    pub async fn lock(&self, conversation_id: &str) -> DraftGuard {
        DraftGuard {
            conversation_id: conversation_id.to_string(),
            slot: self.slot(conversation_id).lock_owned().await,
            slots: Arc::clone(&self.slots),
            policy: self.policy,
        }
    }

    pub async fn state(&self, conversation_id: &str) -> DraftState {
        self.lock(conversation_id).await.state()
    }

    pub async fn pending(&self, conversation_id: &str) -> Option<PendingDraft> {
        self.lock(conversation_id).await.pending().cloned()
    }
}

/// 会话草稿的独占句柄，drop 时释放
pub struct DraftGuard {
    conversation_id: String,
    slot: OwnedMutexGuard<Option<PendingDraft>>,
    slots: Slots,
    policy: ConflictPolicy,
}

impl Drop for DraftGuard {
    fn drop(&mut self) {
        if self.slot.is_some() {
            return;
        }
        // 持有 map 锁时不会有新的等待者拿到该条目；计数为 2 表示只剩 map 与本句柄
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let ours = OwnedMutexGuard::mutex(&self.slot);
        let idle = slots
            .get(&self.conversation_id)
            .is_some_and(|slot| Arc::ptr_eq(slot, ours) && Arc::strong_count(slot) == 2);
        if idle {
            slots.remove(&self.conversation_id);
        }
    }
}

impl DraftGuard {
    pub fn state(&self) -> DraftState {
        self.slot.as_ref().map(|d| d.state).unwrap_or(DraftState::None)
    }

    pub fn pending(&self) -> Option<&PendingDraft> {
        self.slot.as_ref()
    }

    /// 起草或编辑：同一工具的草稿合并，不同工具按冲突策略处理
    pub fn propose(&mut self, proposal: DraftProposal) -> Result<&PendingDraft, AgentError> {
        let replace = match self.slot.as_ref() {
            None => true,
            Some(current) if current.state == DraftState::Drafted => {
                if current.tool_name == proposal.tool_name {
                    false
                } else if self.policy == ConflictPolicy::Replace {
                    tracing::info!(
                        conversation_id = %self.conversation_id,
                        replaced = %current.tool_name,
                        tool = %proposal.tool_name,
                        "Replacing pending draft"
                    );
                    true
                } else {
                    return Err(AgentError::DraftConflict {
                        pending: current.tool_name.clone(),
                        requested: proposal.tool_name,
                    });
                }
            }
            Some(current) => {
                return Err(AgentError::DraftConflict {
                    pending: current.tool_name.clone(),
                    requested: proposal.tool_name,
                })
            }
        };

        if replace {
            *self.slot = Some(PendingDraft::new(proposal.tool_name.clone()));
        }
        let draft = self.slot.get_or_insert_with(|| PendingDraft::new(proposal.tool_name.clone()));
        draft.merge(proposal);
        tracing::debug!(
            conversation_id = %self.conversation_id,
            tool = %draft.tool_name,
            fields = draft.fields.len(),
            assumptions = draft.assumptions.len(),
            "Draft updated"
        );
        Ok(draft)
    }

    /// DRAFTED → CONFIRMED，返回待执行的草稿；其他状态返回 None
    pub fn confirm(&mut self) -> Option<PendingDraft> {
        let draft = self.slot.as_mut()?;
        if draft.state != DraftState::Drafted {
            return None;
        }
        draft.state = DraftState::Confirmed;
        draft.updated_at = Utc::now();
        Some(draft.clone())
    }

    /// 确认后的执行结束：成功清空草稿，失败退回 DRAFTED 以便重试或取消
    pub fn complete(&mut self, success: bool) {
        if self.state() != DraftState::Confirmed {
            return;
        }
        if success {
            *self.slot = None;
        } else if let Some(draft) = self.slot.as_mut() {
            draft.state = DraftState::Drafted;
            draft.updated_at = Utc::now();
        }
    }

    /// DRAFTED → CANCELLED → NONE，返回被取消的草稿
    pub fn cancel(&mut self) -> Option<PendingDraft> {
        if self.state() != DraftState::Drafted {
            return None;
        }
        let mut draft = self.slot.take()?;
        draft.state = DraftState::Cancelled;
        draft.updated_at = Utc::now();
        Some(draft)
    }
}

#[cfg(test)]
impl ConfirmationStore {
    fn tracked(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
