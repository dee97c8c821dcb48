//! 编排器：一轮对话的主流程
//!
//! 1. 取得会话草稿锁（同一会话的轮次串行，不同会话并发）
//! 2. 持久化用户消息（尽力而为，失败只记日志）
//! 3. 确认 / 取消口令直接作用于待确认草稿，不经过 Planner
//! 4. 其余输入交给 Planner：直接回复走 Responder；工具流水线中写操作进入草稿，其余步骤交执行器
//! 5. 确定性地合成回复；直接回复做成功声明守卫，带搜索结果的回复做来源核验
//! 6. 持久化助手回复，返回响应信封

use std::sync::Arc;
use std::time::Instant;

use chrono::{Local, NaiveDate, Utc};
use serde_json::{json, Value};

use crate::confirmation::{
    proposal_from_step, ConfirmationStore, DraftGuard, ReplyIntent, TokenPolicy,
};
use crate::core::claims::scrub_write_claims;
use crate::core::envelope::{DecisionSummary, ResponseEnvelope};
use crate::core::render::{
    cap_response, collect_sources, render_cancelled, render_confirmed, render_draft_prompt,
    render_results,
};
use crate::core::responder::Responder;
use crate::core::verification;
use crate::core::ErrorKind;
use crate::memory::{Message, MessageStore, Role};
use crate::planner::{Planner, ToolStep};
use crate::tools::executor::rejected;
use crate::tools::{ToolExecutor, ToolItem, ToolResult, ToolStatus, TurnContext};

pub const NOTHING_TO_CONFIRM: &str = "There is nothing waiting for confirmation right now.";
pub const NOTHING_TO_CANCEL: &str = "There is no pending draft to cancel.";

const SEARCH_TOOL: &str = "web_search";

/// 一轮输入
#[derive(Clone, Debug, Default)]
pub struct Turn {
    pub thread_id: String,
    pub user_id: String,
    pub text: String,
}

impl Turn {
    pub fn new(
        thread_id: impl Into<String>,
        user_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            user_id: user_id.into(),
            text: text.into(),
        }
    }

    fn context(&self) -> TurnContext {
        TurnContext {
            thread_id: self.thread_id.clone(),
            user_id: self.user_id.clone(),
            user_text: self.text.clone(),
        }
    }
}

struct Outcome {
    text: String,
    decision: DecisionSummary,
    results: Vec<ToolResult>,
}

impl Outcome {
    fn direct(text: impl Into<String>, reason: &str) -> Self {
        Self {
            text: text.into(),
            decision: DecisionSummary::new("direct_response", reason, 1.0),
            results: Vec::new(),
        }
    }
}

fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

pub struct Orchestrator {
    planner: Planner,
    executor: ToolExecutor,
    responder: Responder,
    store: Arc<dyn MessageStore>,
    drafts: ConfirmationStore,
    tokens: TokenPolicy,
    verify_sources: bool,
    today: fn() -> NaiveDate,
}

impl Orchestrator {
    pub fn new(
        planner: Planner,
        executor: ToolExecutor,
        responder: Responder,
        store: Arc<dyn MessageStore>,
    ) -> Self {
        Self {
            planner,
            executor,
            responder,
            store,
            drafts: ConfirmationStore::default(),
            tokens: TokenPolicy::default(),
            verify_sources: true,
            today: local_today,
        }
    }

    pub fn with_confirmation(mut self, drafts: ConfirmationStore, tokens: TokenPolicy) -> Self {
        self.drafts = drafts;
        self.tokens = tokens;
        self
    }

    pub fn with_verification(mut self, enabled: bool) -> Self {
        self.verify_sources = enabled;
        self
    }

    /// 相对日期（today / tomorrow / 星期几）的参照日
    pub fn with_clock(mut self, today: fn() -> NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn drafts(&self) -> &ConfirmationStore {
        &self.drafts
    }

    pub fn executor(&self) -> &ToolExecutor {
        &self.executor
    }

    pub async fn handle_turn(&self, turn: Turn) -> ResponseEnvelope {
        let started = Instant::now();
        let request_id = uuid::Uuid::new_v4().to_string();
        tracing::debug!(request_id = %request_id, thread_id = %turn.thread_id, "Turn started");
        let mut guard = self.drafts.lock(&turn.thread_id).await;
        self.persist(&turn.thread_id, Role::User, &turn.text).await;

        let outcome = match self.tokens.classify(&turn.text) {
            ReplyIntent::Confirm { note } => self.on_confirm(&mut guard, &turn, note).await,
            ReplyIntent::Cancel => self.on_cancel(&mut guard, &turn),
            ReplyIntent::Other => self.on_plan(&mut guard, &turn).await,
        };

        let response_text = cap_response(&outcome.text);
        self.persist(&turn.thread_id, Role::Assistant, &response_text).await;
        let draft_state = guard.state();
        drop(guard);

        let (prompt_tokens, completion_tokens, total_tokens) = self.planner.token_usage();
        tracing::debug!(prompt_tokens, completion_tokens, total_tokens, "LLM token usage");
        tracing::info!(
            request_id = %request_id,
            thread_id = %turn.thread_id,
            action = %outcome.decision.action,
            steps = outcome.results.len(),
            draft_state = ?draft_state,
            duration_ms = started.elapsed().as_millis() as u64,
            "Turn handled"
        );

        ResponseEnvelope {
            thread_id: turn.thread_id,
            response_text,
            decision: outcome.decision,
            sources: collect_sources(&outcome.results),
            tool_pipeline: outcome.results,
        }
    }

    async fn on_confirm(
        &self,
        guard: &mut DraftGuard,
        turn: &Turn,
        note: Option<String>,
    ) -> Outcome {
        let Some(draft) = guard.confirm() else {
            tracing::info!(thread_id = %turn.thread_id, "Confirmation without a pending draft");
            return Outcome::direct(NOTHING_TO_CONFIRM, "No pending draft to confirm.");
        };
        tracing::info!(
            thread_id = %turn.thread_id,
            tool = %draft.tool_name,
            note = ?note,
            "Draft confirmed"
        );

        let step = ToolStep::new(
            "confirmed_1",
            draft.tool_name.clone(),
            draft.fields.clone(),
            "Execute the confirmed draft.",
        );
        let mut result = self.executor.run_step(&step, &turn.context()).await;
        if let Some(note) = note {
            match result.payload.as_object_mut() {
                Some(payload) => {
                    payload.insert("note".into(), Value::String(note));
                }
                None => result.payload = json!({ "note": note }),
            }
        }

        guard.complete(result.is_ok());
        tracing::info!(
            thread_id = %turn.thread_id,
            tool = %draft.tool_name,
            success = result.is_ok(),
            state = ?guard.state(),
            "Confirmed draft executed"
        );

        let label = self.executor.registry().label(&draft.tool_name);
        Outcome {
            text: render_confirmed(&result, &label, &self.tokens),
            decision: DecisionSummary::new("tool_pipeline", "User confirmed the pending draft.", 1.0),
            results: vec![result],
        }
    }

    fn on_cancel(&self, guard: &mut DraftGuard, turn: &Turn) -> Outcome {
        let Some(draft) = guard.cancel() else {
            tracing::info!(thread_id = %turn.thread_id, "Cancellation without a pending draft");
            return Outcome::direct(NOTHING_TO_CANCEL, "No pending draft to cancel.");
        };
        tracing::info!(thread_id = %turn.thread_id, tool = %draft.tool_name, "Draft cancelled");

        let label = self.executor.registry().label(&draft.tool_name);
        let skipped = ToolResult::skipped(
            "cancelled_1",
            &draft.tool_name,
            "User cancelled the pending draft.",
            json!({ "status": "cancelled", "fields": draft.fields }),
        )
        .as_write(true);
        Outcome {
            text: render_cancelled(&draft, &label),
            decision: DecisionSummary::new("tool_pipeline", "User cancelled the pending draft.", 1.0),
            results: vec![skipped],
        }
    }

    async fn on_plan(&self, guard: &mut DraftGuard, turn: &Turn) -> Outcome {
        let context = self.context(turn).await;
        let descriptors = self.executor.registry().descriptors();
        let plan = self.planner.decide(&context, &descriptors).await;
        let decision = DecisionSummary::from(&plan);

        if plan.is_direct() {
            let answer = self.responder.answer(&context).await;
            let (answer, _) = scrub_write_claims(&answer, &[]);
            return Outcome {
                text: answer,
                decision,
                results: Vec::new(),
            };
        }

        // 写步骤只起草不执行，其余步骤按计划顺序交给执行器
        let mut gated = Vec::with_capacity(plan.steps().len());
        let mut runnable = Vec::new();
        for step in plan.steps() {
            let result = self.draft_write_step(guard, step, turn).await;
            if result.is_none() {
                runnable.push(step.clone());
            }
            gated.push(result);
        }
        let mut executed = self.executor.run(&runnable, &turn.context()).await.into_iter();
        let results: Vec<ToolResult> = gated
            .into_iter()
            .filter_map(|slot| slot.or_else(|| executed.next()))
            .collect();

        let mut sections = Vec::new();
        let rendered = render_results(&results, self.executor.registry());
        if !rendered.is_empty() {
            sections.push(rendered);
        }
        let awaiting = results.iter().any(|r| {
            r.write
                && (r.status == ToolStatus::Skipped
                    || r.error.as_ref().map(|e| e.kind) == Some(ErrorKind::DraftConflict))
        });
        if awaiting {
            if let Some(draft) = guard.pending() {
                let label = self.executor.registry().label(&draft.tool_name);
                sections.push(render_draft_prompt(draft, &label, &self.tokens));
            }
        }
        let mut text = sections.join("\n\n");

        let search_items: Vec<ToolItem> = results
            .iter()
            .filter(|r| r.tool_name == SEARCH_TOOL && r.is_ok())
            .flat_map(|r| r.items())
            .collect();
        if !search_items.is_empty() {
            text = self.verify(&turn.text, &text, &search_items);
        }

        Outcome {
            text,
            decision,
            results,
        }
    }

    /// 写操作步骤进入草稿而不执行；非写步骤返回 None 交给执行器
    async fn draft_write_step(
        &self,
        guard: &mut DraftGuard,
        step: &ToolStep,
        turn: &Turn,
    ) -> Option<ToolResult> {
        let registry = self.executor.registry();
        let tool = registry.get(step.tool_name())?;
        if !tool.is_write(step.args()) {
            return None;
        }
        if let Err(e) = registry.validate(step.tool_name(), step.args()) {
            return Some(rejected(step, &e).as_write(true));
        }
        if let Err(e) = self.executor.check_capability(tool.as_ref(), &turn.user_id).await {
            return Some(rejected(step, &e).as_write(true));
        }

        let proposal = proposal_from_step(step, (self.today)());
        match guard.propose(proposal) {
            Ok(draft) => {
                tracing::info!(
                    thread_id = %turn.thread_id,
                    tool = %draft.tool_name,
                    assumptions = ?draft.assumptions,
                    "Write step drafted, awaiting confirmation"
                );
                let payload = json!({
                    "status": "awaiting_confirmation",
                    "fields": draft.fields,
                    "assumptions": draft.assumptions,
                });
                Some(
                    ToolResult::skipped(step.id(), step.tool_name(), step.reason(), payload)
                        .as_write(true),
                )
            }
            Err(e) => {
                tracing::warn!(thread_id = %turn.thread_id, error = %e, "Draft rejected");
                Some(rejected(step, &e).as_write(true))
            }
        }
    }

    fn verify(&self, user_text: &str, answer: &str, sources: &[ToolItem]) -> String {
        if !self.verify_sources {
            return answer.to_string();
        }
        let profile = verification::assess(user_text);
        verification::enforce(user_text, answer, sources, &profile, Utc::now())
    }

    /// Planner 上下文：最近消息，保证以本轮用户消息结尾
    async fn context(&self, turn: &Turn) -> Vec<Message> {
        let limit = self.planner.settings().context_messages.max(4) + 1;
        let mut context = match self.store.recent_messages(&turn.thread_id, limit).await {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(thread_id = %turn.thread_id, error = %e, "Could not load recent messages");
                Vec::new()
            }
        };
        let ends_with_turn = context
            .last()
            .is_some_and(|m| m.role == Role::User && m.content == turn.text);
        if !ends_with_turn {
            context.push(Message::user(turn.text.clone()));
        }
        context
    }

    async fn persist(&self, thread_id: &str, role: Role, content: &str) {
        if let Err(e) = self.store.append_message(thread_id, role, content).await {
            tracing::warn!(thread_id, role = role.as_str(), error = %e, "Failed to persist message");
        }
    }
}
