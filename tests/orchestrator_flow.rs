//! 编排器端到端流程：脚本化 LLM + 假工具 + 内存账号 / 存储

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};

use steward::config::AppConfig;
use steward::confirmation::{ConflictPolicy, DraftState};
use steward::core::claims::CALENDAR_DISCLAIMER;
use steward::core::orchestrator::NOTHING_TO_CONFIRM;
use steward::core::{ErrorKind, Orchestrator, StewardBuilder, Turn};
use steward::integrations::{ConnectedAccount, InMemoryAccounts, Scope};
use steward::llm::{MockLlmClient, ScriptedLlmClient};
use steward::memory::{InMemoryMessageStore, Message, MessageStore, Role, StoreError};
use steward::search::{ProviderError, ProviderFallbackChain, SearchHit, SearchProvider};
use steward::tools::schema::{ArgKind, Args};
use steward::tools::{
    Tool, ToolContext, ToolError, ToolItem, ToolOutput, ToolRegistry, ToolSchema, ToolStatus,
    WebSearchTool,
};

/// 2026-10-17（星期六）
fn fixed_today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()
}

#[derive(Default)]
struct FakeCalendar {
    created: Mutex<Vec<Args>>,
    fail: bool,
}

#[async_trait]
impl Tool for FakeCalendar {
    fn name(&self) -> &str {
        "google_calendar"
    }
    fn label(&self) -> &str {
        "Google Calendar"
    }
    fn description(&self) -> &str {
        "Read or create calendar events"
    }
    fn schema(&self) -> ToolSchema {
        ToolSchema::new()
            .optional("operation", ArgKind::one_of(&["read", "create"]), "")
            .optional("title", ArgKind::String, "")
            .optional("day", ArgKind::String, "")
            .optional("time", ArgKind::String, "")
            .optional("duration_minutes", ArgKind::Integer, "")
            .optional("location", ArgKind::String, "")
    }
    fn required_scope(&self) -> Option<Scope> {
        Some(Scope::Calendar)
    }
    fn is_write(&self, args: &Args) -> bool {
        args.get("operation").and_then(Value::as_str) == Some("create")
    }
    async fn invoke(&self, _ctx: &ToolContext, args: &Args) -> Result<ToolOutput, ToolError> {
        if self.fail {
            return Err(ToolError::Failed("Google Calendar API failed (500): backend error.".into()));
        }
        self.created.lock().unwrap().push(args.clone());
        let title = args.get("title").and_then(Value::as_str).unwrap_or("Event");
        Ok(ToolOutput::items(vec![ToolItem::new(
            format!("[Created] {title}"),
            "https://calendar.google.com/calendar/event?eid=test-created-1",
            "Starts: 2026-10-18T15:00:00 (UTC)",
        )]))
    }
}

#[derive(Default)]
struct FakeGmail {
    sent: Mutex<Vec<Args>>,
}

#[async_trait]
impl Tool for FakeGmail {
    fn name(&self) -> &str {
        "google_gmail"
    }
    fn label(&self) -> &str {
        "Gmail"
    }
    fn description(&self) -> &str {
        "Send email"
    }
    fn schema(&self) -> ToolSchema {
        ToolSchema::new()
            .optional("operation", ArgKind::one_of(&["read", "draft_new", "send"]), "")
            .optional("to", ArgKind::String, "")
            .optional("subject", ArgKind::String, "")
            .optional("body", ArgKind::String, "")
    }
    fn required_scope(&self) -> Option<Scope> {
        Some(Scope::Mail)
    }
    fn is_write(&self, args: &Args) -> bool {
        args.get("operation").and_then(Value::as_str) == Some("send")
    }
    async fn invoke(&self, _ctx: &ToolContext, args: &Args) -> Result<ToolOutput, ToolError> {
        self.sent.lock().unwrap().push(args.clone());
        Ok(ToolOutput::items(vec![ToolItem::new("[Sent] Hello", "https://mail.google.com/mail/u/0/#sent/1", "")]))
    }
}

struct DownProvider(&'static str);

#[async_trait]
impl SearchProvider for DownProvider {
    fn name(&self) -> &str {
        self.0
    }
    async fn search(&self, _query: &str, _max: usize) -> Result<Vec<SearchHit>, ProviderError> {
        Err(ProviderError::Status(503))
    }
}

struct BrokenStore;

#[async_trait]
impl MessageStore for BrokenStore {
    async fn append_message(&self, _t: &str, _r: Role, _c: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("disk full".into()))
    }
    async fn recent_messages(&self, _t: &str, _l: usize) -> Result<Vec<Message>, StoreError> {
        Err(StoreError::Unavailable("disk full".into()))
    }
}

fn accounts() -> Arc<InMemoryAccounts> {
    Arc::new(InMemoryAccounts::new(vec![ConnectedAccount {
        user_id: "u1".into(),
        provider: "google".into(),
        access_token: "token-1".into(),
        scopes: HashSet::from([Scope::Calendar, Scope::Mail]),
        expires_at: None,
    }]))
}

struct Harness {
    orchestrator: Orchestrator,
    llm: Arc<ScriptedLlmClient>,
    calendar: Arc<FakeCalendar>,
    gmail: Arc<FakeGmail>,
    store: Arc<InMemoryMessageStore>,
}

fn harness_with(config: AppConfig, calendar: FakeCalendar) -> Harness {
    let llm = Arc::new(ScriptedLlmClient::new(Vec::<String>::new()));
    let calendar = Arc::new(calendar);
    let gmail = Arc::new(FakeGmail::default());
    let store = Arc::new(InMemoryMessageStore::default());

    let chain = ProviderFallbackChain::new(
        vec![Arc::new(DownProvider("duckduckgo")), Arc::new(DownProvider("bing"))],
        Duration::from_millis(200),
        1,
    );
    let mut registry = ToolRegistry::new();
    registry.register_arc(calendar.clone());
    registry.register_arc(gmail.clone());
    registry.register(WebSearchTool::new(Arc::new(chain), 5));

    let orchestrator = StewardBuilder::new(config)
        .with_llm(llm.clone())
        .with_accounts(accounts())
        .with_store(store.clone())
        .with_registry(registry)
        .build()
        .unwrap()
        .with_clock(fixed_today);

    Harness {
        orchestrator,
        llm,
        calendar,
        gmail,
        store,
    }
}

fn harness() -> Harness {
    harness_with(AppConfig::default(), FakeCalendar::default())
}

fn pipeline(tool: &str, args: Value) -> String {
    json!({
        "mode": "tool_pipeline",
        "reason": "User asked for an action",
        "confidence": 0.9,
        "steps": [{"id": "step_1", "tool": tool, "args": args, "reason": "Do it"}]
    })
    .to_string()
}

fn schedule_sync() -> String {
    pipeline(
        "google_calendar",
        json!({"operation": "create", "title": "Sync", "day": "tomorrow", "time": "3pm"}),
    )
}

#[tokio::test]
async fn test_schedule_then_confirm_creates_event() {
    let h = harness();
    h.llm.push(schedule_sync());

    let first = h
        .orchestrator
        .handle_turn(Turn::new("t1", "u1", "schedule a meeting tomorrow at 3pm called Sync"))
        .await;
    assert_eq!(first.decision.action, "tool_pipeline");
    assert_eq!(first.tool_pipeline[0].status, ToolStatus::Skipped);
    assert!(first.tool_pipeline[0].write);
    assert!(first.response_text.contains("Should I add this to Google Calendar?"));
    assert!(!first.response_text.contains("updated"));
    assert!(!first.write_succeeded("google_calendar"));
    assert!(h.calendar.created.lock().unwrap().is_empty());

    let draft = h.orchestrator.drafts().pending("t1").await.unwrap();
    assert_eq!(draft.state, DraftState::Drafted);
    assert_eq!(draft.fields["title"], "Sync");
    assert_eq!(draft.fields["day"], "2026-10-18");
    assert_eq!(draft.fields["time"], "15:00");
    assert_eq!(draft.assumptions.iter().collect::<Vec<_>>(), vec!["day", "time"]);

    let second = h.orchestrator.handle_turn(Turn::new("t1", "u1", "Confirm.")).await;
    assert!(second.response_text.contains("Google Calendar updated"));
    assert!(second
        .response_text
        .contains("Link: https://calendar.google.com/calendar/event?eid=test-created-1"));
    assert!(second.write_succeeded("google_calendar"));
    assert_eq!(second.sources.len(), 1);
    assert_eq!(h.orchestrator.drafts().state("t1").await, DraftState::None);

    let created = h.calendar.created.lock().unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0]["time"], "15:00");
    // 确认轮不调用 Planner
    assert_eq!(h.llm.calls(), 1);
}

#[tokio::test]
async fn test_cancel_discards_draft() {
    let h = harness();
    h.llm.push(schedule_sync());
    h.orchestrator
        .handle_turn(Turn::new("t1", "u1", "schedule a meeting tomorrow at 3pm called Sync"))
        .await;

    let env = h.orchestrator.handle_turn(Turn::new("t1", "u1", "cancel")).await;
    assert_eq!(env.tool_pipeline.len(), 1);
    assert_eq!(env.tool_pipeline[0].status, ToolStatus::Skipped);
    assert!(env.response_text.contains("cancelled"));
    assert!(!env.response_text.contains("updated"));
    assert_eq!(h.orchestrator.drafts().state("t1").await, DraftState::None);

    let again = h.orchestrator.handle_turn(Turn::new("t1", "u1", "confirm")).await;
    assert_eq!(again.response_text, NOTHING_TO_CONFIRM);
    assert!(h.calendar.created.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_stray_confirm_is_noop() {
    let h = harness();
    let env = h.orchestrator.handle_turn(Turn::new("t1", "u1", "confirm")).await;
    assert_eq!(env.response_text, NOTHING_TO_CONFIRM);
    assert!(env.tool_pipeline.is_empty());
    assert_eq!(h.llm.calls(), 0);
    assert_eq!(h.orchestrator.drafts().state("t1").await, DraftState::None);
}

#[tokio::test]
async fn test_edit_merges_into_pending_draft() {
    let h = harness();
    h.llm.push(pipeline(
        "google_calendar",
        json!({"operation": "create", "title": "Sync", "day": "tomorrow", "time": "3pm", "location": "Office"}),
    ));
    h.llm.push(pipeline("google_calendar", json!({"operation": "create", "time": "16:30"})));

    h.orchestrator
        .handle_turn(Turn::new("t1", "u1", "schedule Sync tomorrow at 3pm in the office"))
        .await;
    let env = h
        .orchestrator
        .handle_turn(Turn::new("t1", "u1", "actually make it 16:30"))
        .await;
    assert!(env.response_text.contains("- Time: 4:30 PM"));

    let draft = h.orchestrator.drafts().pending("t1").await.unwrap();
    assert_eq!(draft.fields["title"], "Sync");
    assert_eq!(draft.fields["location"], "Office");
    assert_eq!(draft.fields["day"], "2026-10-18");
    assert_eq!(draft.fields["time"], "16:30");
    assert_eq!(draft.assumptions.iter().collect::<Vec<_>>(), vec!["day"]);
}

#[tokio::test]
async fn test_conflicting_draft_rejected_by_default() {
    let h = harness();
    h.llm.push(schedule_sync());
    h.llm.push(pipeline(
        "google_gmail",
        json!({"operation": "send", "to": "ann@example.com", "subject": "Hi", "body": "Hello"}),
    ));

    h.orchestrator
        .handle_turn(Turn::new("t1", "u1", "schedule a meeting tomorrow at 3pm called Sync"))
        .await;
    let env = h
        .orchestrator
        .handle_turn(Turn::new("t1", "u1", "email ann hello"))
        .await;

    let result = &env.tool_pipeline[0];
    assert_eq!(result.status, ToolStatus::Failed);
    assert_eq!(result.error.as_ref().unwrap().kind, ErrorKind::DraftConflict);
    assert!(env.response_text.contains("Should I add this to Google Calendar?"));
    assert_eq!(
        h.orchestrator.drafts().pending("t1").await.unwrap().tool_name,
        "google_calendar"
    );
    assert!(h.gmail.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_conflicting_draft_replaced_when_configured() {
    let mut config = AppConfig::default();
    config.confirmation.on_conflicting_draft = ConflictPolicy::Replace;
    let h = harness_with(config, FakeCalendar::default());
    h.llm.push(schedule_sync());
    h.llm.push(pipeline(
        "google_gmail",
        json!({"operation": "send", "to": "ann@example.com", "subject": "Hi", "body": "Hello"}),
    ));

    h.orchestrator
        .handle_turn(Turn::new("t1", "u1", "schedule a meeting tomorrow at 3pm called Sync"))
        .await;
    let env = h
        .orchestrator
        .handle_turn(Turn::new("t1", "u1", "email ann hello"))
        .await;
    assert_eq!(env.tool_pipeline[0].status, ToolStatus::Skipped);
    assert!(env.response_text.contains("I am ready to send this email:"));

    let env = h.orchestrator.handle_turn(Turn::new("t1", "u1", "confirm")).await;
    assert!(env.write_succeeded("google_gmail"));
    assert_eq!(h.gmail.sent.lock().unwrap().len(), 1);
    assert!(h.calendar.created.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_confirmation_keeps_draft() {
    let h = harness_with(
        AppConfig::default(),
        FakeCalendar {
            fail: true,
            ..FakeCalendar::default()
        },
    );
    h.llm.push(schedule_sync());
    h.orchestrator
        .handle_turn(Turn::new("t1", "u1", "schedule a meeting tomorrow at 3pm called Sync"))
        .await;

    let env = h
        .orchestrator
        .handle_turn(Turn::new("t1", "u1", "confirm: put it on my work calendar"))
        .await;
    assert_eq!(env.tool_pipeline[0].status, ToolStatus::Failed);
    assert_eq!(env.tool_pipeline[0].payload["note"], "put it on my work calendar");
    assert!(env.response_text.contains("The draft is still pending."));
    assert!(!env.write_succeeded("google_calendar"));
    assert_eq!(h.orchestrator.drafts().state("t1").await, DraftState::Drafted);
}

#[tokio::test]
async fn test_direct_answer_claims_are_scrubbed() {
    let h = harness();
    h.llm.push(r#"{"mode":"direct_response","reason":"chat","confidence":0.8,"steps":[]}"#);
    h.llm.push("Done! I've added your meeting to your calendar.");

    let env = h
        .orchestrator
        .handle_turn(Turn::new("t1", "u1", "that is not what i asked"))
        .await;
    assert!(!env.response_text.contains("I've added your meeting"));
    assert!(env.response_text.contains(CALENDAR_DISCLAIMER));
}

#[tokio::test]
async fn test_exhausted_search_reports_no_results() {
    let h = harness();
    h.llm.push(pipeline("web_search", json!({"query": "rust release notes"})));

    let env = h
        .orchestrator
        .handle_turn(Turn::new("t1", "u1", "find the rust release notes"))
        .await;
    assert_eq!(env.tool_pipeline[0].status, ToolStatus::Failed);
    assert!(env.response_text.contains("No results found"));
    assert!(env.sources.is_empty());
    assert!(env.tool_pipeline[0].citations.is_empty());

    // 工具失败时两条消息仍然被持久化
    let history = h.store.history("t1").await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0], Message::user("find the rust release notes"));
    assert_eq!(history[1].role, Role::Assistant);
}

#[tokio::test]
async fn test_missing_account_is_capability_unavailable() {
    let h = harness();
    h.llm.push(schedule_sync());

    let env = h
        .orchestrator
        .handle_turn(Turn::new("t2", "nobody", "schedule a meeting tomorrow at 3pm called Sync"))
        .await;
    let result = &env.tool_pipeline[0];
    assert_eq!(result.status, ToolStatus::Failed);
    assert_eq!(result.error.as_ref().unwrap().kind, ErrorKind::CapabilityUnavailable);
    assert!(env.response_text.contains("is not connected"));
    assert_eq!(h.orchestrator.drafts().state("t2").await, DraftState::None);
}

#[tokio::test]
async fn test_persistence_failure_does_not_break_turn() {
    let mut config = AppConfig::default();
    config.llm.provider = "mock".into();
    let orchestrator = StewardBuilder::new(config)
        .with_llm(Arc::new(MockLlmClient))
        .with_store(Arc::new(BrokenStore))
        .with_registry(ToolRegistry::new())
        .build()
        .unwrap();

    let env = orchestrator.handle_turn(Turn::new("t1", "u1", "hello")).await;
    assert_eq!(env.response_text, "Echo from Mock: hello");
}

#[tokio::test]
async fn test_concurrent_turns() {
    let store = Arc::new(InMemoryMessageStore::default());
    let orchestrator = Arc::new(
        StewardBuilder::new(AppConfig::default())
            .with_llm(Arc::new(MockLlmClient))
            .with_store(store.clone())
            .with_registry(ToolRegistry::new())
            .build()
            .unwrap(),
    );

    let mut handles = Vec::new();
    for (thread, text) in [("a", "one"), ("b", "two"), ("a", "three"), ("b", "four")] {
        let orchestrator = Arc::clone(&orchestrator);
        handles.push(tokio::spawn(async move {
            orchestrator.handle_turn(Turn::new(thread, "u1", text)).await
        }));
    }
    for handle in handles {
        let env = handle.await.unwrap();
        assert!(env.response_text.starts_with("Echo from Mock: "));
    }

    for thread in ["a", "b"] {
        let roles: Vec<Role> = store.history(thread).await.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User, Role::Assistant]);
    }
}

#[tokio::test]
async fn test_mixed_plan_keeps_step_order() {
    let h = harness();
    h.llm.push(
        json!({
            "mode": "tool_pipeline",
            "reason": "Look something up and book time",
            "confidence": 0.8,
            "steps": [
                {"id": "step_1", "tool": "google_calendar",
                 "args": {"operation": "create", "title": "Sync", "day": "tomorrow", "time": "3pm"},
                 "reason": "Book it"},
                {"id": "step_2", "tool": "web_search", "args": {"query": "sync agenda ideas"}, "reason": "Research"},
                {"id": "step_3", "tool": "google_calendar", "args": {"operation": "read"}, "reason": "Check calendar"}
            ]
        })
        .to_string(),
    );

    let env = h
        .orchestrator
        .handle_turn(Turn::new("t1", "u1", "book Sync tomorrow at 3pm and find agenda ideas"))
        .await;
    let ids: Vec<&str> = env.tool_pipeline.iter().map(|r| r.step_id.as_str()).collect();
    assert_eq!(ids, ["step_1", "step_2", "step_3"]);
    assert_eq!(env.tool_pipeline[0].status, ToolStatus::Skipped);
    assert_eq!(env.tool_pipeline[1].status, ToolStatus::Failed);
    assert_eq!(env.tool_pipeline[2].status, ToolStatus::Ok);
    assert_eq!(h.orchestrator.drafts().state("t1").await, DraftState::Drafted);
    // 只读调用照常执行，写操作仍在等待确认
    let calls = h.calendar.created.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0]["operation"], "read");
}
