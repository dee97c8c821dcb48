//! Google 日历工具：读取近期事件（read）或创建事件（create，写操作，需确认后执行）

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::{json, Value};

use crate::integrations::google::{require_token, GoogleApi};
use crate::integrations::Scope;
use crate::tools::schema::{arg_str, arg_usize, ArgKind, Args, ToolSchema};
use crate::tools::{Tool, ToolContext, ToolError, ToolItem, ToolOutput};

const EVENTS_URL: &str = "https://www.googleapis.com/calendar/v3/calendars/primary/events";
const SERVICE: &str = "Google Calendar";

pub struct GoogleCalendarTool {
    api: GoogleApi,
    time_zone: String,
    default_duration_minutes: i64,
    max_results: usize,
}

impl GoogleCalendarTool {
    pub fn new(time_zone: &str, default_duration_minutes: i64, max_results: usize, timeout: Duration) -> Self {
        Self {
            api: GoogleApi::new(SERVICE, timeout),
            time_zone: time_zone.to_string(),
            default_duration_minutes: default_duration_minutes.max(5),
            max_results: max_results.clamp(1, 20),
        }
    }

    async fn list_upcoming(&self, token: &str, max_results: usize) -> Result<ToolOutput, ToolError> {
        let query = [
            ("timeMin", Utc::now().to_rfc3339()),
            ("maxResults", max_results.to_string()),
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
        ];
        let payload = self.api.get_json(EVENTS_URL, token, &query).await?;
        Ok(ToolOutput::items(parse_events(&payload)))
    }

    async fn create(&self, token: &str, args: &Args) -> Result<ToolOutput, ToolError> {
        let body = build_event_body(args, &self.time_zone, self.default_duration_minutes)?;
        let created = self.api.post_json(EVENTS_URL, token, &body).await?;

        let event_id = created.get("id").and_then(Value::as_str).unwrap_or_default();
        let link = created
            .get("htmlLink")
            .and_then(Value::as_str)
            .unwrap_or("https://calendar.google.com/calendar/r");
        let title = body["summary"].as_str().unwrap_or("Event");
        let starts = body["start"]["dateTime"].as_str().unwrap_or_default();
        Ok(ToolOutput::items(vec![ToolItem::new(
            format!("[Created] {title}"),
            link,
            format!("Starts: {starts} ({})", self.time_zone),
        )])
        .with_meta(json!({ "event_id": event_id })))
    }
}

fn is_create(args: &Args) -> bool {
    arg_str(args, "operation") == Some("create")
}

#[async_trait]
impl Tool for GoogleCalendarTool {
    fn name(&self) -> &str {
        "google_calendar"
    }

    fn label(&self) -> &str {
        SERVICE
    }

    fn description(&self) -> &str {
        "Read upcoming Google Calendar events (operation=read) or create an event (operation=create with title, day, time). Creating is a write action and needs user confirmation."
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new()
            .optional("operation", ArgKind::one_of(&["read", "create"]), "read (default) or create")
            .optional("title", ArgKind::String, "Event title")
            .optional("day", ArgKind::String, "Event day: YYYY-MM-DD, today, tomorrow or a weekday name")
            .optional("time", ArgKind::String, "Start time: HH:MM (24h) or like 3pm")
            .optional("duration_minutes", ArgKind::Integer, "Event length in minutes")
            .optional("location", ArgKind::String, "Event location")
            .optional("max_results", ArgKind::Integer, "Number of upcoming events to read")
    }

    fn required_scope(&self) -> Option<Scope> {
        Some(Scope::Calendar)
    }

    fn is_write(&self, args: &Args) -> bool {
        is_create(args)
    }

    async fn invoke(&self, ctx: &ToolContext, args: &Args) -> Result<ToolOutput, ToolError> {
        let token = require_token(ctx, SERVICE)?;
        if is_create(args) {
            self.create(token, args).await
        } else {
            let max_results = arg_usize(args, "max_results")
                .unwrap_or(self.max_results)
                .clamp(1, 20);
            self.list_upcoming(token, max_results).await
        }
    }
}

/// 由规范化后的草稿字段构造 events.insert 请求体
pub fn build_event_body(args: &Args, time_zone: &str, default_duration_minutes: i64) -> Result<Value, ToolError> {
    let title = arg_str(args, "title").unwrap_or("Meeting");
    let day = arg_str(args, "day").ok_or_else(|| ToolError::InvalidArgs("event day is missing".into()))?;
    let time = arg_str(args, "time").ok_or_else(|| ToolError::InvalidArgs("event time is missing".into()))?;

    let date = NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|_| ToolError::InvalidArgs(format!("could not understand the day '{day}'")))?;
    let start_time = NaiveTime::parse_from_str(time, "%H:%M")
        .map_err(|_| ToolError::InvalidArgs(format!("could not understand the time '{time}'")))?;
    let duration = args
        .get("duration_minutes")
        .and_then(Value::as_i64)
        .filter(|m| *m > 0)
        .unwrap_or(default_duration_minutes);

    let start = NaiveDateTime::new(date, start_time);
    let end = start + chrono::Duration::minutes(duration);
    let fmt = "%Y-%m-%dT%H:%M:%S";

    let mut body = json!({
        "summary": title,
        "start": { "dateTime": start.format(fmt).to_string(), "timeZone": time_zone },
        "end": { "dateTime": end.format(fmt).to_string(), "timeZone": time_zone },
    });
    if let Some(location) = arg_str(args, "location") {
        body["location"] = Value::String(location.to_string());
    }
    Ok(body)
}

pub fn parse_events(payload: &Value) -> Vec<ToolItem> {
    payload
        .get("items")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .map(|row| {
                    let title = row.get("summary").and_then(Value::as_str).unwrap_or("(untitled event)");
                    let link = row
                        .get("htmlLink")
                        .and_then(Value::as_str)
                        .unwrap_or("https://calendar.google.com/calendar/r");
                    let start = row
                        .pointer("/start/dateTime")
                        .or_else(|| row.pointer("/start/date"))
                        .and_then(Value::as_str)
                        .unwrap_or("unknown time");
                    let mut snippet = format!("Starts: {start}");
                    if let Some(location) = row.get("location").and_then(Value::as_str) {
                        snippet.push_str(&format!(" | Location: {location}"));
                    }
                    ToolItem::new(title, link, snippet)
                })
                .collect()
        })
        .unwrap_or_default()
}
