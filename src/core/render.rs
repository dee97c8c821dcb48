//! 回复合成：把工具结果与草稿确定性地渲染为文本
//!
//! 只渲染工具真实返回的内容，不经 LLM 二次加工；跳过（草稿）的步骤不会被渲染成“已完成”。

use chrono::{NaiveDate, NaiveTime};
use serde_json::Value;

use crate::confirmation::{PendingDraft, TokenPolicy};
use crate::tools::gmail::sanitize_email_text;
use crate::tools::schema::arg_str;
use crate::tools::{Citation, ToolRegistry, ToolResult, ToolStatus};

pub const MAX_ITEMS_PER_STEP: usize = 5;
pub const MAX_SNIPPET_CHARS: usize = 220;
pub const MAX_RESPONSE_CHARS: usize = 6000;
const MAX_FAILURES_SHOWN: usize = 3;

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{}...", cut.trim_end())
}

/// 限制持久化与返回的回复长度；空文本给出占位
pub fn cap_response(text: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        return "Tool execution completed.".to_string();
    }
    truncate(text, MAX_RESPONSE_CHARS - 3)
}

fn failure_line(result: &ToolResult, registry: &ToolRegistry) -> String {
    format!(
        "- {}: {}",
        registry.label(&result.tool_name),
        result.error_message().unwrap_or("failed")
    )
}

/// 渲染已执行步骤（ok / failed）；skipped 步骤由草稿提示单独渲染
pub fn render_results(results: &[ToolResult], registry: &ToolRegistry) -> String {
    let executed: Vec<&ToolResult> = results
        .iter()
        .filter(|r| r.status != ToolStatus::Skipped)
        .collect();
    let successful: Vec<&ToolResult> = executed.iter().copied().filter(|r| r.is_ok()).collect();
    let failed: Vec<&ToolResult> = executed.iter().copied().filter(|r| !r.is_ok()).collect();

    if executed.is_empty() {
        return String::new();
    }

    let mut lines = Vec::new();
    if successful.is_empty() {
        lines.push("I couldn't complete the requested tool actions.".to_string());
        lines.extend(failed.iter().take(MAX_FAILURES_SHOWN).map(|r| failure_line(r, registry)));
        lines.push("Please retry with a narrower request.".to_string());
        return lines.join("\n");
    }

    for result in &successful {
        lines.push(format!("{}:", registry.label(&result.tool_name)));
        let items = result.items();
        if items.is_empty() {
            lines.push("- Completed with no returned items.".to_string());
            continue;
        }
        for item in items.iter().take(MAX_ITEMS_PER_STEP) {
            let title = item.title.trim();
            let mut row = format!("- {}", if title.is_empty() { "Result" } else { title });
            let snippet = item.snippet.trim();
            if !snippet.is_empty() {
                row.push_str(" | ");
                row.push_str(&truncate(snippet, MAX_SNIPPET_CHARS));
            }
            if !item.url.trim().is_empty() {
                row.push_str(" | ");
                row.push_str(item.url.trim());
            }
            lines.push(row);
        }
    }
    if !failed.is_empty() {
        lines.push(String::new());
        lines.push("Some steps failed:".to_string());
        lines.extend(failed.iter().take(MAX_FAILURES_SHOWN).map(|r| failure_line(r, registry)));
    }
    lines.join("\n")
}

/// 引用来源：按出现顺序，按 URL 去重
pub fn collect_sources(results: &[ToolResult]) -> Vec<Citation> {
    let mut seen = std::collections::HashSet::new();
    results
        .iter()
        .flat_map(|r| r.citations.iter())
        .filter(|c| seen.insert(c.url.clone()))
        .map(|c| Citation {
            title: if c.title.trim().is_empty() { c.url.clone() } else { c.title.trim().to_string() },
            url: c.url.clone(),
        })
        .collect()
}

fn field<'a>(draft: &'a PendingDraft, key: &str) -> Option<&'a str> {
    arg_str(&draft.fields, key)
}

fn friendly_day(day: &str) -> String {
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map(|d| d.format("%A, %b %d, %Y").to_string())
        .unwrap_or_else(|_| day.to_string())
}

fn friendly_time(time: &str) -> String {
    NaiveTime::parse_from_str(time, "%H:%M")
        .map(|t| t.format("%-I:%M %p").to_string())
        .unwrap_or_else(|_| time.to_string())
}

fn assumption_block(draft: &PendingDraft) -> Option<String> {
    let notes: Vec<String> = draft
        .assumptions
        .iter()
        .map(|key| match (key.as_str(), field(draft, key)) {
            ("day", Some(day)) => format!("I assumed the day: {}.", friendly_day(day)),
            ("time", Some(time)) => format!("I assumed the time: {}.", friendly_time(time)),
            (_, Some(value)) => format!("I assumed the {key}: {value}."),
            (_, None) => format!("I assumed {key}."),
        })
        .collect();
    (!notes.is_empty()).then(|| format!("Assumptions to confirm: {}", notes.join(" ")))
}

fn reply_hint(tokens: &TokenPolicy, action: &str) -> String {
    let confirm = tokens.confirm_words.first().map(String::as_str).unwrap_or("confirm");
    let cancel = tokens.cancel_words.first().map(String::as_str).unwrap_or("cancel");
    format!("Reply with '{confirm}' to {action} or '{cancel}' to stop.")
}

/// 待确认草稿的提示
pub fn render_draft_prompt(draft: &PendingDraft, label: &str, tokens: &TokenPolicy) -> String {
    let mut lines = Vec::new();
    let question = match draft.tool_name.as_str() {
        "google_calendar" => {
            lines.push("I have this draft event:".to_string());
            lines.push(format!("- Title: {}", field(draft, "title").unwrap_or("Meeting")));
            lines.push(format!("- Day: {}", field(draft, "day").map(friendly_day).unwrap_or_default()));
            lines.push(format!("- Time: {}", field(draft, "time").map(friendly_time).unwrap_or_default()));
            if let Some(location) = field(draft, "location") {
                lines.push(format!("- Location: {location}"));
            }
            format!("Should I add this to {label}?")
        }
        "google_gmail" => {
            lines.push("I am ready to send this email:".to_string());
            lines.push(format!("- To: {}", field(draft, "to").unwrap_or("unknown")));
            lines.push(format!("- Subject: {}", field(draft, "subject").unwrap_or("(no subject)")));
            let body = match field(draft, "body") {
                Some(body) => {
                    let (safe, flagged) = sanitize_email_text(body);
                    let mut line = truncate(&safe, 240);
                    if flagged {
                        line.push_str(" [sanitized]");
                    }
                    line
                }
                None => "(empty body)".to_string(),
            };
            lines.push(format!("- Body: {body}"));
            "Should I send it?".to_string()
        }
        _ => {
            lines.push(format!("I have this draft for {label}:"));
            for (key, value) in &draft.fields {
                let shown = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                lines.push(format!("- {key}: {shown}"));
            }
            "Should I go ahead?".to_string()
        }
    };
    if let Some(block) = assumption_block(draft) {
        lines.push(block);
    }
    let action = if draft.tool_name == "google_gmail" { "send" } else { "proceed" };
    lines.push(format!("{question} {}", reply_hint(tokens, action)));
    lines.join("\n")
}

/// 确认后执行结果
pub fn render_confirmed(result: &ToolResult, label: &str, tokens: &TokenPolicy) -> String {
    if !result.is_ok() {
        return format!(
            "I couldn't complete the {label} action: {}\nThe draft is still pending. {}",
            result.error_message().unwrap_or("failed"),
            reply_hint(tokens, "retry")
        );
    }
    let mut lines = vec![format!("{label} updated:")];
    let items = result.items();
    for item in items.iter().take(MAX_ITEMS_PER_STEP) {
        let snippet = item.snippet.trim();
        if snippet.is_empty() {
            lines.push(format!("- {}", item.title.trim()));
        } else {
            lines.push(format!("- {} | {}", item.title.trim(), truncate(snippet, MAX_SNIPPET_CHARS)));
        }
    }
    if let Some(link) = items.iter().map(|i| i.url.trim()).find(|u| !u.is_empty()) {
        lines.push(format!("Link: {link}"));
    }
    lines.join("\n")
}

pub fn render_cancelled(draft: &PendingDraft, label: &str) -> String {
    let nothing = match draft.tool_name.as_str() {
        "google_gmail" => "No email was sent.".to_string(),
        "google_calendar" => "Nothing was added to your calendar.".to_string(),
        _ => format!("Nothing was changed in {label}."),
    };
    format!("Okay, I cancelled that draft. {nothing}")
}
