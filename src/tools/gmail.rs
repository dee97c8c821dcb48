//! Gmail 工具
//!
//! - read：列出收件箱线程（过滤推广 / 社交等分类），正文预览先做提示注入清洗
//! - draft_new：创建草稿（不发送）
//! - send：直接发送（写操作，需确认后执行）
//!
//! 收件人域名受 allowed_recipient_domains 约束（为空表示不限制）。

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{json, Value};

use crate::integrations::google::{require_token, GoogleApi};
use crate::integrations::Scope;
use crate::tools::schema::{arg_str, arg_usize, ArgKind, Args, ToolSchema};
use crate::tools::{Tool, ToolContext, ToolError, ToolItem, ToolOutput};

const THREADS_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me/threads";
const DRAFTS_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me/drafts";
const SEND_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me/messages/send";
const SERVICE: &str = "Gmail";

const EXCLUDED_LABELS: [&str; 5] = [
    "CATEGORY_PROMOTIONS",
    "CATEGORY_SOCIAL",
    "CATEGORY_UPDATES",
    "CATEGORY_FORUMS",
    "SPAM",
];

const SUSPICIOUS_MARKERS: [&str; 9] = [
    "ignore previous instructions",
    "ignore all previous instructions",
    "system prompt",
    "reveal your prompt",
    "developer message",
    "tool output",
    "api key",
    "password",
    "secret token",
];

const PREVIEW_CHARS: usize = 2000;

pub struct GoogleGmailTool {
    api: GoogleApi,
    allowed_domains: HashSet<String>,
    max_results: usize,
}

impl GoogleGmailTool {
    pub fn new(allowed_domains: &[String], max_results: usize, timeout: Duration) -> Self {
        Self {
            api: GoogleApi::new(SERVICE, timeout),
            allowed_domains: allowed_domains
                .iter()
                .map(|d| d.trim().to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
            max_results: max_results.clamp(1, 15),
        }
    }

    async fn list_threads(&self, token: &str, query: &str, max_results: usize) -> Result<ToolOutput, ToolError> {
        let fetch_limit = (max_results * 3).min(50);
        let listing = self
            .api
            .get_json(THREADS_URL, token, &[("maxResults", fetch_limit.to_string()), ("q", query.to_string())])
            .await?;

        let ids: Vec<String> = listing
            .get("threads")
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .filter_map(|r| r.get("id").and_then(Value::as_str))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let mut items = Vec::new();
        for id in ids {
            if items.len() >= max_results {
                break;
            }
            let url = format!("{THREADS_URL}/{id}");
            let thread = self
                .api
                .get_json(
                    &url,
                    token,
                    &[
                        ("format", "metadata".to_string()),
                        ("metadataHeaders", "Subject".to_string()),
                        ("metadataHeaders", "From".to_string()),
                    ],
                )
                .await?;
            if let Some(item) = thread_item(&id, &thread) {
                items.push(item);
            }
        }
        Ok(ToolOutput::items(items))
    }

    async fn draft_new(&self, token: &str, email: &OutgoingEmail) -> Result<ToolOutput, ToolError> {
        let created = self
            .api
            .post_json(DRAFTS_URL, token, &json!({ "message": { "raw": email.to_raw() } }))
            .await?;
        let draft_id = created
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::Failed("Gmail returned an unexpected draft payload.".into()))?;
        Ok(ToolOutput::items(vec![ToolItem::new(
            "[Drafted] New email",
            format!("https://mail.google.com/mail/u/0/#drafts?compose={draft_id}"),
            email.preview(),
        )])
        .with_meta(json!({ "draft_id": draft_id })))
    }

    async fn send(&self, token: &str, email: &OutgoingEmail) -> Result<ToolOutput, ToolError> {
        let sent = self
            .api
            .post_json(SEND_URL, token, &json!({ "raw": email.to_raw() }))
            .await?;
        let message_id = sent.get("id").and_then(Value::as_str).unwrap_or_default();
        let thread_id = sent.get("threadId").and_then(Value::as_str).unwrap_or(message_id);
        Ok(ToolOutput::items(vec![ToolItem::new(
            format!("[Sent] {}", email.subject),
            format!("https://mail.google.com/mail/u/0/#sent/{thread_id}"),
            email.preview(),
        )])
        .with_meta(json!({ "message_id": message_id, "thread_id": thread_id })))
    }

    fn outgoing(&self, args: &Args) -> Result<OutgoingEmail, ToolError> {
        let email = OutgoingEmail::from_args(args)?;
        enforce_allowed_domains(&email.to, &self.allowed_domains)?;
        Ok(email)
    }
}

#[async_trait]
impl Tool for GoogleGmailTool {
    fn name(&self) -> &str {
        "google_gmail"
    }

    fn label(&self) -> &str {
        SERVICE
    }

    fn description(&self) -> &str {
        "Read recent Gmail threads (operation=read, optional query), create a draft (operation=draft_new) or send an email (operation=send with to, subject, body). Sending is a write action and needs user confirmation."
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new()
            .optional("operation", ArgKind::one_of(&["read", "draft_new", "send"]), "read (default), draft_new or send")
            .optional("query", ArgKind::String, "Gmail search query for read")
            .optional("max_results", ArgKind::Integer, "Number of threads to read")
            .optional("to", ArgKind::String, "Recipient address(es), comma separated")
            .optional("subject", ArgKind::String, "Email subject")
            .optional("body", ArgKind::String, "Plain text body")
    }

    fn required_scope(&self) -> Option<Scope> {
        Some(Scope::Mail)
    }

    fn is_write(&self, args: &Args) -> bool {
        arg_str(args, "operation") == Some("send")
    }

    async fn invoke(&self, ctx: &ToolContext, args: &Args) -> Result<ToolOutput, ToolError> {
        let token = require_token(ctx, SERVICE)?;
        match arg_str(args, "operation").unwrap_or("read") {
            "send" => self.send(token, &self.outgoing(args)?).await,
            "draft_new" => self.draft_new(token, &self.outgoing(args)?).await,
            _ => {
                let query = arg_str(args, "query").unwrap_or("in:inbox");
                let max_results = arg_usize(args, "max_results").unwrap_or(self.max_results).clamp(1, 15);
                self.list_threads(token, query, max_results).await
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OutgoingEmail {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl OutgoingEmail {
    pub fn from_args(args: &Args) -> Result<Self, ToolError> {
        let to: Vec<String> = arg_str(args, "to")
            .unwrap_or_default()
            .split([',', ';'])
            .map(|addr| strip_header_breaks(addr).trim().to_string())
            .filter(|addr| !addr.is_empty())
            .collect();
        if to.is_empty() {
            return Err(ToolError::InvalidArgs("recipient ('to') is missing".into()));
        }
        if let Some(bad) = to.iter().find(|addr| !addr.contains('@')) {
            return Err(ToolError::InvalidArgs(format!("'{bad}' is not an email address")));
        }
        let body = arg_str(args, "body")
            .ok_or_else(|| ToolError::InvalidArgs("email body is missing".into()))?
            .to_string();
        let subject = strip_header_breaks(arg_str(args, "subject").unwrap_or("(no subject)"));
        Ok(Self { to, subject, body })
    }

    /// RFC 822 原文，base64url（无填充）编码
    pub fn to_raw(&self) -> String {
        let message = format!(
            "To: {}\r\nSubject: {}\r\nMIME-Version: 1.0\r\nContent-Type: text/plain; charset=\"UTF-8\"\r\n\r\n{}",
            self.to.join(", "),
            self.subject,
            self.body
        );
        URL_SAFE_NO_PAD.encode(message.as_bytes())
    }

    fn preview(&self) -> String {
        let (safe, flagged) = sanitize_email_text(&self.body);
        let mut preview: String = safe.chars().take(220).collect();
        if flagged {
            preview.push_str(" [sanitized]");
        }
        format!("To: {} | Subject: {}\nPreview: {preview}", self.to.join(", "), self.subject)
    }
}

fn strip_header_breaks(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

pub fn enforce_allowed_domains(recipients: &[String], allowed: &HashSet<String>) -> Result<(), ToolError> {
    if allowed.is_empty() {
        return Ok(());
    }
    for addr in recipients {
        let domain = addr
            .rsplit_once('@')
            .map(|(_, d)| d.trim_end_matches('>').to_ascii_lowercase())
            .unwrap_or_default();
        if !allowed.contains(&domain) {
            let mut list: Vec<&str> = allowed.iter().map(String::as_str).collect();
            list.sort_unstable();
            return Err(ToolError::InvalidArgs(format!(
                "Recipient domain is not allowed by policy. Recipient: {addr}. Allowed domains: {}",
                list.join(", ")
            )));
        }
    }
    Ok(())
}

/// 删除疑似提示注入的行；返回（清洗后文本，是否有行被删除）
pub fn sanitize_email_text(text: &str) -> (String, bool) {
    let mut flagged = false;
    let kept: Vec<&str> = text
        .lines()
        .filter(|line| {
            let lowered = line.trim().to_lowercase();
            let suspicious = SUSPICIOUS_MARKERS.iter().any(|m| lowered.contains(m));
            flagged |= suspicious;
            !suspicious
        })
        .collect();
    let cleaned = kept.join("\n").trim().to_string();
    if cleaned.chars().count() > PREVIEW_CHARS {
        let truncated: String = cleaned.chars().take(PREVIEW_CHARS).collect();
        return (format!("{}...", truncated.trim_end()), flagged);
    }
    (cleaned, flagged)
}

fn thread_item(id: &str, thread: &Value) -> Option<ToolItem> {
    let first = thread.pointer("/messages/0")?;
    let labels: Vec<&str> = first
        .get("labelIds")
        .and_then(Value::as_array)
        .map(|l| l.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    if labels.iter().any(|l| EXCLUDED_LABELS.contains(l)) {
        return None;
    }

    let header = |name: &str| {
        first
            .pointer("/payload/headers")
            .and_then(Value::as_array)
            .and_then(|headers| {
                headers.iter().find(|h| {
                    h.get("name")
                        .and_then(Value::as_str)
                        .map(|n| n.eq_ignore_ascii_case(name))
                        .unwrap_or(false)
                })
            })
            .and_then(|h| h.get("value"))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    let subject = header("Subject").unwrap_or_else(|| "(no subject)".to_string());
    let sender = header("From").unwrap_or_else(|| "Unknown sender".to_string());
    let raw_snippet = thread
        .get("snippet")
        .or_else(|| first.get("snippet"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let (safe, flagged) = sanitize_email_text(raw_snippet);
    let mut snippet = format!("From: {sender} | {safe}");
    if flagged {
        snippet.push_str(" [Security] Potential prompt-injection lines were filtered from this email.");
    }
    Some(ToolItem::new(
        subject,
        format!("https://mail.google.com/mail/u/0/#inbox/{id}"),
        snippet,
    ))
}
