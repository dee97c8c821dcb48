//! 写操作成功声明守卫
//!
//! 只有本轮存在对应写工具的成功结果时，回复才能声称“已创建日程”“已发送邮件”。
//! 否则把含有此类声明的句子删掉，并在开头补一句如实说明。

use std::sync::LazyLock;

use regex::Regex;

use crate::tools::ToolResult;

const CALENDAR_TOOL: &str = "google_calendar";
const MAIL_TOOL: &str = "google_gmail";

pub const CALENDAR_DISCLAIMER: &str = "I haven't added anything to your Google Calendar yet.";
pub const MAIL_DISCLAIMER: &str = "I haven't sent an email yet.";

static CALENDAR_CLAIM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)[^.!?\n]*\bi(?:\s+have|'ve|’ve)?\s+(?:(?:already|just|now|did|successfully)\s+)*(?:added|add|created|create|scheduled|schedule|booked|book|put)\b[^.!?\n]*\b(?:calendar|meeting|event|appointment)s?\b[^.!?\n]*[.!?]?",
    )
    .expect("valid calendar claim regex")
});

static MAIL_CLAIM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)[^.!?\n]*\bi(?:\s+have|'ve|’ve)?\s+(?:(?:already|just|now|did|successfully)\s+)*(?:sent|send|emailed|mailed)\b[^.!?\n]*\b(?:email|e-mail|mail|message|reply)s?\b[^.!?\n]*[.!?]?",
    )
    .expect("valid mail claim regex")
});

fn write_ok(results: &[ToolResult], tool_name: &str) -> bool {
    results
        .iter()
        .any(|r| r.write && r.is_ok() && r.tool_name == tool_name)
}

fn scrub(text: &str, pattern: &Regex, disclaimer: &str) -> Option<String> {
    if !pattern.is_match(text) {
        return None;
    }
    let stripped = pattern.replace_all(text, "");
    let rest = stripped
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    Some(if rest.is_empty() {
        disclaimer.to_string()
    } else {
        format!("{disclaimer}\n{rest}")
    })
}

/// 去掉本轮没有成功结果支撑的写操作声明；返回（处理后的文本，是否改动）
pub fn scrub_write_claims(text: &str, results: &[ToolResult]) -> (String, bool) {
    let mut out = text.to_string();
    let mut changed = false;
    let guards: [(&str, &Regex, &str); 2] = [
        (CALENDAR_TOOL, &*CALENDAR_CLAIM_RE, CALENDAR_DISCLAIMER),
        (MAIL_TOOL, &*MAIL_CLAIM_RE, MAIL_DISCLAIMER),
    ];
    for (tool, pattern, disclaimer) in guards {
        if write_ok(results, tool) {
            continue;
        }
        if let Some(scrubbed) = scrub(&out, pattern, disclaimer) {
            tracing::warn!(tool, "Unsupported write claim removed from reply");
            out = scrubbed;
            changed = true;
        }
    }
    (out, changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{ToolItem, ToolOutput};

    #[test]
    fn test_calendar_claim_without_result_is_scrubbed() {
        let (out, changed) = scrub_write_claims(
            "Sure! I've added your meeting to your calendar for 3pm. Anything else?",
            &[],
        );
        assert!(changed);
        assert!(!out.contains("I've added your meeting"));
        assert!(out.starts_with(CALENDAR_DISCLAIMER));
        assert!(out.contains("Anything else?"));
    }

    #[test]
    fn test_mail_claim_without_result_is_scrubbed() {
        let (out, changed) = scrub_write_claims("Yes, I did send the email to John.", &[]);
        assert!(changed);
        assert_eq!(out, MAIL_DISCLAIMER);
    }

    #[test]
    fn test_claim_backed_by_successful_write_is_kept() {
        let created = ToolResult::ok(
            "step_1",
            "google_calendar",
            "create",
            ToolOutput::items(vec![ToolItem::new("[Created] Sync", "https://calendar.google.com/e/1", "")]),
        )
        .as_write(true);
        let text = "I've added the Sync meeting to your calendar.";
        assert_eq!(scrub_write_claims(text, &[created]), (text.to_string(), false));
    }

    #[test]
    fn test_read_result_does_not_back_a_write_claim() {
        let read = ToolResult::ok("step_1", "google_calendar", "read", ToolOutput::default());
        let (_, changed) = scrub_write_claims("I scheduled the event for you.", &[read]);
        assert!(changed);
    }

    #[test]
    fn test_plain_text_untouched() {
        let text = "Your calendar looks free tomorrow afternoon.";
        assert_eq!(scrub_write_claims(text, &[]), (text.to_string(), false));
    }
}
