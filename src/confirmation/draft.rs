//! 从写操作步骤生成草稿提案
//!
//! 日历字段在起草时即规范化：相对日期（today / tomorrow / 星期几）解析为 ISO 日期，
//! 12 小时制时间转为 24 小时 HH:MM。凡是经过推断或取默认值的字段都记入假设集合，
//! 在确认提示中展示给用户。默认值只填补缺失字段，不覆盖已有草稿中的值。

use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use regex::Regex;
use serde_json::Value;

use crate::planner::ToolStep;
use crate::tools::schema::Args;

pub const DEFAULT_EVENT_TITLE: &str = "Meeting";
pub const DEFAULT_EVENT_TIME: &str = "09:00";

static TWELVE_HOUR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})(?::(\d{2}))?(am|pm)$").expect("valid 12-hour time regex")
});
static TWENTY_FOUR_HOUR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2}):(\d{2})(?::\d{2})?$").expect("valid 24-hour time regex")
});
static BARE_HOUR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})$").expect("valid bare hour regex"));

/// 一次起草请求
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DraftProposal {
    pub tool_name: String,
    /// 本次明确给出的字段（已规范化）
    pub fields: Args,
    /// 本次推断出的字段名与规划器声明的假设
    pub assumptions: BTreeSet<String>,
    /// 仅在草稿缺少该字段时填入，填入即记为假设
    pub defaults: Args,
}

/// 由写操作步骤生成提案
pub fn proposal_from_step(step: &ToolStep, today: NaiveDate) -> DraftProposal {
    let mut fields: Args = step
        .args()
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let mut assumptions: BTreeSet<String> = step.assumptions().iter().cloned().collect();
    let mut defaults = Args::new();

    if step.tool_name() == "google_calendar" {
        if let Some(raw) = fields.get("day").and_then(Value::as_str).map(str::to_string) {
            let (day, assumed) = normalize_day(&raw, today);
            fields.insert("day".into(), Value::String(day));
            if assumed {
                assumptions.insert("day".into());
            }
        }
        if let Some(raw) = fields.get("time").and_then(Value::as_str).map(str::to_string) {
            let (time, assumed) = normalize_time(&raw);
            fields.insert("time".into(), Value::String(time));
            if assumed {
                assumptions.insert("time".into());
            }
        }
        if let Some(title) = fields.get("title").and_then(Value::as_str).map(|t| t.trim().to_string()) {
            fields.insert("title".into(), Value::String(title));
        }
        defaults.insert("title".into(), Value::String(DEFAULT_EVENT_TITLE.into()));
        defaults.insert("day".into(), Value::String(iso(today + Duration::days(1))));
        defaults.insert("time".into(), Value::String(DEFAULT_EVENT_TIME.into()));
    }

    DraftProposal {
        tool_name: step.tool_name().to_string(),
        fields,
        assumptions,
        defaults,
    }
}

fn iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_weekday(raw: &str) -> Option<Weekday> {
    Some(match raw {
        "monday" | "mon" => Weekday::Mon,
        "tuesday" | "tue" | "tues" => Weekday::Tue,
        "wednesday" | "wed" => Weekday::Wed,
        "thursday" | "thu" | "thur" | "thurs" => Weekday::Thu,
        "friday" | "fri" => Weekday::Fri,
        "saturday" | "sat" => Weekday::Sat,
        "sunday" | "sun" => Weekday::Sun,
        _ => return None,
    })
}

/// 解析日期；返回（规范化值，是否经过推断）
pub fn normalize_day(raw: &str, today: NaiveDate) -> (String, bool) {
    let lowered = raw.trim().to_lowercase();
    let stripped = lowered
        .trim_start_matches("on ")
        .trim_start_matches("next ")
        .trim_start_matches("this ")
        .trim();

    match stripped {
        "today" | "tonight" => return (iso(today), true),
        "tomorrow" => return (iso(today + Duration::days(1)), true),
        _ => {}
    }
    if let Some(target) = parse_weekday(stripped) {
        let current = today.weekday().num_days_from_monday() as i64;
        let wanted = target.num_days_from_monday() as i64;
        let mut ahead = (wanted - current).rem_euclid(7);
        if ahead == 0 {
            ahead = 7;
        }
        return (iso(today + Duration::days(ahead)), true);
    }
    if let Ok(date) = NaiveDate::parse_from_str(stripped, "%Y-%m-%d") {
        return (iso(date), false);
    }
    if let Ok(date) = NaiveDate::parse_from_str(stripped, "%m/%d/%Y") {
        return (iso(date), false);
    }
    if let Ok(date) = NaiveDate::parse_from_str(&format!("{stripped}/{}", today.year()), "%m/%d/%Y") {
        let date = if date < today {
            date.with_year(today.year() + 1).unwrap_or(date)
        } else {
            date
        };
        return (iso(date), true);
    }
    (raw.trim().to_string(), true)
}

/// 解析时间；返回（HH:MM 或原文，是否经过推断）
pub fn normalize_time(raw: &str) -> (String, bool) {
    let compact: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '.')
        .collect();
    let compact = compact.trim_start_matches("at");

    match compact {
        "noon" | "midday" => return ("12:00".into(), true),
        "midnight" => return ("00:00".into(), true),
        _ => {}
    }

    if let Some(caps) = TWELVE_HOUR_RE.captures(compact) {
        let hour: u32 = caps[1].parse().unwrap_or(99);
        let minute: u32 = caps.get(2).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
        if (1..=12).contains(&hour) && minute < 60 {
            let hour = match (&caps[3], hour) {
                ("am", 12) => 0,
                ("am", h) => h,
                ("pm", 12) => 12,
                (_, h) => h + 12,
            };
            return (format!("{hour:02}:{minute:02}"), true);
        }
    }
    if let Some(caps) = TWENTY_FOUR_HOUR_RE.captures(compact) {
        let hour: u32 = caps[1].parse().unwrap_or(99);
        let minute: u32 = caps[2].parse().unwrap_or(99);
        if hour < 24 && minute < 60 {
            return (format!("{hour:02}:{minute:02}"), false);
        }
    }
    if let Some(caps) = BARE_HOUR_RE.captures(compact) {
        let hour: u32 = caps[1].parse().unwrap_or(99);
        if hour < 24 {
            return (format!("{hour:02}:00"), true);
        }
    }
    (raw.trim().to_string(), true)
}
