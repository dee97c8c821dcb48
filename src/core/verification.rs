//! 来源核验策略
//!
//! 对用户原文做确定性的风险评估（医疗 / 法律 / 金融 / 安全类，时效性问题），
//! 高风险回答必须有至少 2 个独立来源（按主机名去重）支撑：
//! - 来源不足：替换为“无法核验”说明并列出已有来源
//! - 数额敏感且来源中的金额与回答冲突：同样替换
//! - 通过：加上 "As of <时间>, verified against N independent sources." 前缀

use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;

use crate::tools::ToolItem;

const HIGH_STAKES_CUES: &[&str] = &[
    "medical", "medicine", "drug", "dosage", "symptom", "diagnosis", "legal", "law", "lawsuit",
    "regulation", "tax", "finance", "financial", "stock", "crypto", "price", "interest rate",
    "mortgage", "safety", "hazard", "security advisory", "vulnerability",
];

const CRITICAL_CUES: &[&str] = &[
    "medical", "diagnosis", "treatment", "prescription", "legal", "law", "tax", "irs",
    "security advisory", "vulnerability", "hazard",
];

const TEMPORAL_CUES: &[&str] = &[
    "live", "latest", "current", "today", "now", "this week", "breaking", "recent", "updated",
];

const NUMERIC_CUES: &[&str] = &[
    "price", "cost", "rate", "percent", "amount", "market cap", "revenue", "valuation", "quote",
];

const SHOPPING_CUES: &[&str] = &[
    "buy", "purchase", "shopping", "recommend", "recommendation", "options", "models", "best",
    "budget", "price range",
];

const FACTUAL_CUES: &[&str] = &["what is", "who is", "when is", "how much", "how many", "price", "rate"];

fn cue_regex(cues: &[&str]) -> Regex {
    let alternation = cues
        .iter()
        .map(|c| regex::escape(c))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"\b(?:{alternation})\b")).expect("valid cue regex")
}

static HIGH_STAKES_RE: LazyLock<Regex> = LazyLock::new(|| cue_regex(HIGH_STAKES_CUES));
static CRITICAL_RE: LazyLock<Regex> = LazyLock::new(|| cue_regex(CRITICAL_CUES));
static TEMPORAL_RE: LazyLock<Regex> = LazyLock::new(|| cue_regex(TEMPORAL_CUES));
static NUMERIC_RE: LazyLock<Regex> = LazyLock::new(|| cue_regex(NUMERIC_CUES));
static SHOPPING_RE: LazyLock<Regex> = LazyLock::new(|| cue_regex(SHOPPING_CUES));
static PRODUCT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:boat|tractor|car|truck|suv|motorcycle|laptop|phone|camera|tv|appliance|sofa|mower)s?\b")
        .expect("valid product regex")
});
static PRODUCT_CONTEXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:for|under|budget|people|use|need)\b").expect("valid product context regex"));
static MONEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\$\s*|usd\s*)([0-9]{1,3}(?:,[0-9]{3})+(?:\.[0-9]+)?|[0-9]+(?:\.[0-9]+)?)")
        .expect("valid money regex")
});

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VerificationProfile {
    pub level: RiskLevel,
    pub reasons: Vec<&'static str>,
    pub min_independent_sources: usize,
}

impl VerificationProfile {
    pub fn requires_sources(&self) -> bool {
        self.level != RiskLevel::Low
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn looks_like_shopping(text: &str) -> bool {
    SHOPPING_RE.is_match(text)
        || text.contains("under ")
        || (PRODUCT_RE.is_match(text) && PRODUCT_CONTEXT_RE.is_match(text))
}

/// 评估用户原文的核验要求
pub fn assess(user_text: &str) -> VerificationProfile {
    let text = normalize(user_text);
    let temporal = TEMPORAL_RE.is_match(&text);

    if looks_like_shopping(&text) && !CRITICAL_RE.is_match(&text) {
        let mut reasons = vec!["shopping_research"];
        if temporal {
            reasons.push("time_sensitive");
        }
        return VerificationProfile {
            level: RiskLevel::Medium,
            reasons,
            min_independent_sources: 1,
        };
    }

    let high_stakes = HIGH_STAKES_RE.is_match(&text);
    let mut reasons = Vec::new();
    if high_stakes {
        reasons.push("high_stakes");
    }
    if temporal {
        reasons.push("time_sensitive");
    }

    let factual = FACTUAL_CUES.iter().any(|c| text.contains(c));
    if high_stakes || (temporal && factual) {
        return VerificationProfile {
            level: RiskLevel::High,
            reasons,
            min_independent_sources: 2,
        };
    }
    if temporal {
        return VerificationProfile {
            level: RiskLevel::Medium,
            reasons,
            min_independent_sources: 1,
        };
    }
    VerificationProfile {
        level: RiskLevel::Low,
        reasons,
        min_independent_sources: 0,
    }
}

/// 按主机名（去掉 www.）统计独立来源
pub fn independent_sources(sources: &[ToolItem]) -> usize {
    sources
        .iter()
        .filter_map(|s| reqwest::Url::parse(s.url.trim()).ok())
        .filter_map(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_lowercase()))
        .filter(|h| !h.is_empty())
        .collect::<BTreeSet<_>>()
        .len()
}

fn money_values(text: &str) -> Vec<f64> {
    MONEY_RE
        .captures_iter(text)
        .filter_map(|c| c[1].replace(',', "").parse::<f64>().ok())
        .filter(|v| *v > 0.0 && *v <= 1_000_000_000.0)
        .collect()
}

/// 回答中的每个金额都要在 3 个单位或 3% 以内找到来源对应值
fn has_money_mismatch(answer: &[f64], sources: &[f64]) -> bool {
    answer.iter().any(|value| {
        let nearest = sources
            .iter()
            .copied()
            .min_by(|a, b| (a - value).abs().total_cmp(&(b - value).abs()));
        match nearest {
            Some(nearest) => {
                let diff = (nearest - value).abs();
                diff > 3.0 && diff / nearest.max(1.0) > 0.03
            }
            None => true,
        }
    })
}

fn with_sources(base: &str, sources: &[ToolItem]) -> String {
    let listed: Vec<String> = sources
        .iter()
        .filter(|s| !s.url.trim().is_empty())
        .take(5)
        .map(|s| {
            let title = s.title.trim();
            format!("- {}: {}", if title.is_empty() { "Source" } else { title }, s.url.trim())
        })
        .collect();
    if listed.is_empty() {
        return base.to_string();
    }
    format!("{base}\n\nSources:\n{}", listed.join("\n"))
}

/// 按风险等级处理回答；只有 High 会改动文本
pub fn enforce(
    user_text: &str,
    answer: &str,
    sources: &[ToolItem],
    profile: &VerificationProfile,
    now: DateTime<Utc>,
) -> String {
    if profile.level != RiskLevel::High {
        return answer.to_string();
    }

    let independent = independent_sources(sources);
    if independent < profile.min_independent_sources {
        tracing::warn!(
            independent,
            required = profile.min_independent_sources,
            "High-risk answer lacks independent sources"
        );
        return with_sources(
            "I cannot verify this high-risk request with enough independent sources yet. \
             Please retry in a moment or check authoritative primary sources directly.",
            sources,
        );
    }

    if NUMERIC_RE.is_match(&normalize(user_text)) || user_text.contains('%') {
        let answer_values = money_values(answer);
        let source_values: Vec<f64> = sources
            .iter()
            .flat_map(|s| {
                let mut v = money_values(&s.title);
                v.extend(money_values(&s.snippet));
                v
            })
            .collect();
        if !answer_values.is_empty() && source_values.is_empty() {
            return with_sources(
                "I cannot verify the numeric value with reliable source evidence right now. \
                 Please check the linked primary sources directly.",
                sources,
            );
        }
        if has_money_mismatch(&answer_values, &source_values) {
            return with_sources(
                "I found conflicting numeric values across sources, so I cannot provide a single \
                 verified number right now. Please use the linked primary sources.",
                sources,
            );
        }
    }

    format!(
        "As of {}, verified against {independent} independent sources.\n{answer}",
        now.format("%b %d, %Y %H:%M UTC")
    )
}
