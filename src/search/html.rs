//! 搜索结果清洗：去标签、解码实体、规范化与去重 URL

use std::collections::HashSet;
use std::sync::LazyLock;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use regex::Regex;
use reqwest::Url;

use crate::search::SearchHit;

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));

/// 去除 HTML 标签、解码实体并压缩空白
pub fn clean_text(raw: &str) -> String {
    let no_tags = TAG_RE.replace_all(raw, " ");
    let decoded = match html2text::from_read(no_tags.as_bytes(), 4096) {
        Ok(text) if !text.trim().is_empty() => text,
        _ => no_tags.into_owned(),
    };
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 仅接受带 host 的 http(s) 绝对 URL
pub fn normalize_http_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().map_or(true, str::is_empty) {
        return None;
    }
    Some(url.to_string())
}

/// 去重用的规范形式：小写 scheme/host，去掉片段
pub fn canonical_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    url.set_fragment(None);
    Some(url.to_string())
}

/// 解析 DuckDuckGo 跳转链接（/l/?uddg=...）
pub fn duckduckgo_target(raw_href: &str) -> Option<String> {
    let base = Url::parse("https://duckduckgo.com/").ok()?;
    let url = base.join(raw_href.trim()).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == "uddg")
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// 解析 Bing 跳转链接（/ck/a?...&u=a1<base64url>）
pub fn bing_target(raw_href: &str) -> Option<String> {
    let url = Url::parse(raw_href.trim()).ok()?;
    if !url.host_str()?.to_ascii_lowercase().contains("bing.com") {
        return None;
    }
    let token = url.query_pairs().find(|(k, _)| k == "u").map(|(_, v)| v.into_owned())?;
    let token = token.strip_prefix("a1").unwrap_or(&token);
    if let Some(decoded) = URL_SAFE_NO_PAD
        .decode(token.trim_end_matches('='))
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .and_then(|s| normalize_http_url(&s))
    {
        return Some(decoded);
    }
    normalize_http_url(token)
}

/// 清洗、按规范 URL 去重并截断到 max_results
pub fn dedupe_hits(hits: Vec<SearchHit>, max_results: usize) -> Vec<SearchHit> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for hit in hits {
        if out.len() >= max_results {
            break;
        }
        let Some(url) = normalize_http_url(&hit.url) else {
            continue;
        };
        let Some(key) = canonical_url(&url) else {
            continue;
        };
        if !seen.insert(key) {
            continue;
        }
        let title = Some(clean_text(&hit.title)).filter(|t| !t.is_empty()).unwrap_or_else(|| url.clone());
        let snippet = Some(clean_text(&hit.snippet))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| title.clone());
        out.push(SearchHit { title, url, snippet });
    }
    out
}
