//! 确认 / 取消口令识别
//!
//! 只有精确口令才算确认或取消（默认 "confirm" / "cancel"）。规范化规则：去首尾空白、去掉结尾的 . ! ?、
//! 合并连续空白，默认不区分大小写。开启 allow_note 时 "confirm: 备注" 也算确认并带上备注。
//! 其余任何文本（包括 "confirm the meeting"）都不是口令。

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplyIntent {
    Confirm { note: Option<String> },
    Cancel,
    Other,
}

#[derive(Clone, Debug)]
pub struct TokenPolicy {
    pub confirm_words: Vec<String>,
    pub cancel_words: Vec<String>,
    pub case_sensitive: bool,
    pub allow_note: bool,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            confirm_words: vec!["confirm".to_string()],
            cancel_words: vec!["cancel".to_string()],
            case_sensitive: false,
            allow_note: true,
        }
    }
}

impl TokenPolicy {
    pub fn classify(&self, text: &str) -> ReplyIntent {
        let normalized = self.normalize(text);
        if normalized.is_empty() {
            return ReplyIntent::Other;
        }
        if self.matches(&self.confirm_words, &normalized) {
            return ReplyIntent::Confirm { note: None };
        }
        if self.matches(&self.cancel_words, &normalized) {
            return ReplyIntent::Cancel;
        }

        if self.allow_note {
            if let Some((head, note)) = text.trim().split_once(':') {
                let head = self.normalize(head);
                let note = note.trim();
                let note = (!note.is_empty()).then(|| note.to_string());
                if self.matches(&self.confirm_words, &head) {
                    return ReplyIntent::Confirm { note };
                }
                if self.matches(&self.cancel_words, &head) {
                    return ReplyIntent::Cancel;
                }
            }
        }
        ReplyIntent::Other
    }

    fn normalize(&self, text: &str) -> String {
        let trimmed = text.trim().trim_end_matches(['.', '!', '?']).trim();
        let collapsed = trimmed.split_whitespace().collect::<Vec<_>>().join(" ");
        if self.case_sensitive {
            collapsed
        } else {
            collapsed.to_lowercase()
        }
    }

    fn matches(&self, words: &[String], normalized: &str) -> bool {
        words.iter().any(|w| {
            if self.case_sensitive {
                w.trim() == normalized
            } else {
                w.trim().to_lowercase() == normalized
            }
        })
    }
}
