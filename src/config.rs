//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `STEWARD__*` 覆盖（双下划线表示嵌套，如 `STEWARD__LLM__PROVIDER=openai`）。
//! 列表值在环境变量中用逗号分隔（如 `STEWARD__TOOLS__SEARCH__PROVIDERS=bing,duckduckgo`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::confirmation::{ConflictPolicy, TokenPolicy};
use crate::integrations::ConnectedAccount;
use crate::planner::PlannerSettings;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub planner: PlannerSection,
    pub tools: ToolsSection,
    pub confirmation: ConfirmationSection,
    pub accounts: AccountsSection,
    pub store: StoreSection,
    pub verification: VerificationSection,
}

/// [app] 段：应用名、数据目录、Planner 上下文条数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    pub data_dir: PathBuf,
    /// Planner 可见的最近消息条数（下限 4）
    pub planner_context_messages: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "steward".to_string(),
            data_dir: PathBuf::from("data"),
            planner_context_messages: 12,
        }
    }
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// openai / deepseek / groq / mock
    pub provider: String,
    pub model: Option<String>,
    /// 覆盖 provider 的默认端点（任意 OpenAI 兼容服务）
    pub base_url: Option<String>,
    /// 未设置时读 provider 对应的环境变量（OPENAI_API_KEY / DEEPSEEK_API_KEY / GROQ_API_KEY）
    pub api_key: Option<String>,
    pub temperature: f32,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: None,
            base_url: None,
            api_key: None,
            temperature: 0.2,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 直接回复的超时（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [planner] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlannerSection {
    /// 计划步骤上限（1..=8）
    pub max_steps: usize,
    pub timeout_secs: u64,
    /// 输出不是 JSON 时是否追加一次修复调用
    pub repair: bool,
}

impl Default for PlannerSection {
    fn default() -> Self {
        Self {
            max_steps: 4,
            timeout_secs: 20,
            repair: true,
        }
    }
}

/// [tools] 段：工具超时与各工具配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    pub search: SearchSection,
    pub calendar: CalendarSection,
    pub gmail: GmailSection,
    pub drive: DriveSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            search: SearchSection::default(),
            calendar: CalendarSection::default(),
            gmail: GmailSection::default(),
            drive: DriveSection::default(),
        }
    }
}

/// [tools.search] 段：后端顺序、单后端超时与重试次数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub providers: Vec<String>,
    pub timeout_secs: u64,
    pub retries: u32,
    pub max_results: usize,
    pub brave_api_key: Option<String>,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            providers: vec!["duckduckgo".into(), "bing".into(), "brave".into()],
            timeout_secs: 8,
            retries: 1,
            max_results: 5,
            brave_api_key: None,
        }
    }
}

/// [tools.calendar] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CalendarSection {
    pub time_zone: String,
    pub default_duration_minutes: i64,
    pub max_results: usize,
}

impl Default for CalendarSection {
    fn default() -> Self {
        Self {
            time_zone: "UTC".to_string(),
            default_duration_minutes: 30,
            max_results: 5,
        }
    }
}

/// [tools.gmail] 段：收件人域名白名单为空时不限制
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GmailSection {
    pub allowed_recipient_domains: Vec<String>,
    pub max_results: usize,
}

impl Default for GmailSection {
    fn default() -> Self {
        Self {
            allowed_recipient_domains: Vec::new(),
            max_results: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DriveSection {
    pub max_results: usize,
}

impl Default for DriveSection {
    fn default() -> Self {
        Self { max_results: 5 }
    }
}

/// [confirmation] 段：确认口令策略与草稿冲突策略
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConfirmationSection {
    pub confirm_words: Vec<String>,
    pub cancel_words: Vec<String>,
    pub case_sensitive: bool,
    pub allow_note: bool,
    pub on_conflicting_draft: ConflictPolicy,
}

impl Default for ConfirmationSection {
    fn default() -> Self {
        let tokens = TokenPolicy::default();
        Self {
            confirm_words: tokens.confirm_words,
            cancel_words: tokens.cancel_words,
            case_sensitive: tokens.case_sensitive,
            allow_note: tokens.allow_note,
            on_conflicting_draft: ConflictPolicy::default(),
        }
    }
}

impl ConfirmationSection {
    pub fn token_policy(&self) -> TokenPolicy {
        TokenPolicy {
            confirm_words: self.confirm_words.clone(),
            cancel_words: self.cancel_words.clone(),
            case_sensitive: self.case_sensitive,
            allow_note: self.allow_note,
        }
    }
}

/// [accounts] 段：静态配置的已连接账号
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AccountsSection {
    pub connected: Vec<ConnectedAccount>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Memory,
    Sqlite,
}

/// [store] 段：消息持久化
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub backend: StoreBackend,
    /// SQLite 文件路径；相对路径基于 app.data_dir
    pub path: PathBuf,
    /// 内存后端每个会话保留的消息数
    pub max_messages_per_thread: usize,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            path: PathBuf::from("steward.db"),
            max_messages_per_thread: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VerificationSection {
    pub enabled: bool,
}

impl Default for VerificationSection {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl AppConfig {
    pub fn planner_settings(&self) -> PlannerSettings {
        PlannerSettings {
            timeout: std::time::Duration::from_secs(self.planner.timeout_secs.max(1)),
            max_steps: self.planner.max_steps.clamp(1, 8),
            context_messages: self.app.planner_context_messages.max(4),
            repair: self.planner.repair,
        }
    }

    pub fn sqlite_path(&self) -> PathBuf {
        if self.store.path.is_absolute() {
            self.store.path.clone()
        } else {
            self.app.data_dir.join(&self.store.path)
        }
    }
}

/// 从 config 目录加载配置，环境变量 STEWARD__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 STEWARD__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            tracing::warn!(path = %path.display(), "Config file not found, ignoring");
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("STEWARD")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("tools.search.providers")
            .with_list_parse_key("tools.gmail.allowed_recipient_domains")
            .with_list_parse_key("confirmation.confirm_words")
            .with_list_parse_key("confirmation.cancel_words")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.tools.search.providers, vec!["duckduckgo", "bing", "brave"]);
        assert_eq!(cfg.confirmation.on_conflicting_draft, ConflictPolicy::Reject);
        assert_eq!(cfg.store.backend, StoreBackend::Memory);
        assert_eq!(cfg.planner_settings().max_steps, 4);
        assert_eq!(cfg.sqlite_path(), PathBuf::from("data").join("steward.db"));
    }

    #[test]
    fn test_explicit_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[planner]
max_steps = 20

[confirmation]
confirm_words = ["confirm", "yes, send it"]
on_conflicting_draft = "replace"

[store]
backend = "sqlite"
path = "/tmp/steward-test.db"

[[accounts.connected]]
user_id = "u1"
access_token = "tok"
scopes = ["calendar", "mail"]
"#
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.planner_settings().max_steps, 8);
        assert_eq!(cfg.planner.timeout_secs, 20);
        assert_eq!(cfg.confirmation.token_policy().confirm_words.len(), 2);
        assert_eq!(cfg.confirmation.on_conflicting_draft, ConflictPolicy::Replace);
        assert_eq!(cfg.store.backend, StoreBackend::Sqlite);
        assert_eq!(cfg.sqlite_path(), PathBuf::from("/tmp/steward-test.db"));
        assert_eq!(cfg.accounts.connected.len(), 1);
        assert_eq!(cfg.accounts.connected[0].provider, "google");
    }
}
