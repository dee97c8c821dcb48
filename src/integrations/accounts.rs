//! 已连接账号
//!
//! 读写 Google 日历 / 邮箱 / 云端硬盘的工具都需要对应授权范围的访问令牌。
//! ConnectedAccounts 回答“某用户是否已授权某范围，令牌是什么”；执行器在调用工具前查询，
//! 查不到即判定能力不可用，而不是带着空令牌去请求外部 API。

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// 授权范围
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Calendar,
    Mail,
    Drive,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Calendar => "calendar",
            Scope::Mail => "mail",
            Scope::Drive => "drive",
        }
    }
}

/// 单个已连接账号
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectedAccount {
    pub user_id: String,
    #[serde(default = "default_provider")]
    pub provider: String,
    pub access_token: String,
    #[serde(default)]
    pub scopes: HashSet<Scope>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

fn default_provider() -> String {
    "google".to_string()
}

impl ConnectedAccount {
    /// 令牌未过期且包含该授权范围
    pub fn grants(&self, scope: Scope, now: DateTime<Utc>) -> bool {
        let fresh = self.expires_at.map(|exp| exp > now).unwrap_or(true);
        fresh && !self.access_token.trim().is_empty() && self.scopes.contains(&scope)
    }
}

#[async_trait]
pub trait ConnectedAccounts: Send + Sync {
    /// 返回可用的访问令牌；未连接、缺少范围或已过期时返回 None
    async fn access_token(&self, user_id: &str, scope: Scope) -> Option<String>;
}

/// 内存账号表（由配置加载，也可在运行时增删）
#[derive(Default)]
pub struct InMemoryAccounts {
    accounts: RwLock<Vec<ConnectedAccount>>,
}

impl InMemoryAccounts {
    pub fn new(accounts: Vec<ConnectedAccount>) -> Self {
        Self {
            accounts: RwLock::new(accounts),
        }
    }

    /// 新增或替换同一用户同一 provider 的账号
    pub async fn connect(&self, account: ConnectedAccount) {
        let mut accounts = self.accounts.write().await;
        accounts.retain(|a| !(a.user_id == account.user_id && a.provider == account.provider));
        accounts.push(account);
    }

    pub async fn disconnect(&self, user_id: &str) {
        self.accounts.write().await.retain(|a| a.user_id != user_id);
    }
}

#[async_trait]
impl ConnectedAccounts for InMemoryAccounts {
    async fn access_token(&self, user_id: &str, scope: Scope) -> Option<String> {
        let now = Utc::now();
        self.accounts
            .read()
            .await
            .iter()
            .find(|a| a.user_id == user_id && a.grants(scope, now))
            .map(|a| a.access_token.clone())
    }
}
