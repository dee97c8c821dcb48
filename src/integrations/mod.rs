//! 外部集成：已连接账号与 Google REST API 调用

pub mod accounts;
pub mod google;

pub use accounts::{ConnectedAccount, ConnectedAccounts, InMemoryAccounts, Scope};
pub use google::GoogleApi;
