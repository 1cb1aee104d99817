//! 传输层抽象
//!
//! 每个 `Transport` 实例对应一个独立的 Cookie 容器，即一个门户会话。

use crate::error::Result;
use crate::forms::SubmissionPayload;
use async_trait::async_trait;

/// 一次请求的原始响应
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// 跟随重定向后的最终地址
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }
}

/// 传输能力
///
/// 职责：
/// - 持有 HTTP 客户端和 Cookie
/// - 发送 GET / 表单 / JSON 请求并跟随重定向
/// - 不认识页面结构，不判断会话是否有效
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<RawResponse>;

    async fn submit(&self, payload: &SubmissionPayload) -> Result<RawResponse>;

    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<RawResponse>;

    /// 导出当前 Cookie（`name=value`）
    fn export_cookies(&self) -> Vec<String>;

    /// 导入 Cookie（`name=value`）
    fn import_cookies(&self, cookies: &[String]);
}
