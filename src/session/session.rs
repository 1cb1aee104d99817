use crate::infrastructure::Transport;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Valid,
    Expired,
    /// 从磁盘恢复、尚未探测
    Unknown,
}

/// 已认证的门户会话
///
/// 由调用方持有，只能通过 `SessionManager` 的（重新）认证改变状态。
pub struct Session {
    account: String,
    base_url: Url,
    transport: Arc<dyn Transport>,
    state: SessionState,
    auth_generation: u32,
    last_activity: Option<Instant>,
}

impl Session {
    pub fn new(account: impl Into<String>, base_url: Url, transport: Arc<dyn Transport>) -> Self {
        Self {
            account: account.into(),
            base_url,
            transport,
            state: SessionState::Unknown,
            auth_generation: 0,
            last_activity: None,
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// 成功登录的次数
    pub fn auth_generation(&self) -> u32 {
        self.auth_generation
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// 把相对路径解析为门户上的绝对地址
    pub fn url(&self, path: &str) -> String {
        self.base_url
            .join(path)
            .map(String::from)
            .unwrap_or_else(|_| path.to_string())
    }

    /// 距上次成功请求的时间；从未请求过视为无限久
    pub fn idle_for(&self) -> Duration {
        self.last_activity
            .map(|t| t.elapsed())
            .unwrap_or(Duration::MAX)
    }

    pub fn mark_expired(&mut self) {
        self.state = SessionState::Expired;
    }

    pub(crate) fn mark_authenticated(&mut self) {
        self.state = SessionState::Valid;
        self.auth_generation += 1;
        self.touch();
    }

    pub(crate) fn mark_valid(&mut self) {
        self.state = SessionState::Valid;
        self.touch();
    }

    pub(crate) fn touch(&mut self) {
        self.last_activity = Some(Instant::now());
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("account", &self.account)
            .field("base_url", &self.base_url.as_str())
            .field("state", &self.state)
            .field("auth_generation", &self.auth_generation)
            .finish()
    }
}
