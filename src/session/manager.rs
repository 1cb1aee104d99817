//! 会话管理 - 业务能力层
//!
//! 只负责"保持一个有效的门户会话"：登录握手、存活探测、过期识别、Cookie 持久化。

use super::cookie_file;
use super::credentials::Credentials;
use super::session::{Session, SessionState};
use crate::config::Config;
use crate::error::{AppError, AuthError, NetworkError, PageShapeError, PortalError, Result};
use crate::forms::{synthesize_form, Mutation, SubmissionPayload};
use crate::infrastructure::{RawResponse, Transport};
use crate::page::{self, FieldKind, FormModel, HttpMethod, PageModel};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// 登录过程中最多跟随的页面数（含身份提供方的自动提交页）
pub const MAX_LOGIN_HOPS: usize = 8;

/// 会话相关配置
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub base_url: String,
    pub login_path: String,
    pub liveness_path: String,
    pub logout_path: String,
    /// 空闲超过该时长后，下一步开始前重新探测
    pub idle_recheck: Duration,
    pub cookie_dir: Option<PathBuf>,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_url: config.portal_base_url.clone(),
            login_path: config.login_path.clone(),
            liveness_path: config.liveness_path.clone(),
            logout_path: "logout.php".to_string(),
            idle_recheck: config.idle_recheck(),
            cookie_dir: config.cookie_dir.as_ref().map(PathBuf::from),
        }
    }
}

/// 会话管理器
///
/// 一个实例对应一组凭据；可以廉价克隆。
#[derive(Clone)]
pub struct SessionManager {
    credentials: Credentials,
    settings: SessionSettings,
    base_url: Url,
}

impl SessionManager {
    pub fn new(credentials: Credentials, settings: SessionSettings) -> Result<Self> {
        let base_url = Url::parse(&settings.base_url).map_err(|_| {
            AppError::invalid_config("ILIAS_BASE_URL", &settings.base_url, "不是合法的 URL")
        })?;
        Ok(Self {
            credentials,
            settings,
            base_url,
        })
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn account(&self) -> &str {
        &self.credentials.account
    }

    /// 创建未认证的会话
    pub fn new_session(&self, transport: Arc<dyn Transport>) -> Session {
        Session::new(&self.credentials.account, self.base_url.clone(), transport)
    }

    /// 登录并返回有效会话
    pub async fn authenticate(&self, transport: Arc<dyn Transport>) -> Result<Session> {
        let mut session = self.new_session(transport);
        self.login(&mut session).await?;
        Ok(session)
    }

    /// 优先复用磁盘上的 Cookie，无效时重新登录
    pub async fn resume(&self, transport: Arc<dyn Transport>) -> Result<Session> {
        let mut session = self.new_session(transport);
        let stored = match &self.settings.cookie_dir {
            Some(dir) => cookie_file::load(dir, self.account()).await?,
            None => None,
        };
        match stored {
            Some(cookies) if !cookies.is_empty() => {
                info!("[账号 {}] 🍪 载入 {} 个已保存的 Cookie", self.account(), cookies.len());
                session.transport().import_cookies(&cookies);
                self.ensure_valid(&mut session).await?;
            }
            _ => self.login(&mut session).await?,
        }
        Ok(session)
    }

    /// 重新登录（会话过期后由编排层调用）
    pub async fn reauthenticate(&self, session: &mut Session) -> Result<()> {
        session.mark_expired();
        self.login(session).await
    }

    /// 保证会话可用：过期则登录，状态未知或空闲过久则探测
    ///
    /// 从不在无效会话上静默继续。
    pub async fn ensure_valid(&self, session: &mut Session) -> Result<()> {
        match session.state() {
            SessionState::Expired => self.login(session).await,
            SessionState::Unknown => self.check_liveness(session).await,
            SessionState::Valid if session.idle_for() >= self.settings.idle_recheck => {
                debug!("[账号 {}] 会话空闲 {:?}，重新探测", self.account(), session.idle_for());
                self.check_liveness(session).await
            }
            SessionState::Valid => Ok(()),
        }
    }

    /// 发送请求；返回原始响应
    ///
    /// 5xx → 网络错误，401 或未登录页面 → 会话过期，其他 4xx → 门户错误。
    pub async fn request(
        &self,
        session: &mut Session,
        target: &str,
        payload: Option<&SubmissionPayload>,
    ) -> Result<RawResponse> {
        let raw = self.send(session, target, payload).await?;
        self.page_from(session, &raw)?;
        Ok(raw)
    }

    /// GET 并提取页面模型
    pub async fn get_page(&self, session: &mut Session, url: &str) -> Result<PageModel> {
        let raw = self.send(session, url, None).await?;
        self.page_from(session, &raw)
    }

    /// 提交表单并提取结果页面
    pub async fn submit(
        &self,
        session: &mut Session,
        payload: &SubmissionPayload,
    ) -> Result<PageModel> {
        let raw = self.send(session, &payload.url, Some(payload)).await?;
        self.page_from(session, &raw)
    }

    /// 向 JSON 接口发送请求
    pub async fn post_json(
        &self,
        session: &mut Session,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let raw = session.transport().post_json(url, body).await?;
        check_status(session, &raw)?;
        match serde_json::from_str(&raw.body) {
            Ok(value) => {
                session.touch();
                Ok(value)
            }
            Err(source) => {
                // 会话过期时门户返回登录页而不是 JSON
                if let Ok(page) = page::extract(&raw.body, &raw.url) {
                    if !page.logged_in {
                        session.mark_expired();
                        return Err(AppError::SessionExpired { url: raw.url });
                    }
                }
                Err(PageShapeError::InvalidJson { url: raw.url, source }.into())
            }
        }
    }

    /// 退出登录并删除保存的 Cookie
    pub async fn logout(&self, session: &mut Session) -> Result<()> {
        let url = session.url(&self.settings.logout_path);
        info!("[账号 {}] 👋 退出登录", self.account());
        let response = session.transport().get(&url).await?;
        if response.status >= 500 {
            return Err(NetworkError::ServerError {
                url: response.url,
                status: response.status,
            }
            .into());
        }
        session.mark_expired();
        if let Some(dir) = &self.settings.cookie_dir {
            cookie_file::remove(dir, self.account()).await?;
        }
        Ok(())
    }

    async fn send(
        &self,
        session: &Session,
        target: &str,
        payload: Option<&SubmissionPayload>,
    ) -> Result<RawResponse> {
        match payload {
            Some(payload) => session.transport().submit(payload).await,
            None => session.transport().get(&session.url(target)).await,
        }
    }

    fn page_from(&self, session: &mut Session, raw: &RawResponse) -> Result<PageModel> {
        check_status(session, raw)?;
        let page = page::extract(&raw.body, &raw.url)?;
        if !page.logged_in {
            warn!("[账号 {}] ⚠️ 会话已失效 ({})", self.account(), raw.url);
            session.mark_expired();
            return Err(AppError::SessionExpired {
                url: raw.url.clone(),
            });
        }
        session.touch();
        Ok(page)
    }

    async fn check_liveness(&self, session: &mut Session) -> Result<()> {
        let url = session.url(&self.settings.liveness_path);
        let raw = session.transport().get(&url).await?;
        if raw.status >= 500 {
            return Err(NetworkError::ServerError {
                url: raw.url,
                status: raw.status,
            }
            .into());
        }
        let alive = raw.is_success()
            && page::extract(&raw.body, &raw.url)
                .map(|p| p.logged_in)
                .unwrap_or(false);
        if alive {
            debug!("[账号 {}] 会话探测成功", self.account());
            session.mark_valid();
            Ok(())
        } else {
            info!("[账号 {}] 会话探测失败，重新登录", self.account());
            self.login(session).await
        }
    }

    /// 登录握手：登录表单 → （身份提供方自动提交页）* → 已登录页面
    async fn login(&self, session: &mut Session) -> Result<()> {
        info!("[账号 {}] 🔐 正在登录 {}", self.account(), self.base_url);
        let transport = session.transport().clone();
        let mut response = transport.get(&session.url(&self.settings.login_path)).await?;
        let mut credentials_sent = false;

        for hop in 0..MAX_LOGIN_HOPS {
            if response.status >= 500 {
                return Err(NetworkError::ServerError {
                    url: response.url,
                    status: response.status,
                }
                .into());
            }
            if response.status >= 400 {
                return Err(AuthError::IdentityProvider {
                    url: response.url,
                    reason: format!("HTTP {}", response.status),
                }
                .into());
            }
            let page = page::extract(&response.body, &response.url).map_err(|e| {
                AuthError::IdentityProvider {
                    url: response.url.clone(),
                    reason: e.to_string(),
                }
            })?;
            debug!("[账号 {}] 登录第 {} 跳: {}", self.account(), hop + 1, page.url);

            if page.logged_in {
                session.mark_authenticated();
                info!(
                    "[账号 {}] ✓ 登录成功 (第 {} 次认证)",
                    self.account(),
                    session.auth_generation()
                );
                self.persist_cookies(session).await;
                return Ok(());
            }

            if let Some(form) = page.login_form() {
                if credentials_sent {
                    let messages = page.failure_messages().join(" ");
                    return Err(AuthError::InvalidCredentials {
                        messages: if messages.is_empty() {
                            "登录表单再次出现".to_string()
                        } else {
                            messages
                        },
                    }
                    .into());
                }
                let payload = synthesize_form(form, &self.credential_mutation(form)?)?;
                response = transport.submit(&payload).await?;
                credentials_sent = true;
                continue;
            }

            if let Some(form) = auto_post_form(&page) {
                debug!("[账号 {}] 跟随自动提交表单 {}", self.account(), form.action);
                let payload = synthesize_form(form, &Mutation::new())?;
                response = transport.submit(&payload).await?;
                continue;
            }

            return Err(AuthError::IdentityProvider {
                url: page.url.clone(),
                reason: "页面既不是登录表单也不是已登录页面".to_string(),
            }
            .into());
        }

        Err(AuthError::TooManyHops {
            hops: MAX_LOGIN_HOPS,
        }
        .into())
    }

    fn credential_mutation(&self, form: &FormModel) -> Result<Mutation> {
        let password = form
            .fields
            .iter()
            .find(|f| f.kind == FieldKind::Password)
            .ok_or_else(|| AppError::field_absent("password", form.describe()))?;
        let text_fields: Vec<_> = form
            .fields
            .iter()
            .filter(|f| f.kind == FieldKind::Text && !f.constraints.disabled)
            .collect();
        let username = text_fields
            .iter()
            .find(|f| {
                let name = f.name.to_ascii_lowercase();
                name.contains("user") || name.contains("login")
            })
            .or_else(|| text_fields.first())
            .ok_or_else(|| AppError::field_absent("username", form.describe()))?;
        Ok(Mutation::new()
            .set(&username.name, self.credentials.username.as_str())
            .set(&password.name, self.credentials.password()))
    }

    async fn persist_cookies(&self, session: &Session) {
        let Some(dir) = &self.settings.cookie_dir else {
            return;
        };
        let cookies = session.transport().export_cookies();
        if let Err(e) = cookie_file::save(dir, self.account(), &cookies).await {
            warn!("[账号 {}] ⚠️ Cookie 保存失败: {}", self.account(), e);
        }
    }
}

fn check_status(session: &mut Session, raw: &RawResponse) -> Result<()> {
    match raw.status {
        s if s >= 500 => Err(NetworkError::ServerError {
            url: raw.url.clone(),
            status: s,
        }
        .into()),
        401 => {
            session.mark_expired();
            Err(AppError::SessionExpired {
                url: raw.url.clone(),
            })
        }
        s if s >= 400 => Err(PortalError::HttpStatus {
            url: raw.url.clone(),
            status: s,
        }
        .into()),
        _ => Ok(()),
    }
}

/// 身份提供方的自动提交页：只含隐藏字段的 POST 表单（如 SAMLResponse）
fn auto_post_form(page: &PageModel) -> Option<&FormModel> {
    page.forms.iter().find(|f| {
        f.method == HttpMethod::Post
            && !f.fields.is_empty()
            && f.fields.iter().all(|field| field.kind == FieldKind::Hidden)
    })
}
