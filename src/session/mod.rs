//! 会话层
//!
//! - `Credentials` - 账号凭据（Debug 不输出密码）
//! - `Session` - 显式的会话值（基础地址、Cookie 容器、过期状态）
//! - `SessionManager` - 登录握手、存活探测、重新认证
//! - `cookie_file` - Cookie 持久化

pub mod cookie_file;
pub mod credentials;
pub mod manager;
#[allow(clippy::module_inception)]
pub mod session;

pub use credentials::Credentials;
pub use manager::{SessionManager, SessionSettings, MAX_LOGIN_HOPS};
pub use session::{Session, SessionState};
