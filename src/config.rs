use crate::error::{ConfigError, Result};
use crate::session::Credentials;
use std::str::FromStr;
use std::time::Duration;

/// 程序配置文件
#[derive(Clone, Debug)]
pub struct Config {
    /// 门户根地址（以 `/` 结尾）
    pub portal_base_url: String,
    /// 登录入口（相对于根地址）
    pub login_path: String,
    /// 会话探测页面（相对于根地址）
    pub liveness_path: String,
    /// 仓库根节点页面（相对于根地址）
    pub repository_root_path: String,
    /// 默认账号
    pub username: Option<String>,
    pub password: Option<String>,
    /// 额外账号列表（TOML）
    pub accounts_file: Option<String>,
    /// Cookie 持久化目录，为空时不持久化
    pub cookie_dir: Option<String>,
    /// 单次请求超时（秒）
    pub http_timeout_secs: u64,
    // --- 重试配置 ---
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// 空闲多久后在下一步之前重新探测会话（秒）
    pub idle_recheck_secs: u64,
    /// 同时运行的会话数量（不同账号之间）
    pub max_concurrent_sessions: usize,
    /// 计划文件存放目录
    pub plan_folder: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
    /// 失败步骤记录文件
    pub failure_file: String,
    /// 每个账号的计划执行完后退出登录（同时删除保存的 Cookie）
    pub logout_after_run: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            portal_base_url: "https://ilias.studium.kit.edu/".to_string(),
            login_path: "login.php?cmd=force_login".to_string(),
            liveness_path: "ilias.php?baseClass=ilDashboardGUI&cmd=show".to_string(),
            repository_root_path: "ilias.php?baseClass=ilRepositoryGUI&ref_id=1".to_string(),
            username: None,
            password: None,
            accounts_file: None,
            cookie_dir: None,
            http_timeout_secs: 60,
            max_attempts: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 8000,
            idle_recheck_secs: 120,
            max_concurrent_sessions: 2,
            plan_folder: "plans".to_string(),
            verbose_logging: false,
            output_log_file: "output.txt".to_string(),
            failure_file: "failed_steps.txt".to_string(),
            logout_after_run: false,
        }
    }
}

impl Config {
    /// 从环境变量加载配置，未设置的项使用默认值
    pub fn from_env() -> Result<Self> {
        let default = Self::default();
        let config = Self {
            portal_base_url: env_string("ILIAS_BASE_URL").unwrap_or(default.portal_base_url),
            login_path: env_string("ILIAS_LOGIN_PATH").unwrap_or(default.login_path),
            liveness_path: env_string("ILIAS_LIVENESS_PATH").unwrap_or(default.liveness_path),
            repository_root_path: env_string("ILIAS_ROOT_PATH")
                .unwrap_or(default.repository_root_path),
            username: env_string("ILIAS_USER"),
            password: env_string("ILIAS_PASSWORD"),
            accounts_file: env_string("ILIAS_ACCOUNTS_FILE"),
            cookie_dir: env_string("COOKIE_DIR"),
            http_timeout_secs: env_parse("HTTP_TIMEOUT_SECS", "u64")?
                .unwrap_or(default.http_timeout_secs),
            max_attempts: env_parse("MAX_ATTEMPTS", "u32")?.unwrap_or(default.max_attempts),
            backoff_base_ms: env_parse("BACKOFF_BASE_MS", "u64")?
                .unwrap_or(default.backoff_base_ms),
            backoff_max_ms: env_parse("BACKOFF_MAX_MS", "u64")?.unwrap_or(default.backoff_max_ms),
            idle_recheck_secs: env_parse("IDLE_RECHECK_SECS", "u64")?
                .unwrap_or(default.idle_recheck_secs),
            max_concurrent_sessions: env_parse("MAX_CONCURRENT_SESSIONS", "usize")?
                .unwrap_or(default.max_concurrent_sessions),
            plan_folder: env_string("PLAN_FOLDER").unwrap_or(default.plan_folder),
            verbose_logging: env_parse("VERBOSE_LOGGING", "bool")?
                .unwrap_or(default.verbose_logging),
            output_log_file: env_string("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
            failure_file: env_string("FAILURE_FILE").unwrap_or(default.failure_file),
            logout_after_run: env_parse("LOGOUT_AFTER_RUN", "bool")?
                .unwrap_or(default.logout_after_run),
        };
        config.validate()?;
        Ok(config)
    }

    /// 校验配置项之间的约束
    pub fn validate(&self) -> Result<()> {
        if url::Url::parse(&self.portal_base_url).is_err() {
            return Err(crate::AppError::invalid_config(
                "ILIAS_BASE_URL",
                &self.portal_base_url,
                "不是合法的 URL",
            ));
        }
        if self.max_attempts == 0 {
            return Err(crate::AppError::invalid_config(
                "MAX_ATTEMPTS",
                "0",
                "至少需要尝试一次",
            ));
        }
        if self.max_concurrent_sessions == 0 {
            return Err(crate::AppError::invalid_config(
                "MAX_CONCURRENT_SESSIONS",
                "0",
                "并发数必须大于 0",
            ));
        }
        if self.backoff_base_ms > self.backoff_max_ms {
            return Err(crate::AppError::invalid_config(
                "BACKOFF_BASE_MS",
                self.backoff_base_ms.to_string(),
                "不能大于 BACKOFF_MAX_MS",
            ));
        }
        if self.username.is_some() != self.password.is_some() {
            return Err(crate::AppError::invalid_config(
                "ILIAS_USER/ILIAS_PASSWORD",
                "",
                "用户名和密码必须同时设置",
            ));
        }
        Ok(())
    }

    /// 默认账号（名称为 `default`）
    pub fn default_credentials(&self) -> Option<Credentials> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some(Credentials::new("default", user, pass)),
            _ => None,
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn idle_recheck(&self) -> Duration {
        Duration::from_secs(self.idle_recheck_secs)
    }
}

fn env_string(var_name: &str) -> Option<String> {
    std::env::var(var_name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(var_name: &str, expected_type: &str) -> Result<Option<T>> {
    match env_string(var_name) {
        None => Ok(None),
        Some(value) => value.trim().parse().map(Some).map_err(|_| {
            ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type: expected_type.to_string(),
            }
            .into()
        }),
    }
}
