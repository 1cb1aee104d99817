use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 应用程序错误类型
///
/// 顶层错误按领域拆分为子枚举；`kind()` 把它们归入统一的错误分类，
/// 编排层据此决定重试还是中止。
#[derive(Debug, Error)]
pub enum AppError {
    /// 认证错误（账号密码错误、身份提供方异常），不重试
    #[error("认证错误: {0}")]
    Auth(#[from] AuthError),
    /// 会话过期，编排层会重新登录并重试一次
    #[error("会话已过期 ({url})")]
    SessionExpired { url: String },
    /// 网络错误，按退避策略有限次重试
    #[error("网络错误: {0}")]
    Network(#[from] NetworkError),
    /// 页面结构与预期不符
    #[error("页面结构异常: {0}")]
    PageShape(#[from] PageShapeError),
    /// 字段修改无法映射到当前表单
    #[error("无法应用字段修改: {0}")]
    UnsupportedMutation(#[from] MutationError),
    /// 门户自身报告的业务/校验错误
    #[error("门户拒绝请求: {0}")]
    Portal(#[from] PortalError),
    /// 对象树导航错误
    #[error("导航错误: {0}")]
    Navigation(#[from] NavigationError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// 用户取消
    #[error("操作已取消")]
    Cancelled,
    /// 账号任务异常终止（panic 或被中止）
    #[error("账号 {account} 的任务异常终止: {reason}")]
    TaskFailed { account: String, reason: String },
}

/// 错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Auth,
    SessionExpired,
    Network,
    UnexpectedPageShape,
    UnsupportedMutation,
    Portal,
    NotFound,
    Config,
    File,
    Cancelled,
    Internal,
}

impl AppError {
    /// 错误所属分类
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Auth(_) => ErrorKind::Auth,
            AppError::SessionExpired { .. } => ErrorKind::SessionExpired,
            AppError::Network(_) => ErrorKind::Network,
            AppError::PageShape(_) => ErrorKind::UnexpectedPageShape,
            AppError::UnsupportedMutation(_) => ErrorKind::UnsupportedMutation,
            AppError::Portal(_) => ErrorKind::Portal,
            AppError::Navigation(_) => ErrorKind::NotFound,
            AppError::Config(_) => ErrorKind::Config,
            AppError::File(_) => ErrorKind::File,
            AppError::Cancelled => ErrorKind::Cancelled,
            AppError::TaskFailed { .. } => ErrorKind::Internal,
        }
    }

    /// 是否可在本地通过重试恢复
    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::SessionExpired | ErrorKind::Network)
    }
}

/// 认证错误
#[derive(Debug, Error)]
pub enum AuthError {
    /// 登录表单再次出现（账号或密码错误）
    #[error("登录被拒绝: {messages}")]
    InvalidCredentials { messages: String },
    /// 登录流程中出现无法识别的页面
    #[error("身份提供方返回了无法处理的页面 ({url}): {reason}")]
    IdentityProvider { url: String, reason: String },
    /// 重定向/自动提交跳转次数过多
    #[error("登录跳转超过 {hops} 次仍未完成")]
    TooManyHops { hops: usize },
    /// 同一步骤内会话再次过期
    #[error("重新登录后会话再次过期 ({url})，请检查账号配置")]
    SessionExpiredRepeatedly { url: String },
}

/// 网络错误
#[derive(Debug, Error)]
pub enum NetworkError {
    /// 请求发送失败（连接、DNS、读取等）
    #[error("请求失败 ({url}): {source}")]
    RequestFailed {
        url: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 请求超时
    #[error("请求超时 ({url})")]
    Timeout { url: String },
    /// 服务端 5xx
    #[error("服务端错误 ({url}): HTTP {status}")]
    ServerError { url: String, status: u16 },
}

/// 页面结构错误
#[derive(Debug, Error)]
pub enum PageShapeError {
    /// 响应不是 HTML
    #[error("响应不是可解析的 HTML 页面 ({url})")]
    NotHtml { url: String },
    /// URL 无法解析
    #[error("无法解析 URL: {url}")]
    InvalidUrl { url: String },
    /// 找不到预期的表单
    #[error("页面 {url} 中找不到表单 ({locator})")]
    MissingForm { url: String, locator: String },
    /// 匹配到多个表单
    #[error("页面 {url} 中有 {count} 个表单匹配 ({locator})")]
    AmbiguousForm {
        url: String,
        locator: String,
        count: usize,
    },
    /// 找不到预期的元素
    #[error("页面 {url} 中找不到 {what}")]
    MissingElement { url: String, what: String },
    /// 元素存在但格式不对
    #[error("页面 {url} 中 {what} 格式异常")]
    MalformedElement { url: String, what: String },
    /// 提交后的结果页面不是预期页面
    #[error("提交后到达了非预期页面 {url} (期望: {expected})")]
    UnexpectedResult { url: String, expected: String },
    /// JSON 响应解析失败
    #[error("JSON 响应解析失败 ({url}): {source}")]
    InvalidJson {
        url: String,
        source: serde_json::Error,
    },
}

/// 字段修改错误
#[derive(Debug, Error)]
pub enum MutationError {
    /// 表单中不存在该字段
    #[error("表单 {form} 中不存在字段 '{field}'")]
    FieldAbsent { field: String, form: String },
    /// 字段被禁用
    #[error("字段 '{field}' 已被禁用")]
    FieldDisabled { field: String },
    /// 隐藏字段（含防伪令牌）只能原样提交
    #[error("字段 '{field}' 是隐藏字段，不允许修改")]
    ProtectedField { field: String },
    /// 值的类型与字段类型不匹配
    #[error("字段 '{field}' ({kind}) 不接受值 {value}")]
    IncompatibleValue {
        field: String,
        kind: String,
        value: String,
    },
    /// 选择框中没有该选项
    #[error("字段 '{field}' 没有选项 '{value}' (可选: {options})")]
    ValueNotOffered {
        field: String,
        value: String,
        options: String,
    },
    /// 标签匹配到多个字段
    #[error("标签 '{label}' 匹配到 {count} 个字段")]
    AmbiguousLabel { label: String, count: usize },
    /// 找不到提交按钮
    #[error("表单 {form} 中不存在提交按钮 '{button}'")]
    MissingButton { button: String, form: String },
}

/// 门户报告的错误
#[derive(Debug, Error)]
pub enum PortalError {
    /// 页面中出现错误提示
    #[error("{messages} ({url})")]
    Rejected { url: String, messages: String },
    /// 非预期的 HTTP 状态码
    #[error("HTTP {status} ({url})")]
    HttpStatus { url: String, status: u16 },
    /// 页面编辑器接口返回错误
    #[error("页面编辑器返回错误: {message}")]
    EditorRejected { message: String },
    /// 已存在的同名题目与计划不一致，无法只补齐缺失部分
    #[error("题目 '{title}' 与计划不一致: {detail}")]
    QuestionDiverged { title: String, detail: String },
}

/// 导航错误
#[derive(Debug, Error)]
pub enum NavigationError {
    /// 路径段不存在
    #[error("在 '{path}' 中找不到 '{segment}'")]
    NotFound { segment: String, path: String },
    /// 路径段重名
    #[error("'{path}' 中有 {count} 个名为 '{segment}' 的对象")]
    Ambiguous {
        segment: String,
        path: String,
        count: usize,
    },
    /// 对象类型不符
    #[error("'{path}' 的类型是 {actual}，期望 {expected}")]
    WrongKind {
        path: String,
        expected: String,
        actual: String,
    },
    /// 测验中找不到题目
    #[error("测验 '{test}' 中找不到题目 '{title}'")]
    QuestionNotFound { test: String, title: String },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 环境变量不存在
    #[error("环境变量 {var_name} 不存在")]
    EnvVarNotFound { var_name: String },
    /// 配置项取值非法
    #[error("配置项 {field} 的值 '{value}' 非法: {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        source: std::io::Error,
    },
    /// 写入文件失败
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        source: toml::de::Error,
    },
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建网络请求失败错误
    pub fn network(
        url: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Network(NetworkError::RequestFailed {
            url: url.into(),
            source: Box::new(source),
        })
    }

    /// 创建页面缺少元素错误
    pub fn missing(url: impl Into<String>, what: impl Into<String>) -> Self {
        AppError::PageShape(PageShapeError::MissingElement {
            url: url.into(),
            what: what.into(),
        })
    }

    /// 创建字段不存在错误
    pub fn field_absent(field: impl Into<String>, form: impl Into<String>) -> Self {
        AppError::UnsupportedMutation(MutationError::FieldAbsent {
            field: field.into(),
            form: form.into(),
        })
    }

    /// 创建配置取值非法错误
    pub fn invalid_config(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        AppError::Config(ConfigError::InvalidValue {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type Result<T, E = AppError> = std::result::Result<T, E>;
