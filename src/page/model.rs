//! 页面模型
//!
//! 一次请求对应一个 `PageModel`：表单、链接、提示信息、标签页等的类型化快照。
//! 表单中的防伪令牌只属于产生它的那个实例，提交后即丢弃。

use crate::error::{PageShapeError, Result};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// 字段类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Hidden,
    Text,
    Password,
    TextArea,
    Number,
    DateTime,
    /// 选中时提交 `on_value`
    Checkbox { on_value: String },
    Radio,
    Select,
    MultiSelect,
    File,
}

impl Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Hidden => "hidden",
            FieldKind::Text => "text",
            FieldKind::Password => "password",
            FieldKind::TextArea => "textarea",
            FieldKind::Number => "number",
            FieldKind::DateTime => "datetime",
            FieldKind::Checkbox { .. } => "checkbox",
            FieldKind::Radio => "radio",
            FieldKind::Select => "select",
            FieldKind::MultiSelect => "multiselect",
            FieldKind::File => "file",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

/// 字段约束
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldConstraints {
    pub required: bool,
    pub disabled: bool,
    pub readonly: bool,
    pub max_length: Option<usize>,
    /// 下拉框/单选组的可选项
    pub options: Vec<SelectOption>,
}

/// 表单字段描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub id: Option<String>,
    pub label: Option<String>,
    pub kind: FieldKind,
    /// 当前值；多选可有多个，未选中的复选框为空
    pub values: Vec<String>,
    pub constraints: FieldConstraints,
}

impl FieldDescriptor {
    pub fn value(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }

    pub fn is_checked(&self) -> bool {
        matches!(self.kind, FieldKind::Checkbox { .. }) && !self.values.is_empty()
    }

    pub fn offers(&self, value: &str) -> bool {
        self.constraints.options.iter().any(|o| o.value == value)
    }
}

/// 提交按钮
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonDescriptor {
    pub name: Option<String>,
    pub value: String,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormEncoding {
    UrlEncoded,
    Multipart,
}

/// 表单模型
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormModel {
    pub id: Option<String>,
    pub name: Option<String>,
    /// 绝对地址
    pub action: String,
    pub method: HttpMethod,
    pub encoding: FormEncoding,
    pub classes: Vec<String>,
    /// 文档顺序
    pub fields: Vec<FieldDescriptor>,
    pub buttons: Vec<ButtonDescriptor>,
}

impl FormModel {
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// 按标签文本查找字段（忽略首尾空白）
    pub fn fields_by_label(&self, label: &str) -> Vec<&FieldDescriptor> {
        let label = label.trim();
        self.fields
            .iter()
            .filter(|f| f.label.as_deref().map(str::trim) == Some(label))
            .collect()
    }

    pub fn button(&self, name: &str) -> Option<&ButtonDescriptor> {
        self.buttons.iter().find(|b| b.name.as_deref() == Some(name))
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    /// 日志/错误信息中使用的简短描述
    pub fn describe(&self) -> String {
        match (&self.id, &self.name) {
            (Some(id), _) => format!("#{}", id),
            (None, Some(name)) => format!("[name={}]", name),
            (None, None) => self.action.clone(),
        }
    }
}

/// 表单定位方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormLocator {
    /// 包含指定 name 的提交按钮
    Button(String),
    Class(String),
    Id(String),
    /// 包含指定 name 的字段
    ContainsField(String),
}

impl FormLocator {
    pub fn button(name: impl Into<String>) -> Self {
        FormLocator::Button(name.into())
    }

    fn matches(&self, form: &FormModel) -> bool {
        match self {
            FormLocator::Button(name) => form.button(name).is_some(),
            FormLocator::Class(class) => form.has_class(class),
            FormLocator::Id(id) => form.id.as_deref() == Some(id.as_str()),
            FormLocator::ContainsField(name) => form.has_field(name),
        }
    }
}

impl Display for FormLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormLocator::Button(name) => write!(f, "按钮 {}", name),
            FormLocator::Class(class) => write!(f, "form.{}", class),
            FormLocator::Id(id) => write!(f, "form#{}", id),
            FormLocator::ContainsField(name) => write!(f, "含字段 {}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub text: String,
    pub url: String,
    pub id: Option<String>,
}

/// 通过 `data-action` 或 `onclick` 触发跳转的按钮
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageAction {
    pub label: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Failure,
    Success,
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub kind: AlertKind,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tab {
    pub id: String,
    pub label: String,
    pub url: String,
}

/// 测验对象的标签页
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestTab {
    #[default]
    Settings,
    Questions,
    Participants,
    Dashboard,
}

impl TestTab {
    /// 英文/德文界面下的标签文本
    pub fn labels(self) -> &'static [&'static str] {
        match self {
            TestTab::Settings => &["Settings", "Einstellungen"],
            TestTab::Questions => &["Questions", "Fragen"],
            TestTab::Participants => &["Participants", "Teilnehmer"],
            TestTab::Dashboard => &["Dashboard"],
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "settings" | "einstellungen" => Some(TestTab::Settings),
            "questions" | "fragen" => Some(TestTab::Questions),
            "participants" | "teilnehmer" => Some(TestTab::Participants),
            "dashboard" => Some(TestTab::Dashboard),
            _ => None,
        }
    }
}

impl Display for TestTab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.labels()[0])
    }
}

/// 容器中的子对象条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildItem {
    pub title: String,
    pub url: String,
}

/// 测验题目列表中的一行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionRow {
    pub id: String,
    pub title: String,
    pub url: String,
    /// 排序字段名，形如 `order[123]`
    pub order_field: String,
}

/// 页面编辑器入口
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorInit {
    pub endpoint: String,
    pub form_action: Option<String>,
    /// 编辑器中已有的内容块（页面顺序）
    pub blocks: Vec<ContentBlock>,
}

/// 页面编辑器中的一个内容块
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentBlock {
    pub pcid: String,
    pub kind: ContentKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentKind {
    /// 文本段落，内容为段落内部的 HTML
    Paragraph(String),
    Code,
    Media,
    /// 无法识别的块，保留其 class
    Other(String),
}

impl ContentKind {
    pub fn name(&self) -> &str {
        match self {
            ContentKind::Paragraph(_) => "文本",
            ContentKind::Code => "代码",
            ContentKind::Media => "图片",
            ContentKind::Other(class) => class,
        }
    }
}

/// 页面模型
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageModel {
    pub url: String,
    pub title: String,
    pub forms: Vec<FormModel>,
    pub links: Vec<Link>,
    pub actions: Vec<PageAction>,
    pub alerts: Vec<Alert>,
    pub tabs: Vec<Tab>,
    pub logged_in: bool,
    pub children: Vec<ChildItem>,
    /// 页面上没有题目表格时为 `None`
    pub question_rows: Option<Vec<QuestionRow>>,
    pub editor: Option<EditorInit>,
}

impl PageModel {
    /// 按定位方式查找唯一表单
    pub fn form(&self, locator: &FormLocator) -> Result<&FormModel> {
        let matches: Vec<&FormModel> = self.forms.iter().filter(|f| locator.matches(f)).collect();
        match matches.as_slice() {
            [form] => Ok(form),
            [] => Err(PageShapeError::MissingForm {
                url: self.url.clone(),
                locator: locator.to_string(),
            }
            .into()),
            many => Err(PageShapeError::AmbiguousForm {
                url: self.url.clone(),
                locator: locator.to_string(),
                count: many.len(),
            }
            .into()),
        }
    }

    /// 依次尝试多个定位方式，返回第一个命中的表单
    pub fn form_any(&self, locators: &[FormLocator]) -> Result<&FormModel> {
        let mut last_err = None;
        for locator in locators {
            match self.form(locator) {
                Ok(form) => return Ok(form),
                Err(e @ crate::AppError::PageShape(PageShapeError::AmbiguousForm { .. })) => {
                    return Err(e)
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            PageShapeError::MissingForm {
                url: self.url.clone(),
                locator: "<none>".to_string(),
            }
            .into()
        }))
    }

    pub fn tab(&self, tab: TestTab) -> Result<&Tab> {
        self.tabs
            .iter()
            .find(|t| tab.labels().contains(&t.label.as_str()))
            .ok_or_else(|| crate::AppError::missing(&self.url, format!("标签页 {}", tab)))
    }

    /// 新建测验的链接
    pub fn test_create_url(&self) -> Result<&str> {
        self.links
            .iter()
            .find(|l| l.id.as_deref() == Some("tst") || l.url.contains("new_type=tst"))
            .map(|l| l.url.as_str())
            .ok_or_else(|| crate::AppError::missing(&self.url, "新建测验链接"))
    }

    /// 目标地址包含 `needle`（不区分大小写）的第一个按钮
    pub fn action_containing(&self, needle: &str) -> Option<&PageAction> {
        let needle = needle.to_ascii_lowercase();
        self.actions
            .iter()
            .find(|a| a.url.to_ascii_lowercase().contains(&needle))
    }

    pub fn require_action(&self, needle: &str) -> Result<&PageAction> {
        self.action_containing(needle)
            .ok_or_else(|| crate::AppError::missing(&self.url, format!("按钮 ({})", needle)))
    }

    /// 地址包含 `needle`（不区分大小写）的第一个链接
    pub fn link_containing(&self, needle: &str) -> Option<&Link> {
        let needle = needle.to_ascii_lowercase();
        self.links
            .iter()
            .find(|l| l.url.to_ascii_lowercase().contains(&needle))
    }

    pub fn failure_messages(&self) -> Vec<&str> {
        self.alerts
            .iter()
            .filter(|a| a.kind == AlertKind::Failure)
            .map(|a| a.text.as_str())
            .collect()
    }

    pub fn has_failure_alert(&self) -> bool {
        self.alerts.iter().any(|a| a.kind == AlertKind::Failure)
    }

    /// 有成功提示且没有错误提示
    pub fn has_success_alert(&self) -> bool {
        !self.has_failure_alert() && self.alerts.iter().any(|a| a.kind == AlertKind::Success)
    }

    /// 页面包含带密码框的表单
    pub fn is_login_page(&self) -> bool {
        self.login_form().is_some()
    }

    pub fn login_form(&self) -> Option<&FormModel> {
        self.forms
            .iter()
            .find(|f| f.fields.iter().any(|field| field.kind == FieldKind::Password))
    }

    pub fn questions(&self) -> Result<&[QuestionRow]> {
        self.question_rows
            .as_deref()
            .ok_or_else(|| crate::AppError::missing(&self.url, "题目列表"))
    }

    pub fn editor(&self) -> Result<&EditorInit> {
        self.editor
            .as_ref()
            .ok_or_else(|| crate::AppError::missing(&self.url, "页面编辑器 (il-copg-init)"))
    }

    /// URL 中是否包含 `needle`（不区分大小写）
    pub fn url_contains(&self, needle: &str) -> bool {
        self.url
            .to_ascii_lowercase()
            .contains(&needle.to_ascii_lowercase())
    }
}
