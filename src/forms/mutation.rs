//! 调用方描述的字段修改

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// 字段定位：按 name 或按标签文本
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKey {
    Name(String),
    Label(String),
}

impl Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKey::Name(name) => f.write_str(name),
            FieldKey::Label(label) => write!(f, "label:{}", label),
        }
    }
}

/// 期望的字段值
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DesiredValue {
    Text(String),
    /// 复选框开/关
    Flag(bool),
    /// 多选
    Many(Vec<String>),
    /// 空文件（保持门户上的现有文件）
    EmptyFile,
}

impl Display for DesiredValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DesiredValue::Text(t) => write!(f, "'{}'", t),
            DesiredValue::Flag(b) => write!(f, "{}", b),
            DesiredValue::Many(values) => write!(f, "[{}]", values.join(", ")),
            DesiredValue::EmptyFile => f.write_str("<empty file>"),
        }
    }
}

impl From<&str> for DesiredValue {
    fn from(value: &str) -> Self {
        DesiredValue::Text(value.to_string())
    }
}

impl From<String> for DesiredValue {
    fn from(value: String) -> Self {
        DesiredValue::Text(value)
    }
}

impl From<bool> for DesiredValue {
    fn from(value: bool) -> Self {
        DesiredValue::Flag(value)
    }
}

impl From<Vec<String>> for DesiredValue {
    fn from(values: Vec<String>) -> Self {
        DesiredValue::Many(values)
    }
}

/// 字段不存在时的处理方式
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Presence {
    /// 必须存在，否则报错
    Required,
    /// 不存在时忽略
    IfPresent,
    /// 不存在时按模板字段新增一行（如答案行）
    RowOf(String),
    /// 不存在时原样附加
    Extra,
    /// 存在时保留页面上的值，不存在时附加
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMutation {
    pub key: FieldKey,
    pub value: DesiredValue,
    pub presence: Presence,
}

/// 对单个表单的一组修改，以及要点击的提交按钮
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutation {
    pub entries: Vec<FieldMutation>,
    pub submit: Option<String>,
}

impl Mutation {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, key: FieldKey, value: DesiredValue, presence: Presence) -> Self {
        self.entries.push(FieldMutation {
            key,
            value,
            presence,
        });
        self
    }

    /// 设置必须存在的字段
    pub fn set(self, name: impl Into<String>, value: impl Into<DesiredValue>) -> Self {
        self.push(FieldKey::Name(name.into()), value.into(), Presence::Required)
    }

    /// 按标签文本设置字段
    pub fn set_by_label(self, label: impl Into<String>, value: impl Into<DesiredValue>) -> Self {
        self.push(FieldKey::Label(label.into()), value.into(), Presence::Required)
    }

    /// 字段存在时才设置
    pub fn set_if_present(self, name: impl Into<String>, value: impl Into<DesiredValue>) -> Self {
        self.push(FieldKey::Name(name.into()), value.into(), Presence::IfPresent)
    }

    /// 设置字段，不存在时以 `template` 为模板新增
    pub fn set_row(
        self,
        name: impl Into<String>,
        template: impl Into<String>,
        value: impl Into<DesiredValue>,
    ) -> Self {
        self.push(
            FieldKey::Name(name.into()),
            value.into(),
            Presence::RowOf(template.into()),
        )
    }

    /// 设置字段，不存在时原样附加
    pub fn set_extra(self, name: impl Into<String>, value: impl Into<DesiredValue>) -> Self {
        self.push(FieldKey::Name(name.into()), value.into(), Presence::Extra)
    }

    /// 字段存在时保留原值，否则附加
    pub fn set_default(self, name: impl Into<String>, value: impl Into<DesiredValue>) -> Self {
        self.push(FieldKey::Name(name.into()), value.into(), Presence::Default)
    }

    /// 指定提交按钮
    pub fn submit_with(mut self, button: impl Into<String>) -> Self {
        self.submit = Some(button.into());
        self
    }

    /// 合并另一组修改（后者覆盖同名字段）
    pub fn merge(mut self, other: Mutation) -> Self {
        for entry in other.entries {
            self.entries.retain(|e| e.key != entry.key);
            self.entries.push(entry);
        }
        if other.submit.is_some() {
            self.submit = other.submit;
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
