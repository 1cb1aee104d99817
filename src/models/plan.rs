//! 执行计划
//!
//! 一个 `ActionPlan` 是一组有序步骤；开始执行后不再修改。

use super::question::QuestionSpec;
use crate::forms::Mutation;
use crate::navigator::ObjectPath;
use crate::page::TestTab;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPlan {
    pub name: String,
    /// 使用哪个账号执行
    pub account: String,
    pub steps: Vec<PlanStep>,
}

impl ActionPlan {
    pub fn new(name: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            account: account.into(),
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, target: impl Into<ObjectPath>, action: StepAction) -> Self {
        self.steps.push(PlanStep {
            target: target.into(),
            action,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// 单个步骤
///
/// `EnsureTest` 的目标是容器（文件夹/课程），其余动作的目标是测验本身。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub target: ObjectPath,
    pub action: StepAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StepAction {
    /// 容器中不存在同名测验时创建
    EnsureTest {
        title: String,
        #[serde(default)]
        description: String,
    },
    /// 修改测验某个标签页上的表单
    ConfigureTest {
        #[serde(default)]
        tab: TestTab,
        mutation: Mutation,
    },
    SetOnline { online: bool },
    /// 不存在同名题目时添加
    AddQuestion { question: QuestionSpec },
    /// 按标题顺序排列题目
    ReorderQuestions { titles: Vec<String> },
    /// 结束所有参与者的答题
    EndAllPasses,
}

impl StepAction {
    /// 日志中使用的简短描述
    pub fn describe(&self) -> String {
        match self {
            StepAction::EnsureTest { title, .. } => format!("确保测验 '{}' 存在", title),
            StepAction::ConfigureTest { tab, mutation } => {
                format!("配置 {} 标签页 ({} 个字段)", tab, mutation.len())
            }
            StepAction::SetOnline { online: true } => "设置为在线".to_string(),
            StepAction::SetOnline { online: false } => "设置为离线".to_string(),
            StepAction::AddQuestion { question } => format!("添加{}", question),
            StepAction::ReorderQuestions { titles } => format!("排列 {} 道题目", titles.len()),
            StepAction::EndAllPasses => "结束所有答题".to_string(),
        }
    }

    /// 是否会创建新对象
    pub fn creates_child(&self) -> bool {
        matches!(
            self,
            StepAction::EnsureTest { .. } | StepAction::AddQuestion { .. }
        )
    }
}

impl Display for PlanStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.action.describe(), self.target)
    }
}
