//! 计划文件（TOML）及其编译
//!
//! 一个计划文件描述"在某个文件夹下应该有哪些测验、每个测验是什么样子"。
//! `PlanBuilder` 把（计划文件，目标文件夹）编译成一个不可变的 `ActionPlan`。

use super::plan::{ActionPlan, PlanStep, StepAction};
use super::question::QuestionSpec;
use crate::error::{AppError, Result};
use crate::forms::{DesiredValue, Mutation};
use crate::navigator::ObjectPath;
use crate::page::TestTab;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 计划文件中的时间格式
pub const PLAN_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";
/// 门户表单中的时间格式
pub const PORTAL_TIME_FORMAT: &str = "%d.%m.%Y %H:%M";

fn default_account() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanFile {
    pub name: String,
    #[serde(default = "default_account")]
    pub account: String,
    /// 仓库根节点下的基础路径
    #[serde(default)]
    pub base: String,
    /// 相对于 `base` 的通配路径；设置后对每个匹配的文件夹各生成一个计划
    #[serde(default)]
    pub replicate: Option<String>,
    #[serde(default)]
    pub tests: Vec<TestSpec>,
    #[serde(default)]
    pub steps: Vec<RawStep>,

    /// 加载时记录的文件路径
    #[serde(skip)]
    pub file_path: Option<String>,
}

/// 一个测验的期望状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSpec {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub intro_text: String,
    /// `YYYY-MM-DD HH:MM`
    #[serde(default)]
    pub starting_time: Option<String>,
    #[serde(default)]
    pub ending_time: Option<String>,
    #[serde(default)]
    pub number_of_tries: Option<u32>,
    #[serde(default)]
    pub online: Option<bool>,
    /// 直接按字段名覆盖的设置
    #[serde(default)]
    pub settings: BTreeMap<String, FieldInput>,
    #[serde(default)]
    pub questions: Vec<QuestionSpec>,
}

/// 计划文件中的字段值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldInput {
    Flag(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<String>),
}

impl From<&FieldInput> for DesiredValue {
    fn from(input: &FieldInput) -> Self {
        match input {
            FieldInput::Flag(b) => DesiredValue::Flag(*b),
            FieldInput::Integer(i) => DesiredValue::Text(i.to_string()),
            FieldInput::Float(f) => DesiredValue::Text(f.to_string()),
            FieldInput::Text(t) => DesiredValue::Text(t.clone()),
            FieldInput::List(values) => DesiredValue::Many(values.clone()),
        }
    }
}

/// 计划文件中直接书写的步骤
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawStep {
    /// 相对于目标文件夹的路径
    #[serde(default)]
    pub target: String,
    #[serde(flatten)]
    pub action: RawAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RawAction {
    EnsureTest {
        title: String,
        #[serde(default)]
        description: String,
    },
    ConfigureTest {
        #[serde(default)]
        tab: TestTab,
        #[serde(default)]
        fields: BTreeMap<String, FieldInput>,
        #[serde(default)]
        submit: Option<String>,
    },
    SetOnline {
        online: bool,
    },
    AddQuestion {
        question: QuestionSpec,
    },
    ReorderQuestions {
        titles: Vec<String>,
    },
    EndAllPasses,
}

/// 计划编译器
pub struct PlanBuilder<'a> {
    file: &'a PlanFile,
}

impl<'a> PlanBuilder<'a> {
    pub fn new(file: &'a PlanFile) -> Self {
        Self { file }
    }

    /// 基础路径
    pub fn base_path(&self) -> ObjectPath {
        ObjectPath::parse(&self.file.base)
    }

    /// 通配路径（未设置时为空）
    pub fn replicate_pattern(&self) -> Option<ObjectPath> {
        self.file
            .replicate
            .as_deref()
            .map(ObjectPath::parse)
            .filter(|p| !p.is_root())
    }

    /// 为一个目标文件夹编译计划
    ///
    /// 每个测验依次生成：EnsureTest → ConfigureTest → AddQuestion* → ReorderQuestions，
    /// 随后是文件中直接书写的步骤。
    pub fn build(&self, folder: &ObjectPath) -> Result<ActionPlan> {
        let name = if self.replicate_pattern().is_some() {
            format!("{} @ {}", self.file.name, folder)
        } else {
            self.file.name.clone()
        };
        let mut plan = ActionPlan::new(name, &self.file.account);

        for test in &self.file.tests {
            let test_path = folder.child(&test.title);
            plan.steps.push(PlanStep {
                target: folder.clone(),
                action: StepAction::EnsureTest {
                    title: test.title.clone(),
                    description: test.description.clone(),
                },
            });
            plan.steps.push(PlanStep {
                target: test_path.clone(),
                action: StepAction::ConfigureTest {
                    tab: TestTab::Settings,
                    mutation: settings_mutation(test)?,
                },
            });
            for question in &test.questions {
                plan.steps.push(PlanStep {
                    target: test_path.clone(),
                    action: StepAction::AddQuestion {
                        question: question.clone(),
                    },
                });
            }
            if !test.questions.is_empty() {
                plan.steps.push(PlanStep {
                    target: test_path,
                    action: StepAction::ReorderQuestions {
                        titles: test.questions.iter().map(|q| q.title.clone()).collect(),
                    },
                });
            }
        }

        for raw in &self.file.steps {
            plan.steps.push(PlanStep {
                target: folder.join(&ObjectPath::parse(&raw.target)),
                action: raw_action(&raw.action),
            });
        }

        Ok(plan)
    }
}

fn raw_action(raw: &RawAction) -> StepAction {
    match raw {
        RawAction::EnsureTest { title, description } => StepAction::EnsureTest {
            title: title.clone(),
            description: description.clone(),
        },
        RawAction::ConfigureTest { tab, fields, submit } => {
            let mut mutation = fields_mutation(fields);
            mutation.submit = submit.clone();
            StepAction::ConfigureTest {
                tab: *tab,
                mutation,
            }
        }
        RawAction::SetOnline { online } => StepAction::SetOnline { online: *online },
        RawAction::AddQuestion { question } => StepAction::AddQuestion {
            question: question.clone(),
        },
        RawAction::ReorderQuestions { titles } => StepAction::ReorderQuestions {
            titles: titles.clone(),
        },
        RawAction::EndAllPasses => StepAction::EndAllPasses,
    }
}

fn fields_mutation(fields: &BTreeMap<String, FieldInput>) -> Mutation {
    fields
        .iter()
        .fold(Mutation::new(), |m, (name, value)| {
            m.set(name.as_str(), DesiredValue::from(value))
        })
}

/// 测验设置页的修改
///
/// 标题必须存在；其余字段随门户版本不同可能缺失，缺失时跳过。
pub fn settings_mutation(test: &TestSpec) -> Result<Mutation> {
    let mut mutation = Mutation::new()
        .set("title", test.title.as_str())
        .set_if_present("description", test.description.as_str());

    if let Some(online) = test.online {
        mutation = mutation.set_if_present("online", online);
    }
    if !test.intro_text.is_empty() {
        mutation = mutation
            .set_if_present("intro_enabled", true)
            .set_if_present("introduction", test.intro_text.as_str());
    }
    if let Some(start) = &test.starting_time {
        mutation = mutation.set_if_present("starting_time", portal_time("starting_time", start)?);
    }
    if let Some(end) = &test.ending_time {
        mutation = mutation.set_if_present("ending_time", portal_time("ending_time", end)?);
    }
    if let Some(tries) = test.number_of_tries {
        mutation = mutation
            .set_if_present("limitPasses", true)
            .set_if_present("nr_of_tries", tries.to_string());
    }

    Ok(mutation
        .merge(fields_mutation(&test.settings))
        .submit_with("cmd[saveForm]"))
}

/// `YYYY-MM-DD HH:MM` → `DD.MM.YYYY HH:MM`
pub fn portal_time(field: &str, value: &str) -> Result<String> {
    NaiveDateTime::parse_from_str(value.trim(), PLAN_TIME_FORMAT)
        .map(|t| t.format(PORTAL_TIME_FORMAT).to_string())
        .map_err(|_| {
            AppError::invalid_config(field, value, format!("时间格式应为 {}", PLAN_TIME_FORMAT))
        })
}
