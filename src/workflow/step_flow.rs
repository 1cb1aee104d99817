//! 步骤执行流程 - 流程层
//!
//! 核心职责：定义"一个步骤"的一次尝试
//!
//! 流程顺序：
//! 1. 导航到目标对象
//! 2. 读取当前状态，已符合预期则跳过（幂等）
//! 3. 取回表单页面 → 合成 → 提交 → 检查结果
//!
//! 不做重试，不处理会话过期；这些由编排层负责。

use crate::error::{NavigationError, Result};
use crate::forms::Mutation;
use crate::models::{PlanStep, StepAction, TestSnapshot};
use crate::navigator::{Navigator, ObjectKind, ObjectPath, ObjectRef};
use crate::page::TestTab;
use crate::services::{Applied, TestService};
use crate::session::Session;
use crate::workflow::step_ctx::StepCtx;
use tracing::info;

/// 一次成功尝试的效果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEffect {
    /// 向门户提交了修改
    Changed,
    /// 已是期望状态，没有提交
    Unchanged,
}

impl From<Applied> for StepEffect {
    fn from(applied: Applied) -> Self {
        if applied.is_changed() {
            StepEffect::Changed
        } else {
            StepEffect::Unchanged
        }
    }
}

/// 步骤执行流程
///
/// - 把 `StepAction` 翻译成对测验服务的调用
/// - 不持有会话，会话由编排层传入
pub struct StepFlow {
    navigator: Navigator,
    tests: TestService,
}

impl StepFlow {
    pub fn new(navigator: Navigator) -> Self {
        Self {
            tests: TestService::new(navigator.manager().clone()),
            navigator,
        }
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    /// 执行步骤的一次尝试
    pub async fn attempt(
        &self,
        session: &mut Session,
        step: &PlanStep,
        ctx: &StepCtx,
    ) -> Result<StepEffect> {
        match &step.action {
            StepAction::EnsureTest { title, description } => {
                let folder = self.navigator.resolve(session, &step.target).await?;
                if !folder.kind.is_container() {
                    return Err(NavigationError::WrongKind {
                        path: folder.path.to_string(),
                        expected: "container".to_string(),
                        actual: folder.kind.to_string(),
                    }
                    .into());
                }
                match self.tests.find_test(session, &folder, title).await? {
                    Some(test) => {
                        info!("{} ✓ 测验已存在: {}", ctx, test);
                        Ok(StepEffect::Unchanged)
                    }
                    None => {
                        self.tests
                            .create_test(session, &folder, title, description)
                            .await?;
                        info!("{} ✓ 测验 '{}' 已创建", ctx, title);
                        Ok(StepEffect::Changed)
                    }
                }
            }

            StepAction::ConfigureTest { tab, mutation } => {
                let test = self.resolve_test(session, &step.target).await?;
                let applied = self.tests.configure(session, &test, *tab, mutation).await?;
                if let Applied::Changed(changes) = &applied {
                    info!("{} ✓ 修改了 {} 个字段", ctx, changes.len());
                }
                Ok(applied.into())
            }

            StepAction::SetOnline { online } => {
                let test = self.resolve_test(session, &step.target).await?;
                let mutation = Mutation::new()
                    .set("online", *online)
                    .submit_with("cmd[saveForm]");
                let applied = self
                    .tests
                    .configure(session, &test, TestTab::Settings, &mutation)
                    .await?;
                Ok(applied.into())
            }

            StepAction::AddQuestion { question } => {
                let test = self.resolve_test(session, &step.target).await?;
                let page = self.tests.questions_page(session, &test).await?;
                let existing = page
                    .question_rows
                    .as_deref()
                    .unwrap_or_default()
                    .iter()
                    .find(|row| row.title == question.title);
                if let Some(row) = existing {
                    info!("{} ✓ 题目 '{}' 已存在，核对内容", ctx, question.title);
                    let applied = self.tests.complete_question(session, row, question).await?;
                    return Ok(applied.into());
                }
                self.tests.add_question(session, &page, question).await?;
                Ok(StepEffect::Changed)
            }

            StepAction::ReorderQuestions { titles } => {
                let test = self.resolve_test(session, &step.target).await?;
                let applied = self.tests.reorder_questions(session, &test, titles).await?;
                Ok(applied.into())
            }

            StepAction::EndAllPasses => {
                let test = self.resolve_test(session, &step.target).await?;
                let applied = self.tests.end_all_passes(session, &test).await?;
                Ok(applied.into())
            }
        }
    }

    /// 导出测验快照
    pub async fn snapshot_test(
        &self,
        session: &mut Session,
        path: &ObjectPath,
    ) -> Result<TestSnapshot> {
        let test = self.resolve_test(session, path).await?;
        self.tests.snapshot(session, &test).await
    }

    async fn resolve_test(&self, session: &mut Session, path: &ObjectPath) -> Result<ObjectRef> {
        let root = self.navigator.root(session);
        self.navigator
            .resolve_kind(session, &root, path, ObjectKind::Test)
            .await
    }
}
