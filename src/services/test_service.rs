//! 测验操作服务 - 业务能力层
//!
//! 只负责"对一个测验做一件事"：创建、切换标签页、提交表单、添加/排列题目、结束答题。
//! 每次提交都基于紧接着取回的页面，不复用旧页面上的令牌；不关心计划和重试。

use super::page_editor::PageEditor;
use crate::error::{NavigationError, PageShapeError, PortalError, Result};
use crate::forms::{pending_changes, synthesize_form, FieldChange, Mutation};
use crate::forms::payload::is_token_name;
use crate::models::{FieldInput, PageBlock, QuestionSpec, TestSnapshot};
use crate::navigator::{children_of, ObjectKind, ObjectRef};
use crate::page::html::fragment_text;
use crate::page::{
    ContentBlock, ContentKind, FieldKind, FormLocator, FormModel, PageModel, QuestionRow, TestTab,
};
use crate::AppError;
use crate::session::{Session, SessionManager};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// 创建测验成功后到达的设置页
const TEST_CREATED_MARKER: &str = "ilobjtestsettingsgeneralgui";
/// 结束答题成功后到达的参与者页
const PASSES_ENDED_MARKER: &str = "iltestparticipantsgui";

/// 表单修改的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// 提交了修改
    Changed(Vec<FieldChange>),
    /// 门户上的值已经符合预期，没有提交
    Unchanged,
}

impl Applied {
    pub fn is_changed(&self) -> bool {
        matches!(self, Applied::Changed(_))
    }
}

pub struct TestService {
    manager: SessionManager,
    editor: PageEditor,
}

impl TestService {
    pub fn new(manager: SessionManager) -> Self {
        Self {
            editor: PageEditor::new(manager.clone()),
            manager,
        }
    }

    /// 在容器中查找名为 `title` 的测验；重名报错
    pub async fn find_test(
        &self,
        session: &mut Session,
        folder: &ObjectRef,
        title: &str,
    ) -> Result<Option<ObjectRef>> {
        let page = self.manager.get_page(session, &folder.url).await?;
        let mut matches: Vec<ObjectRef> = children_of(folder, &page)
            .into_iter()
            .filter(|c| c.name == title && c.kind == ObjectKind::Test)
            .collect();
        match matches.len() {
            0 | 1 => Ok(matches.pop()),
            count => Err(NavigationError::Ambiguous {
                segment: title.to_string(),
                path: folder.path.to_string(),
                count,
            }
            .into()),
        }
    }

    /// 在容器中新建测验
    pub async fn create_test(
        &self,
        session: &mut Session,
        folder: &ObjectRef,
        title: &str,
        description: &str,
    ) -> Result<PageModel> {
        info!("📝 在 {} 中创建测验 '{}'", folder.path, title);
        let folder_page = self.manager.get_page(session, &folder.url).await?;
        let create_url = folder_page.test_create_url()?.to_string();
        let create_page = self.manager.get_page(session, &create_url).await?;
        let form = create_page.form(&FormLocator::button("cmd[save]"))?;
        let mutation = Mutation::new()
            .set("title", title)
            .set_if_present("desc", description)
            .submit_with("cmd[save]");
        self.submit_checked(session, form, &mutation, Some(TEST_CREATED_MARKER))
            .await
    }

    /// 打开测验的某个标签页
    pub async fn open_tab(
        &self,
        session: &mut Session,
        test: &ObjectRef,
        tab: TestTab,
    ) -> Result<PageModel> {
        let test_page = self.manager.get_page(session, &test.url).await?;
        let url = test_page.tab(tab)?.url.clone();
        debug!("打开 {} 的 {} 标签页", test.path, tab);
        self.manager.get_page(session, &url).await
    }

    /// 对标签页上的表单应用修改；值已符合预期时不提交
    pub async fn configure(
        &self,
        session: &mut Session,
        test: &ObjectRef,
        tab: TestTab,
        mutation: &Mutation,
    ) -> Result<Applied> {
        let page = self.open_tab(session, test, tab).await?;
        let form = tab_form(&page, tab, mutation)?;
        let changes = pending_changes(form, mutation)?;
        if changes.is_empty() {
            debug!("{} 的 {} 已是期望值，跳过提交", test.path, tab);
            return Ok(Applied::Unchanged);
        }
        for change in &changes {
            debug!("  {}: {:?} → {:?}", change.field, change.from, change.to);
        }
        self.submit_checked(session, form, mutation, None).await?;
        Ok(Applied::Changed(changes))
    }

    /// 题目列表页
    pub async fn questions_page(&self, session: &mut Session, test: &ObjectRef) -> Result<PageModel> {
        self.open_tab(session, test, TestTab::Questions).await
    }

    /// 创建题目：选择题型 → 编辑表单 → 页面设计文本块
    pub async fn add_question(
        &self,
        session: &mut Session,
        questions_page: &PageModel,
        question: &QuestionSpec,
    ) -> Result<()> {
        info!("➕ 添加{}", question);
        let add_url = questions_page.require_action("cmd=addQuestion")?.url.clone();
        let add_page = self.manager.get_page(session, &add_url).await?;

        let create_form = add_page.form(&FormLocator::button("cmd[executeCreateQuestion]"))?;
        let edit_page = self
            .submit_checked(session, create_form, &question.creation_mutation(), None)
            .await?;

        let edit_form = edit_page.form(&FormLocator::button("cmd[saveReturn]"))?;
        let saved = self
            .submit_checked(session, edit_form, &question.edit_mutation(), None)
            .await?;

        if question.page_design.is_empty() {
            return Ok(());
        }
        let design_page = self.manager.get_page(session, &design_url(&saved)?).await?;
        let ids = self
            .editor
            .insert_text_blocks(session, &design_page, None, question.text_blocks())
            .await?;
        debug!("插入了 {} 个文本块", ids.len());
        Ok(())
    }

    /// 补齐已存在的同名题目
    ///
    /// 上一次添加可能中途失败：编辑表单已保存，但文本块只插入了一部分。
    /// 已有文本块必须是计划文本块的前缀，否则报错且不做任何修改；
    /// 表单内容与计划不同时重新保存，然后只追加缺少的文本块。
    pub async fn complete_question(
        &self,
        session: &mut Session,
        row: &QuestionRow,
        question: &QuestionSpec,
    ) -> Result<Applied> {
        let (edit_url, design_url) = self.question_urls(session, row).await?;
        let design_page = self.manager.get_page(session, &design_url).await?;
        let existing = &design_page.editor()?.blocks;
        let missing = missing_blocks(&question.title, existing, question)?;

        let edit_page = self.manager.get_page(session, &edit_url).await?;
        let form = edit_page.form(&FormLocator::button("cmd[saveReturn]"))?;
        let current = QuestionSpec::from_edit_form(&edit_page.url, form, Vec::new())?;
        let mut changes = Vec::new();

        let differences = question_differences(&current, question, form)?;
        if !differences.is_empty() {
            info!("✏️ {} 与计划不一致 ({})，重新保存", question, differences.join(", "));
            let mutation = question.edit_mutation();
            changes.extend(pending_changes(form, &mutation)?);
            self.submit_checked(session, form, &mutation, None).await?;
        }

        if !missing.is_empty() {
            let after = existing.last().map(|b| b.pcid.as_str());
            let ids = self
                .editor
                .insert_text_blocks(session, &design_page, after, missing.clone())
                .await?;
            info!("🧩 为{}补充了 {} 个文本块", question, ids.len());
            changes.push(FieldChange {
                field: "page_design".to_string(),
                from: Vec::new(),
                to: missing.iter().map(|t| t.to_string()).collect(),
            });
        }

        if changes.is_empty() {
            Ok(Applied::Unchanged)
        } else {
            Ok(Applied::Changed(changes))
        }
    }

    /// 读取题目定义：编辑表单 + 页面设计中的文本块
    ///
    /// 代码块和图片在计划文件中没有对应结构，读到时记录警告后跳过。
    pub async fn read_question(
        &self,
        session: &mut Session,
        row: &QuestionRow,
    ) -> Result<QuestionSpec> {
        let (edit_url, design_url) = self.question_urls(session, row).await?;
        let design_page = self.manager.get_page(session, &design_url).await?;
        let mut page_design = Vec::new();
        for block in &design_page.editor()?.blocks {
            match &block.kind {
                ContentKind::Paragraph(html) => page_design.push(PageBlock::Text {
                    text: html.clone(),
                }),
                other => warn!(
                    "⚠️ 题目 '{}' 的{}块 {} 无法导出，已跳过",
                    row.title,
                    other.name(),
                    block.pcid
                ),
            }
        }
        let edit_page = self.manager.get_page(session, &edit_url).await?;
        let form = edit_page.form(&FormLocator::button("cmd[saveReturn]"))?;
        QuestionSpec::from_edit_form(&edit_page.url, form, page_design)
    }

    /// 题目预览页上的编辑地址和页面设计地址
    async fn question_urls(
        &self,
        session: &mut Session,
        row: &QuestionRow,
    ) -> Result<(String, String)> {
        let preview = self.manager.get_page(session, &row.url).await?;
        let edit_url = preview
            .link_containing("cmd=editquestion")
            .map(|l| l.url.clone())
            .or_else(|| preview.action_containing("cmd=editquestion").map(|a| a.url.clone()))
            .ok_or_else(|| AppError::missing(&preview.url, "题目编辑入口"))?;
        Ok((edit_url, design_url(&preview)?))
    }

    /// 按标题顺序提交题目排序；已按顺序时不提交
    pub async fn reorder_questions(
        &self,
        session: &mut Session,
        test: &ObjectRef,
        titles: &[String],
    ) -> Result<Applied> {
        let page = self.questions_page(session, test).await?;
        let rows = page.questions()?;
        let ordered = order_rows(rows, titles, &test.path.to_string())?;

        let current: Vec<&str> = rows
            .iter()
            .filter(|r| titles.contains(&r.title))
            .map(|r| r.title.as_str())
            .collect();
        if current == titles.iter().map(String::as_str).collect::<Vec<_>>() {
            debug!("{} 的题目已按顺序排列", test.path);
            return Ok(Applied::Unchanged);
        }

        let form = page.form(&FormLocator::button("cmd[saveOrderAndObligations]"))?;
        let mutation = ordered
            .iter()
            .enumerate()
            .fold(Mutation::new(), |m, (i, row)| {
                m.set_extra(row.order_field.as_str(), ((i + 1) * 10).to_string())
            })
            .submit_with("cmd[saveOrderAndObligations]");
        let changes = pending_changes(form, &mutation)?;
        self.submit_checked(session, form, &mutation, None).await?;
        Ok(Applied::Changed(changes))
    }

    /// 结束所有参与者的答题；门户没有提供该按钮时什么也不做
    pub async fn end_all_passes(&self, session: &mut Session, test: &ObjectRef) -> Result<Applied> {
        let dashboard = self.open_tab(session, test, TestTab::Dashboard).await?;
        let Some(action) = dashboard.action_containing("finishalluserpasses") else {
            warn!("⚠️ {} 没有结束答题按钮（可能已全部结束）", test.path);
            return Ok(Applied::Unchanged);
        };
        let url = action.url.clone();
        let confirm_page = self.manager.get_page(session, &url).await?;
        reject_on_failure(&confirm_page)?;

        let form = confirm_page.form(&FormLocator::button("cmd[confirmFinishTestPassForAllUser]"))?;
        let mutation = Mutation::new().submit_with("cmd[confirmFinishTestPassForAllUser]");
        self.submit_checked(session, form, &mutation, Some(PASSES_ENDED_MARKER))
            .await?;
        info!("⏹️ 已结束 {} 的所有答题", test.path);
        Ok(Applied::Changed(Vec::new()))
    }

    /// 读取测验设置和全部题目
    pub async fn snapshot(&self, session: &mut Session, test: &ObjectRef) -> Result<TestSnapshot> {
        let settings_page = self.open_tab(session, test, TestTab::Settings).await?;
        let form = settings_form(&settings_page)?;
        let settings = form
            .fields
            .iter()
            .filter(|f| {
                !f.constraints.disabled
                    && !is_token_name(&f.name)
                    && !matches!(f.kind, FieldKind::Hidden | FieldKind::File)
            })
            .map(|f| (f.name.clone(), field_input(f)))
            .collect::<BTreeMap<_, _>>();

        let questions_page = self.questions_page(session, test).await?;
        let mut questions = Vec::new();
        for row in questions_page.questions()? {
            debug!("读取题目 '{}'", row.title);
            questions.push(self.read_question(session, row).await?);
        }

        Ok(TestSnapshot {
            title: test.name.clone(),
            path: test.path.to_string(),
            questions,
            settings,
        })
    }

    /// 合成并提交表单，检查结果页面
    async fn submit_checked(
        &self,
        session: &mut Session,
        form: &FormModel,
        mutation: &Mutation,
        expected_marker: Option<&str>,
    ) -> Result<PageModel> {
        let payload = synthesize_form(form, mutation)?;
        debug!("提交 {} ({} 个字段)", payload.url, payload.fields.len());
        let result = self.manager.submit(session, &payload).await?;
        reject_on_failure(&result)?;
        if let Some(marker) = expected_marker {
            if !result.url_contains(marker) {
                return Err(PageShapeError::UnexpectedResult {
                    url: result.url.clone(),
                    expected: marker.to_string(),
                }
                .into());
            }
        }
        Ok(result)
    }
}

/// 页面设计入口（按钮或链接）
fn design_url(page: &PageModel) -> Result<String> {
    page.action_containing("cmdclass=ilassquestionpagegui")
        .map(|a| a.url.clone())
        .or_else(|| {
            page.link_containing("cmdclass=ilassquestionpagegui")
                .map(|l| l.url.clone())
        })
        .ok_or_else(|| AppError::missing(&page.url, "页面设计入口"))
}

fn diverged(title: &str, detail: String) -> AppError {
    PortalError::QuestionDiverged {
        title: title.to_string(),
        detail,
    }
    .into()
}

/// 门户上的题目与计划不同的部分；题型不同时无法就地修正
fn question_differences(
    current: &QuestionSpec,
    wanted: &QuestionSpec,
    form: &FormModel,
) -> Result<Vec<&'static str>> {
    if current.body.type_code() != wanted.body.type_code() {
        return Err(diverged(
            &wanted.title,
            format!("门户上是{}，计划是{}", current.body.name(), wanted.body.name()),
        ));
    }
    let mut differences = Vec::new();
    if current.title != wanted.title.trim() {
        differences.push("标题");
    }
    if form.has_field("author") && current.author != wanted.author.trim() {
        differences.push("作者");
    }
    if form.has_field("comment") && current.summary != wanted.summary.trim() {
        differences.push("简介");
    }
    if fragment_text(&current.question) != fragment_text(&wanted.question) {
        differences.push("题干");
    }
    if current.body != wanted.body {
        differences.push("答案/分数");
    }
    Ok(differences)
}

/// 计划中还没有插入的文本块；已有块必须与计划的前几块一致
fn missing_blocks<'q>(
    title: &str,
    existing: &[ContentBlock],
    wanted: &'q QuestionSpec,
) -> Result<Vec<&'q str>> {
    let wanted: Vec<&str> = wanted.text_blocks().collect();
    if existing.len() > wanted.len() {
        return Err(diverged(
            title,
            format!("门户上有 {} 个内容块，计划只有 {} 个", existing.len(), wanted.len()),
        ));
    }
    for (i, (block, text)) in existing.iter().zip(&wanted).enumerate() {
        match &block.kind {
            ContentKind::Paragraph(html) if fragment_text(html) == fragment_text(text) => {}
            other => {
                return Err(diverged(
                    title,
                    format!("第 {} 个内容块 ({}) 与计划不同", i + 1, other.name()),
                ))
            }
        }
    }
    Ok(wanted[existing.len()..].to_vec())
}

/// 页面上的错误提示 → 门户错误（原文）
fn reject_on_failure(page: &PageModel) -> Result<()> {
    if page.has_failure_alert() {
        return Err(PortalError::Rejected {
            url: page.url.clone(),
            messages: page.failure_messages().join(" "),
        }
        .into());
    }
    Ok(())
}

fn settings_form(page: &PageModel) -> Result<&FormModel> {
    page.form_any(&[
        FormLocator::button("cmd[saveForm]"),
        FormLocator::Class("il-standard-form".to_string()),
    ])
}

/// 标签页上要修改的表单：优先按指定的提交按钮查找
fn tab_form<'p>(page: &'p PageModel, tab: TestTab, mutation: &Mutation) -> Result<&'p FormModel> {
    match (&mutation.submit, tab) {
        (Some(button), _) => page.form(&FormLocator::button(button.as_str())),
        (None, TestTab::Settings) => settings_form(page),
        (None, _) => page.form_any(&[FormLocator::Class("il-standard-form".to_string())]),
    }
}

/// 按标题排列题目行；标题不存在时报错
fn order_rows<'r>(rows: &'r [QuestionRow], titles: &[String], test: &str) -> Result<Vec<&'r QuestionRow>> {
    let mut ordered = Vec::with_capacity(rows.len());
    for title in titles {
        let row = rows
            .iter()
            .find(|r| &r.title == title)
            .ok_or_else(|| NavigationError::QuestionNotFound {
                test: test.to_string(),
                title: title.clone(),
            })?;
        ordered.push(row);
    }
    // 未列出的题目保持原有相对顺序，排在后面
    ordered.extend(rows.iter().filter(|r| !titles.contains(&r.title)));
    Ok(ordered)
}

fn field_input(field: &crate::page::FieldDescriptor) -> FieldInput {
    match field.kind {
        FieldKind::Checkbox { .. } => FieldInput::Flag(field.is_checked()),
        FieldKind::MultiSelect => FieldInput::List(field.values.clone()),
        _ => FieldInput::Text(field.value().unwrap_or_default().to_string()),
    }
}
