//! 题目定义
//!
//! 计划文件中 `[[tests.questions]]` 的结构，以及它到门户表单字段的映射。

use crate::error::{AppError, PageShapeError, Result};
use crate::forms::{DesiredValue, Mutation};
use crate::page::FormModel;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::str::FromStr;

/// 上传题默认的文件大小上限（2 MiB）
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 2 * 1024 * 1024;

/// 单个题目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionSpec {
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub summary: String,
    /// 题干（HTML）
    #[serde(default, alias = "question_html")]
    pub question: String,
    /// 页面设计中追加的文本块（HTML）
    #[serde(default)]
    pub page_design: Vec<PageBlock>,
    #[serde(flatten)]
    pub body: QuestionBody,
}

/// 页面设计块，只支持文本；代码块和图片不在计划文件中表示
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PageBlock {
    Text { text: String },
}

/// 题型及其专有字段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionBody {
    SingleChoice {
        answers: Vec<ChoiceAnswer>,
        #[serde(default)]
        shuffle: bool,
    },
    MultipleChoice {
        answers: Vec<ChoiceAnswer>,
        #[serde(default)]
        shuffle: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selection_limit: Option<u32>,
    },
    FreeformText {
        points: f64,
    },
    FileUpload {
        points: f64,
        #[serde(default, alias = "allowed_filetypes")]
        allowed_extensions: Vec<String>,
        #[serde(default = "default_max_size", alias = "max_bytes")]
        max_size_bytes: u64,
    },
}

fn default_max_size() -> u64 {
    DEFAULT_MAX_UPLOAD_BYTES
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceAnswer {
    pub answer: String,
    pub points: f64,
    /// 多选题中未勾选该项的得分
    #[serde(default)]
    pub points_unchecked: f64,
}

impl QuestionBody {
    /// 门户的题型编号（创建表单中的 `qtype`）
    pub fn type_code(&self) -> u32 {
        match self {
            QuestionBody::SingleChoice { .. } => 1,
            QuestionBody::MultipleChoice { .. } => 2,
            QuestionBody::FreeformText { .. } => 8,
            QuestionBody::FileUpload { .. } => 14,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            QuestionBody::SingleChoice { .. } => "单选题",
            QuestionBody::MultipleChoice { .. } => "多选题",
            QuestionBody::FreeformText { .. } => "问答题",
            QuestionBody::FileUpload { .. } => "文件上传题",
        }
    }
}

impl QuestionSpec {
    /// 创建题目表单（选择题型）的修改
    pub fn creation_mutation(&self) -> Mutation {
        Mutation::new()
            .set("qtype", self.body.type_code().to_string())
            .set_extra("add_quest_cont_edit_mode", "default")
            .set_extra("usage", "1")
            .set_extra("position", "0")
            .submit_with("cmd[executeCreateQuestion]")
    }

    /// 题目编辑表单的修改
    pub fn edit_mutation(&self) -> Mutation {
        let base = Mutation::new()
            .set("title", self.title.as_str())
            .set_if_present("author", self.author.as_str())
            .set_if_present("comment", self.summary.as_str())
            .set_if_present("lifecycle", "draft")
            .set("question", self.question.as_str())
            .submit_with("cmd[saveReturn]");

        match &self.body {
            QuestionBody::SingleChoice { answers, shuffle } => {
                choice_rows(base, answers, false).set_extra("shuffle", *shuffle)
            }
            QuestionBody::MultipleChoice {
                answers,
                shuffle,
                selection_limit,
            } => {
                let mutation = choice_rows(base, answers, true).set_extra("shuffle", *shuffle);
                match selection_limit {
                    Some(limit) => mutation.set_if_present("selection_limit", limit.to_string()),
                    None => mutation,
                }
            }
            QuestionBody::FreeformText { points } => base
                .set_extra("scoring_mode", "non")
                .set_extra("non_keyword_points", points.to_string())
                .set_extra("all_keyword_points", points.to_string())
                .set_extra("one_keyword_points", points.to_string()),
            QuestionBody::FileUpload {
                points,
                allowed_extensions,
                max_size_bytes,
            } => base
                .set_extra("allowedextensions", allowed_extensions.join(","))
                .set_extra("maxsize", max_size_bytes.to_string())
                .set_extra("points", points.to_string()),
        }
    }

    /// 页面设计中的文本块
    pub fn text_blocks(&self) -> impl Iterator<Item = &str> {
        self.page_design.iter().map(|block| match block {
            PageBlock::Text { text } => text.as_str(),
        })
    }
}

/// 编辑页地址中的题型类名
const TYPE_CLASSES: &[(&str, u32)] = &[
    ("asssinglechoicegui", 1),
    ("assmultiplechoicegui", 2),
    ("asstextquestiongui", 8),
    ("assfileuploadgui", 14),
];

impl QuestionSpec {
    /// 从题目编辑表单还原题目定义
    ///
    /// 题型由编辑页地址中的 GUI 类名决定；`page_design` 由调用方从页面编辑器读取。
    pub fn from_edit_form(
        url: &str,
        form: &FormModel,
        page_design: Vec<PageBlock>,
    ) -> Result<Self> {
        let lower = url.to_ascii_lowercase();
        let type_code = TYPE_CLASSES
            .iter()
            .find(|(class, _)| lower.contains(class))
            .map(|(_, code)| *code)
            .ok_or_else(|| PageShapeError::MalformedElement {
                url: url.to_string(),
                what: "题型 (编辑页地址中没有已知的题型类名)".to_string(),
            })?;
        let reader = FormReader { url, form };

        let body = match type_code {
            1 => QuestionBody::SingleChoice {
                answers: reader.answers(false)?,
                shuffle: reader.checked("shuffle"),
            },
            2 => QuestionBody::MultipleChoice {
                answers: reader.answers(true)?,
                shuffle: reader.checked("shuffle"),
                selection_limit: reader.number("selection_limit")?,
            },
            8 => QuestionBody::FreeformText {
                points: reader.required("non_keyword_points")?,
            },
            _ => QuestionBody::FileUpload {
                points: reader.required("points")?,
                allowed_extensions: reader
                    .text("allowedextensions")
                    .split(',')
                    .map(str::trim)
                    .filter(|e| !e.is_empty())
                    .map(String::from)
                    .collect(),
                max_size_bytes: reader
                    .number("maxsize")?
                    .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            },
        };

        Ok(Self {
            title: reader.text("title"),
            author: reader.text("author"),
            summary: reader.text("comment"),
            question: reader.text("question"),
            page_design,
            body,
        })
    }
}

struct FormReader<'f> {
    url: &'f str,
    form: &'f FormModel,
}

impl FormReader<'_> {
    fn text(&self, name: &str) -> String {
        self.form
            .field(name)
            .and_then(|f| f.value())
            .unwrap_or_default()
            .trim()
            .to_string()
    }

    fn checked(&self, name: &str) -> bool {
        self.form.field(name).is_some_and(|f| f.is_checked())
    }

    /// 空值或字段不存在时为 `None`
    fn number<T: FromStr>(&self, name: &str) -> Result<Option<T>> {
        let raw = self.text(name).replace(',', ".");
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse().map(Some).map_err(|_| {
            PageShapeError::MalformedElement {
                url: self.url.to_string(),
                what: format!("数值字段 '{}' ({})", name, raw),
            }
            .into()
        })
    }

    fn required(&self, name: &str) -> Result<f64> {
        self.number(name)?
            .ok_or_else(|| AppError::missing(self.url, format!("字段 '{}'", name)))
    }

    fn answers(&self, unchecked: bool) -> Result<Vec<ChoiceAnswer>> {
        let mut answers = Vec::new();
        for i in 0.. {
            if self.form.field(&format!("choice[answer][{}]", i)).is_none() {
                break;
            }
            answers.push(ChoiceAnswer {
                answer: self.text(&format!("choice[answer][{}]", i)),
                points: self.number(&format!("choice[points][{}]", i))?.unwrap_or(0.0),
                points_unchecked: if unchecked {
                    self.number(&format!("choice[points_unchecked][{}]", i))?
                        .unwrap_or(0.0)
                } else {
                    0.0
                },
            });
        }
        Ok(answers)
    }
}

/// 答案行：页面上已有的行直接覆盖，多出的行按第 0 行的字段类型附加
fn choice_rows(mut mutation: Mutation, answers: &[ChoiceAnswer], unchecked: bool) -> Mutation {
    for (i, answer) in answers.iter().enumerate() {
        mutation = mutation
            .set_row(
                format!("choice[answer][{}]", i),
                "choice[answer][0]",
                answer.answer.as_str(),
            )
            .set_default(format!("choice[answer_id][{}]", i), "-1")
            .set_default(format!("choice[image][{}]", i), DesiredValue::EmptyFile)
            .set_row(
                format!("choice[points][{}]", i),
                "choice[points][0]",
                answer.points.to_string(),
            );
        if unchecked {
            mutation = mutation.set_row(
                format!("choice[points_unchecked][{}]", i),
                "choice[points_unchecked][0]",
                answer.points_unchecked.to_string(),
            );
        }
    }
    mutation
        .set_default("types", "0")
        .set_default("thumb_size", "150")
}

impl Display for QuestionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.body.name(), self.title)
    }
}
