//! 测验快照
//!
//! 测验设置和题目的只读导出，格式与计划文件的 `[[tests]]` 兼容，
//! 可以直接作为新计划的起点。

use super::plan_file::FieldInput;
use super::question::QuestionSpec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSnapshot {
    pub title: String,
    /// 测验在仓库中的路径
    pub path: String,
    /// 题目（按测验中的顺序），页面设计只含文本块
    pub questions: Vec<QuestionSpec>,
    /// 设置页上可编辑字段的当前值
    pub settings: BTreeMap<String, FieldInput>,
}

impl TestSnapshot {
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChoiceAnswer, PageBlock, QuestionBody};

    #[test]
    fn test_snapshot_roundtrips_through_toml() {
        let mut settings = BTreeMap::new();
        settings.insert("online".to_string(), FieldInput::Flag(true));
        settings.insert("title".to_string(), FieldInput::Text("Midterm".into()));
        let snapshot = TestSnapshot {
            title: "Midterm".into(),
            path: "Kurs/Tests/Midterm".into(),
            questions: vec![QuestionSpec {
                title: "Frage Eins".into(),
                author: "tutor".into(),
                summary: String::new(),
                question: "<p>Frage Eins?</p>".into(),
                page_design: vec![PageBlock::Text {
                    text: "<p>Hinweis</p>".into(),
                }],
                body: QuestionBody::MultipleChoice {
                    answers: vec![ChoiceAnswer {
                        answer: "Ja".into(),
                        points: 1.5,
                        points_unchecked: 0.0,
                    }],
                    shuffle: true,
                    selection_limit: None,
                },
            }],
            settings,
        };
        let text = snapshot.to_toml().unwrap();
        assert!(text.contains("online = true"));
        assert!(text.contains("type = \"multiple_choice\""));
        let back: TestSnapshot = toml::from_str(&text).unwrap();
        assert_eq!(back, snapshot);
    }
}
