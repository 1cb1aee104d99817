//! 编码完成、可直接发送的提交内容

use crate::page::{FormEncoding, HttpMethod};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadValue {
    Text(String),
    File { filename: String, content: Vec<u8> },
}

impl PayloadValue {
    pub fn empty_file() -> Self {
        PayloadValue::File {
            filename: String::new(),
            content: Vec::new(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PayloadValue::Text(t) => Some(t),
            PayloadValue::File { .. } => None,
        }
    }
}

/// 表单提交内容
///
/// 字段顺序与页面中的顺序一致，附加字段在后，提交按钮最后。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionPayload {
    pub url: String,
    pub method: HttpMethod,
    pub encoding: FormEncoding,
    pub fields: Vec<(String, PayloadValue)>,
}

impl SubmissionPayload {
    /// 第一个同名文本值
    pub fn value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_text())
    }

    /// 所有同名文本值
    pub fn values(&self, name: &str) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(n, _)| n == name)
            .filter_map(|(_, v)| v.as_text())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|(n, _)| n == name)
    }

    /// 提交中携带的防伪令牌：令牌类字段以及 URL 上的 `rtoken`
    pub fn anti_forgery(&self) -> Vec<(String, String)> {
        let mut tokens: Vec<(String, String)> = self
            .fields
            .iter()
            .filter(|(n, _)| is_token_name(n))
            .filter_map(|(n, v)| Some((n.clone(), v.as_text()?.to_string())))
            .collect();
        if let Ok(url) = url::Url::parse(&self.url) {
            tokens.extend(
                url.query_pairs()
                    .filter(|(k, _)| k == "rtoken")
                    .map(|(k, v)| (format!("url:{}", k), v.into_owned())),
            );
        }
        tokens
    }

    /// 文本形式的键值对（文件字段为空串）
    pub fn text_pairs(&self) -> Vec<(String, String)> {
        self.fields
            .iter()
            .map(|(n, v)| {
                let text = match v {
                    PayloadValue::Text(t) => t.clone(),
                    PayloadValue::File { filename, .. } => filename.clone(),
                };
                (n.clone(), text)
            })
            .collect()
    }
}

pub(crate) fn is_token_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.contains("token") || lower.contains("csrf") || lower == "ilfilehash"
}
