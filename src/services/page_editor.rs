//! 页面编辑器服务 - 业务能力层
//!
//! 通过门户页面编辑器的 JSON 接口向题目页面插入文本块。

use crate::error::{PortalError, Result};
use crate::page::PageModel;
use crate::session::{Session, SessionManager};
use rand::Rng;
use serde_json::{json, Value as JsonValue};
use tracing::debug;

/// 段落 ID 的位数
const PCID_DIGITS: usize = 20;

pub struct PageEditor {
    manager: SessionManager,
}

impl PageEditor {
    pub fn new(manager: SessionManager) -> Self {
        Self { manager }
    }

    /// 依次插入文本块，第一块插在 `after` 之后（`None` 为页首），其余块接在上一块之后；
    /// 返回新块的 ID
    pub async fn insert_text_blocks<'b>(
        &self,
        session: &mut Session,
        design_page: &PageModel,
        after: Option<&str>,
        blocks: impl IntoIterator<Item = &'b str>,
    ) -> Result<Vec<String>> {
        let endpoint = design_page.editor()?.endpoint.clone();
        let mut inserted: Vec<String> = Vec::new();

        for text in blocks {
            let after = inserted
                .last()
                .map(String::as_str)
                .or(after)
                .unwrap_or_default()
                .to_string();
            let pcid = new_pcid();
            debug!("插入文本块 {} (在 '{}' 之后)", pcid, after);
            let reply = self
                .manager
                .post_json(session, &endpoint, &paragraph_insert(&after, &pcid, text))
                .await?;
            check_reply(&reply)?;
            inserted.push(pcid);
        }
        Ok(inserted)
    }
}

/// 插入段落的请求体
pub fn paragraph_insert(after_pcid: &str, pcid: &str, content: &str) -> JsonValue {
    json!({
        "component": "Paragraph",
        "action": "insert",
        "data": {
            "after_pcid": after_pcid,
            "pcid": pcid,
            "content": content,
            "characteristic": "Standard",
            "fromPlaceholder": false,
        }
    })
}

/// 随机生成段落 ID
pub fn new_pcid() -> String {
    let mut rng = rand::thread_rng();
    (0..PCID_DIGITS)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// 回复中 `error` 非空即失败
fn check_reply(reply: &JsonValue) -> Result<()> {
    let message = match reply.get("error") {
        None | Some(JsonValue::Null) => return Ok(()),
        Some(JsonValue::Bool(false)) => return Ok(()),
        Some(JsonValue::String(s)) if s.is_empty() => return Ok(()),
        Some(JsonValue::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    Err(PortalError::EditorRejected { message }.into())
}
