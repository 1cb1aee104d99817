//! 页面模型提取层
//!
//! - `html` - 基于 scraper 的 HTML 解析辅助
//! - `model` - 类型化的页面模型（表单、字段、链接、提示、标签页）
//! - `extract` - 原始 HTML → `PageModel`

pub mod extract;
pub mod html;
pub mod model;

pub use extract::extract;
pub use model::{
    Alert, AlertKind, ButtonDescriptor, ChildItem, ContentBlock, ContentKind, EditorInit,
    FieldConstraints, FieldDescriptor, FieldKind, FormEncoding, FormLocator, FormModel, HttpMethod,
    Link, PageAction, PageModel, QuestionRow, SelectOption, Tab, TestTab,
};
