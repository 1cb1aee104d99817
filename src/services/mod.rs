//! 业务能力层（Services）
//!
//! - `TestService` - 对单个测验的操作（创建、配置、题目、结束答题、快照）
//! - `PageEditor` - 题目页面的文本块
//! - `FailureWriter` - 写失败文件

pub mod failure_writer;
pub mod page_editor;
pub mod test_service;

pub use failure_writer::FailureWriter;
pub use page_editor::PageEditor;
pub use test_service::{Applied, TestService};
