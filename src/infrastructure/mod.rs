//! 基础设施层（Infrastructure）
//!
//! 唯一持有网络资源（HTTP 客户端 + Cookie 容器）的层，只暴露"发请求"的能力。
//! 上层通过 `Transport` trait 使用它，测试中可替换为内存实现。

pub mod http_transport;
pub mod transport;

pub use http_transport::HttpTransport;
pub use transport::{RawResponse, Transport};
