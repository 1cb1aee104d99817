//! 流程层（Workflow）
//!
//! 定义"一个步骤"的一次尝试：导航 → 读取状态 → 合成 → 提交 → 检查。
//! 重试与会话恢复由编排层负责。

pub mod step_ctx;
pub mod step_flow;

pub use step_ctx::StepCtx;
pub use step_flow::{StepEffect, StepFlow};
