//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和流程调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批量计划处理器
//! - 管理应用生命周期（初始化、运行、统计）
//! - 批量加载计划文件（Vec<PlanFile>）
//! - 按账号分组，控制并发会话数量（Semaphore）
//! - 展开通配路径
//! - 写日志文件和失败文件
//!
//! ### `plan_runner` - 单个计划执行器
//! - 顺序执行计划中的步骤
//! - 步骤状态机、会话过期重新登录、网络错误退避重试
//! - 响应取消信号
//! - 生成 ActionReport
//!
//! ### `retry` - 重试策略
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<PlanFile>，每个账号一个会话)
//!     ↓
//! plan_runner (处理 Vec<PlanStep>)
//!     ↓
//! workflow::StepFlow (处理单个 PlanStep 的一次尝试)
//!     ↓
//! services / navigator (能力层)
//!     ↓
//! session → infrastructure (Transport)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：batch_processor 管批量，plan_runner 管单个计划
//! 2. **资源隔离**：只有编排层创建传输层和会话
//! 3. **向下依赖**：编排层 → workflow → services → session → infrastructure
//! 4. **无业务逻辑**：只做调度、重试和统计

pub mod batch_processor;
pub mod plan_runner;
pub mod retry;

// 重新导出主要类型
pub use batch_processor::{App, RunSummary, TransportFactory};
pub use plan_runner::PlanRunner;
pub use retry::RetryPolicy;
