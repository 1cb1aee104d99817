//! # ILIAS Tests
//!
//! 通过门户的 HTML 表单自动创建和配置 ILIAS 测验的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有网络资源（HTTP 客户端 + Cookie 容器），只暴露能力
//! - `Transport` - 发送 GET / 表单 / JSON 请求的 trait，测试中替换为内存门户
//!
//! ### ② 会话与页面
//! - `session/` - 登录握手、会话探测、重新认证、Cookie 持久化
//! - `page/` - 原始 HTML → 类型化的 `PageModel`
//! - `forms/` - `Mutation` + `FormModel` → `SubmissionPayload`
//! - `navigator/` - 仓库路径 → `ObjectRef`，通配展开
//!
//! ### ③ 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个测验
//! - `TestService` - 创建、配置、题目、结束答题、快照
//! - `PageEditor` - 题目页面文本块
//! - `FailureWriter` - 写失败文件
//!
//! ### ④ 流程层（Workflow）
//! - `workflow/` - 定义"一个步骤"的一次尝试
//! - `StepCtx` - 上下文封装（计划序号 + 步骤序号 + 账号）
//! - `StepFlow` - 导航 → 读取状态 → 合成 → 提交 → 检查
//!
//! ### ⑤ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 批量计划处理器，按账号管理会话和并发
//! - `orchestrator/plan_runner` - 单个计划执行器，状态机与重试
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod forms;
pub mod infrastructure;
pub mod models;
pub mod navigator;
pub mod orchestrator;
pub mod page;
pub mod services;
pub mod session;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, ErrorKind, Result};
pub use forms::{synthesize_form, Mutation, SubmissionPayload};
pub use infrastructure::{HttpTransport, RawResponse, Transport};
pub use models::{ActionPlan, ActionReport, ExitCategory, PlanFile, PlanStep, StepAction};
pub use navigator::{Navigator, ObjectPath, ObjectRef};
pub use orchestrator::{App, PlanRunner, RetryPolicy, RunSummary};
pub use page::{extract, PageModel};
pub use session::{Credentials, Session, SessionManager};
pub use workflow::{StepCtx, StepFlow};
