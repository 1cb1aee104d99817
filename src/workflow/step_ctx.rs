//! 步骤上下文
//!
//! 封装"我正在执行哪个计划的第几步"这一信息

use std::fmt::Display;

/// 步骤上下文
#[derive(Debug, Clone)]
pub struct StepCtx {
    /// 计划名称
    pub plan_name: String,

    /// 计划序号（仅用于日志显示）
    pub plan_index: usize,

    /// 步骤在计划中的序号（从1开始）
    pub step_index: usize,

    pub total_steps: usize,

    pub account: String,
}

impl StepCtx {
    pub fn new(
        plan_name: impl Into<String>,
        plan_index: usize,
        step_index: usize,
        total_steps: usize,
        account: impl Into<String>,
    ) -> Self {
        Self {
            plan_name: plan_name.into(),
            plan_index,
            step_index,
            total_steps,
            account: account.into(),
        }
    }
}

impl Display for StepCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[计划 {} 步骤 {}/{} 账号 {}]",
            self.plan_index, self.step_index, self.total_steps, self.account
        )
    }
}
