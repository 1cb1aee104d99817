//! 执行报告
//!
//! 报告总是被返回而不是作为错误抛出；退出码由报告推导。

use crate::error::{AppError, ErrorKind};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// 单个步骤的状态机
///
/// `Pending → InFlight → {Succeeded, RetryScheduled, Failed}`，
/// `RetryScheduled → InFlight`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    InFlight,
    RetryScheduled,
    Succeeded,
    Failed,
}

impl StepState {
    pub fn can_transition_to(self, next: StepState) -> bool {
        use StepState::*;
        matches!(
            (self, next),
            (Pending, InFlight)
                | (InFlight, Succeeded)
                | (InFlight, RetryScheduled)
                | (InFlight, Failed)
                | (RetryScheduled, InFlight)
                | (RetryScheduled, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, StepState::Succeeded | StepState::Failed)
    }
}

/// 步骤最终结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Succeeded,
    /// 重试后成功
    Retried,
    Failed,
    /// 前面的步骤失败或运行被取消，未执行
    NotAttempted,
}

impl Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StepOutcome::Succeeded => "成功",
            StepOutcome::Retried => "重试后成功",
            StepOutcome::Failed => "失败",
            StepOutcome::NotAttempted => "未执行",
        };
        f.write_str(text)
    }
}

/// 失败原因（步骤、对象、信息）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureCause {
    pub kind: ErrorKind,
    /// 步骤序号（从 1 开始，0 表示计划开始之前）
    pub step: usize,
    pub object: String,
    pub message: String,
}

impl FailureCause {
    pub fn from_error(step: usize, object: impl Into<String>, error: &AppError) -> Self {
        Self {
            kind: error.kind(),
            step,
            object: object.into(),
            message: error.to_string(),
        }
    }
}

impl Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "步骤 {} [{}]: {}", self.step, self.object, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub index: usize,
    pub action: String,
    pub target: String,
    pub outcome: StepOutcome,
    /// 实际发起的尝试次数
    pub attempts: u32,
    pub cause: Option<FailureCause>,
}

/// 一次计划运行的报告
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionReport {
    pub plan: String,
    pub account: String,
    pub steps: Vec<StepRecord>,
    pub overall_success: bool,
    pub first_failure: Option<FailureCause>,
}

impl ActionReport {
    /// 计划开始前就失败（登录失败、基础路径不存在等）
    pub fn aborted(plan: impl Into<String>, account: impl Into<String>, cause: FailureCause) -> Self {
        Self {
            plan: plan.into(),
            account: account.into(),
            steps: Vec::new(),
            overall_success: false,
            first_failure: Some(cause),
        }
    }

    pub fn succeeded_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, StepOutcome::Succeeded | StepOutcome::Retried))
            .count()
    }

    pub fn exit_category(&self) -> ExitCategory {
        match &self.first_failure {
            None if self.overall_success => ExitCategory::Success,
            None => ExitCategory::PortalRejected,
            Some(cause) => ExitCategory::from_kind(cause.kind),
        }
    }

    /// 可读的结果摘要
    pub fn summary(&self) -> String {
        match &self.first_failure {
            None => format!(
                "计划 '{}' 完成: {}/{} 个步骤成功",
                self.plan,
                self.succeeded_steps(),
                self.steps.len()
            ),
            Some(cause) => format!("计划 '{}' 失败: {}", self.plan, cause),
        }
    }
}

/// 进程退出分类
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitCategory {
    #[default]
    Success,
    ConfigError,
    AuthFailure,
    PortalRejected,
    UnexpectedShape,
    NetworkExhausted,
    Cancelled,
    /// 内部错误（任务异常终止）
    InternalFailure,
}

impl ExitCategory {
    pub fn from_kind(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Config | ErrorKind::File => ExitCategory::ConfigError,
            ErrorKind::Auth | ErrorKind::SessionExpired => ExitCategory::AuthFailure,
            ErrorKind::Portal | ErrorKind::UnsupportedMutation | ErrorKind::NotFound => {
                ExitCategory::PortalRejected
            }
            ErrorKind::UnexpectedPageShape => ExitCategory::UnexpectedShape,
            ErrorKind::Network => ExitCategory::NetworkExhausted,
            ErrorKind::Cancelled => ExitCategory::Cancelled,
            ErrorKind::Internal => ExitCategory::InternalFailure,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            ExitCategory::Success => 0,
            ExitCategory::ConfigError => 2,
            ExitCategory::AuthFailure => 3,
            ExitCategory::PortalRejected => 4,
            ExitCategory::UnexpectedShape => 5,
            ExitCategory::NetworkExhausted => 6,
            ExitCategory::Cancelled => 130,
            ExitCategory::InternalFailure => 1,
        }
    }

    /// 多个报告的整体分类：取第一个失败报告的分类，取消优先
    pub fn combine<'a>(reports: impl IntoIterator<Item = &'a ActionReport>) -> Self {
        let mut result = ExitCategory::Success;
        for report in reports {
            let category = report.exit_category();
            if category == ExitCategory::Cancelled {
                return category;
            }
            if result == ExitCategory::Success {
                result = category;
            }
        }
        result
    }
}
