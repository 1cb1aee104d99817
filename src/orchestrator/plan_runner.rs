//! 单个计划执行器 - 编排层
//!
//! ## 职责
//!
//! 1. **顺序执行**：计划中的步骤严格按顺序执行，失败即停止
//! 2. **状态机**：每个步骤 `Pending → InFlight → {Succeeded, RetryScheduled, Failed}`
//! 3. **重试**：会话过期时重新登录并重试一次；网络错误按退避策略有限次重试
//! 4. **取消**：在步骤之间和退避等待期间检查，从不打断正在进行的提交
//! 5. **报告**：总是返回 `ActionReport`，不抛出错误

use super::retry::RetryPolicy;
use crate::error::{AppError, AuthError};
use crate::models::{
    ActionPlan, ActionReport, FailureCause, PlanStep, StepOutcome, StepRecord, StepState,
};
use crate::navigator::Navigator;
use crate::session::{Session, SessionManager};
use crate::workflow::{StepCtx, StepEffect, StepFlow};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 一次失败之后的处理
enum Next {
    /// 立即重试（重新登录之后）
    RetryNow,
    /// 等待后重试
    RetryAfter(Duration),
    Fail(AppError),
}

pub struct PlanRunner {
    manager: SessionManager,
    flow: StepFlow,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl PlanRunner {
    pub fn new(navigator: Navigator, retry: RetryPolicy, cancel: CancellationToken) -> Self {
        Self {
            manager: navigator.manager().clone(),
            flow: StepFlow::new(navigator),
            retry,
            cancel,
        }
    }

    pub fn flow(&self) -> &StepFlow {
        &self.flow
    }

    /// 执行计划
    ///
    /// 计划独占传入的会话直到结束。
    pub async fn run(
        &self,
        session: &mut Session,
        plan: &ActionPlan,
        plan_index: usize,
    ) -> ActionReport {
        log_plan_start(plan_index, plan);
        let total = plan.steps.len();
        let mut records = Vec::with_capacity(total);
        let mut first_failure: Option<FailureCause> = None;
        let mut changed = 0usize;

        for (i, step) in plan.steps.iter().enumerate() {
            let ctx = StepCtx::new(&plan.name, plan_index, i + 1, total, &plan.account);

            if first_failure.is_some() {
                records.push(not_attempted(i + 1, step));
                continue;
            }
            if self.cancel.is_cancelled() {
                warn!("{} ⏹️ 运行已取消，剩余步骤不再执行", ctx);
                first_failure = Some(FailureCause::from_error(
                    i + 1,
                    step.target.to_string(),
                    &AppError::Cancelled,
                ));
                records.push(not_attempted(i + 1, step));
                continue;
            }

            let (record, effect) = self.run_step(session, step, &ctx).await;
            if effect == Some(StepEffect::Changed) {
                changed += 1;
            }
            if record.outcome == StepOutcome::Failed {
                first_failure = record.cause.clone();
            }
            records.push(record);
        }

        let report = ActionReport {
            plan: plan.name.clone(),
            account: plan.account.clone(),
            steps: records,
            overall_success: first_failure.is_none(),
            first_failure,
        };
        log_plan_complete(plan_index, &report, changed);
        report
    }

    /// 执行单个步骤直到成功或失败
    async fn run_step(
        &self,
        session: &mut Session,
        step: &PlanStep,
        ctx: &StepCtx,
    ) -> (StepRecord, Option<StepEffect>) {
        info!("{} ▶️ {} ({})", ctx, step.action.describe(), step.target);
        let mut state = StepState::Pending;
        let mut attempts = 0u32;
        let mut network_failures = 0u32;
        let mut reauthenticated = false;

        loop {
            transition(&mut state, StepState::InFlight, ctx);
            attempts += 1;

            let result = match self.manager.ensure_valid(session).await {
                Ok(()) => self.flow.attempt(session, step, ctx).await,
                Err(e) => Err(e),
            };

            let err = match result {
                Ok(effect) => {
                    transition(&mut state, StepState::Succeeded, ctx);
                    let outcome = if attempts > 1 {
                        StepOutcome::Retried
                    } else {
                        StepOutcome::Succeeded
                    };
                    if effect == StepEffect::Unchanged {
                        debug!("{} 已是期望状态", ctx);
                    }
                    info!("{} ✓ {}", ctx, outcome);
                    return (record(ctx.step_index, step, outcome, attempts, None), Some(effect));
                }
                Err(e) => e,
            };

            let next = match err {
                AppError::SessionExpired { .. } if !reauthenticated => {
                    reauthenticated = true;
                    warn!("{} ⚠️ 会话已过期，重新登录后重试", ctx);
                    match self.manager.reauthenticate(session).await {
                        Ok(()) => Next::RetryNow,
                        Err(auth) => Next::Fail(auth),
                    }
                }
                AppError::SessionExpired { url } => {
                    Next::Fail(AuthError::SessionExpiredRepeatedly { url }.into())
                }
                e @ AppError::Network(_) => {
                    network_failures += 1;
                    if self.retry.allows_retry(network_failures) {
                        let delay = self.retry.delay_for(network_failures);
                        warn!(
                            "{} ⚠️ 网络错误 (第 {}/{} 次): {}，{:?} 后重试",
                            ctx, network_failures, self.retry.max_attempts, e, delay
                        );
                        Next::RetryAfter(delay)
                    } else {
                        Next::Fail(e)
                    }
                }
                other => Next::Fail(other),
            };

            match next {
                Next::RetryNow => transition(&mut state, StepState::RetryScheduled, ctx),
                Next::RetryAfter(delay) => {
                    transition(&mut state, StepState::RetryScheduled, ctx);
                    if !self.backoff(delay).await {
                        transition(&mut state, StepState::Failed, ctx);
                        warn!("{} ⏹️ 等待重试期间运行被取消", ctx);
                        let cause = FailureCause::from_error(
                            ctx.step_index,
                            step.target.to_string(),
                            &AppError::Cancelled,
                        );
                        return (
                            record(ctx.step_index, step, StepOutcome::Failed, attempts, Some(cause)),
                            None,
                        );
                    }
                }
                Next::Fail(e) => {
                    transition(&mut state, StepState::Failed, ctx);
                    error!("{} ❌ 步骤失败 (共尝试 {} 次): {}", ctx, attempts, e);
                    let cause =
                        FailureCause::from_error(ctx.step_index, step.target.to_string(), &e);
                    return (
                        record(ctx.step_index, step, StepOutcome::Failed, attempts, Some(cause)),
                        None,
                    );
                }
            }
        }
    }

    /// 等待退避时间；期间被取消则返回 false
    async fn backoff(&self, delay: Duration) -> bool {
        if delay.is_zero() {
            return !self.cancel.is_cancelled();
        }
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

fn transition(state: &mut StepState, next: StepState, ctx: &StepCtx) {
    debug_assert!(
        state.can_transition_to(next),
        "非法状态转换 {:?} → {:?}",
        state,
        next
    );
    debug!("{} 状态 {:?} → {:?}", ctx, state, next);
    *state = next;
}

fn record(
    index: usize,
    step: &PlanStep,
    outcome: StepOutcome,
    attempts: u32,
    cause: Option<FailureCause>,
) -> StepRecord {
    StepRecord {
        index,
        action: step.action.describe(),
        target: step.target.to_string(),
        outcome,
        attempts,
        cause,
    }
}

fn not_attempted(index: usize, step: &PlanStep) -> StepRecord {
    record(index, step, StepOutcome::NotAttempted, 0, None)
}

// ========== 日志辅助函数 ==========

fn log_plan_start(plan_index: usize, plan: &ActionPlan) {
    info!("\n{}", "=".repeat(60));
    info!("[计划 {}] 📋 {}", plan_index, plan.name);
    info!("[计划 {}] 👤 账号: {}", plan_index, plan.account);
    info!("[计划 {}] 📊 共 {} 个步骤", plan_index, plan.steps.len());
    info!("{}", "=".repeat(60));
}

fn log_plan_complete(plan_index: usize, report: &ActionReport, changed: usize) {
    info!("\n{}", "─".repeat(60));
    if report.overall_success {
        info!(
            "[计划 {}] ✅ 完成: {}/{} 个步骤成功，{} 个步骤修改了门户",
            plan_index,
            report.succeeded_steps(),
            report.steps.len(),
            changed
        );
    } else {
        error!("[计划 {}] ❌ {}", plan_index, report.summary());
    }
    info!("{}", "─".repeat(60));
}
