//! 批量计划处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责批量计划的调度和会话资源管理。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：账号表、传输层工厂；日志文件在 `run` 开始时重写
//! 2. **批量加载**：扫描并加载所有计划文件（`Vec<PlanFile>`）
//! 3. **按账号分组**：同一账号的计划共用一个会话，串行执行
//! 4. **并发控制**：不同账号之间并行，使用 Semaphore 限制同时存在的会话数
//! 5. **通配展开**：`replicate` 展开为多个目标文件夹，每个文件夹一个计划
//! 6. **全局统计**：汇总所有报告，推导退出分类，写失败文件

use crate::config::Config;
use crate::error::{AppError, ConfigError};
use crate::infrastructure::{HttpTransport, Transport};
use crate::models::{
    load_accounts, load_all_plan_files, ActionReport, ExitCategory, FailureCause, PlanBuilder,
    PlanFile, TestSnapshot,
};
use crate::navigator::{Navigator, ObjectPath};
use crate::orchestrator::plan_runner::PlanRunner;
use crate::orchestrator::retry::RetryPolicy;
use crate::services::FailureWriter;
use crate::session::{Credentials, Session, SessionManager, SessionSettings};
use crate::utils::logging;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// 为账号创建独立的传输层（独立的 Cookie 容器）
pub type TransportFactory =
    Arc<dyn Fn(&Credentials) -> crate::Result<Arc<dyn Transport>> + Send + Sync>;

/// 应用主结构
pub struct App {
    config: Config,
    accounts: BTreeMap<String, Credentials>,
    transports: TransportFactory,
    cancel: CancellationToken,
}

/// 一次运行的结果
#[derive(Debug, Default)]
pub struct RunSummary {
    /// 按计划顺序排列
    pub reports: Vec<ActionReport>,
    pub exit: ExitCategory,
}

impl RunSummary {
    pub fn success(&self) -> usize {
        self.reports.iter().filter(|r| r.overall_success).count()
    }

    pub fn failed(&self) -> usize {
        self.reports.len() - self.success()
    }
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config, cancel: CancellationToken) -> Result<Self> {
        config.validate()?;

        logging::log_startup(&config.portal_base_url, config.max_concurrent_sessions);

        let mut accounts: Vec<Credentials> = config.default_credentials().into_iter().collect();
        if let Some(path) = &config.accounts_file {
            accounts.extend(load_accounts(std::path::Path::new(path)).await?);
        }
        if accounts.is_empty() {
            warn!("⚠️ 没有配置任何账号（ILIAS_USER / ILIAS_ACCOUNTS_FILE）");
        }

        let base_url = config.portal_base_url.clone();
        let timeout = config.http_timeout();
        let transports: TransportFactory = Arc::new(
            move |_credentials: &Credentials| -> crate::Result<Arc<dyn Transport>> {
                Ok(Arc::new(HttpTransport::new(&base_url, timeout)?))
            },
        );

        Ok(Self::with_transports(config, accounts, transports, cancel))
    }

    /// 使用指定的传输层工厂创建（测试中替换为内存门户）
    pub fn with_transports(
        config: Config,
        accounts: Vec<Credentials>,
        transports: TransportFactory,
        cancel: CancellationToken,
    ) -> Self {
        let accounts = accounts
            .into_iter()
            .map(|c| (c.account.clone(), c))
            .collect();
        Self {
            config,
            accounts,
            transports,
            cancel,
        }
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<RunSummary> {
        // 只有执行计划才重写日志文件，快照不动它
        logging::init_log_file(&self.config.output_log_file, &self.config.portal_base_url)?;

        // 加载所有计划
        let plans = self.load_plans().await?;

        if plans.is_empty() {
            warn!("⚠️ 没有找到待执行的计划文件，程序结束");
            return Ok(RunSummary::default());
        }

        let summary = self.run_plans(plans).await;

        // 输出最终统计
        logging::print_final_stats(
            summary.success(),
            summary.reports.len(),
            summary.exit.code(),
            &self.config.output_log_file,
            &self.config.failure_file,
        );

        Ok(summary)
    }

    /// 加载计划
    async fn load_plans(&self) -> Result<Vec<PlanFile>> {
        info!("\n📁 正在扫描计划文件...");
        load_all_plan_files(&self.config.plan_folder).await
    }

    /// 执行一组计划文件
    pub async fn run_plans(&self, plans: Vec<PlanFile>) -> RunSummary {
        let total = plans.len();

        // 按账号分组，保持文件顺序
        let mut groups: BTreeMap<String, Vec<(usize, PlanFile)>> = BTreeMap::new();
        for (idx, plan) in plans.into_iter().enumerate() {
            groups
                .entry(plan.account.clone())
                .or_default()
                .push((idx + 1, plan));
        }
        logging::log_plans_loaded(total, groups.len());

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_sessions));
        let mut handles = Vec::new();

        for (account, plans) in groups {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!("[账号 {}] 无法获取并发许可: {}", account, e);
                    break;
                }
            };
            // 任务异常终止时仍要为这些计划生成报告
            let owned: Vec<(usize, String)> = plans
                .iter()
                .map(|(index, file)| (*index, file.name.clone()))
                .collect();
            let job = AccountJob {
                credentials: self.accounts.get(&account).cloned(),
                account: account.clone(),
                plans,
                config: self.config.clone(),
                transports: self.transports.clone(),
                cancel: self.cancel.clone(),
            };
            let handle = tokio::spawn(async move {
                let _permit = permit;
                job.run().await
            });
            handles.push((account, owned, handle));
        }

        let mut indexed: Vec<(usize, ActionReport)> = Vec::new();
        let joined = futures::future::join_all(handles.into_iter().map(
            |(account, owned, handle)| async move { (account, owned, handle.await) },
        ))
        .await;
        for (account, owned, result) in joined {
            match result {
                Ok(reports) => indexed.extend(reports),
                Err(e) => {
                    error!("[账号 {}] ❌ 任务执行失败: {}", account, e);
                    let err = AppError::TaskFailed {
                        account: account.clone(),
                        reason: e.to_string(),
                    };
                    let cause = FailureCause::from_error(0, &account, &err);
                    indexed.extend(owned.into_iter().map(|(index, name)| {
                        (index, ActionReport::aborted(name, &account, cause.clone()))
                    }));
                }
            }
        }
        indexed.sort_by_key(|(index, _)| *index);
        let reports: Vec<ActionReport> = indexed.into_iter().map(|(_, r)| r).collect();

        self.record_reports(&reports);
        let exit = ExitCategory::combine(&reports);
        RunSummary { reports, exit }
    }

    /// 导出测验快照
    pub async fn snapshot(&self, account: &str, path: &ObjectPath) -> Result<TestSnapshot> {
        let credentials = self
            .accounts
            .get(account)
            .cloned()
            .with_context(|| format!("账号 '{}' 未配置", account))?;
        let manager =
            SessionManager::new(credentials.clone(), SessionSettings::from_config(&self.config))?;
        let transport = (self.transports)(&credentials)?;
        let mut session = manager.resume(transport).await?;
        let runner = PlanRunner::new(
            Navigator::new(manager, self.config.repository_root_path.clone()),
            RetryPolicy::from_config(&self.config),
            self.cancel.clone(),
        );
        let snapshot = runner.flow().snapshot_test(&mut session, path).await?;
        info!("📸 已读取 {} 的快照 ({} 道题目)", path, snapshot.questions.len());
        Ok(snapshot)
    }

    /// 写日志文件和失败文件
    fn record_reports(&self, reports: &[ActionReport]) {
        let failure_writer = FailureWriter::with_path(&self.config.failure_file);
        for report in reports {
            let text = logging::truncate_text(&report.summary(), 500);
            if let Err(e) = logging::append_log(&self.config.output_log_file, &text) {
                warn!("⚠️ 写入日志文件失败: {}", e);
            }
            if let Err(e) = failure_writer.write(report) {
                warn!("⚠️ 写入失败文件失败: {}", e);
            }
        }
    }
}

/// 一个账号的全部计划
struct AccountJob {
    account: String,
    credentials: Option<Credentials>,
    plans: Vec<(usize, PlanFile)>,
    config: Config,
    transports: TransportFactory,
    cancel: CancellationToken,
}

impl AccountJob {
    async fn run(self) -> Vec<(usize, ActionReport)> {
        logging::log_account_start(&self.account, self.plans.len());

        let (manager, mut session) = match self.open_session().await {
            Ok(opened) => opened,
            Err(e) => {
                error!("[账号 {}] ❌ 无法建立会话: {}", self.account, e);
                let cause = FailureCause::from_error(0, &self.account, &e);
                return self
                    .plans
                    .iter()
                    .map(|(index, file)| {
                        (
                            *index,
                            ActionReport::aborted(&file.name, &self.account, cause.clone()),
                        )
                    })
                    .collect();
            }
        };

        let navigator = Navigator::new(manager.clone(), self.config.repository_root_path.clone());
        let runner = PlanRunner::new(
            navigator.clone(),
            RetryPolicy::from_config(&self.config),
            self.cancel.clone(),
        );

        let mut reports = Vec::new();
        for (index, file) in &self.plans {
            if self.cancel.is_cancelled() {
                let cause = FailureCause::from_error(0, &file.name, &AppError::Cancelled);
                reports.push((*index, ActionReport::aborted(&file.name, &self.account, cause)));
                continue;
            }
            let builder = PlanBuilder::new(file);
            let targets = match self
                .expand_targets(&manager, &navigator, &mut session, &builder)
                .await
            {
                Ok(targets) => targets,
                Err(e) => {
                    error!("[计划 {}] ❌ 无法确定目标文件夹: {}", index, e);
                    let cause = FailureCause::from_error(0, &file.base, &e);
                    reports.push((*index, ActionReport::aborted(&file.name, &self.account, cause)));
                    continue;
                }
            };
            if targets.is_empty() {
                warn!("[计划 {}] ⚠️ '{}' 没有匹配的目标文件夹", index, file.name);
            }
            for folder in targets {
                let report = match builder.build(&folder) {
                    Ok(plan) => runner.run(&mut session, &plan, *index).await,
                    Err(e) => ActionReport::aborted(
                        &file.name,
                        &self.account,
                        FailureCause::from_error(0, folder.to_string(), &e),
                    ),
                };
                reports.push((*index, report));
            }
        }

        if self.config.logout_after_run {
            if let Err(e) = manager.logout(&mut session).await {
                warn!("[账号 {}] ⚠️ 退出登录失败: {}", self.account, e);
            }
        }

        let success = reports.iter().filter(|(_, r)| r.overall_success).count();
        logging::log_account_complete(&self.account, success, reports.len());
        reports
    }

    async fn open_session(&self) -> crate::Result<(SessionManager, Session)> {
        let credentials = self.credentials.clone().ok_or_else(|| ConfigError::InvalidValue {
            field: "account".to_string(),
            value: self.account.clone(),
            reason: "账号未配置".to_string(),
        })?;
        let transport = (self.transports)(&credentials)?;
        let manager = SessionManager::new(credentials, SessionSettings::from_config(&self.config))?;
        let session = manager.resume(transport).await?;
        Ok((manager, session))
    }

    /// 计划的目标文件夹：基础路径，或其下匹配通配路径的所有文件夹
    async fn expand_targets(
        &self,
        manager: &SessionManager,
        navigator: &Navigator,
        session: &mut Session,
        builder: &PlanBuilder<'_>,
    ) -> crate::Result<Vec<ObjectPath>> {
        let Some(pattern) = builder.replicate_pattern() else {
            return Ok(vec![builder.base_path()]);
        };
        manager.ensure_valid(session).await?;
        let base = match navigator.resolve(session, &builder.base_path()).await {
            Err(AppError::SessionExpired { .. }) => {
                manager.reauthenticate(session).await?;
                navigator.resolve(session, &builder.base_path()).await?
            }
            other => other?,
        };
        let folders = navigator.expand_glob(session, &base, &pattern).await?;
        info!(
            "🔎 {} 下匹配 '{}' 的对象: {} 个",
            base.path,
            pattern,
            folders.len()
        );
        Ok(folders.into_iter().map(|f| f.path).collect())
    }
}
