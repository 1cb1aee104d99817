//! 失败记录服务 - 业务能力层
//!
//! 只负责"把失败的步骤写进失败文件"，不关心流程

use crate::models::ActionReport;
use anyhow::Result;
use std::fs::OpenOptions;
use std::io::Write;
use tracing::debug;

/// 失败记录服务
///
/// 职责：
/// - 将失败计划的第一个失败原因追加到失败文件
/// - 成功的报告不写入
pub struct FailureWriter {
    failure_file_path: String,
}

impl FailureWriter {
    pub fn new() -> Self {
        Self {
            failure_file_path: "failed_steps.txt".to_string(),
        }
    }

    /// 使用自定义文件路径创建
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            failure_file_path: path.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.failure_file_path
    }

    /// 写入一个报告；返回是否写入了内容
    pub fn write(&self, report: &ActionReport) -> Result<bool> {
        let Some(cause) = &report.first_failure else {
            return Ok(false);
        };
        debug!(
            "写入失败记录: 计划 {} | 步骤 {} | {:?}",
            report.plan, cause.step, cause.kind
        );

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.failure_file_path)?;

        let line = format!(
            "{} | 账号 {} | 计划 {} | 步骤 {} | {} | {:?} | {}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            report.account,
            report.plan,
            cause.step,
            cause.object,
            cause.kind,
            cause.message.replace('\n', " ")
        );

        file.write_all(line.as_bytes())?;

        Ok(true)
    }
}

impl Default for FailureWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::FailureCause;

    #[test]
    fn test_only_failed_reports_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("failed.txt");
        let writer = FailureWriter::with_path(path.to_string_lossy());

        let ok = ActionReport {
            plan: "ok".into(),
            account: "default".into(),
            steps: Vec::new(),
            overall_success: true,
            first_failure: None,
        };
        assert!(!writer.write(&ok).unwrap());
        assert!(!path.exists());

        let failed = ActionReport::aborted(
            "Sync",
            "default",
            FailureCause {
                kind: ErrorKind::Portal,
                step: 2,
                object: "Kurs/Midterm".into(),
                message: "Pflichtfeld\nfehlt".into(),
            },
        );
        assert!(writer.write(&failed).unwrap());
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("计划 Sync | 步骤 2 | Kurs/Midterm | Portal | Pflichtfeld fehlt"));
    }
}
