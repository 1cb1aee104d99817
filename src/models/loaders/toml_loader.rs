use crate::models::plan_file::PlanFile;
use crate::session::Credentials;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs;

/// 从 TOML 文件加载计划
pub async fn load_plan_file(toml_file_path: &Path) -> Result<PlanFile> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取TOML文件: {}", toml_file_path.display()))?;

    let mut plan: PlanFile = toml::from_str(&content)
        .with_context(|| format!("无法解析TOML文件: {}", toml_file_path.display()))?;

    plan.file_path = Some(toml_file_path.to_string_lossy().to_string());

    Ok(plan)
}

/// 从文件夹中加载所有计划文件
///
/// 按文件名排序；无法解析的文件记录警告后跳过。
pub async fn load_all_plan_files(folder_path: &str) -> Result<Vec<PlanFile>> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        anyhow::bail!("文件夹不存在: {}", folder_path);
    }

    let mut toml_files = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder_path))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml_files.push(path);
        }
    }
    toml_files.sort();

    let mut plans = Vec::new();
    for path in toml_files {
        tracing::info!(
            "正在加载: {}",
            path.file_name().unwrap_or_default().to_string_lossy()
        );

        match load_plan_file(&path).await {
            Ok(plan) => {
                tracing::info!(
                    "成功加载计划 '{}' ({} 个测验, {} 个步骤)",
                    plan.name,
                    plan.tests.len(),
                    plan.steps.len()
                );
                plans.push(plan);
            }
            Err(e) => {
                tracing::warn!("加载文件失败 {}: {:#}", path.display(), e);
            }
        }
    }

    Ok(plans)
}

#[derive(Debug, Deserialize)]
struct AccountsFile {
    #[serde(default)]
    accounts: Vec<Credentials>,
}

/// 加载账号文件（`[[accounts]]` 列表，每项含 name / username / password）
pub async fn load_accounts(path: &Path) -> Result<Vec<Credentials>> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取账号文件: {}", path.display()))?;
    let file: AccountsFile = toml::from_str(&content)
        .with_context(|| format!("无法解析账号文件: {}", path.display()))?;
    tracing::info!("从 {} 加载了 {} 个账号", path.display(), file.accounts.len());
    Ok(file.accounts)
}
