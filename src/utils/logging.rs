//! 日志工具模块
//!
//! 提供日志初始化、格式化和输出的辅助函数
use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use tracing::info;
use tracing_subscriber::EnvFilter;

const RULE: &str = "=";

/// 初始化 tracing 订阅器
///
/// `RUST_LOG` 优先；未设置时按 `verbose` 选择 `debug` 或 `info`。
/// 重复调用不会报错（测试中常见）。
pub fn init(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 初始化日志文件（覆盖旧内容），写入门户地址和开始时间
pub fn init_log_file(log_file_path: &str, base_url: &str) -> Result<()> {
    let log_header = format!(
        "{rule}\n测验同步日志\n门户: {}\n开始: {}\n{rule}\n\n",
        base_url,
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        rule = RULE.repeat(60),
    );
    fs::write(log_file_path, log_header)
        .with_context(|| format!("无法写入日志文件: {}", log_file_path))?;
    Ok(())
}

/// 向日志文件追加一段文本
pub fn append_log(log_file_path: &str, text: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path)
        .with_context(|| format!("无法打开日志文件: {}", log_file_path))?;
    file.write_all(text.as_bytes())?;
    if !text.ends_with('\n') {
        file.write_all(b"\n")?;
    }
    Ok(())
}

/// 记录程序启动信息
pub fn log_startup(base_url: &str, max_concurrent: usize) {
    banner("🚀 测验同步启动");
    info!("🌐 门户地址: {}", base_url);
    info!("📊 最大并发会话数: {}", max_concurrent);
}

/// 记录计划加载信息
///
/// # 参数
/// - `total`: 计划总数
/// - `accounts`: 涉及的账号数
pub fn log_plans_loaded(total: usize, accounts: usize) {
    info!("✓ 找到 {} 个待执行的计划", total);
    info!("👤 涉及 {} 个账号，同一账号的计划串行执行", accounts);
    info!("💡 不同账号之间并行执行\n");
}

/// 记录账号开始信息
pub fn log_account_start(account: &str, plans: usize) {
    banner(&format!("📦 账号 {} 开始执行 {} 个计划", account, plans));
}

/// 记录账号完成信息
pub fn log_account_complete(account: &str, success: usize, total: usize) {
    info!("✓ 账号 {} 完成: 成功 {}/{}", account, success, total);
}

/// 打印最终统计信息
///
/// `exit_code` 为进程退出码；有失败时提示失败文件位置。
pub fn print_final_stats(
    success: usize,
    total: usize,
    exit_code: u8,
    log_file_path: &str,
    failure_file_path: &str,
) {
    banner("📊 全部计划执行完成");
    info!("✅ 成功: {}/{}", success, total);
    if success < total {
        info!("❌ 失败: {} (详见 {})", total - success, failure_file_path);
    }
    info!("🔚 退出码: {}", exit_code);
    info!("📝 日志: {}", log_file_path);
}

fn banner(title: &str) {
    info!("{}", RULE.repeat(60));
    info!("{}", title);
    info!("{}", RULE.repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
