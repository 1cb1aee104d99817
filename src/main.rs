use anyhow::{Context, Result};
use ilias_tests::models::ExitCategory;
use ilias_tests::utils::logging;
use ilias_tests::{App, Config, ObjectPath};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    // 加载配置
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            logging::init(false);
            error!("❌ 配置错误: {}", e);
            return ExitCode::from(ExitCategory::ConfigError.code());
        }
    };

    // 初始化日志
    logging::init(config.verbose_logging);

    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("⏹️ 收到中断信号，当前提交完成后停止");
            signal.cancel();
        }
    });

    // 初始化应用
    let app = match App::initialize(config, cancel).await {
        Ok(app) => app,
        Err(e) => {
            error!("❌ 初始化失败: {:#}", e);
            return ExitCode::from(ExitCategory::ConfigError.code());
        }
    };

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.first().map(String::as_str) == Some("snapshot") {
        return match snapshot(&app, &args[1..]).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("❌ 快照失败: {:#}", e);
                ExitCode::FAILURE
            }
        };
    }

    match app.run().await {
        Ok(summary) => ExitCode::from(summary.exit.code()),
        Err(e) => {
            error!("❌ 运行失败: {:#}", e);
            ExitCode::from(ExitCategory::ConfigError.code())
        }
    }
}

/// `snapshot <测验路径> [输出文件] [账号]`
async fn snapshot(app: &App, args: &[String]) -> Result<()> {
    let path = args
        .first()
        .map(|p| ObjectPath::parse(p))
        .context("用法: snapshot <测验路径> [输出文件] [账号]")?;
    let account = args.get(2).map(String::as_str).unwrap_or("default");

    let snapshot = app.snapshot(account, &path).await?;
    let text = snapshot.to_toml()?;
    match args.get(1) {
        Some(out) => {
            tokio::fs::write(out, text)
                .await
                .with_context(|| format!("无法写入快照文件: {}", out))?;
            info!("💾 快照已写入 {}", out);
        }
        None => println!("{}", text),
    }
    Ok(())
}
