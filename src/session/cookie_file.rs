//! Cookie 持久化
//!
//! 每个账号一个文件，每行一条 `Set-Cookie: name=value`。

use crate::error::{FileError, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

const PREFIX: &str = "Set-Cookie:";

/// 账号对应的 Cookie 文件路径
pub fn cookie_path(dir: &Path, account: &str) -> PathBuf {
    let safe: String = account
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    dir.join(format!("{}.cookies", safe))
}

/// 读取 Cookie，文件不存在时返回 `None`
pub async fn load(dir: &Path, account: &str) -> Result<Option<Vec<String>>> {
    let path = cookie_path(dir, account);
    let content = match fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(FileError::ReadFailed {
                path: path.display().to_string(),
                source,
            }
            .into())
        }
    };
    let cookies = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| l.strip_prefix(PREFIX).unwrap_or(l).trim().to_string())
        .filter(|c| c.contains('='))
        .collect();
    Ok(Some(cookies))
}

/// 写入 Cookie（覆盖旧文件）
pub async fn save(dir: &Path, account: &str, cookies: &[String]) -> Result<()> {
    let path = cookie_path(dir, account);
    let write_err = |source| FileError::WriteFailed {
        path: path.display().to_string(),
        source,
    };
    fs::create_dir_all(dir).await.map_err(write_err)?;
    let content: String = cookies
        .iter()
        .map(|c| format!("{} {}\n", PREFIX, c))
        .collect();
    fs::write(&path, content).await.map_err(write_err)?;
    Ok(())
}

/// 删除 Cookie 文件（不存在时忽略）
pub async fn remove(dir: &Path, account: &str) -> Result<()> {
    let path = cookie_path(dir, account);
    match fs::remove_file(&path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(FileError::WriteFailed {
            path: path.display().to_string(),
            source,
        }
        .into()),
    }
}
