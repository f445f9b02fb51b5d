//! 文件操作辅助函数
//!
//! 提供校验和计算与原子写入（临时文件 + rename）。

use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// 缺失文件参与校验和计算时使用的占位内容
const MISSING_MARKER: &[u8] = b"MISSING";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// 计算内容的 SHA256 哈希值，`None` 表示文件不存在
pub fn content_checksum(content: Option<&[u8]>) -> String {
    let mut hasher = Sha256::new();
    match content {
        Some(bytes) => hasher.update(bytes),
        None => hasher.update(MISSING_MARKER),
    }
    format!("{:x}", hasher.finalize())
}

/// 读取文件，不存在时返回 `Ok(None)`
pub fn read_optional(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

/// 目标文件同目录下的临时文件路径
///
/// 以 `.` 开头，避免与工具自身的文件名规则冲突。
pub fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());
    let seq = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{file_name}.{}-{seq}.tmp", std::process::id()))
}

/// 写入临时文件并设置权限，返回临时文件路径（尚未替换目标）
pub fn write_temp(path: &Path, content: &[u8]) -> io::Result<PathBuf> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp = temp_path_for(path);
    let result = (|| {
        let mut file = fs::File::create(&temp)?;
        file.write_all(content)?;
        file.sync_all()?;
        set_private_permissions(&temp)
    })();

    if let Err(err) = result {
        let _ = fs::remove_file(&temp);
        return Err(err);
    }
    Ok(temp)
}

/// 原子写入：先写同目录临时文件，再 rename 覆盖目标
///
/// 并发读取方只会看到旧内容或新内容，不会看到写了一半的文件。
pub fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let temp = write_temp(path, content)?;
    if let Err(err) = fs::rename(&temp, path) {
        let _ = fs::remove_file(&temp);
        return Err(err);
    }
    Ok(())
}

/// 设置文件权限为 0o600（仅 Unix）
pub fn set_private_permissions(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(0o600);
        fs::set_permissions(path, perms)?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::TempDir;

    #[test]
    fn test_content_checksum_is_sha256_hex() {
        let checksum = content_checksum(Some(b"test content"));
        assert_eq!(checksum.len(), 64);
        assert!(checksum.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(checksum, content_checksum(Some(b"test content")));
    }

    #[test]
    fn test_missing_checksum_differs_from_empty() {
        assert_ne!(content_checksum(None), content_checksum(Some(b"")));
    }

    #[test]
    fn test_read_optional_missing() -> Result<()> {
        let dir = TempDir::new()?;
        assert!(read_optional(&dir.path().join("nope.json"))?.is_none());
        Ok(())
    }

    #[test]
    fn test_atomic_write_replaces_and_cleans_temp() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("nested").join("settings.json");

        atomic_write(&path, b"{\"a\":1}")?;
        atomic_write(&path, b"{\"a\":2}")?;
        assert_eq!(fs::read_to_string(&path)?, "{\"a\":2}");

        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path)?.permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
        Ok(())
    }

    #[test]
    fn test_temp_path_is_hidden_sibling() {
        let temp = temp_path_for(Path::new("/home/u/.gemini/.env"));
        assert_eq!(temp.parent(), Some(Path::new("/home/u/.gemini")));
        let name = temp.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("..env."));
        assert!(name.ends_with(".tmp"));
    }
}
