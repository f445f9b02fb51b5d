//! ENV 文件管理器
//!
//! 提供 `.env` 文件的读写，支持：
//! - 保留注释、空行与无关键
//! - 原子写入与 Unix 权限 0o600
//!
//! # 使用示例
//!
//! ```rust
//! use std::path::Path;
//! use crate::data::managers::EnvManager;
//!
//! let manager = EnvManager::new();
//! let content = manager.read_text(Path::new(".env"))?;
//! let updated = manager.apply(&content, &[("GEMINI_API_KEY", "secret")]);
//! manager.write_text(Path::new(".env"), &updated)?;
//! ```

use crate::data::{DataError, Result};
use crate::utils::file_helpers::atomic_write;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// ENV 文件管理器
pub struct EnvManager;

impl EnvManager {
    pub fn new() -> Self {
        Self
    }

    /// 读取原始文本
    pub fn read_text(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).map_err(|e| DataError::io(path, e))
    }

    /// 读取 ENV 文件为键值对（忽略注释和空行）
    pub fn read(&self, path: &Path) -> Result<HashMap<String, String>> {
        Ok(self.parse(&self.read_text(path)?))
    }

    /// 解析文本为键值对，后出现的键覆盖先出现的
    pub fn parse(&self, content: &str) -> HashMap<String, String> {
        content.lines().filter_map(parse_env_line).collect()
    }

    /// 在原文本上更新或追加键值，保留其余行
    pub fn apply(&self, content: &str, updates: &[(&str, &str)]) -> String {
        let mut lines: Vec<String> = content.lines().map(String::from).collect();

        for (key, value) in updates {
            let mut found = false;
            for line in &mut lines {
                if let Some((k, _)) = parse_env_line(line) {
                    if k == *key {
                        *line = format!("{key}={value}");
                        found = true;
                    }
                }
            }
            if !found {
                lines.push(format!("{key}={value}"));
            }
        }

        let mut rendered = lines.join("\n");
        rendered.push('\n');
        rendered
    }

    /// 写入文本（原子替换）
    pub fn write_text(&self, path: &Path, content: &str) -> Result<()> {
        atomic_write(path, content.as_bytes()).map_err(|e| DataError::io(path, e))
    }
}

impl Default for EnvManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 解析 ENV 文件的一行
///
/// 支持 `export KEY=value` 与成对引号包裹的值；注释或空行返回 `None`。
pub fn parse_env_line(line: &str) -> Option<(String, String)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }

    let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
    let (key, value) = trimmed.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), unquote(value.trim()).to_string()))
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}
