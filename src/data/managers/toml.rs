//! TOML 配置管理器
//!
//! 使用 `toml_edit` 保留注释和格式，支持：
//! - 内存解析/渲染
//! - 原子写入与 Unix 权限 0o600
//!
//! # 使用示例
//!
//! ```rust
//! use std::path::Path;
//! use crate::data::managers::TomlManager;
//!
//! let manager = TomlManager::new();
//! let mut doc = manager.read_document(Path::new("config.toml"))?;
//! doc["model_provider"] = toml_edit::value("duckcoding");
//! manager.write(Path::new("config.toml"), &doc)?;
//! ```

use crate::data::{DataError, Result};
use crate::utils::file_helpers::atomic_write;
use std::fs;
use std::path::Path;
use toml_edit::{DocumentMut, Item, Table};

/// TOML 配置管理器
pub struct TomlManager;

impl TomlManager {
    pub fn new() -> Self {
        Self
    }

    /// 读取为可编辑文档
    pub fn read_document(&self, path: &Path) -> Result<DocumentMut> {
        let content = fs::read(path).map_err(|e| DataError::io(path, e))?;
        self.parse(path, &content)
    }

    /// 解析内存中的 TOML 内容，`path` 仅用于错误信息
    pub fn parse(&self, path: &Path, content: &[u8]) -> Result<DocumentMut> {
        let text = std::str::from_utf8(content).map_err(|e| DataError::toml(path, e.to_string()))?;
        text.parse::<DocumentMut>()
            .map_err(|e| DataError::toml(path, e.to_string()))
    }

    pub fn render(&self, doc: &DocumentMut) -> Vec<u8> {
        doc.to_string().into_bytes()
    }

    /// 写入 TOML 文档（原子替换）
    pub fn write(&self, path: &Path, doc: &DocumentMut) -> Result<()> {
        atomic_write(path, &self.render(doc)).map_err(|e| DataError::io(path, e))
    }

    /// 获取（必要时创建）显式子表
    pub fn ensure_table<'a>(parent: &'a mut Table, key: &str) -> Result<&'a mut Table> {
        let needs_reset = !matches!(parent.get(key), Some(Item::Table(_)));
        if needs_reset {
            let mut table = Table::new();
            table.set_implicit(false);
            parent.insert(key, Item::Table(table));
        }
        parent
            .get_mut(key)
            .and_then(Item::as_table_mut)
            .ok_or_else(|| DataError::InvalidKey(key.to_string()))
    }
}

impl Default for TomlManager {
    fn default() -> Self {
        Self::new()
    }
}
