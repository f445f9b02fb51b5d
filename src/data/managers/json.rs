//! JSON 配置管理器
//!
//! 提供 JSON 配置文件的读写和操作，支持：
//! - 内存解析/渲染（供原生配置适配器计算"将会写出的内容"）
//! - 键路径访问（支持嵌套键如 "env.API_KEY"）
//! - 原子写入（临时文件 + rename）与 Unix 权限 0o600
//!
//! # 使用示例
//!
//! ```rust
//! use std::path::Path;
//! use crate::data::managers::JsonManager;
//!
//! let manager = JsonManager::new();
//! let mut settings = manager.read(Path::new("~/.claude/settings.json"))?;
//! JsonManager::set_value(&mut settings, "env.ANTHROPIC_AUTH_TOKEN", "sk-ant-xxx".into())?;
//! manager.write(Path::new("~/.claude/settings.json"), &settings)?;
//! ```

use crate::data::{DataError, Result};
use crate::utils::file_helpers::atomic_write;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

/// JSON 配置管理器
pub struct JsonManager;

impl JsonManager {
    pub fn new() -> Self {
        Self
    }

    /// 读取整个 JSON 文件
    pub fn read(&self, path: &Path) -> Result<Value> {
        let content = fs::read(path).map_err(|e| DataError::io(path, e))?;
        self.parse(path, &content)
    }

    /// 解析内存中的 JSON 内容，`path` 仅用于错误信息
    ///
    /// 空内容视为空对象（工具刚创建的空文件）。
    pub fn parse(&self, path: &Path, content: &[u8]) -> Result<Value> {
        if content.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(Value::Object(Map::new()));
        }
        serde_json::from_slice(content).map_err(|e| DataError::json(path, e))
    }

    /// 渲染为格式化 JSON 字节
    pub fn render(&self, value: &Value) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(value).map_err(|e| DataError::json("", e))?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// 写入整个 JSON 文件（原子替换）
    pub fn write(&self, path: &Path, value: &Value) -> Result<()> {
        let content = self.render(value)?;
        atomic_write(path, &content).map_err(|e| DataError::io(path, e))
    }

    /// 读取并反序列化为具体类型，文件不存在时返回 `None`
    pub fn read_typed<T: serde::de::DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        if !path.exists() {
            return Ok(None);
        }
        let value = self.read(path)?;
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| DataError::json(path, e))
    }

    /// 序列化具体类型并写入
    pub fn write_typed<T: serde::Serialize>(&self, path: &Path, data: &T) -> Result<()> {
        let value = serde_json::to_value(data).map_err(|e| DataError::json(path, e))?;
        self.write(path, &value)
    }

    /// 设置嵌套键，自动创建不存在的中间对象
    pub fn set_value(value: &mut Value, key: &str, new_value: Value) -> Result<()> {
        set_nested(value, &parse_key_path(key), new_value)
    }
}

impl Default for JsonManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 解析键路径
fn parse_key_path(key: &str) -> Vec<&str> {
    key.split('.').collect()
}

/// 设置嵌套值
fn set_nested(value: &mut Value, path: &[&str], new_value: Value) -> Result<()> {
    let Some((last, parents)) = path.split_last() else {
        return Err(DataError::InvalidKey("空键路径".into()));
    };
    if last.is_empty() {
        return Err(DataError::InvalidKey(path.join(".")));
    }

    let mut current = value;
    for segment in parents {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        current = match current {
            Value::Object(obj) => obj
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new())),
            _ => return Err(DataError::InvalidKey(path.join("."))),
        };
    }

    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    if let Value::Object(obj) = current {
        obj.insert(last.to_string(), new_value);
    }
    Ok(())
}
