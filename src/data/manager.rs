//! 统一数据管理入口
//!
//! 提供所有数据管理器的统一访问接口。原生配置文件会被外部工具频繁改写，
//! 因此所有管理器都不带缓存，每次读取均访问磁盘。
//!
//! # 使用示例
//!
//! ```rust
//! use std::path::Path;
//! use crate::data::DataManager;
//!
//! let manager = DataManager::global();
//! let settings = manager.json().read(Path::new("settings.json"))?;
//! let doc = manager.toml().read_document(Path::new("config.toml"))?;
//! ```

use crate::data::managers::{EnvManager, JsonManager, TomlManager};
use once_cell::sync::Lazy;
use std::sync::Arc;

/// 全局 DataManager 单例
static GLOBAL_DATA_MANAGER: Lazy<DataManager> = Lazy::new(DataManager::new);

/// 统一数据管理器
pub struct DataManager {
    json: Arc<JsonManager>,
    toml: Arc<TomlManager>,
    env: Arc<EnvManager>,
}

impl DataManager {
    /// 获取全局 DataManager 单例
    pub fn global() -> &'static DataManager {
        &GLOBAL_DATA_MANAGER
    }

    pub fn new() -> Self {
        Self {
            json: Arc::new(JsonManager::new()),
            toml: Arc::new(TomlManager::new()),
            env: Arc::new(EnvManager::new()),
        }
    }

    /// JSON 管理器（全局配置、Profile 存储、Claude settings.json、Codex auth.json）
    pub fn json(&self) -> &JsonManager {
        &self.json
    }

    /// TOML 管理器（Codex config.toml）
    pub fn toml(&self) -> &TomlManager {
        &self.toml
    }

    /// ENV 管理器（Gemini .env）
    pub fn env(&self) -> &EnvManager {
        &self.env
    }
}

impl Default for DataManager {
    fn default() -> Self {
        Self::new()
    }
}
