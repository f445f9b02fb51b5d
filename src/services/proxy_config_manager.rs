//! 透明代理配置管理器
//!
//! 负责 `proxy.json` 的读写。缺失的文件或工具段落按默认值补齐。

use crate::core::SyncResult;
use crate::data::DataManager;
use crate::models::proxy_config::{ProxyStore, ToolProxyConfig};
use crate::models::ToolId;
use std::path::{Path, PathBuf};

pub struct ProxyConfigManager {
    data_manager: &'static DataManager,
    proxy_path: PathBuf,
}

impl ProxyConfigManager {
    pub fn new(config_dir: &Path) -> Self {
        Self {
            data_manager: DataManager::global(),
            proxy_path: config_dir.join("proxy.json"),
        }
    }

    pub fn proxy_path(&self) -> &Path {
        &self.proxy_path
    }

    /// 加载 proxy.json
    pub fn load_proxy_store(&self) -> SyncResult<ProxyStore> {
        Ok(self
            .data_manager
            .json()
            .read_typed::<ProxyStore>(&self.proxy_path)?
            .unwrap_or_default())
    }

    /// 保存 proxy.json
    pub fn save_proxy_store(&self, store: &ProxyStore) -> SyncResult<()> {
        self.data_manager
            .json()
            .write_typed(&self.proxy_path, store)
            .map_err(Into::into)
    }

    /// 获取指定工具的代理配置
    pub fn get_config(&self, tool_id: ToolId) -> SyncResult<ToolProxyConfig> {
        let store = self.load_proxy_store()?;
        Ok(store.get_config(tool_id).clone())
    }

    /// 就地修改指定工具的代理配置并保存，返回修改后的配置
    pub fn modify_config<F>(&self, tool_id: ToolId, f: F) -> SyncResult<ToolProxyConfig>
    where
        F: FnOnce(&mut ToolProxyConfig),
    {
        let mut store = self.load_proxy_store()?;
        let mut config = store.get_config(tool_id).clone();
        f(&mut config);
        store.update_config(tool_id, config.clone());
        self.save_proxy_store(&store)?;
        Ok(config)
    }
}
