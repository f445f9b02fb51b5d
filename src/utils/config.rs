use crate::models::GlobalConfig;
use crate::utils::file_helpers::atomic_write;
use anyhow::{anyhow, Context, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// 覆盖配置目录的环境变量（测试与多实例场景使用）
pub const CONFIG_DIR_ENV: &str = "DUCKCODING_CONFIG_DIR";

/// DuckCoding 配置目录 (~/.duckcoding)，若不存在则创建
pub fn config_dir() -> Result<PathBuf> {
    let dir = match env::var_os(CONFIG_DIR_ENV) {
        Some(custom) if !custom.is_empty() => PathBuf::from(custom),
        _ => dirs::home_dir()
            .ok_or_else(|| anyhow!("无法获取用户主目录"))?
            .join(".duckcoding"),
    };
    if !dir.exists() {
        fs::create_dir_all(&dir).with_context(|| format!("创建配置目录失败: {dir:?}"))?;
    }
    Ok(dir)
}

/// 全局配置文件路径
pub fn global_config_path(config_dir: &Path) -> PathBuf {
    config_dir.join("config.json")
}

/// 读取全局配置（若文件不存在返回 Ok(None)）
pub fn read_global_config(config_dir: &Path) -> Result<Option<GlobalConfig>> {
    let config_path = global_config_path(config_dir);
    if !config_path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(&config_path)
        .with_context(|| format!("读取全局配置失败: {config_path:?}"))?;
    let config: GlobalConfig = serde_json::from_str(&content)
        .with_context(|| format!("解析全局配置失败: {config_path:?}"))?;
    Ok(Some(config))
}

/// 读取全局配置，不存在时返回默认值
pub fn load_global_config_or_default(config_dir: &Path) -> Result<GlobalConfig> {
    Ok(read_global_config(config_dir)?.unwrap_or_default())
}

/// 写入全局配置（原子替换，Unix 权限 0o600）
pub fn write_global_config(config_dir: &Path, config: &GlobalConfig) -> Result<()> {
    let config_path = global_config_path(config_dir);
    let json = serde_json::to_string_pretty(config).context("序列化全局配置失败")?;
    atomic_write(&config_path, json.as_bytes())
        .with_context(|| format!("写入全局配置失败: {config_path:?}"))?;
    Ok(())
}
