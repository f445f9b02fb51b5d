// 全局配置结构，放在 models 以便库和二进制共享
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 轮询间隔下限，避免过于频繁地读取原生配置
pub const MIN_POLL_INTERVAL_MS: u64 = 500;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GlobalConfig {
    /// 是否监听外部配置变更
    #[serde(default = "default_external_watch_enabled")]
    pub external_watch_enabled: bool,
    /// 轮询间隔（毫秒），补偿丢失的文件系统通知
    #[serde(default = "default_external_poll_interval_ms")]
    pub external_poll_interval_ms: u64,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_external_watch_enabled() -> bool {
    true
}

fn default_external_poll_interval_ms() -> u64 {
    5000
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            external_watch_enabled: default_external_watch_enabled(),
            external_poll_interval_ms: default_external_poll_interval_ms(),
            logging: LoggingConfig::default(),
        }
    }
}

impl GlobalConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.external_poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_json() {
        let cfg: GlobalConfig = serde_json::from_str("{}").unwrap();
        assert!(cfg.external_watch_enabled);
        assert_eq!(cfg.poll_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_poll_interval_floor() {
        let cfg = GlobalConfig {
            external_poll_interval_ms: 10,
            ..GlobalConfig::default()
        };
        assert_eq!(cfg.poll_interval(), Duration::from_millis(MIN_POLL_INTERVAL_MS));
    }
}
