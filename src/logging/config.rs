use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// 日志级别枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Error => write!(f, "error"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Trace => write!(f, "trace"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(format!("无效的日志级别: {}", s)),
        }
    }
}

/// 日志配置结构体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: LogLevel,
    /// 是否启用控制台输出
    pub console_enabled: bool,
    /// 是否启用文件输出
    pub file_enabled: bool,
    /// 自定义日志目录
    pub file_path: Option<PathBuf>,
    /// 是否使用JSON格式
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            console_enabled: true,
            file_enabled: true,
            file_path: None,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// 获取有效的日志目录，未配置时位于配置目录下的 `logs/`
    pub fn effective_log_dir(&self, config_dir: &Path) -> PathBuf {
        self.file_path
            .clone()
            .unwrap_or_else(|| config_dir.join("logs"))
    }

    /// 应用环境变量覆盖
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level_str) = std::env::var("RUST_LOG") {
            if let Ok(level) = level_str.parse() {
                self.level = level;
            }
        }

        if let Ok(enabled) = std::env::var("DUCKCODING_LOG_CONSOLE") {
            self.console_enabled = enabled.parse().unwrap_or(self.console_enabled);
        }

        if let Ok(enabled) = std::env::var("DUCKCODING_LOG_FILE") {
            self.file_enabled = enabled.parse().unwrap_or(self.file_enabled);
        }

        if let Ok(path) = std::env::var("DUCKCODING_LOG_PATH") {
            self.file_path = Some(path.into());
        }

        if let Ok(json_fmt) = std::env::var("DUCKCODING_LOG_JSON") {
            self.json_format = json_fmt.parse().unwrap_or(self.json_format);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_parse_level() {
        assert_eq!("DEBUG".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: LoggingConfig = serde_json::from_str(r#"{"level":"debug"}"#).unwrap();
        assert_eq!(config.level, LogLevel::Debug);
        assert!(config.console_enabled);
        assert!(!config.json_format);
    }

    #[test]
    fn test_effective_log_dir() {
        let config = LoggingConfig::default();
        assert_eq!(
            config.effective_log_dir(Path::new("/cfg")),
            PathBuf::from("/cfg/logs")
        );
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var("DUCKCODING_LOG_JSON", "true");
        std::env::set_var("DUCKCODING_LOG_FILE", "false");
        let mut config = LoggingConfig::default();
        config.apply_env_overrides();
        std::env::remove_var("DUCKCODING_LOG_JSON");
        std::env::remove_var("DUCKCODING_LOG_FILE");

        assert!(config.json_format);
        assert!(!config.file_enabled);
    }
}
