use crate::logging::config::LoggingConfig;
use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// 日志管理器，持有文件写入 guard，drop 时刷新缓冲区
pub struct LogManager {
    pub config: LoggingConfig,
    _guard: Option<WorkerGuard>,
}

impl LogManager {
    /// 使用指定配置初始化日志系统
    pub fn init_with_config(config: LoggingConfig, config_dir: &Path) -> Result<Self> {
        let mut layers: Vec<BoxedLayer> = Vec::new();
        let mut file_guard = None;

        if config.console_enabled {
            layers.push(Self::create_console_layer());
        }

        if config.file_enabled {
            let log_dir = config.effective_log_dir(config_dir);
            fs::create_dir_all(&log_dir)
                .with_context(|| format!("无法创建日志目录: {:?}", log_dir))?;
            let (layer, guard) = Self::create_file_layer(&config, &log_dir);
            file_guard = Some(guard);
            layers.push(layer);
        }

        let filter = EnvFilter::new(Self::filter_directive(&config));
        Registry::default()
            .with(layers)
            .with(filter)
            .try_init()
            .context("日志订阅器已初始化")?;

        tracing::debug!(
            level = %config.level,
            console = config.console_enabled,
            file = config.file_enabled,
            "日志系统初始化完成"
        );

        Ok(Self {
            config,
            _guard: file_guard,
        })
    }

    fn filter_directive(config: &LoggingConfig) -> String {
        format!(
            "duckcoding_sync={},hyper=warn,reqwest=warn",
            config.level
        )
    }

    /// 控制台层写入 stderr，stdout 留给命令输出
    fn create_console_layer() -> BoxedLayer {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    }

    fn create_file_layer(config: &LoggingConfig, log_dir: &Path) -> (BoxedLayer, WorkerGuard) {
        let file_appender = tracing_appender::rolling::daily(log_dir, "duckcoding-sync.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let layer = if config.json_format {
            fmt::layer()
                .json()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false)
                .with_writer(non_blocking)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false)
                .with_writer(non_blocking)
                .boxed()
        };

        (layer, guard)
    }
}

static GLOBAL_LOG_MANAGER: OnceCell<LogManager> = OnceCell::new();

/// 初始化全局日志系统，重复调用为空操作
pub fn init_global_logger(mut config: LoggingConfig, config_dir: &Path) -> Result<()> {
    config.apply_env_overrides();
    GLOBAL_LOG_MANAGER
        .get_or_try_init(|| LogManager::init_with_config(config, config_dir))
        .map(|_| ())
}
