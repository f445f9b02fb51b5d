//! duckcoding-sync - Profile 与外部变更同步命令行
//!
//! 提供 `profile`、`changes`、`watch`、`proxy`、`legacy` 子命令。

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use duckcoding_sync::logging::init_global_logger;
use duckcoding_sync::utils::config::load_global_config_or_default;
use duckcoding_sync::{
    Credentials, ProxyConfigUpdate, ProxyControl, ProxyManager, ReconciliationService, SyncContext,
    SyncError, ToolId,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use commands::{
    change_commands, legacy_commands, profile_commands, proxy_commands, watcher_commands, Output,
};

#[derive(Parser)]
#[command(name = "duckcoding-sync")]
#[command(about = "DuckCoding Profile 与外部变更同步工具")]
#[command(version)]
struct Cli {
    /// 以 JSON 输出结果
    #[arg(long, global = true)]
    json: bool,

    /// DuckCoding 配置目录（默认 DUCKCODING_CONFIG_DIR 或 ~/.duckcoding）
    #[arg(long, global = true, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 管理 Profile
    Profile {
        #[command(subcommand)]
        action: ProfileCommands,
    },
    /// 查看和处理外部变更
    Changes {
        #[command(subcommand)]
        action: ChangeCommands,
    },
    /// 前台监听原生配置（同时自动启动透明代理）
    Watch {
        #[command(subcommand)]
        action: Option<WatchCommands>,
    },
    /// 管理透明代理
    Proxy {
        #[command(subcommand)]
        action: ProxyCommands,
    },
    /// 旧版备份文件
    Legacy {
        #[command(subcommand)]
        action: LegacyCommands,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// 列出工具的 Profile
    List { tool: ToolId },
    /// 显示当前生效的配置
    ShowActive { tool: ToolId },
    /// 新建或覆盖 Profile
    Save {
        tool: ToolId,
        name: String,
        #[arg(long)]
        api_key: String,
        #[arg(long)]
        base_url: String,
        /// Gemini 模型等附加字段
        #[arg(long)]
        provider: Option<String>,
    },
    /// 切换到指定 Profile
    Switch { tool: ToolId, name: String },
    /// 删除 Profile
    Delete { tool: ToolId, name: String },
}

#[derive(Subcommand)]
enum ChangeCommands {
    /// 检测并列出待处理变更
    List,
    /// 执行一轮检测，只输出本轮新发现的变更
    Scan,
    /// 接受工具的外部修改，不再提示
    Ack { tool: ToolId },
    /// 把外部修改导入为 Profile
    Import {
        tool: ToolId,
        /// 原生配置文件（默认主配置）
        #[arg(long)]
        path: Option<PathBuf>,
        /// 导入为新 Profile；省略时覆盖当前激活的 Profile
        #[arg(long, value_name = "NAME")]
        as_new: Option<String>,
    },
}

#[derive(Subcommand)]
enum WatchCommands {
    /// 查看监听状态
    Status,
    /// 修改监听设置
    Config {
        #[arg(long)]
        enabled: Option<bool>,
        #[arg(long, value_name = "MS")]
        interval_ms: Option<u64>,
    },
}

#[derive(Subcommand)]
enum ProxyCommands {
    /// 查看代理状态与配置
    Status { tool: Option<ToolId> },
    /// 前台启动代理，Ctrl-C 停止
    Start { tool: ToolId },
    /// 关闭代理
    Stop { tool: ToolId },
    /// 修改代理配置
    Config {
        tool: ToolId,
        #[arg(long)]
        enabled: Option<bool>,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        local_api_key: Option<String>,
        #[arg(long)]
        allow_public: Option<bool>,
        #[arg(long)]
        auto_start: Option<bool>,
    },
}

#[derive(Subcommand)]
enum LegacyCommands {
    /// 扫描旧版 Profile 备份文件
    Scan,
    /// 删除旧版备份文件
    Clean,
    /// 导入为 Profile 后删除
    Migrate,
}

fn init_logging(ctx: &SyncContext) {
    let config = match load_global_config_or_default(&ctx.config_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("读取全局配置失败，使用默认日志配置: {e:#}");
            Default::default()
        }
    };
    if let Err(e) = init_global_logger(config.logging, &ctx.config_dir) {
        eprintln!("日志系统初始化失败: {e:#}");
    }
}

async fn run(cli: Cli) -> Result<()> {
    let ctx = match &cli.config_dir {
        Some(dir) => SyncContext::with_config_dir(dir)?,
        None => SyncContext::from_env()?,
    };
    init_logging(&ctx);

    let out = Output { json: cli.json };
    let proxy = Arc::new(ProxyManager::new());
    let service = ReconciliationService::new(&ctx, Arc::clone(&proxy) as Arc<dyn ProxyControl>)?;

    let result = dispatch(cli.command, &service, &ctx, out).await;
    if let Err(e) = proxy.stop_all().await {
        tracing::warn!(error = ?e, "退出时停止代理失败");
    }
    result
}

async fn dispatch(
    command: Commands,
    service: &ReconciliationService,
    ctx: &SyncContext,
    out: Output,
) -> Result<()> {
    match command {
        Commands::Profile { action } => match action {
            ProfileCommands::List { tool } => {
                profile_commands::list_profiles(service, out, tool).await
            }
            ProfileCommands::ShowActive { tool } => {
                profile_commands::show_active(service, out, tool).await
            }
            ProfileCommands::Save {
                tool,
                name,
                api_key,
                base_url,
                provider,
            } => {
                let creds = Credentials::new(api_key, base_url).with_provider(provider);
                profile_commands::save_profile(service, out, tool, &name, creds).await
            }
            ProfileCommands::Switch { tool, name } => {
                profile_commands::switch_profile(service, out, tool, &name).await
            }
            ProfileCommands::Delete { tool, name } => {
                profile_commands::delete_profile(service, out, tool, &name).await
            }
        },
        Commands::Changes { action } => match action {
            ChangeCommands::List => change_commands::list_changes(service, out).await,
            ChangeCommands::Scan => change_commands::scan_changes(service, out).await,
            ChangeCommands::Ack { tool } => change_commands::acknowledge(service, out, tool).await,
            ChangeCommands::Import { tool, path, as_new } => {
                change_commands::import(service, out, &ctx.home_dir, tool, path, as_new).await
            }
        },
        Commands::Watch { action } => match action {
            None => watcher_commands::run_foreground(service, out).await,
            Some(WatchCommands::Status) => watcher_commands::show_status(service, out).await,
            Some(WatchCommands::Config {
                enabled,
                interval_ms,
            }) => watcher_commands::configure(service, out, enabled, interval_ms).await,
        },
        Commands::Proxy { action } => match action {
            ProxyCommands::Status { tool } => proxy_commands::status(service, out, tool).await,
            ProxyCommands::Start { tool } => {
                proxy_commands::start_foreground(service, out, tool).await
            }
            ProxyCommands::Stop { tool } => proxy_commands::stop(service, out, tool).await,
            ProxyCommands::Config {
                tool,
                enabled,
                port,
                local_api_key,
                allow_public,
                auto_start,
            } => {
                let update = ProxyConfigUpdate {
                    enabled,
                    port,
                    local_api_key,
                    allow_public,
                    auto_start,
                };
                proxy_commands::configure(service, out, tool, update).await
            }
        },
        Commands::Legacy { action } => match action {
            LegacyCommands::Scan => legacy_commands::scan(service, out).await,
            LegacyCommands::Clean => legacy_commands::clean(service, out).await,
            LegacyCommands::Migrate => legacy_commands::migrate(service, out).await,
        },
    }
}

/// 错误映射到退出码：领域错误用各自的编码，其余为 1
fn exit_code(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<SyncError>())
        .map(|e| e.exit_code() as u8)
        .unwrap_or(1)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("错误: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}
