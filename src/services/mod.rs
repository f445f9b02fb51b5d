// 服务层模块
//
// - profile_manager: Profile 存储与激活配置推导
// - native_config: 各工具原生配置适配器
// - config: 外部变更检测与监听
// - proxy: 透明代理运行时与切换同步
// - reconciliation: 对外的协调服务

pub mod config;
pub mod legacy_cleanup;
pub mod native_config;
pub mod profile_manager;
pub mod proxy;
pub mod proxy_config_manager;
pub mod reconciliation;
pub mod tool_lock;

pub use reconciliation::ReconciliationService;
pub use tool_lock::ToolLocks;
