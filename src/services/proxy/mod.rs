// 代理服务模块
//
// 包含透明代理运行时与 Profile 切换后的代理同步

pub mod headers;
pub mod proxy_instance;
pub mod proxy_manager;
pub mod sync_bridge;
pub mod utils;

pub use headers::{create_headers_processor, HeadersProcessor};
pub use proxy_instance::ProxyInstance;
pub use proxy_manager::{ProxyControl, ProxyManager, ProxyStatus};
pub use sync_bridge::{ProxySyncBridge, ProxySyncStatus};
