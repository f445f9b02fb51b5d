pub mod config;
pub mod proxy_config;
pub mod tool;

pub use config::*;
pub use proxy_config::{ProxyMetadata, ProxyStore, ToolProxyConfig};
pub use tool::*;
