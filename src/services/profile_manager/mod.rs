//! Profile 管理模块
//!
//! - `manager`: profiles.json / active.json 持久化（ProfileStore）
//! - `resolver`: 由原生文件推导当前激活配置
//! - `types`: 数据类型

mod manager;
mod resolver;
mod types;

pub use manager::{validate_profile_name, ProfileStore, RESERVED_PREFIX};
pub use resolver::{resolve_snapshot, ActiveConfigResolver};
pub use types::{
    mask_api_key, ActiveConfig, ActiveProfile, ActiveStore, Credentials, Profile,
    ProfileDescriptor, ProfileRecord, ProfilesStore, StoreMetadata, ToolSyncState,
};
