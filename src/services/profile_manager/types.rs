//! Profile 管理数据类型定义
//!
//! 设计原则：
//! - profiles.json 以工具 ID 分组，组内按插入顺序保存
//! - active.json 只保存"上次切换"提示与引擎自身写入的校验和
//! - ActiveConfig 由原生配置实时推导，从不单独持久化

use crate::models::ToolId;
use chrono::{DateTime, Utc};
use linked_hash_map::LinkedHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const PROFILES_VERSION: &str = "2.0.0";

/// 工具无关的凭证（引擎理解的全部字段）
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Credentials {
    pub api_key: String,
    pub base_url: String,
    /// Codex 为 wire_api，Gemini 为模型名，Claude Code 不使用
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            provider: None,
        }
    }

    pub fn with_provider(mut self, provider: Option<String>) -> Self {
        self.provider = provider.filter(|p| !p.trim().is_empty());
        self
    }
}

// ==================== profiles.json 结构 ====================

/// profiles.json 中单个 Profile 的存储形式（名称即键）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub api_key: String,
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 对外暴露的 Profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub tool_id: ToolId,
    pub name: String,
    pub api_key: String,
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn from_record(tool_id: ToolId, name: &str, record: &ProfileRecord) -> Self {
        Self {
            tool_id,
            name: name.to_string(),
            api_key: record.api_key.clone(),
            base_url: record.base_url.clone(),
            provider: record.provider.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            provider: self.provider.clone(),
        }
    }
}

/// profiles.json 顶层结构
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfilesStore {
    pub version: String,
    #[serde(rename = "claude-code", default)]
    pub claude_code: LinkedHashMap<String, ProfileRecord>,
    #[serde(default)]
    pub codex: LinkedHashMap<String, ProfileRecord>,
    #[serde(rename = "gemini-cli", default)]
    pub gemini_cli: LinkedHashMap<String, ProfileRecord>,
    pub metadata: StoreMetadata,
}

impl ProfilesStore {
    pub fn new() -> Self {
        Self {
            version: PROFILES_VERSION.to_string(),
            claude_code: LinkedHashMap::new(),
            codex: LinkedHashMap::new(),
            gemini_cli: LinkedHashMap::new(),
            metadata: StoreMetadata::now(),
        }
    }

    pub fn tool_profiles(&self, tool_id: ToolId) -> &LinkedHashMap<String, ProfileRecord> {
        match tool_id {
            ToolId::ClaudeCode => &self.claude_code,
            ToolId::Codex => &self.codex,
            ToolId::GeminiCli => &self.gemini_cli,
        }
    }

    pub fn tool_profiles_mut(
        &mut self,
        tool_id: ToolId,
    ) -> &mut LinkedHashMap<String, ProfileRecord> {
        match tool_id {
            ToolId::ClaudeCode => &mut self.claude_code,
            ToolId::Codex => &mut self.codex,
            ToolId::GeminiCli => &mut self.gemini_cli,
        }
    }
}

impl Default for ProfilesStore {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMetadata {
    pub last_updated: DateTime<Utc>,
}

impl StoreMetadata {
    pub fn now() -> Self {
        Self {
            last_updated: Utc::now(),
        }
    }
}

// ==================== active.json 结构 ====================

/// 最近一次切换的 Profile（多个 Profile 序列化结果相同时的决胜依据）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveProfile {
    pub profile: String,
    pub switched_at: DateTime<Utc>,
}

/// 单个工具的同步状态
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolSyncState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_switched: Option<ActiveProfile>,
    /// 引擎最后写入或接受的原生文件校验和（按文件）
    #[serde(default)]
    pub native_checksums: BTreeMap<PathBuf, String>,
}

/// active.json 顶层结构
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveStore {
    pub version: String,
    #[serde(rename = "claude-code", default)]
    pub claude_code: ToolSyncState,
    #[serde(default)]
    pub codex: ToolSyncState,
    #[serde(rename = "gemini-cli", default)]
    pub gemini_cli: ToolSyncState,
    pub metadata: StoreMetadata,
}

impl ActiveStore {
    pub fn new() -> Self {
        Self {
            version: PROFILES_VERSION.to_string(),
            claude_code: ToolSyncState::default(),
            codex: ToolSyncState::default(),
            gemini_cli: ToolSyncState::default(),
            metadata: StoreMetadata::now(),
        }
    }

    pub fn get(&self, tool_id: ToolId) -> &ToolSyncState {
        match tool_id {
            ToolId::ClaudeCode => &self.claude_code,
            ToolId::Codex => &self.codex,
            ToolId::GeminiCli => &self.gemini_cli,
        }
    }

    pub fn get_mut(&mut self, tool_id: ToolId) -> &mut ToolSyncState {
        match tool_id {
            ToolId::ClaudeCode => &mut self.claude_code,
            ToolId::Codex => &mut self.codex,
            ToolId::GeminiCli => &mut self.gemini_cli,
        }
    }
}

impl Default for ActiveStore {
    fn default() -> Self {
        Self::new()
    }
}

// ==================== 推导视图 ====================

/// 当前生效的配置（由原生文件推导）
///
/// `profile_name == None` 表示原生内容与任何 Profile 都不匹配（custom / drift）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveConfig {
    pub tool_id: ToolId,
    pub api_key: String,
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub profile_name: Option<String>,
}

impl ActiveConfig {
    pub fn from_credentials(
        tool_id: ToolId,
        creds: &Credentials,
        profile_name: Option<String>,
    ) -> Self {
        Self {
            tool_id,
            api_key: creds.api_key.clone(),
            base_url: creds.base_url.clone(),
            provider: creds.provider.clone(),
            profile_name,
        }
    }

    /// 原生文件无法解析时的 custom 状态
    pub fn unparseable(tool_id: ToolId) -> Self {
        Self {
            tool_id,
            api_key: String::new(),
            base_url: String::new(),
            provider: None,
            profile_name: None,
        }
    }
}

/// Profile 描述符（用于展示）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileDescriptor {
    pub tool_id: ToolId,
    pub name: String,
    pub api_key_preview: String,
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// 原生配置当前与该 Profile 匹配
    pub is_active: bool,
    /// 该 Profile 是最近切换的目标，但原生配置已被外部修改
    pub has_drift: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub switched_at: Option<DateTime<Utc>>,
}

impl ProfileDescriptor {
    pub fn new(
        profile: &Profile,
        active: &ActiveConfig,
        last_switched: Option<&ActiveProfile>,
    ) -> Self {
        let is_active = active.profile_name.as_deref() == Some(profile.name.as_str());
        let last = last_switched.filter(|ap| ap.profile == profile.name);

        Self {
            tool_id: profile.tool_id,
            name: profile.name.clone(),
            api_key_preview: mask_api_key(&profile.api_key),
            base_url: profile.base_url.clone(),
            provider: profile.provider.clone(),
            created_at: profile.created_at,
            updated_at: profile.updated_at,
            is_active,
            has_drift: last.is_some() && !is_active,
            switched_at: last.map(|ap| ap.switched_at),
        }
    }
}

// ==================== 辅助函数 ====================

pub fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let prefix: String = chars[..4].iter().collect();
    let suffix: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", prefix, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_api_key() {
        assert_eq!(mask_api_key("short"), "****");
        assert_eq!(mask_api_key("12345678"), "****");
        assert_eq!(mask_api_key("sk-ant-abcdef1234"), "sk-a...1234");
    }

    #[test]
    fn test_profiles_store_accepts_missing_tool_sections() {
        let json = r#"{"version":"2.0.0","codex":{},"metadata":{"last_updated":"2025-01-01T00:00:00Z"}}"#;
        let store: ProfilesStore = serde_json::from_str(json).unwrap();
        assert!(store.tool_profiles(ToolId::ClaudeCode).is_empty());
    }

    #[test]
    fn test_profiles_store_keeps_insertion_order() {
        let mut store = ProfilesStore::new();
        let now = Utc::now();
        for name in ["zeta", "alpha", "mid"] {
            store.tool_profiles_mut(ToolId::Codex).insert(
                name.to_string(),
                ProfileRecord {
                    api_key: "k".into(),
                    base_url: "u".into(),
                    provider: None,
                    created_at: now,
                    updated_at: now,
                },
            );
        }

        let json = serde_json::to_string(&store).unwrap();
        let restored: ProfilesStore = serde_json::from_str(&json).unwrap();
        let names: Vec<_> = restored.tool_profiles(ToolId::Codex).keys().cloned().collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_descriptor_flags() {
        let now = Utc::now();
        let profile = Profile {
            tool_id: ToolId::ClaudeCode,
            name: "work".into(),
            api_key: "sk-ant-abcdef1234".into(),
            base_url: "https://a".into(),
            provider: None,
            created_at: now,
            updated_at: now,
        };
        let hint = ActiveProfile {
            profile: "work".into(),
            switched_at: now,
        };

        let matched = ActiveConfig::from_credentials(
            ToolId::ClaudeCode,
            &profile.credentials(),
            Some("work".into()),
        );
        let d = ProfileDescriptor::new(&profile, &matched, Some(&hint));
        assert!(d.is_active);
        assert!(!d.has_drift);

        let drifted = ActiveConfig::unparseable(ToolId::ClaudeCode);
        let d = ProfileDescriptor::new(&profile, &drifted, Some(&hint));
        assert!(!d.is_active);
        assert!(d.has_drift);
        assert_eq!(d.switched_at, Some(now));
    }

    #[test]
    fn test_credentials_blank_provider_is_none() {
        let creds = Credentials::new("k", "u").with_provider(Some("  ".into()));
        assert_eq!(creds.provider, None);
    }
}
