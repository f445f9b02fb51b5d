//! 透明代理配置数据模型

use super::tool::ToolId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 单个工具的透明代理配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolProxyConfig {
    pub enabled: bool,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub real_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub real_base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub real_profile_name: Option<String>,
    #[serde(default)]
    pub allow_public: bool,
    #[serde(default)]
    pub auto_start: bool,
}

impl ToolProxyConfig {
    /// 创建默认配置
    pub fn new(port: u16) -> Self {
        Self {
            enabled: false,
            port,
            local_api_key: None,
            real_api_key: None,
            real_base_url: None,
            real_profile_name: None,
            allow_public: false,
            auto_start: false,
        }
    }

    /// 默认端口配置
    pub fn default_port(tool_id: ToolId) -> u16 {
        match tool_id {
            ToolId::ClaudeCode => 8787,
            ToolId::Codex => 8788,
            ToolId::GeminiCli => 8789,
        }
    }

    pub fn for_tool(tool_id: ToolId) -> Self {
        Self::new(Self::default_port(tool_id))
    }

    /// 真实上游凭证是否齐全
    pub fn has_upstream(&self) -> bool {
        self.real_api_key.as_deref().is_some_and(|k| !k.is_empty())
            && self.real_base_url.as_deref().is_some_and(|u| !u.is_empty())
    }
}

/// proxy.json 顶层结构
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyStore {
    pub version: String,
    #[serde(rename = "claude-code", default = "default_claude")]
    pub claude_code: ToolProxyConfig,
    #[serde(default = "default_codex")]
    pub codex: ToolProxyConfig,
    #[serde(rename = "gemini-cli", default = "default_gemini")]
    pub gemini_cli: ToolProxyConfig,
    pub metadata: ProxyMetadata,
}

fn default_claude() -> ToolProxyConfig {
    ToolProxyConfig::for_tool(ToolId::ClaudeCode)
}

fn default_codex() -> ToolProxyConfig {
    ToolProxyConfig::for_tool(ToolId::Codex)
}

fn default_gemini() -> ToolProxyConfig {
    ToolProxyConfig::for_tool(ToolId::GeminiCli)
}

impl ProxyStore {
    pub fn new() -> Self {
        Self {
            version: "2.1.0".to_string(),
            claude_code: default_claude(),
            codex: default_codex(),
            gemini_cli: default_gemini(),
            metadata: ProxyMetadata {
                last_updated: Utc::now(),
            },
        }
    }

    /// 获取指定工具的配置
    pub fn get_config(&self, tool_id: ToolId) -> &ToolProxyConfig {
        match tool_id {
            ToolId::ClaudeCode => &self.claude_code,
            ToolId::Codex => &self.codex,
            ToolId::GeminiCli => &self.gemini_cli,
        }
    }

    /// 更新指定工具的配置
    pub fn update_config(&mut self, tool_id: ToolId, config: ToolProxyConfig) {
        match tool_id {
            ToolId::ClaudeCode => self.claude_code = config,
            ToolId::Codex => self.codex = config,
            ToolId::GeminiCli => self.gemini_cli = config,
        }
        self.metadata.last_updated = Utc::now();
    }
}

impl Default for ProxyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyMetadata {
    pub last_updated: DateTime<Utc>,
}
