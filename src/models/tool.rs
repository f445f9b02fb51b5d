use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// 受管理的工具标识
///
/// 序列化名称即工具 ID，与 profiles.json / proxy.json 中的键保持一致。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ToolId {
    #[serde(rename = "claude-code")]
    ClaudeCode,
    #[serde(rename = "codex")]
    Codex,
    #[serde(rename = "gemini-cli")]
    GeminiCli,
}

impl ToolId {
    pub const ALL: [ToolId; 3] = [ToolId::ClaudeCode, ToolId::Codex, ToolId::GeminiCli];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolId::ClaudeCode => "claude-code",
            ToolId::Codex => "codex",
            ToolId::GeminiCli => "gemini-cli",
        }
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "claude-code" | "claude" => Ok(ToolId::ClaudeCode),
            "codex" => Ok(ToolId::Codex),
            "gemini-cli" | "gemini" => Ok(ToolId::GeminiCli),
            _ => Err(format!("不支持的工具 ID: {s}")),
        }
    }
}

/// 工具定义
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub id: ToolId,
    pub name: String,
    pub config_dir: PathBuf,
    /// 引擎负责读写的原生配置文件名（主配置在前）
    pub native_files: Vec<String>,
}

impl Tool {
    /// 以指定用户主目录构造所有工具
    pub fn all_in(home_dir: &Path) -> Vec<Tool> {
        ToolId::ALL
            .iter()
            .map(|id| Tool::in_home(*id, home_dir))
            .collect()
    }

    /// 以指定用户主目录构造单个工具
    pub fn in_home(id: ToolId, home_dir: &Path) -> Tool {
        match id {
            ToolId::ClaudeCode => Tool {
                id,
                name: "Claude Code".to_string(),
                config_dir: home_dir.join(".claude"),
                native_files: vec!["settings.json".to_string()],
            },
            ToolId::Codex => Tool {
                id,
                name: "CodeX".to_string(),
                config_dir: home_dir.join(".codex"),
                native_files: vec!["config.toml".to_string(), "auth.json".to_string()],
            },
            ToolId::GeminiCli => Tool {
                id,
                name: "Gemini CLI".to_string(),
                config_dir: home_dir.join(".gemini"),
                native_files: vec![".env".to_string()],
            },
        }
    }

    /// 主配置文件路径
    pub fn primary_path(&self) -> PathBuf {
        self.config_dir.join(&self.native_files[0])
    }

    /// 全部原生配置文件路径
    pub fn native_paths(&self) -> Vec<PathBuf> {
        self.native_files
            .iter()
            .map(|f| self.config_dir.join(f))
            .collect()
    }

    pub fn owns_path(&self, path: &Path) -> bool {
        self.native_paths().iter().any(|p| p == path)
    }
}
