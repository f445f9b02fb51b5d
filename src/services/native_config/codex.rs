//! Codex 适配器：`~/.codex/config.toml` + `~/.codex/auth.json`
//!
//! provider 名称固定为 [`CODEX_PROVIDER_NAME`]，序列化结果与 Profile 名称无关。

use super::{require_file, NativeConfigAdapter, NativeSnapshot};
use crate::core::{SyncError, SyncResult};
use crate::data::managers::TomlManager;
use crate::data::DataManager;
use crate::models::Tool;
use crate::services::profile_manager::Credentials;
use serde_json::{Map, Value};
use std::path::PathBuf;
use toml_edit::DocumentMut;

pub const CODEX_PROVIDER_NAME: &str = "duckcoding";
pub const DEFAULT_WIRE_API: &str = "responses";
const API_KEY: &str = "OPENAI_API_KEY";

pub struct CodexAdapter {
    tool: Tool,
    data_manager: &'static DataManager,
}

impl CodexAdapter {
    pub fn new(tool: Tool) -> Self {
        Self {
            tool,
            data_manager: DataManager::global(),
        }
    }

    fn config_path(&self) -> PathBuf {
        self.tool.config_dir.join("config.toml")
    }

    fn auth_path(&self) -> PathBuf {
        self.tool.config_dir.join("auth.json")
    }
}

/// 确保 base_url 以 `/v1` 结尾
fn with_v1_suffix(base_url: &str) -> String {
    let normalized = base_url.trim_end_matches('/');
    if normalized.ends_with("/v1") {
        normalized.to_string()
    } else {
        format!("{}/v1", normalized)
    }
}

impl NativeConfigAdapter for CodexAdapter {
    fn tool(&self) -> &Tool {
        &self.tool
    }

    fn parse(&self, snapshot: &NativeSnapshot) -> SyncResult<Credentials> {
        let config_path = self.config_path();
        let auth_path = self.auth_path();

        let doc = self
            .data_manager
            .toml()
            .parse(&config_path, require_file(snapshot, &config_path)?)?;

        let api_key = match snapshot.get(&auth_path) {
            Some(content) => self
                .data_manager
                .json()
                .parse(&auth_path, content)?
                .get(API_KEY)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            None => String::new(),
        };

        let current_provider = doc
            .get("model_provider")
            .and_then(|v| v.as_str())
            .unwrap_or(CODEX_PROVIDER_NAME);

        let mut base_url = String::new();
        let mut wire_api = DEFAULT_WIRE_API.to_string();
        if let Some(provider) = doc
            .get("model_providers")
            .and_then(|v| v.as_table())
            .and_then(|providers| providers.get(current_provider))
            .and_then(|v| v.as_table())
        {
            if let Some(url) = provider.get("base_url").and_then(|v| v.as_str()) {
                base_url = url.to_string();
            }
            if let Some(api) = provider.get("wire_api").and_then(|v| v.as_str()) {
                wire_api = api.to_string();
            }
        }

        Ok(Credentials::new(api_key, base_url).with_provider(Some(wire_api)))
    }

    fn serialize(&self, base: &NativeSnapshot, creds: &Credentials) -> SyncResult<NativeSnapshot> {
        let config_path = self.config_path();
        let auth_path = self.auth_path();
        let toml = self.data_manager.toml();
        let json = self.data_manager.json();

        let mut doc = match base.get(&config_path) {
            Some(content) => toml.parse(&config_path, content)?,
            None => DocumentMut::new(),
        };
        let wire_api = creds.provider.as_deref().unwrap_or(DEFAULT_WIRE_API);

        let root = doc.as_table_mut();
        for (key, default) in [
            ("model", "gpt-5-codex"),
            ("model_reasoning_effort", "high"),
            ("network_access", "enabled"),
        ] {
            if !root.contains_key(key) {
                root.insert(key, toml_edit::value(default));
            }
        }
        root.insert("model_provider", toml_edit::value(CODEX_PROVIDER_NAME));

        let providers = TomlManager::ensure_table(root, "model_providers")?;
        let provider = TomlManager::ensure_table(providers, CODEX_PROVIDER_NAME)?;
        provider.insert("name", toml_edit::value(CODEX_PROVIDER_NAME));
        provider.insert("base_url", toml_edit::value(with_v1_suffix(&creds.base_url)));
        provider.insert("wire_api", toml_edit::value(wire_api));
        provider.insert("requires_openai_auth", toml_edit::value(true));

        let mut auth = match base.get(&auth_path) {
            Some(content) => json.parse(&auth_path, content)?,
            None => Value::Object(Map::new()),
        };
        let auth_obj = auth
            .as_object_mut()
            .ok_or_else(|| SyncError::parse(&auth_path, "auth.json 顶层不是对象"))?;
        auth_obj.insert(API_KEY.to_string(), Value::String(creds.api_key.clone()));

        Ok(base
            .clone()
            .with_file(config_path, Some(toml.render(&doc)))
            .with_file(auth_path, Some(json.render(&auth)?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ToolId;
    use crate::services::native_config::FingerprintLedger;
    use std::fs;
    use tempfile::TempDir;

    fn adapter(home: &std::path::Path) -> CodexAdapter {
        CodexAdapter::new(Tool::in_home(ToolId::Codex, home))
    }

    #[test]
    fn test_with_v1_suffix() {
        assert_eq!(with_v1_suffix("https://a"), "https://a/v1");
        assert_eq!(with_v1_suffix("https://a/"), "https://a/v1");
        assert_eq!(with_v1_suffix("https://a/v1/"), "https://a/v1");
    }

    #[test]
    fn test_write_and_read_back() {
        let home = TempDir::new().unwrap();
        let adapter = adapter(home.path());
        adapter
            .write(&Credentials::new("sk-a", "https://a"), &FingerprintLedger::new())
            .unwrap();

        let config = fs::read_to_string(adapter.config_path()).unwrap();
        assert!(config.contains("model_provider = \"duckcoding\""));
        assert!(config.contains("[model_providers.duckcoding]"));
        assert!(config.contains("base_url = \"https://a/v1\""));

        let creds = adapter.read().unwrap();
        assert_eq!(creds.api_key, "sk-a");
        assert_eq!(creds.base_url, "https://a/v1");
        assert_eq!(creds.provider.as_deref(), Some("responses"));
    }

    #[test]
    fn test_write_keeps_user_settings_and_comments() {
        let home = TempDir::new().unwrap();
        let adapter = adapter(home.path());
        fs::create_dir_all(&adapter.tool().config_dir).unwrap();
        fs::write(
            adapter.config_path(),
            "# my codex\nmodel = \"o3\"\n\n[model_providers.openai]\nbase_url = \"https://api.openai.com/v1\"\n",
        )
        .unwrap();

        adapter
            .write(&Credentials::new("k", "https://b"), &FingerprintLedger::new())
            .unwrap();

        let config = fs::read_to_string(adapter.config_path()).unwrap();
        assert!(config.contains("# my codex"));
        assert!(config.contains("model = \"o3\""));
        assert!(config.contains("[model_providers.openai]"));
    }

    #[test]
    fn test_fingerprint_ignores_v1_suffix_difference() {
        let home = TempDir::new().unwrap();
        let adapter = adapter(home.path());
        adapter
            .write(&Credentials::new("k", "https://a"), &FingerprintLedger::new())
            .unwrap();

        let snapshot = adapter.load().unwrap();
        let parsed = adapter.parse(&snapshot).unwrap();
        let canonical = adapter.fingerprint_with(&snapshot, &parsed).unwrap();
        let from_profile = adapter
            .fingerprint_with(&snapshot, &Credentials::new("k", "https://a"))
            .unwrap();
        assert_eq!(canonical, from_profile);
        assert_eq!(canonical, snapshot.fingerprint());
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let home = TempDir::new().unwrap();
        let adapter = adapter(home.path());
        fs::create_dir_all(&adapter.tool().config_dir).unwrap();
        fs::write(adapter.config_path(), "model = = 1").unwrap();
        assert!(adapter.read().unwrap_err().is_parse());
    }
}
