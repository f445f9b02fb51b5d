//! Claude Code 适配器：`~/.claude/settings.json` 的 `env` 段

use super::{require_file, NativeConfigAdapter, NativeSnapshot};
use crate::core::{SyncError, SyncResult};
use crate::data::managers::JsonManager;
use crate::data::DataManager;
use crate::models::Tool;
use crate::services::profile_manager::Credentials;
use serde_json::{Map, Value};

const API_KEY: &str = "ANTHROPIC_AUTH_TOKEN";
const BASE_URL: &str = "ANTHROPIC_BASE_URL";

pub struct ClaudeAdapter {
    tool: Tool,
    data_manager: &'static DataManager,
}

impl ClaudeAdapter {
    pub fn new(tool: Tool) -> Self {
        Self {
            tool,
            data_manager: DataManager::global(),
        }
    }
}

impl NativeConfigAdapter for ClaudeAdapter {
    fn tool(&self) -> &Tool {
        &self.tool
    }

    fn parse(&self, snapshot: &NativeSnapshot) -> SyncResult<Credentials> {
        let path = self.tool.primary_path();
        let settings = self
            .data_manager
            .json()
            .parse(&path, require_file(snapshot, &path)?)?;

        let env = settings
            .get("env")
            .and_then(Value::as_object)
            .ok_or_else(|| SyncError::parse(&path, "缺少 env"))?;

        let field = |key: &str| {
            env.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Ok(Credentials::new(field(API_KEY), field(BASE_URL)))
    }

    fn serialize(&self, base: &NativeSnapshot, creds: &Credentials) -> SyncResult<NativeSnapshot> {
        let path = self.tool.primary_path();
        let json = self.data_manager.json();

        let mut settings = match base.get(&path) {
            Some(content) => json.parse(&path, content)?,
            None => Value::Object(Map::new()),
        };
        if !settings.is_object() {
            return Err(SyncError::parse(&path, "settings.json 顶层不是对象"));
        }

        JsonManager::set_value(
            &mut settings,
            &format!("env.{API_KEY}"),
            creds.api_key.clone().into(),
        )?;
        JsonManager::set_value(
            &mut settings,
            &format!("env.{BASE_URL}"),
            creds.base_url.clone().into(),
        )?;

        let rendered = json.render(&settings)?;
        Ok(base.clone().with_file(path, Some(rendered)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ToolId;
    use crate::services::native_config::FingerprintLedger;
    use std::fs;
    use tempfile::TempDir;

    fn adapter(home: &std::path::Path) -> ClaudeAdapter {
        ClaudeAdapter::new(Tool::in_home(ToolId::ClaudeCode, home))
    }

    #[test]
    fn test_write_preserves_unrelated_settings() {
        let home = TempDir::new().unwrap();
        let adapter = adapter(home.path());
        let path = adapter.tool().primary_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, r#"{"theme":"dark","env":{"OTHER":"1"}}"#).unwrap();

        let creds = Credentials::new("sk-ant-1", "https://api.example.com");
        adapter.write(&creds, &FingerprintLedger::new()).unwrap();

        let value: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["theme"], "dark");
        assert_eq!(value["env"]["OTHER"], "1");
        assert_eq!(value["env"][API_KEY], "sk-ant-1");
        assert_eq!(adapter.read().unwrap(), creds);
    }

    #[test]
    fn test_missing_file_is_parse_error() {
        let home = TempDir::new().unwrap();
        let err = adapter(home.path()).read().unwrap_err();
        assert!(err.is_parse());
    }

    #[test]
    fn test_write_creates_file_and_records_ledger() {
        let home = TempDir::new().unwrap();
        let adapter = adapter(home.path());
        let ledger = FingerprintLedger::new();

        let written = adapter
            .write(&Credentials::new("k", "https://u"), &ledger)
            .unwrap();
        let path = adapter.tool().primary_path();
        assert!(path.exists());
        assert_eq!(ledger.expected(ToolId::ClaudeCode, &path), written.checksum_of(&path));
    }

    #[test]
    fn test_round_trip_fingerprint() {
        let home = TempDir::new().unwrap();
        let adapter = adapter(home.path());
        let path = adapter.tool().primary_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            "{\n  \"env\": {\n    \"ANTHROPIC_AUTH_TOKEN\": \"k\",\n    \"ANTHROPIC_BASE_URL\": \"https://u\"\n  }\n}\n",
        )
        .unwrap();

        let snapshot = adapter.load().unwrap();
        let creds = adapter.parse(&snapshot).unwrap();
        let rewritten = adapter.serialize(&snapshot, &creds).unwrap();
        assert_eq!(rewritten.fingerprint(), snapshot.fingerprint());
    }
}
