//! Gemini CLI 适配器：`~/.gemini/.env`

use super::{require_file, NativeConfigAdapter, NativeSnapshot};
use crate::core::SyncResult;
use crate::data::DataManager;
use crate::models::Tool;
use crate::services::profile_manager::Credentials;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash-exp";
const API_KEY: &str = "GEMINI_API_KEY";
const BASE_URL: &str = "GOOGLE_GEMINI_BASE_URL";
const MODEL: &str = "GEMINI_MODEL";

pub struct GeminiAdapter {
    tool: Tool,
    data_manager: &'static DataManager,
}

impl GeminiAdapter {
    pub fn new(tool: Tool) -> Self {
        Self {
            tool,
            data_manager: DataManager::global(),
        }
    }
}

impl NativeConfigAdapter for GeminiAdapter {
    fn tool(&self) -> &Tool {
        &self.tool
    }

    fn parse(&self, snapshot: &NativeSnapshot) -> SyncResult<Credentials> {
        let path = self.tool.primary_path();
        let content = String::from_utf8_lossy(require_file(snapshot, &path)?);
        let mut pairs = self.data_manager.env().parse(&content);

        let api_key = pairs.remove(API_KEY).unwrap_or_default();
        let base_url = pairs.remove(BASE_URL).unwrap_or_default();
        let model = pairs
            .remove(MODEL)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string());

        Ok(Credentials::new(api_key, base_url).with_provider(Some(model)))
    }

    fn serialize(&self, base: &NativeSnapshot, creds: &Credentials) -> SyncResult<NativeSnapshot> {
        let path = self.tool.primary_path();
        let current = base.text(&path).unwrap_or_default();
        let model = creds.provider.as_deref().unwrap_or(DEFAULT_GEMINI_MODEL);

        let rendered = self.data_manager.env().apply(
            &current,
            &[
                (API_KEY, creds.api_key.as_str()),
                (BASE_URL, creds.base_url.as_str()),
                (MODEL, model),
            ],
        );
        Ok(base.clone().with_file(path, Some(rendered.into_bytes())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ToolId;
    use crate::services::native_config::FingerprintLedger;
    use std::fs;
    use tempfile::TempDir;

    fn adapter(home: &std::path::Path) -> GeminiAdapter {
        GeminiAdapter::new(Tool::in_home(ToolId::GeminiCli, home))
    }

    #[test]
    fn test_write_preserves_comments() {
        let home = TempDir::new().unwrap();
        let adapter = adapter(home.path());
        let path = adapter.tool().primary_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "# gemini\nGEMINI_API_KEY=old\nEXTRA=1\n").unwrap();

        adapter
            .write(&Credentials::new("new", "https://g"), &FingerprintLedger::new())
            .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# gemini\nGEMINI_API_KEY=new\n"));
        assert!(content.contains("EXTRA=1"));
        assert!(content.contains("GEMINI_MODEL=gemini-2.0-flash-exp"));
    }

    #[test]
    fn test_quoted_values_match_canonically() {
        let home = TempDir::new().unwrap();
        let adapter = adapter(home.path());
        let path = adapter.tool().primary_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            "GEMINI_API_KEY=\"k\"\nGOOGLE_GEMINI_BASE_URL=https://g\n",
        )
        .unwrap();

        let snapshot = adapter.load().unwrap();
        let creds = adapter.parse(&snapshot).unwrap();
        assert_eq!(creds.api_key, "k");
        assert_eq!(creds.provider.as_deref(), Some(DEFAULT_GEMINI_MODEL));

        assert_eq!(
            adapter.fingerprint_with(&snapshot, &creds).unwrap(),
            adapter
                .fingerprint_with(&snapshot, &Credentials::new("k", "https://g"))
                .unwrap()
        );
    }
}
