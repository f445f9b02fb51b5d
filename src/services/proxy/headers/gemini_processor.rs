// Gemini CLI Headers 处理器

use super::{replace_auth_header, HeadersProcessor};
use crate::models::ToolId;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::HeaderMap as ReqwestHeaderMap;

/// Gemini CLI 专用 Headers 处理器
///
/// Google API 使用 `x-goog-api-key` 而不是 Bearer Token。
pub struct GeminiHeadersProcessor;

#[async_trait]
impl HeadersProcessor for GeminiHeadersProcessor {
    fn tool_id(&self) -> ToolId {
        ToolId::GeminiCli
    }

    async fn process_request(
        &self,
        headers: &mut ReqwestHeaderMap,
        _body: &[u8],
        target_api_key: &str,
    ) -> Result<()> {
        replace_auth_header(headers, "x-goog-api-key", target_api_key)
    }
}
