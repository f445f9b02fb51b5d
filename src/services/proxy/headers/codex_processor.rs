// Codex Headers 处理器

use super::{replace_auth_header, HeadersProcessor};
use crate::models::ToolId;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::HeaderMap as ReqwestHeaderMap;

/// Codex 专用 Headers 处理器（OpenAI 兼容 Bearer 认证）
pub struct CodexHeadersProcessor;

#[async_trait]
impl HeadersProcessor for CodexHeadersProcessor {
    fn tool_id(&self) -> ToolId {
        ToolId::Codex
    }

    async fn process_request(
        &self,
        headers: &mut ReqwestHeaderMap,
        _body: &[u8],
        target_api_key: &str,
    ) -> Result<()> {
        replace_auth_header(headers, "authorization", &format!("Bearer {}", target_api_key))
    }
}
