// Claude Code Headers 处理器

use super::{replace_auth_header, HeadersProcessor};
use crate::models::ToolId;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::HeaderMap as ReqwestHeaderMap;

/// Claude Code 专用 Headers 处理器
///
/// Authorization header 格式：`Bearer sk-ant-xxx`
pub struct ClaudeHeadersProcessor;

#[async_trait]
impl HeadersProcessor for ClaudeHeadersProcessor {
    fn tool_id(&self) -> ToolId {
        ToolId::ClaudeCode
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
