// Headers 处理器模块 - 为不同工具提供独立的 headers 处理逻辑

use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::HeaderMap as ReqwestHeaderMap;

use crate::models::ToolId;

mod claude_processor;
mod codex_processor;
mod gemini_processor;

pub use claude_processor::ClaudeHeadersProcessor;
pub use codex_processor::CodexHeadersProcessor;
pub use gemini_processor::GeminiHeadersProcessor;

/// 客户端认证相关的 headers，转发前一律移除
const CLIENT_AUTH_HEADERS: [&str; 3] = ["authorization", "x-api-key", "x-goog-api-key"];

/// Headers 处理器 trait
///
/// 为不同的 AI 编程工具提供独立的请求 headers 处理逻辑。
/// 每个工具的认证方式不同，本地 key 必须替换为上游真实 key。
#[async_trait]
pub trait HeadersProcessor: Send + Sync {
    fn tool_id(&self) -> ToolId;

    /// 处理请求 headers（转发到上游前调用）
    ///
    /// 返回 `Err` 会中断请求。
    async fn process_request(
        &self,
        headers: &mut ReqwestHeaderMap,
        body: &[u8],
        target_api_key: &str,
    ) -> Result<()>;

    /// 拼接上游 URL
    ///
    /// base 已以 `/v1` 结尾且请求路径也以 `/v1` 开头时去掉重复段。
    fn build_target_url(&self, base_url: &str, path: &str, query: Option<&str>) -> String {
        let base = base_url.trim_end_matches('/');
        let path = if base.ends_with("/v1") && (path == "/v1" || path.starts_with("/v1/")) {
            &path[3..]
        } else {
            path
        };

        match query {
            Some(q) if !q.is_empty() => format!("{base}{path}?{q}"),
            _ => format!("{base}{path}"),
        }
    }
}

/// 移除客户端认证 headers 后写入上游认证
pub(crate) fn replace_auth_header(
    headers: &mut ReqwestHeaderMap,
    name: &'static str,
    value: &str,
) -> Result<()> {
    for header in CLIENT_AUTH_HEADERS {
        headers.remove(header);
    }
    headers.insert(
        name,
        value
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {} header: {}", name, e))?,
    );
    Ok(())
}

/// 创建 Headers 处理器工厂函数
pub fn create_headers_processor(tool_id: ToolId) -> Box<dyn HeadersProcessor> {
    match tool_id {
        ToolId::ClaudeCode => Box::new(ClaudeHeadersProcessor),
        ToolId::Codex => Box::new(CodexHeadersProcessor),
        ToolId::GeminiCli => Box::new(GeminiHeadersProcessor),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_headers_processor() {
        for id in ToolId::ALL {
            assert_eq!(create_headers_processor(id).tool_id(), id);
        }
    }

    #[test]
    fn test_build_target_url() {
        let processor = CodexHeadersProcessor;
        assert_eq!(
            processor.build_target_url("https://a/v1/", "/v1/responses", None),
            "https://a/v1/responses"
        );
        assert_eq!(
            processor.build_target_url("https://a", "/v1/responses", Some("x=1")),
            "https://a/v1/responses?x=1"
        );
        assert_eq!(
            processor.build_target_url("https://a/v1", "/v1beta/models", None),
            "https://a/v1/v1beta/models"
        );
    }

    #[tokio::test]
    async fn test_claude_processor_basic() {
        let processor = ClaudeHeadersProcessor;
        let mut headers = ReqwestHeaderMap::new();
        headers.insert("x-api-key", "local".parse().unwrap());

        processor
            .process_request(&mut headers, b"", "test-api-key")
            .await
            .unwrap();

        let auth_header = headers.get("authorization").unwrap().to_str().unwrap();
        assert_eq!(auth_header, "Bearer test-api-key");
        assert!(headers.get("x-api-key").is_none());
    }

    #[tokio::test]
    async fn test_gemini_processor_uses_goog_header() {
        let processor = GeminiHeadersProcessor;
        let mut headers = ReqwestHeaderMap::new();
        headers.insert("authorization", "Bearer local".parse().unwrap());

        processor
            .process_request(&mut headers, b"", "g-key")
            .await
            .unwrap();

        assert_eq!(headers.get("x-goog-api-key").unwrap(), "g-key");
        assert!(headers.get("authorization").is_none());
    }
}
