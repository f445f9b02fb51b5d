//! 代理错误响应模板
//!
//! 统一的 JSON 错误格式和响应构建

use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use serde_json::json;

use super::body::{full, BoxBody};
use crate::models::ToolId;

fn json_error(
    status: StatusCode,
    error: &str,
    message: String,
    details: &str,
) -> Response<BoxBody> {
    let payload = json!({
        "error": error,
        "message": message,
        "details": details,
    });
    let mut response = Response::new(full(payload.to_string()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// 配置缺失错误
pub fn configuration_missing(tool_id: ToolId) -> Response<BoxBody> {
    json_error(
        StatusCode::BAD_GATEWAY,
        "CONFIGURATION_MISSING",
        format!("{tool_id} 透明代理配置不完整"),
        "请先切换到一个有效的 Profile 或配置 API Key 和 Base URL",
    )
}

/// 代理回环错误
pub fn proxy_loop_detected(tool_id: ToolId) -> Response<BoxBody> {
    json_error(
        StatusCode::BAD_GATEWAY,
        "PROXY_LOOP_DETECTED",
        format!("{tool_id} 透明代理配置错误导致回环"),
        "请检查代理配置，确保 Base URL 不指向本地代理端口",
    )
}

/// 未授权错误
pub fn unauthorized() -> Response<BoxBody> {
    let mut response = Response::new(full("Unauthorized: Invalid API Key"));
    *response.status_mut() = StatusCode::UNAUTHORIZED;
    response
}

/// 内部错误
pub fn internal_error(message: &str) -> Response<BoxBody> {
    let mut response = Response::new(full(format!("代理错误: {message}")));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_configuration_missing_is_json_502() {
        let response = configuration_missing(ToolId::Codex);
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"], "CONFIGURATION_MISSING");
        assert!(value["message"].as_str().unwrap().contains("codex"));
    }

    #[test]
    fn test_unauthorized_status() {
        assert_eq!(unauthorized().status(), StatusCode::UNAUTHORIZED);
    }
}
