// 单个代理实例管理
//
// ProxyInstance 封装单个工具的透明代理服务实例，负责：
// - HTTP 服务器的启动和停止
// - 请求的接收和转发
// - 运行期配置热更新（不重启监听端口）

use anyhow::{Context, Result};
use bytes::Bytes;
use futures_util::StreamExt;
use http_body_util::{BodyExt, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;

use super::headers::HeadersProcessor;
use super::utils::body::BodyError;
use super::utils::{box_body, error_responses, full, loop_detector, BoxBody};
use crate::models::{ToolId, ToolProxyConfig};

/// 不向客户端透传的逐跳响应头
const HOP_BY_HOP_HEADERS: [&str; 3] = ["connection", "transfer-encoding", "keep-alive"];

struct ServerHandle {
    task: tokio::task::JoinHandle<()>,
    port: u16,
}

/// 单个代理实例
pub struct ProxyInstance {
    tool_id: ToolId,
    config: Arc<RwLock<ToolProxyConfig>>,
    processor: Arc<dyn HeadersProcessor>,
    client: reqwest::Client,
    server: RwLock<Option<ServerHandle>>,
}

impl ProxyInstance {
    /// 创建新的代理实例
    pub fn new(
        tool_id: ToolId,
        config: ToolProxyConfig,
        processor: Box<dyn HeadersProcessor>,
    ) -> Self {
        Self {
            tool_id,
            config: Arc::new(RwLock::new(config)),
            processor: Arc::from(processor),
            client: reqwest::Client::new(),
            server: RwLock::new(None),
        }
    }

    /// 启动代理服务
    pub async fn start(&self) -> Result<()> {
        let mut server = self.server.write().await;
        if server.is_some() {
            anyhow::bail!("{} 代理实例已在运行", self.tool_id);
        }

        let config = self.config.read().await.clone();

        if !config.has_upstream() {
            tracing::warn!(
                tool_id = %self.tool_id,
                "代理启动时缺少上游配置，将在运行时拦截请求"
            );
        }

        let addr = if config.allow_public {
            SocketAddr::from(([0, 0, 0, 0], config.port))
        } else {
            SocketAddr::from(([127, 0, 0, 1], config.port))
        };

        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("绑定端口 {} 失败", config.port))?;
        let port = listener
            .local_addr()
            .context("读取监听地址失败")?
            .port();

        tracing::info!(
            tool_id = %self.tool_id,
            addr = %addr,
            port,
            allow_public = config.allow_public,
            "透明代理已启动"
        );

        let shared = Arc::new(RequestContext {
            tool_id: self.tool_id,
            config: Arc::clone(&self.config),
            processor: Arc::clone(&self.processor),
            client: self.client.clone(),
            own_port: port,
        });

        let task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _addr)) => {
                        let ctx = Arc::clone(&shared);
                        tokio::spawn(async move {
                            let io = TokioIo::new(stream);
                            let tool_id = ctx.tool_id;
                            let service = service_fn(move |req| {
                                let ctx = Arc::clone(&ctx);
                                async move { handle_request(req, ctx).await }
                            });

                            if let Err(err) =
                                http1::Builder::new().serve_connection(io, service).await
                            {
                                tracing::debug!(tool_id = %tool_id, error = ?err, "处理连接失败");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(tool_id = %shared.tool_id, error = ?e, "接受连接失败");
                    }
                }
            }
        });

        *server = Some(ServerHandle { task, port });
        Ok(())
    }

    /// 停止代理服务
    pub async fn stop(&self) -> Result<()> {
        if let Some(handle) = self.server.write().await.take() {
            handle.task.abort();
            tracing::info!(tool_id = %self.tool_id, "透明代理已停止");
        }
        Ok(())
    }

    /// 检查服务是否在运行
    pub async fn is_running(&self) -> bool {
        self.server
            .read()
            .await
            .as_ref()
            .is_some_and(|h| !h.task.is_finished())
    }

    /// 实际监听的端口（未运行时为 `None`）
    pub async fn port(&self) -> Option<u16> {
        self.server.read().await.as_ref().map(|h| h.port)
    }

    pub async fn config(&self) -> ToolProxyConfig {
        self.config.read().await.clone()
    }

    /// 只替换上游凭证
    pub async fn apply_upstream(
        &self,
        api_key: String,
        base_url: String,
        profile_name: Option<String>,
    ) {
        let mut config = self.config.write().await;
        config.real_api_key = Some(api_key);
        config.real_base_url = Some(base_url);
        config.real_profile_name = profile_name;
        tracing::info!(
            tool_id = %self.tool_id,
            profile = config.real_profile_name.as_deref().unwrap_or(""),
            "透明代理上游已热更新"
        );
    }
}

/// 请求处理共享上下文
struct RequestContext {
    tool_id: ToolId,
    config: Arc<RwLock<ToolProxyConfig>>,
    processor: Arc<dyn HeadersProcessor>,
    client: reqwest::Client,
    own_port: u16,
}

/// 处理单个请求
async fn handle_request(
    req: Request<Incoming>,
    ctx: Arc<RequestContext>,
) -> Result<Response<BoxBody>, Infallible> {
    match handle_request_inner(req, &ctx).await {
        Ok(res) => Ok(res),
        Err(e) => {
            tracing::error!(tool_id = %ctx.tool_id, error = ?e, "代理请求处理失败");
            Ok(error_responses::internal_error(&format!("{e:#}")))
        }
    }
}

/// 从 authorization / x-api-key 中提取客户端提供的 key
fn provided_key(req: &Request<Incoming>) -> &str {
    let auth_header = req
        .headers()
        .get("authorization")
        .or_else(|| req.headers().get("x-api-key"))
        .or_else(|| req.headers().get("x-goog-api-key"))
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    auth_header
        .strip_prefix("Bearer ")
        .or_else(|| auth_header.strip_prefix("x-api-key "))
        .unwrap_or(auth_header)
}

async fn handle_request_inner(
    req: Request<Incoming>,
    ctx: &RequestContext,
) -> Result<Response<BoxBody>> {
    // 每个请求读取一次配置快照，热更新对后续请求生效
    let proxy_config = ctx.config.read().await.clone();
    let (Some(real_api_key), Some(real_base_url)) = (
        proxy_config.real_api_key.as_deref().filter(|_| proxy_config.has_upstream()),
        proxy_config.real_base_url.as_deref(),
    ) else {
        return Ok(error_responses::configuration_missing(ctx.tool_id));
    };

    if let Some(local_key) = &proxy_config.local_api_key {
        if provided_key(&req) != local_key {
            return Ok(error_responses::unauthorized());
        }
    }

    let path = req.uri().path().to_string();
    let query = req.uri().query().map(|s| s.to_string());
    let method = req.method().clone();
    let mut headers = req.headers().clone();
    headers.remove("host");
    headers.remove("content-length");

    let target_url = ctx
        .processor
        .build_target_url(real_base_url, &path, query.as_deref());

    if loop_detector::is_proxy_loop(&target_url, ctx.own_port) {
        return Ok(error_responses::proxy_loop_detected(ctx.tool_id));
    }

    let body_bytes = if method != Method::GET && method != Method::HEAD {
        req.collect().await.context("读取请求体失败")?.to_bytes()
    } else {
        Bytes::new()
    };

    ctx.processor
        .process_request(&mut headers, &body_bytes, real_api_key)
        .await
        .context("处理请求 headers 失败")?;

    tracing::debug!(
        tool_id = %ctx.tool_id,
        method = %method,
        path = %path,
        target = %target_url,
        "代理请求"
    );

    let mut upstream_req = ctx.client.request(method, &target_url).headers(headers);
    if !body_bytes.is_empty() {
        upstream_req = upstream_req.body(body_bytes);
    }

    let upstream_res = upstream_req.send().await.context("上游请求失败")?;

    let status = StatusCode::from_u16(upstream_res.status().as_u16())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let is_sse = upstream_res
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/event-stream"));

    let mut response = Response::builder().status(status);
    for (name, value) in upstream_res.headers().iter() {
        if HOP_BY_HOP_HEADERS.contains(&name.as_str()) {
            continue;
        }
        response = response.header(name, value);
    }

    if is_sse {
        tracing::debug!(tool_id = %ctx.tool_id, "SSE 流式响应");
        let stream = upstream_res.bytes_stream().map(|result| {
            result
                .map(Frame::data)
                .map_err(|e| Box::new(e) as BodyError)
        });
        response
            .body(box_body(StreamBody::new(stream)))
            .context("构建 SSE 响应失败")
    } else {
        let body = upstream_res.bytes().await.context("读取响应体失败")?;
        response
            .body(full(body))
            .context("构建响应失败")
    }
}
