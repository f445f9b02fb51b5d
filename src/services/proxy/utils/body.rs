//! 代理响应体
//!
//! 上游的流式响应和本地生成的错误响应统一装箱为 [`BoxBody`]。

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};

pub type BodyError = Box<dyn std::error::Error + Send + Sync>;

type DynBody = Pin<Box<dyn Body<Data = Bytes, Error = BodyError> + Send>>;

pin_project! {
    pub struct BoxBody {
        #[pin]
        inner: DynBody,
    }
}

impl Body for BoxBody {
    type Data = Bytes;
    type Error = BodyError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, BodyError>>> {
        self.project().inner.poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

pub fn box_body<B>(body: B) -> BoxBody
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BodyError>,
{
    BoxBody {
        inner: Box::pin(body.map_err(Into::into)),
    }
}

/// 一次性响应体（错误 JSON、缓冲后的上游响应）
pub fn full(data: impl Into<Bytes>) -> BoxBody {
    box_body(Full::new(data.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_full_body_collects() {
        let body = full(r#"{"ok":true}"#);
        assert_eq!(body.size_hint().exact(), Some(11));

        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(&collected[..], br#"{"ok":true}"#);
    }
}
