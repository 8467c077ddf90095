//! The response body type returned by [`EngineIoService`](crate::service::EngineIoService).
//!
//! Requests that match the engine.io path produce a `Full<Bytes>` body;
//! everything else is forwarded unchanged to the wrapped inner `tower`
//! service, whose body type `B` is carried through untouched.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body::{Body, Frame};
use http_body_util::Full;

pin_project_lite::pin_project! {
    #[project = ResponseBodyProj]
    pub enum ResponseBody<B> {
        Engine { #[pin] inner: Full<Bytes> },
        Inner { #[pin] inner: B },
    }
}

impl<B> ResponseBody<B> {
    pub fn engine(bytes: impl Into<Bytes>) -> Self {
        ResponseBody::Engine {
            inner: Full::new(bytes.into()),
        }
    }

    pub fn inner(body: B) -> Self {
        ResponseBody::Inner { inner: body }
    }
}

impl<B> Body for ResponseBody<B>
where
    B: Body<Data = Bytes>,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    type Data = Bytes;
    type Error = Box<dyn std::error::Error + Send + Sync>;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project() {
            ResponseBodyProj::Engine { inner } => inner.poll_frame(cx).map_err(|e| match e {}),
            ResponseBodyProj::Inner { inner } => {
                inner.poll_frame(cx).map_err(|e| Box::new(e) as Self::Error)
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            ResponseBody::Engine { inner } => inner.is_end_stream(),
            ResponseBody::Inner { inner } => inner.is_end_stream(),
        }
    }
}
