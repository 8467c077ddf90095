//! The [`tower::Service`] that terminates engine.io HTTP traffic and
//! forwards everything else to the wrapped inner service (spec §4.1/§6).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use http::{Method, Request, Response, StatusCode};
use tower::Service;

use crate::body::ResponseBody;
use crate::config::EngineIoConfig;
use crate::engine::EngineIo;
use crate::errors::Error;
use crate::handler::EngineIoHandler;
use crate::sid::Sid;
use crate::transport::{polling, ws, TransportType};

/// A [`tower::Service`] wrapping an inner service `S`: requests under the
/// configured `req_path` are handled by the engine.io transport layer,
/// everything else passes through untouched.
#[derive(Clone)]
pub struct EngineIoService<H: EngineIoHandler, S> {
    engine: Arc<EngineIo<H>>,
    inner: S,
}

impl<H: EngineIoHandler> EngineIoService<H, ()> {
    pub fn new(handler: H) -> Self {
        Self::with_config(handler, EngineIoConfig::default())
    }

    pub fn with_config(handler: H, config: EngineIoConfig) -> Self {
        Self::with_config_inner((), handler, config)
    }
}

impl<H: EngineIoHandler, S> EngineIoService<H, S> {
    pub fn with_config_inner(inner: S, handler: H, config: EngineIoConfig) -> Self {
        Self {
            engine: EngineIo::with_config(handler, config),
            inner,
        }
    }

    pub fn engine(&self) -> Arc<EngineIo<H>> {
        self.engine.clone()
    }
}

struct Query {
    sid: Option<Sid>,
    transport: Option<TransportType>,
}

fn parse_query(req: &Request<impl Sized>) -> Query {
    let mut sid = None;
    let mut transport = None;
    if let Some(q) = req.uri().query() {
        for pair in q.split('&') {
            let mut it = pair.splitn(2, '=');
            let (Some(key), Some(val)) = (it.next(), it.next()) else {
                continue;
            };
            match key {
                "sid" => sid = val.parse().ok(),
                "transport" => transport = val.parse::<TransportType>().ok(),
                _ => {}
            }
        }
    }
    Query { sid, transport }
}

impl<H, S, ReqBody, ResBody> Service<Request<ReqBody>> for EngineIoService<H, S>
where
    H: EngineIoHandler,
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send,
    ReqBody: http_body::Body + Send + Unpin + 'static,
    ReqBody::Error: std::fmt::Debug,
    ResBody: http_body::Body<Data = Bytes> + Send + 'static,
    ResBody::Error: std::error::Error + Send + Sync + 'static,
{
    type Response = Response<ResponseBody<ResBody>>;
    type Error = S::Error;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        if req.uri().path() != self.engine.config.req_path {
            let mut inner = self.inner.clone();
            return Box::pin(async move {
                inner
                    .call(req)
                    .await
                    .map(|res| res.map(ResponseBody::inner))
            });
        }

        let engine = self.engine.clone();
        Box::pin(async move {
            let query = parse_query(&req);
            let result = dispatch(engine, req, query).await;
            Ok(result.unwrap_or_else(error_response))
        })
    }
}

async fn dispatch<H, ReqBody, ResBody>(
    engine: Arc<EngineIo<H>>,
    req: Request<ReqBody>,
    query: Query,
) -> Result<Response<ResponseBody<ResBody>>, Error>
where
    H: EngineIoHandler,
    ReqBody: http_body::Body + Send + Unpin + 'static,
    ReqBody::Error: std::fmt::Debug,
    ResBody: Send + 'static,
{
    if *req.method() == Method::GET
        && query.transport == Some(TransportType::Websocket)
        && is_upgrade_request(&req)
    {
        return ws::upgrade(engine, req, query.sid).await;
    }

    match (req.method(), query.sid, query.transport) {
        (&Method::GET, None, _) => polling::open_req(engine, req),
        (&Method::GET, Some(sid), Some(TransportType::Polling) | None) => {
            polling::polling_req(engine, sid).await
        }
        (&Method::POST, Some(sid), _) => polling::post_req(engine, sid, req).await,
        _ => Err(Error::HttpErrorResponse(StatusCode::BAD_REQUEST)),
    }
}

/// True when the request carries `Connection: Upgrade` and `Upgrade:
/// websocket`, i.e. it is a genuine HTTP upgrade attempt and not just a
/// plain GET with `transport=websocket` in the query string.
fn is_upgrade_request<B>(req: &Request<B>) -> bool {
    let has_upgrade_header = req
        .headers()
        .get(http::header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));
    let has_connection_upgrade = req
        .headers()
        .get(http::header::CONNECTION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().contains("upgrade"));
    has_upgrade_header && has_connection_upgrade
}

fn error_response<B>(err: Error) -> Response<ResponseBody<B>> {
    let status = match err {
        Error::UnknownSessionID(_) => StatusCode::BAD_REQUEST,
        Error::TransportMismatch => StatusCode::BAD_REQUEST,
        Error::HttpErrorResponse(status) => status,
        Error::BadPacket(_) | Error::PacketParsing(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    tracing::debug!("engine.io request failed: {err}");
    let body = Bytes::from(err.to_string());
    Response::builder()
        .status(status)
        .body(ResponseBody::engine(body))
        .unwrap_or_else(|_| {
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(ResponseBody::engine(Bytes::new()))
                .unwrap()
        })
}
