//! Small helpers for building HTTP responses from the polling transport.

use bytes::Bytes;
use http::{HeaderValue, Response, StatusCode};

use crate::body::ResponseBody;

/// Builds a 200/4xx response carrying `body` as the full response body,
/// tagging the content type appropriately for plain-text vs. binary
/// polling payloads (spec §6).
pub fn http_response<B>(
    status: StatusCode,
    body: impl Into<Bytes>,
    is_binary: bool,
) -> Result<Response<ResponseBody<B>>, http::Error> {
    let content_type = if is_binary {
        "application/octet-stream"
    } else {
        "text/plain; charset=UTF-8"
    };
    Response::builder()
        .status(status)
        .header(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static(content_type),
        )
        .body(ResponseBody::engine(body))
}
