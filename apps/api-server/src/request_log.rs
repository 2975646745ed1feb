//! Per-request log context: request id and client origin.
//!
//! The id comes from the `x-request-id` header that `SetRequestIdLayer` stamps
//! on every request; the origin is taken from forwarding headers when present,
//! otherwise from the socket peer recorded by `ConnectInfo`.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::async_trait;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::Request;

/// Log fields shared by handler log lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLogData {
    pub id: String,
    pub origin_ip: String,
}

impl RequestLogData {
    fn from_parts(headers: &axum::http::HeaderMap, extensions: &axum::http::Extensions) -> Self {
        let id = http_common::request_id(headers).to_string();
        let origin_ip = http_common::origin_ip(headers)
            .or_else(|| {
                extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            })
            .unwrap_or_else(|| "-".to_string());
        Self { id, origin_ip }
    }

    /// Same extraction for the trace layer, which sees the whole request.
    pub fn from_request<B>(request: &Request<B>) -> Self {
        Self::from_parts(request.headers(), request.extensions())
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestLogData
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(&parts.headers, &parts.extensions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn reads_id_and_forwarded_origin() {
        let req = Request::builder()
            .header("x-request-id", "req-1")
            .header("x-forwarded-for", "203.0.113.9")
            .body(Body::empty())
            .unwrap();
        let data = RequestLogData::from_request(&req);
        assert_eq!(data.id, "req-1");
        assert_eq!(data.origin_ip, "203.0.113.9");
    }

    #[test]
    fn falls_back_to_peer_address() {
        let mut req = Request::builder().body(Body::empty()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 10], 41000))));
        let data = RequestLogData::from_request(&req);
        assert_eq!(data.id, "-");
        assert_eq!(data.origin_ip, "192.0.2.10");
    }

    #[test]
    fn unknown_origin_is_dash() {
        let req = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(RequestLogData::from_request(&req).origin_ip, "-");
    }
}
