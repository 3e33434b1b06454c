//! Access control: origin allow-list and per-IP rate limiting.

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, Method};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::core::error::AppError;
use crate::core::web_server::AppState;

/// Origins allowed to call the API. Requests without an `Origin` header
/// (curl, server-to-server) always pass.
#[derive(Debug, Clone)]
pub struct OriginPolicy {
    allowed: Arc<HashSet<String>>,
}

impl OriginPolicy {
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let allowed = origins
            .into_iter()
            .map(|o| o.into().trim_end_matches('/').to_string())
            .filter(|o| !o.is_empty())
            .collect();
        Self {
            allowed: Arc::new(allowed),
        }
    }

    pub fn is_allowed(&self, origin: Option<&str>) -> bool {
        match origin {
            None => true,
            Some(origin) => self.allowed.contains(origin.trim_end_matches('/')),
        }
    }

    /// CORS headers for allowed origins.
    pub fn cors_layer(&self) -> CorsLayer {
        let origins: Vec<HeaderValue> = self
            .allowed
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(value) => Some(value),
                Err(_) => {
                    log::warn!("Ignoring invalid CORS origin: {}", o);
                    None
                }
            })
            .collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE])
            .allow_credentials(true)
    }
}

/// Rejects requests from origins outside the allow-list with 403.
pub async fn enforce_origin(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .map(|value| value.to_str().unwrap_or_default().to_string());

    if !state.origins.is_allowed(origin.as_deref()) {
        return AppError::CorsRejected(origin.unwrap_or_default()).into_response();
    }

    next.run(request).await
}

/// Applies the per-IP fixed window before anything else on the route.
pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let ip = client_ip(&request, state.trust_forwarded_for);

    match state.rate_limiter.check(ip).await {
        Ok(remaining) => {
            log::debug!("Rate limit for {}: {} request(s) left", ip, remaining);
            next.run(request).await
        }
        Err(retry_after) => {
            log::warn!("Rate limit exceeded for {} (retry in {}s)", ip, retry_after.as_secs());
            AppError::RateLimited { retry_after }.into_response()
        }
    }
}

/// Peer address of the connection, or the first `X-Forwarded-For` hop when
/// running behind a trusted proxy.
pub fn client_ip(request: &Request, trust_forwarded_for: bool) -> IpAddr {
    if trust_forwarded_for {
        if let Some(ip) = forwarded_for(request.headers()) {
            return ip;
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

fn forwarded_for(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")?
        .to_str()
        .ok()?
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_origin_policy() {
        let policy = OriginPolicy::new(["http://localhost:8080", "https://app.example.com/"]);
        assert!(policy.is_allowed(None));
        assert!(policy.is_allowed(Some("http://localhost:8080")));
        assert!(policy.is_allowed(Some("https://app.example.com")));
        assert!(!policy.is_allowed(Some("https://evil.example.com")));
        assert!(!policy.is_allowed(Some("")));
    }

    #[test]
    fn test_client_ip_from_connect_info() {
        let mut request = Request::new(Body::empty());
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 168, 1, 7], 5555))));
        assert_eq!(client_ip(&request, false), IpAddr::from([192, 168, 1, 7]));
    }

    #[test]
    fn test_forwarded_for_only_when_trusted() {
        let mut request = Request::new(Body::empty());
        request
            .headers_mut()
            .insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9, 10.0.0.1"));
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 1], 80))));

        assert_eq!(client_ip(&request, true), IpAddr::from([203, 0, 113, 9]));
        assert_eq!(client_ip(&request, false), IpAddr::from([10, 0, 0, 1]));
    }

    #[test]
    fn test_missing_peer_falls_back_to_unspecified() {
        let request = Request::new(Body::empty());
        assert_eq!(client_ip(&request, false), IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }
}
