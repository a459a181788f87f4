//! Network access control, per-client rate limiting, and response headers.
//!
//! Every request passes the ACL check and the rate limiter before routing.
//! The access policy is rebuilt from the live config snapshot per request,
//! so a config reload applies immediately without any cached state.

use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use ipnet::IpNet;
use tracing::warn;

use super::routes::error_response;
use crate::config::{parse_network, NetworkSecurityConfig};
use crate::mcp::handler::AppState;

/// Endpoint classes with distinct rate budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    /// Polling reads: task listings and config views.
    Read,
    /// State-changing calls: submit, activate, close, config writes.
    Submit,
    /// The test-notification probe.
    Probe,
}

impl EndpointClass {
    /// Classify a request path.
    #[must_use]
    pub fn for_path(path: &str) -> Self {
        if path == "/api/test-bark" {
            Self::Probe
        } else if path.ends_with("/submit")
            || path.ends_with("/activate")
            || path == "/api/submit"
            || path == "/api/close"
            || path == "/api/update-notification-config"
        {
            Self::Submit
        } else {
            Self::Read
        }
    }

    /// `(max requests, window)` for this class.
    #[must_use]
    pub fn budget(self) -> (usize, Duration) {
        match self {
            Self::Read => (300, Duration::from_secs(60)),
            Self::Submit => (60, Duration::from_secs(60)),
            Self::Probe => (6, Duration::from_secs(60)),
        }
    }
}

/// Fixed-window request counter per `(client address, endpoint class)`.
#[derive(Default)]
pub struct RateLimiter {
    windows: Mutex<HashMap<(IpAddr, EndpointClass), VecDeque<Instant>>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit or reject one request. On rejection returns the seconds the
    /// client should wait before retrying. Rejected requests are not
    /// counted against the window.
    ///
    /// # Errors
    ///
    /// The error value is the `Retry-After` hint in whole seconds.
    pub fn check(&self, ip: IpAddr, class: EndpointClass) -> std::result::Result<(), u64> {
        let (max, window) = class.budget();
        let now = Instant::now();
        let mut map = self
            .windows
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let entry = map.entry((ip, class)).or_default();
        while entry
            .front()
            .is_some_and(|ts| now.saturating_duration_since(*ts) > window)
        {
            entry.pop_front();
        }
        if entry.len() >= max {
            let retry_after = entry
                .front()
                .map(|ts| window.saturating_sub(now.saturating_duration_since(*ts)))
                .unwrap_or(window);
            return Err(retry_after.as_secs().max(1));
        }
        entry.push_back(now);
        Ok(())
    }
}

/// Compiled view of the `network_security` section.
pub struct AccessPolicy {
    enabled: bool,
    bound_to_loopback: bool,
    allowed: Vec<IpNet>,
    blocked: Vec<IpAddr>,
}

impl AccessPolicy {
    /// Build the policy from a config section. Unparseable entries are
    /// dropped with a warning (validation normally rejects them earlier).
    #[must_use]
    pub fn from_config(section: &NetworkSecurityConfig) -> Self {
        let allowed = section
            .allowed_networks
            .iter()
            .filter_map(|entry| match parse_network(entry) {
                Ok(net) => Some(net),
                Err(err) => {
                    warn!(%err, "skipping invalid allowed_networks entry");
                    None
                }
            })
            .collect();
        let blocked = section
            .blocked_ips
            .iter()
            .filter_map(|entry| match entry.parse() {
                Ok(addr) => Some(addr),
                Err(err) => {
                    warn!(entry = %entry, %err, "skipping invalid blocked_ips entry");
                    None
                }
            })
            .collect();
        let bound_to_loopback = matches!(
            section.bind_interface.as_str(),
            "127.0.0.1" | "::1" | "localhost"
        );
        Self {
            enabled: section.enable_access_control,
            bound_to_loopback,
            allowed,
            blocked,
        }
    }

    /// Whether a client address may call at all.
    #[must_use]
    pub fn is_allowed(&self, ip: IpAddr) -> bool {
        if !self.enabled {
            return true;
        }
        if self.blocked.contains(&ip) {
            return false;
        }
        if ip.is_loopback() && self.bound_to_loopback {
            return true;
        }
        self.allowed.iter().any(|net| net.contains(&ip))
    }
}

/// Client address for policy decisions: first `X-Forwarded-For` entry when
/// a proxy added one, else the socket peer.
#[must_use]
pub fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> IpAddr {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or_else(|| peer.ip())
}

/// ACL + rate-limit middleware applied ahead of every route.
pub async fn guard(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let ip = client_ip(request.headers(), peer);

    let snapshot = state.config.snapshot();
    let policy = AccessPolicy::from_config(&snapshot.network_security);
    if !policy.is_allowed(ip) {
        warn!(%ip, "request rejected by access policy");
        return error_response(StatusCode::FORBIDDEN, "client address is not allowed");
    }

    let class = EndpointClass::for_path(request.uri().path());
    if let Err(retry_after) = state.limiter.check(ip, class) {
        let mut response = error_response(StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded");
        if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        return response;
    }

    next.run(request).await
}

/// Content-security headers on HTML responses: no third-party scripts, no
/// framing, no MIME sniffing.
pub async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|ct| ct.to_str().ok())
        .is_some_and(|ct| ct.to_ascii_lowercase().starts_with("text/html"));
    if is_html {
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static(
                "default-src 'self'; script-src 'self'; style-src 'self' 'unsafe-inline'; \
                 img-src 'self' data: blob:; connect-src 'self'; frame-ancestors 'none'; \
                 base-uri 'self'; object-src 'none'",
            ),
        );
        headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
        headers.insert(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        );
        headers.insert(
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        );
    }
    response
}
