// HTTP and WebSocket surface over the trading service

pub mod routes;
pub mod stream;

use axum::http::HeaderMap;
use axum::routing::get;
use axum::Router;
use std::future::Future;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::TwapResult;
use crate::service::{Access, TradingService};

pub use routes::{ApiError, SubmitOrderBody};

#[derive(Debug, Clone)]
pub struct AppState {
    pub service: TradingService,
    /// Shared secret for protected routes; `None` lets every caller through
    pub auth_token: Option<String>,
}

impl AppState {
    pub fn new(service: TradingService, auth_token: Option<String>) -> Self {
        Self { service, auth_token }
    }

    pub fn access(&self, headers: &HeaderMap) -> Access {
        access(self.auth_token.as_deref(), headers)
    }
}

/// Turn request credentials into the service's notion of access
pub fn access(expected: Option<&str>, headers: &HeaderMap) -> Access {
    let Some(expected) = expected else {
        return Access::Authorized;
    };

    let bearer = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);
    let header_token = headers.get("x-token").and_then(|value| value.to_str().ok());

    if bearer == Some(expected) || header_token == Some(expected) {
        Access::Authorized
    } else {
        Access::Anonymous
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::root))
        .route("/health", get(routes::health))
        .route("/exchanges", get(routes::exchanges))
        .route("/exchanges/:exchange/pairs", get(routes::pairs))
        .route("/prices", get(routes::prices))
        .route("/prices/:exchange/:symbol", get(routes::price))
        .route("/klines/:exchange/:symbol", get(routes::klines))
        .route("/orders", get(routes::list_orders))
        .route("/orders/twap", axum::routing::post(routes::submit_order))
        .route("/orders/:order_id", get(routes::get_order).delete(routes::cancel_order))
        .route("/ws", get(stream::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the API on `listener` until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> TwapResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(%addr, "API server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(name: &'static str, value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_access_from_headers() {
        let token = Some("secret");
        assert_eq!(access(token, &headers("authorization", "Bearer secret")), Access::Authorized);
        assert_eq!(access(token, &headers("x-token", "secret")), Access::Authorized);
        assert_eq!(access(token, &headers("x-token", "wrong")), Access::Anonymous);
        assert_eq!(access(token, &headers("authorization", "Basic secret")), Access::Anonymous);
        assert_eq!(access(token, &HeaderMap::new()), Access::Anonymous);
    }

    #[test]
    fn test_no_token_configured_allows_everyone() {
        assert_eq!(access(None, &HeaderMap::new()), Access::Authorized);
    }
}
