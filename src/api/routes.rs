// Route handlers and HTTP error mapping

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::warn;

use super::AppState;
use crate::error::TwapError;
use crate::feeds::PairFormat;
use crate::orders::{OrderRequest, OrderSnapshot, OrderSummary};
use crate::service::HealthReport;
use crate::types::{PriceTick, Side};

/// A [`TwapError`] rendered as `{"detail": ...}` with a matching status code
#[derive(Debug)]
pub struct ApiError(pub TwapError);

impl From<TwapError> for ApiError {
    fn from(err: TwapError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            TwapError::Validation(_) => StatusCode::BAD_REQUEST,
            TwapError::Unauthorized => StatusCode::UNAUTHORIZED,
            TwapError::NotFound(_) => StatusCode::NOT_FOUND,
            TwapError::Upstream(_) => StatusCode::BAD_GATEWAY,
            TwapError::FeedUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(error = %self.0, category = self.0.category(), "Request failed");
        }
        (status, Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub async fn root() -> Json<Value> {
    Json(json!({ "message": "TWAP paper trading server is running" }))
}

pub async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.service.health())
}

pub async fn exchanges(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "exchanges": state.service.exchanges() }))
}

#[derive(Debug, Deserialize)]
pub struct PairsQuery {
    #[serde(default)]
    pub format: PairFormat,
}

pub async fn pairs(
    State(state): State<AppState>,
    Path(exchange): Path<String>,
    Query(query): Query<PairsQuery>,
) -> ApiResult<Json<Value>> {
    let pairs = state.service.pairs(&exchange, query.format).await?;
    Ok(Json(json!({
        "exchange": exchange.to_ascii_lowercase(),
        "format": query.format,
        "pairs": pairs,
    })))
}

#[derive(Debug, Deserialize)]
pub struct PricesQuery {
    pub exchange: Option<String>,
}

pub async fn prices(State(state): State<AppState>, Query(query): Query<PricesQuery>) -> ApiResult<Json<Value>> {
    let prices = state.service.price_snapshot(query.exchange.as_deref())?;
    Ok(Json(json!({ "prices": prices })))
}

pub async fn price(
    State(state): State<AppState>,
    Path((exchange, symbol)): Path<(String, String)>,
) -> ApiResult<Json<PriceTick>> {
    Ok(Json(state.service.latest_price(&exchange, &symbol)?))
}

fn default_kline_limit() -> usize {
    100
}

#[derive(Debug, Deserialize)]
pub struct KlinesQuery {
    pub interval: String,
    #[serde(default = "default_kline_limit")]
    pub limit: usize,
}

pub async fn klines(
    State(state): State<AppState>,
    Path((exchange, symbol)): Path<(String, String)>,
    Query(query): Query<KlinesQuery>,
) -> ApiResult<Json<Value>> {
    let klines = state
        .service
        .klines(&exchange, &symbol, &query.interval, query.limit)
        .await?;
    Ok(Json(json!({ "klines": klines })))
}

fn default_execution_window() -> f64 {
    600.0
}

fn default_slice_interval() -> f64 {
    60.0
}

/// Body of `POST /orders/twap`
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitOrderBody {
    #[serde(alias = "token_id")]
    pub order_id: String,
    pub exchange: String,
    pub symbol: String,
    #[serde(alias = "order_type")]
    pub side: Side,
    pub quantity: f64,
    #[serde(default = "default_execution_window")]
    pub execution_window_secs: f64,
    #[serde(default = "default_slice_interval")]
    pub slice_interval_secs: f64,
    #[serde(default)]
    pub limit_price: Option<f64>,
}

impl From<SubmitOrderBody> for OrderRequest {
    fn from(body: SubmitOrderBody) -> Self {
        // Negative or non-finite durations become zero and are rejected as non-positive
        let secs = |value: f64| Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO);
        OrderRequest {
            order_id: body.order_id,
            exchange: body.exchange,
            symbol: body.symbol,
            side: body.side,
            quantity: body.quantity,
            execution_window: secs(body.execution_window_secs),
            slice_interval: secs(body.slice_interval_secs),
            limit_price: body.limit_price,
        }
    }
}

pub async fn submit_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SubmitOrderBody>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let access = state.access(&headers);
    let order = state.service.submit_order(access, body.into()).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "TWAP order accepted",
            "order_id": order.order.order_id,
            "order": order,
        })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct OrdersQuery {
    pub order_id: Option<String>,
}

pub async fn list_orders(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<OrdersQuery>,
) -> ApiResult<Json<Vec<OrderSummary>>> {
    let orders = state
        .service
        .orders(state.access(&headers), query.order_id.as_deref())?;
    Ok(Json(orders))
}

pub async fn get_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> ApiResult<Json<OrderSnapshot>> {
    Ok(Json(state.service.order(state.access(&headers), &order_id)?))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let order = state.service.cancel_order(state.access(&headers), &order_id)?;
    Ok(Json(json!({
        "message": "TWAP order cancelled",
        "order_id": order.order.order_id,
        "order": order,
    })))
}
