//! JSON HTTP transport over [`RecommendationService`].

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderValue, Method, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{net::TcpListener, task};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::classifier::WeightOverrides;
use crate::hybrid::DEFAULT_RESULT_LIMIT;
use crate::import::ImportStatus;
use crate::model::{HybridWeights, Item, Recommendation, User};
use crate::service::RecommendationService;
use crate::strategy::TrendWindow;

/// Listener settings.
#[derive(Clone, Debug)]
pub struct ServerOptions {
    /// Interface to bind to.
    pub host: String,
    /// Listening port.
    pub port: u16,
    /// Allowed CORS origins; `"*"` allows any.
    pub allow_origins: Vec<String>,
}

/// Errors that can occur while running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configured host/port is not a socket address.
    #[error("invalid listen address '{0}'")]
    Address(String),
    /// Binding or serving failed.
    #[error("server io error: {0}")]
    Io(#[from] std::io::Error),
}

type AppState = Arc<RecommendationService>;

/// Binds the listener and serves until ctrl-c.
pub async fn serve(
    service: Arc<RecommendationService>,
    options: ServerOptions,
) -> Result<(), ServerError> {
    let raw = format!("{}:{}", options.host, options.port);
    let addr: SocketAddr = raw.parse().map_err(|_| ServerError::Address(raw.clone()))?;
    let app = build_router(service, &options.allow_origins);
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(%addr, allow_origins = ?options.allow_origins, "menugraph listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// All routes with request tracing and, when origins are given, CORS.
pub fn build_router(service: Arc<RecommendationService>, allow_origins: &[String]) -> Router {
    let api = Router::new()
        .route(
            "/recommendations/user-frequent/:user_id",
            get(user_frequent_handler),
        )
        .route(
            "/recommendations/user-co-orders/:user_id/:item_id",
            get(user_co_orders_handler),
        )
        .route(
            "/recommendations/global-co-orders/:item_id",
            get(global_co_orders_handler),
        )
        .route("/recommendations/trending", get(trending_handler))
        .route("/recommendations/hybrid/:user_id", get(hybrid_handler))
        .route("/items", get(items_handler))
        .route("/users", get(users_handler))
        .route("/status", get(status_handler))
        .fallback(api_not_found);

    let mut router = Router::new()
        .route("/health", get(health_handler))
        .nest("/api", api);

    if let Some(layer) = build_cors_layer(allow_origins) {
        router = router.layer(layer);
    }

    router.with_state(service).layer(TraceLayer::new_for_http())
}

fn build_cors_layer(origins: &[String]) -> Option<CorsLayer> {
    if origins.is_empty() {
        return None;
    }
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([ACCEPT, CONTENT_TYPE]);
    if origins.iter().any(|origin| origin.trim() == "*") {
        return Some(base.allow_origin(Any));
    }

    let mut allowed = Vec::new();
    for origin in origins {
        let normalized = origin.trim().trim_end_matches('/');
        match HeaderValue::from_str(normalized) {
            Ok(value) if !normalized.is_empty() => allowed.push(value),
            _ => tracing::warn!(%origin, "ignoring invalid CORS origin"),
        }
    }
    if allowed.is_empty() {
        return None;
    }
    Some(base.allow_origin(AllowOrigin::list(allowed)))
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn api_not_found() -> AppError {
    AppError::NotFound
}

async fn user_frequent_handler(
    State(service): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<StrategyResponse>, AppError> {
    let user_id = parse_id(&user_id, IdKind::User)?;
    let recommendations =
        blocking(move || service.user_frequent_items(user_id).map_err(AppError::from)).await?;
    Ok(Json(StrategyResponse {
        user_id: Some(user_id),
        item_id: None,
        days: None,
        recommendations,
        strategy: "UserFrequency",
        description: "Items you order most frequently",
    }))
}

async fn user_co_orders_handler(
    State(service): State<AppState>,
    Path((user_id, item_id)): Path<(String, String)>,
) -> Result<Json<StrategyResponse>, AppError> {
    let user_id = parse_id(&user_id, IdKind::User)?;
    let item_id = parse_id(&item_id, IdKind::Item)?;
    let recommendations = blocking(move || {
        service
            .user_co_ordered_items(user_id, item_id)
            .map_err(AppError::from)
    })
    .await?;
    Ok(Json(StrategyResponse {
        user_id: Some(user_id),
        item_id: Some(item_id),
        days: None,
        recommendations,
        strategy: "UserCoOrders",
        description: "Items you frequently order with this item",
    }))
}

async fn global_co_orders_handler(
    State(service): State<AppState>,
    Path(item_id): Path<String>,
) -> Result<Json<StrategyResponse>, AppError> {
    let item_id = parse_id(&item_id, IdKind::Item)?;
    let recommendations = blocking(move || {
        service
            .global_co_ordered_items(item_id)
            .map_err(AppError::from)
    })
    .await?;
    Ok(Json(StrategyResponse {
        user_id: None,
        item_id: Some(item_id),
        days: None,
        recommendations,
        strategy: "GlobalCoOrders",
        description: "Items frequently ordered with this item by all customers",
    }))
}

async fn trending_handler(
    State(service): State<AppState>,
    Query(query): Query<TrendingQuery>,
) -> Result<Json<StrategyResponse>, AppError> {
    let days = TrendWindow::parse(query.days.as_deref()).days();
    let recommendations = blocking(move || {
        service
            .trending_items(i64::from(days))
            .map_err(AppError::from)
    })
    .await?;
    Ok(Json(StrategyResponse {
        user_id: None,
        item_id: None,
        days: Some(days),
        recommendations,
        strategy: "TimeBasedTrend",
        description: "Currently trending items",
    }))
}

async fn hybrid_handler(
    State(service): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<HybridQuery>,
) -> Result<Json<HybridResponse>, AppError> {
    let user_id = parse_id(&user_id, IdKind::User)?;
    let item_in_cart = query
        .item_in_cart
        .as_deref()
        .and_then(|raw| raw.trim().parse::<i64>().ok());
    let overrides = WeightOverrides::parse(
        query.user_freq.as_deref(),
        query.user_co_orders.as_deref(),
        query.global_co_orders.as_deref(),
        query.time_trend.as_deref(),
    );
    let (weights, recommendations) = blocking(move || {
        let weights = overrides.apply(service.weights_for_user(user_id));
        let mut recommendations = service.hybrid_recommendation(user_id, item_in_cart, &weights);
        recommendations.truncate(DEFAULT_RESULT_LIMIT);
        Ok((weights, recommendations))
    })
    .await?;
    Ok(Json(HybridResponse {
        user_id,
        item_in_cart,
        weights,
        recommendations,
        strategy: "Hybrid",
        description: "Personalized recommendations based on multiple factors",
    }))
}

async fn items_handler(
    State(service): State<AppState>,
    Query(query): Query<ItemsQuery>,
) -> Result<Json<Vec<Item>>, AppError> {
    let items = blocking(move || {
        let items = match query.category.as_deref().map(str::trim) {
            Some(category) if !category.is_empty() => service.items_by_category(category),
            _ => service.all_items(),
        };
        items.map_err(AppError::from)
    })
    .await?;
    Ok(Json(items))
}

async fn users_handler(State(service): State<AppState>) -> Result<Json<Vec<User>>, AppError> {
    let users = blocking(move || service.all_users().map_err(AppError::from)).await?;
    Ok(Json(users))
}

async fn status_handler(State(service): State<AppState>) -> Result<Json<ImportStatus>, AppError> {
    let status = blocking(move || service.import_status().map_err(AppError::from)).await?;
    Ok(Json(status))
}

async fn blocking<T, F>(work: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
{
    task::spawn_blocking(work).await?
}

#[derive(Debug, Clone, Copy)]
enum IdKind {
    User,
    Item,
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdKind::User => f.write_str("user"),
            IdKind::Item => f.write_str("item"),
        }
    }
}

fn parse_id(raw: &str, kind: IdKind) -> Result<i64, AppError> {
    raw.trim().parse().map_err(|_| AppError::InvalidId(kind))
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(err) => tracing::error!(?err, "failed to listen for shutdown signal"),
    }
}

#[derive(Debug, Error)]
enum AppError {
    #[error("Invalid {0} ID")]
    InvalidId(IdKind),
    #[error("API endpoint not found")]
    NotFound,
    #[error(transparent)]
    Recommendation(#[from] crate::Error),
    #[error("internal task failure: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::InvalidId(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::Recommendation(_) | AppError::Join(_) => {
                tracing::error!(err = %self, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to get recommendations".to_string(),
                )
            }
        };
        (status, Json(ErrorPayload { error: message })).into_response()
    }
}

#[derive(Debug, Serialize)]
struct ErrorPayload {
    error: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct StrategyResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    item_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    days: Option<u32>,
    recommendations: Vec<Recommendation>,
    strategy: &'static str,
    description: &'static str,
}

#[derive(Debug, Serialize)]
struct HybridResponse {
    user_id: i64,
    item_in_cart: Option<i64>,
    weights: HybridWeights,
    recommendations: Vec<Recommendation>,
    strategy: &'static str,
    description: &'static str,
}

#[derive(Debug, Default, Deserialize)]
struct TrendingQuery {
    days: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HybridQuery {
    item_in_cart: Option<String>,
    user_freq: Option<String>,
    user_co_orders: Option<String>,
    global_co_orders: Option<String>,
    time_trend: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ItemsQuery {
    category: Option<String>,
}
