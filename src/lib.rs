pub mod allocation;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod validation;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use allocation::{handlers, AllocationEngine, LineStatus, MetricsSummary};
use error::ErrorResponse;
use models::{
    AvailabilityResponse, CombinationKind, CombinationView, PriceLineView, PricingView,
    QuoteRequest, QuoteResponse, QuoteStatus, SegmentView, UnitView,
};

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    paths(
        allocation::handlers::create_quote,
        allocation::handlers::get_availability,
        allocation::handlers::get_metrics,
    ),
    components(
        schemas(
            QuoteRequest,
            QuoteResponse,
            QuoteStatus,
            CombinationView,
            CombinationKind,
            UnitView,
            SegmentView,
            PricingView,
            PriceLineView,
            LineStatus,
            AvailabilityResponse,
            MetricsSummary,
            ErrorResponse,
        )
    ),
    tags(
        (name = "quotes", description = "Stay allocation and pricing"),
        (name = "availability", description = "Free units per date range"),
        (name = "metrics", description = "Engine performance counters")
    ),
    info(
        title = "Cabin Allocation API",
        version = "0.1.0",
        description = "Assigns cabins to requested stays and prices them against seasonal, per-channel tariffs"
    )
)]
pub struct ApiDoc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AllocationEngine>,
}

/// Creates and configures the application router
/// Maps all API endpoints to their handlers and adds CORS and tracing middleware
pub fn create_router(engine: Arc<AllocationEngine>) -> Router {
    let state = AppState { engine };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // API routes
        .route("/api/quotes", post(handlers::create_quote))
        .route("/api/availability", get(handlers::get_availability))
        .route("/api/metrics", get(handlers::get_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
