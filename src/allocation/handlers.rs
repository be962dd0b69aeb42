// HTTP handlers for the allocation engine
//
// Thin layer: validate, delegate to the engine, map the outcome to JSON.

use axum::{
    extract::{Query, State},
    response::Json,
};
use validator::Validate;

use crate::allocation::{MetricsSummary, QuoteOutcome, StayRequest};
use crate::error::{ApiError, ErrorResponse};
use crate::models::{AvailabilityQuery, AvailabilityResponse, QuoteRequest, QuoteResponse, UnitView};
use crate::AppState;

/// Handler for POST /api/quotes
/// Finds units for a stay and prices them
#[utoipa::path(
    post,
    path = "/api/quotes",
    request_body = QuoteRequest,
    responses(
        (status = 200, description = "Quote computed, or stay not available", body = QuoteResponse),
        (status = 400, description = "Invalid stay request", body = ErrorResponse),
        (status = 500, description = "Availability data could not be loaded", body = ErrorResponse)
    ),
    tag = "quotes"
)]
pub async fn create_quote(
    State(state): State<AppState>,
    Json(payload): Json<QuoteRequest>,
) -> Result<Json<QuoteResponse>, ApiError> {
    tracing::debug!(
        "Quote requested: {} .. {} for {} guests",
        payload.arrival,
        payload.departure,
        payload.party_size
    );

    payload.validate()?;

    let request = StayRequest::from(payload);
    let response = match state.engine.quote(&request).await? {
        QuoteOutcome::Available(quote) => {
            let response = QuoteResponse::available(quote);
            if let Some(quote_id) = response.quote_id {
                tracing::info!("Issued quote {}", quote_id);
            }
            response
        }
        QuoteOutcome::NotAvailable { reason } => QuoteResponse::not_available(reason),
    };

    Ok(Json(response))
}

/// Handler for GET /api/availability
/// Lists units free on every night of a range
#[utoipa::path(
    get,
    path = "/api/availability",
    params(AvailabilityQuery),
    responses(
        (status = 200, description = "Free units, largest first", body = AvailabilityResponse),
        (status = 400, description = "Invalid date range", body = ErrorResponse),
        (status = 500, description = "Availability data could not be loaded", body = ErrorResponse)
    ),
    tag = "availability"
)]
pub async fn get_availability(
    State(state): State<AppState>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    query.validate()?;

    let free = state
        .engine
        .free_units(query.from, query.to, query.no_bunk_beds)
        .await?;

    let units: Vec<UnitView> = free.iter().map(UnitView::from).collect();
    let total_capacity = units.iter().map(|unit| unit.effective_capacity).sum();

    tracing::debug!("{} units free for {} .. {}", units.len(), query.from, query.to);

    Ok(Json(AvailabilityResponse {
        from: query.from,
        to: query.to,
        units,
        total_capacity,
    }))
}

/// Handler for GET /api/metrics
/// Engine performance counters
#[utoipa::path(
    get,
    path = "/api/metrics",
    responses(
        (status = 200, description = "Performance metrics", body = MetricsSummary)
    ),
    tag = "metrics"
)]
pub async fn get_metrics(State(state): State<AppState>) -> Json<MetricsSummary> {
    Json(state.engine.metrics().summary())
}
