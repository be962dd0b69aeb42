use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::allocation::{
    Combination, LineStatus, PriceLine, PricingResult, Quote, Segment, StayRequest, UnitAssignment,
};

/// Request body for POST /api/quotes
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[validate(schema(function = "crate::validation::validate_stay_dates"))]
pub struct QuoteRequest {
    #[schema(example = "2025-01-10")]
    pub arrival: NaiveDate,
    #[schema(example = "2025-01-14")]
    pub departure: NaiveDate,
    #[validate(range(max = 500))]
    #[schema(example = 6)]
    pub party_size: u32,
    /// Allow the party to move between cabins during the stay
    #[serde(default)]
    pub allow_unit_switching: bool,
    /// Only count beds that are not bunk beds
    #[serde(default)]
    pub no_bunk_beds: bool,
    /// Sales channel; defaults to the reference channel
    #[validate(custom = "crate::validation::validate_channel_name")]
    #[schema(example = "direct")]
    pub channel: Option<String>,
}

impl From<QuoteRequest> for StayRequest {
    fn from(request: QuoteRequest) -> Self {
        StayRequest {
            arrival: request.arrival,
            departure: request.departure,
            party_size: request.party_size,
            allow_unit_switching: request.allow_unit_switching,
            no_bunk_beds: request.no_bunk_beds,
            channel: request.channel,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    Available,
    NotAvailable,
}

/// Response body for POST /api/quotes
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QuoteResponse {
    pub status: QuoteStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote_id: Option<Uuid>,
    /// Why no quote could be made
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combination: Option<CombinationView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pricing: Option<PricingView>,
    /// Nights that could not be priced, one entry per gap line
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl QuoteResponse {
    pub fn available(quote: Quote) -> Self {
        let warnings = quote.pricing.gaps().map(describe_gap).collect();

        Self {
            status: QuoteStatus::Available,
            quote_id: Some(Uuid::new_v4()),
            reason: None,
            combination: Some(CombinationView::from(&quote.combination)),
            pricing: Some(PricingView::from(&quote.pricing)),
            warnings,
        }
    }

    pub fn not_available(reason: impl Into<String>) -> Self {
        Self {
            status: QuoteStatus::NotAvailable,
            quote_id: None,
            reason: Some(reason.into()),
            combination: None,
            pricing: None,
            warnings: Vec::new(),
        }
    }
}

fn describe_gap(line: &PriceLine) -> String {
    let cause = match line.status {
        LineStatus::NoTariff => "no tariff in force".to_string(),
        LineStatus::NoChannelRate => "no rate for the requested channel".to_string(),
        LineStatus::NoExchangeRate => format!(
            "no exchange rate for {}",
            line.source_currency.as_deref().unwrap_or("the tariff currency")
        ),
        LineStatus::Priced => "priced".to_string(),
    };
    format!(
        "{} night(s) of {} ({} .. {}) not priced: {}",
        line.nights, line.unit, line.start, line.end, cause
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CombinationKind {
    Flat,
    Segmented,
}

/// Units assigned to a stay
///
/// Flat combinations fill `units`, segmented ones fill `segments`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CombinationView {
    pub kind: CombinationKind,
    #[schema(example = 8)]
    pub capacity: u32,
    #[serde(default)]
    pub units: Vec<UnitView>,
    #[serde(default)]
    pub segments: Vec<SegmentView>,
}

impl From<&Combination> for CombinationView {
    fn from(combination: &Combination) -> Self {
        match combination {
            Combination::Flat(flat) => Self {
                kind: CombinationKind::Flat,
                capacity: flat.capacity,
                units: flat.units.iter().map(UnitView::from).collect(),
                segments: Vec::new(),
            },
            Combination::Segmented(segmented) => Self {
                kind: CombinationKind::Segmented,
                capacity: segmented.capacity,
                units: Vec::new(),
                segments: segmented.segments.iter().map(SegmentView::from).collect(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UnitView {
    #[schema(example = "lenga")]
    pub unit: String,
    #[schema(example = 6)]
    pub effective_capacity: u32,
}

impl From<&UnitAssignment> for UnitView {
    fn from(assignment: &UnitAssignment) -> Self {
        Self {
            unit: assignment.unit.clone(),
            effective_capacity: assignment.effective_capacity,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SegmentView {
    #[schema(example = "lenga")]
    pub unit: String,
    pub capacity: u32,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub nights: i64,
    /// Other units that were free for the whole segment
    pub alternates: Vec<String>,
}

impl From<&Segment> for SegmentView {
    fn from(segment: &Segment) -> Self {
        Self {
            unit: segment.unit.clone(),
            capacity: segment.capacity,
            start: segment.start,
            end: segment.end,
            nights: segment.nights(),
            alternates: segment.alternates.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PricingView {
    #[schema(example = "CLP")]
    pub currency: String,
    pub total: Decimal,
    pub total_nights: i64,
    pub has_gaps: bool,
    pub uncovered_nights: i64,
    pub lines: Vec<PriceLineView>,
}

impl From<&PricingResult> for PricingView {
    fn from(pricing: &PricingResult) -> Self {
        Self {
            currency: pricing.currency.clone(),
            total: pricing.total,
            total_nights: pricing.total_nights,
            has_gaps: pricing.has_gaps(),
            uncovered_nights: pricing.uncovered_nights(),
            lines: pricing.lines.iter().map(PriceLineView::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PriceLineView {
    pub unit: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub nights: i64,
    pub nightly_rate: Decimal,
    pub subtotal: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<NaiveDate>,
    pub status: LineStatus,
}

impl From<&PriceLine> for PriceLineView {
    fn from(line: &PriceLine) -> Self {
        Self {
            unit: line.unit.clone(),
            start: line.start,
            end: line.end,
            nights: line.nights,
            nightly_rate: line.nightly_rate,
            subtotal: line.subtotal,
            source_currency: line.source_currency.clone(),
            valid_from: line.valid_from,
            valid_until: line.valid_until,
            status: line.status,
        }
    }
}

/// Query parameters for GET /api/availability
#[derive(Debug, Clone, Deserialize, Validate, IntoParams)]
#[validate(schema(function = "crate::validation::validate_availability_range"))]
#[into_params(parameter_in = Query)]
pub struct AvailabilityQuery {
    /// First night of the range
    pub from: NaiveDate,
    /// Day after the last night
    pub to: NaiveDate,
    #[serde(default)]
    pub no_bunk_beds: bool,
}

/// Response body for GET /api/availability
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AvailabilityResponse {
    pub from: NaiveDate,
    pub to: NaiveDate,
    /// Units free on every night of the range, largest first
    pub units: Vec<UnitView>,
    pub total_capacity: u32,
}
