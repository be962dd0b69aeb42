// Accommodation Allocation Module
//
// Assigns cabins to a requested stay and prices the assignment:
// - Availability loading: units, tariffs, reservations and exchange rates for a range
// - Normal allocation: a fixed set of units for the whole stay
// - Segmented allocation: date segments bound to units, switching when needed
// - Pricing: seasonal, per-channel tariffs with currency conversion
//
// The engine only reads; it never writes reservations.

pub mod error;
pub mod types;
pub mod store;
pub mod loader;
pub mod normal;
pub mod segmented;
pub mod pricing;
pub mod handlers;
pub mod metrics;

// Re-export commonly used types for convenience
pub use error::{AllocResult, AllocationError};
pub use types::{
    AccommodationUnit,
    BedBreakdown,
    ChannelRate,
    Combination,
    ExchangeRates,
    FlatCombination,
    ReservationInterval,
    ReservationStatus,
    Segment,
    SegmentStrategy,
    SegmentedCombination,
    TariffRecord,
    UnitAssignment,
};
pub use store::{BookingStore, InMemoryBookingStore, PgBookingStore};
pub use loader::{AvailabilityLoader, Snapshot};
pub use normal::NormalCombinationFinder;
pub use segmented::SegmentedCombinationFinder;
pub use pricing::{LineStatus, PriceLine, PricingCalculator, PricingConfig, PricingResult};
pub use metrics::{MetricsSummary, PerformanceMetrics};

// Allocation Engine - Orchestrator
//
// Loads a snapshot, picks a combination and prices it.

use chrono::NaiveDate;
use std::sync::Arc;

/// Departure of a one-night stay arriving on `day`
fn one_night_after(day: NaiveDate) -> AllocResult<NaiveDate> {
    day.succ_opt().ok_or_else(|| {
        AllocationError::InvalidRequest(format!("No night can start on {}", day))
    })
}

/// A requested stay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StayRequest {
    pub arrival: NaiveDate,
    pub departure: NaiveDate,
    pub party_size: u32,
    /// Allow the party to move between units during the stay
    pub allow_unit_switching: bool,
    /// Do not count bunk beds as sleeping places
    pub no_bunk_beds: bool,
    /// Sales channel; the reference channel when absent
    pub channel: Option<String>,
}

impl StayRequest {
    pub fn new(arrival: NaiveDate, departure: NaiveDate, party_size: u32) -> Self {
        Self {
            arrival,
            departure,
            party_size,
            allow_unit_switching: false,
            no_bunk_beds: false,
            channel: None,
        }
    }

    pub fn with_unit_switching(mut self) -> Self {
        self.allow_unit_switching = true;
        self
    }

    pub fn without_bunk_beds(mut self) -> Self {
        self.no_bunk_beds = true;
        self
    }

    pub fn on_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    /// End of the occupied range; a same-day stay occupies one night
    pub fn stay_end(&self) -> AllocResult<NaiveDate> {
        if self.departure != self.arrival {
            return Ok(self.departure);
        }
        one_night_after(self.arrival)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub combination: Combination,
    pub pricing: PricingResult,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuoteOutcome {
    Available(Quote),
    NotAvailable { reason: String },
}

/// Engine tuning taken from configuration
#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    pub pricing: PricingConfig,
    pub segment_strategy: SegmentStrategy,
}

/// Allocation Engine
///
/// Stateless between calls; safe to share behind an `Arc`.
pub struct AllocationEngine {
    loader: AvailabilityLoader,
    normal: NormalCombinationFinder,
    segmented: SegmentedCombinationFinder,
    pricing: PricingCalculator,
    metrics: PerformanceMetrics,
}

impl AllocationEngine {
    pub fn new(store: Arc<dyn BookingStore>, settings: EngineSettings) -> Self {
        Self {
            loader: AvailabilityLoader::new(store),
            normal: NormalCombinationFinder::new(),
            segmented: SegmentedCombinationFinder::new(settings.segment_strategy),
            pricing: PricingCalculator::new(settings.pricing),
            metrics: PerformanceMetrics::new(),
        }
    }

    /// Share counters with other components, e.g. the store cache
    pub fn with_metrics(mut self, metrics: PerformanceMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &PerformanceMetrics {
        &self.metrics
    }

    /// Quote a stay
    ///
    /// Flow:
    /// 1. Load the snapshot for the stay
    /// 2. Find a combination (normal or segmented)
    /// 3. Re-verify segmented combinations against the snapshot
    /// 4. Price the combination
    ///
    /// Lack of availability is an `Ok(NotAvailable)`; store failures and
    /// invariant violations abort the quote.
    pub async fn quote(&self, request: &StayRequest) -> AllocResult<QuoteOutcome> {
        if request.departure < request.arrival {
            return Err(AllocationError::InvalidRequest(format!(
                "Departure {} is before arrival {}",
                request.departure, request.arrival
            )));
        }

        let stay_start = request.arrival;
        let stay_end = request.stay_end()?;
        let channel = request
            .channel
            .as_deref()
            .unwrap_or(&self.pricing.config().reference_channel);

        let snapshot = {
            let _timer = self.metrics.start_snapshot_load();
            self.loader.load(stay_start, stay_end).await?
        };

        let combination = if request.allow_unit_switching {
            let _timer = self.metrics.start_segmented_search();
            let segmented = self.segmented.find(
                &snapshot.units,
                &snapshot.reservations,
                request.party_size,
                stay_start,
                stay_end,
                request.no_bunk_beds,
            );

            if !segmented.is_empty() {
                self.segmented.verify(
                    &segmented,
                    &snapshot.reservations,
                    request.party_size,
                    stay_start,
                    stay_end,
                )?;
            }
            Combination::Segmented(segmented)
        } else {
            let _timer = self.metrics.start_normal_search();
            Combination::Flat(self.normal.find(
                snapshot.free_units(stay_start, stay_end),
                request.party_size,
                request.no_bunk_beds,
            ))
        };

        if !combination.satisfies(request.party_size) {
            self.metrics.record_unavailable_quote();
            let reason = if request.allow_unit_switching {
                format!(
                    "No combination of units can house {} guests on every night of {} .. {}",
                    request.party_size, stay_start, stay_end
                )
            } else {
                format!(
                    "Not enough free units for {} guests over {} .. {}",
                    request.party_size, stay_start, stay_end
                )
            };
            tracing::info!("Quote not available: {}", reason);
            return Ok(QuoteOutcome::NotAvailable { reason });
        }

        let pricing = if combination.is_empty() {
            PricingResult::empty(self.pricing.config().local_currency.as_str())
        } else {
            let _timer = self.metrics.start_pricing();
            self.pricing.price(
                &combination,
                &snapshot.tariffs,
                &snapshot.exchange_rates,
                stay_start,
                stay_end,
                channel,
            )
        };

        tracing::info!(
            "Quoted {} .. {} for {} guests on {}: capacity {}, total {} {}",
            stay_start,
            stay_end,
            request.party_size,
            channel,
            combination.capacity(),
            pricing.total,
            pricing.currency
        );

        Ok(QuoteOutcome::Available(Quote {
            combination,
            pricing,
        }))
    }

    /// Units free for the whole of `[start, end)`, largest first
    pub async fn free_units(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        no_bunk_beds: bool,
    ) -> AllocResult<Vec<UnitAssignment>> {
        let end = if end == start { one_night_after(start)? } else { end };

        let snapshot = {
            let _timer = self.metrics.start_snapshot_load();
            self.loader.load(start, end).await?
        };

        Ok(normal::rank_largest_first(
            snapshot.free_units(start, end),
            no_bunk_beds,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, d).unwrap()
    }

    fn tariff(unit: &str, rate: rust_decimal::Decimal) -> TariffRecord {
        TariffRecord::new(unit, day(1), day(28)).with_rate("direct", rate, "CLP")
    }

    fn engine(
        units: Vec<AccommodationUnit>,
        tariffs: Vec<TariffRecord>,
        reservations: Vec<ReservationInterval>,
    ) -> AllocationEngine {
        let store = InMemoryBookingStore::new(units, tariffs, reservations);
        AllocationEngine::new(store.into_shared(), EngineSettings::default())
    }

    fn available(outcome: QuoteOutcome) -> Quote {
        match outcome {
            QuoteOutcome::Available(quote) => quote,
            QuoteOutcome::NotAvailable { reason } => panic!("expected a quote, got: {}", reason),
        }
    }

    #[tokio::test]
    async fn test_quote_single_unit_stay() {
        let engine = engine(
            vec![AccommodationUnit::new("lenga", 6), AccommodationUnit::new("nire", 4)],
            vec![tariff("lenga", dec!(50000)), tariff("nire", dec!(35000))],
            vec![],
        );

        let quote = available(engine.quote(&StayRequest::new(day(3), day(6), 5)).await.unwrap());

        match &quote.combination {
            Combination::Flat(flat) => {
                assert_eq!(flat.units.len(), 1);
                assert_eq!(flat.units[0].unit, "lenga");
            }
            other => panic!("unexpected combination {:?}", other),
        }
        assert_eq!(quote.pricing.total, dec!(150000));
        assert!(!quote.pricing.has_gaps());
    }

    /// Only unit booked on nights 3-5 of a ten-night window
    #[tokio::test]
    async fn test_booked_unit_is_excluded_without_switching() {
        let engine = engine(
            vec![AccommodationUnit::new("lenga", 8)],
            vec![tariff("lenga", dec!(50000))],
            vec![ReservationInterval::new("lenga", day(3), day(6))],
        );

        let outcome = engine.quote(&StayRequest::new(day(1), day(11), 8)).await.unwrap();

        assert!(matches!(outcome, QuoteOutcome::NotAvailable { .. }));
        assert_eq!(engine.metrics().summary().unavailable_quotes, 1);
    }

    /// Two 6-bed cabins for a party of 12 over twelve nights
    #[tokio::test]
    async fn test_segmented_quote_spans_both_cabins() {
        let engine = engine(
            vec![AccommodationUnit::new("lenga", 6), AccommodationUnit::new("nire", 6)],
            vec![tariff("lenga", dec!(50000)), tariff("nire", dec!(40000))],
            vec![],
        );
        let request = StayRequest::new(day(1), day(13), 12).with_unit_switching();

        let quote = available(engine.quote(&request).await.unwrap());

        match &quote.combination {
            Combination::Segmented(segmented) => {
                assert!(segmented.segments.len() <= 2);
                assert!(segmented.capacity >= 12);
            }
            other => panic!("unexpected combination {:?}", other),
        }
        assert_eq!(quote.pricing.total, dec!(1080000));
        assert_eq!(quote.pricing.total_nights, 24);
    }

    #[tokio::test]
    async fn test_switching_rescues_a_fragmented_calendar() {
        let engine = engine(
            vec![AccommodationUnit::new("lenga", 6), AccommodationUnit::new("nire", 4)],
            vec![tariff("lenga", dec!(50000)), tariff("nire", dec!(35000))],
            vec![
                ReservationInterval::new("lenga", day(2), day(4)),
                ReservationInterval::new("nire", day(5), day(7)),
            ],
        );

        let fixed = engine.quote(&StayRequest::new(day(1), day(8), 4)).await.unwrap();
        assert!(matches!(fixed, QuoteOutcome::NotAvailable { .. }));

        let request = StayRequest::new(day(1), day(8), 4).with_unit_switching();
        let quote = available(engine.quote(&request).await.unwrap());

        let layout: Vec<(&str, NaiveDate, NaiveDate)> = match &quote.combination {
            Combination::Segmented(segmented) => segmented
                .segments
                .iter()
                .map(|s| (s.unit.as_str(), s.start, s.end))
                .collect(),
            other => panic!("unexpected combination {:?}", other),
        };
        assert_eq!(
            layout,
            vec![
                ("nire", day(1), day(5)),
                ("lenga", day(5), day(7)),
                ("nire", day(7), day(8)),
            ]
        );
        assert_eq!(quote.pricing.total, dec!(275000));
    }

    #[tokio::test]
    async fn test_quote_rejects_departure_before_arrival() {
        let engine = engine(vec![AccommodationUnit::new("lenga", 6)], vec![], vec![]);

        let result = engine.quote(&StayRequest::new(day(5), day(2), 2)).await;

        assert!(matches!(result, Err(AllocationError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_same_day_stay_is_one_night() {
        let engine = engine(
            vec![AccommodationUnit::new("lenga", 6)],
            vec![tariff("lenga", dec!(50000))],
            vec![],
        );

        let quote = available(engine.quote(&StayRequest::new(day(4), day(4), 2)).await.unwrap());

        assert_eq!(quote.pricing.total_nights, 1);
        assert_eq!(quote.pricing.total, dec!(50000));
    }

    #[tokio::test]
    async fn test_same_day_stay_on_last_calendar_day_is_rejected() {
        let engine = engine(vec![AccommodationUnit::new("lenga", 6)], vec![], vec![]);

        let result = engine
            .quote(&StayRequest::new(NaiveDate::MAX, NaiveDate::MAX, 2))
            .await;
        assert!(matches!(result, Err(AllocationError::InvalidRequest(_))));

        let result = engine.free_units(NaiveDate::MAX, NaiveDate::MAX, false).await;
        assert!(matches!(result, Err(AllocationError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_stay_ending_on_last_calendar_day_is_priced() {
        let last_night = NaiveDate::MAX.pred_opt().unwrap();
        let engine = engine(
            vec![AccommodationUnit::new("lenga", 6)],
            vec![TariffRecord::new("lenga", last_night, NaiveDate::MAX)
                .with_rate("direct", dec!(50000), "CLP")],
            vec![],
        );

        let quote = available(
            engine
                .quote(&StayRequest::new(last_night, NaiveDate::MAX, 2))
                .await
                .unwrap(),
        );

        assert_eq!(quote.pricing.total_nights, 1);
        assert_eq!(quote.pricing.lines[0].end, NaiveDate::MAX);
    }

    #[tokio::test]
    async fn test_empty_party_needs_nothing() {
        let engine = engine(vec![AccommodationUnit::new("lenga", 6)], vec![], vec![]);

        let quote = available(engine.quote(&StayRequest::new(day(1), day(3), 0)).await.unwrap());

        assert!(quote.combination.is_empty());
        assert_eq!(quote.pricing.total, rust_decimal::Decimal::ZERO);
        assert!(quote.pricing.lines.is_empty());
    }

    #[tokio::test]
    async fn test_channel_falls_back_to_reference_channel() {
        let tariffs = vec![TariffRecord::new("lenga", day(1), day(28))
            .with_rate("direct", dec!(50000), "CLP")
            .with_rate("booking", dec!(62000), "CLP")];
        let engine = engine(vec![AccommodationUnit::new("lenga", 6)], tariffs, vec![]);

        let direct = available(engine.quote(&StayRequest::new(day(1), day(2), 2)).await.unwrap());
        let booking = available(
            engine
                .quote(&StayRequest::new(day(1), day(2), 2).on_channel("booking"))
                .await
                .unwrap(),
        );

        assert_eq!(direct.pricing.total, dec!(50000));
        assert_eq!(booking.pricing.total, dec!(62000));
    }

    #[tokio::test]
    async fn test_no_bunk_beds_changes_the_pick() {
        let engine = engine(
            vec![
                AccommodationUnit::new("refugio", 8).with_beds(BedBreakdown {
                    double_beds: 1,
                    single_beds: 0,
                    bunk_beds: 6,
                }),
                AccommodationUnit::new("lenga", 4),
            ],
            vec![],
            vec![],
        );

        let with_bunks = available(engine.quote(&StayRequest::new(day(1), day(3), 4)).await.unwrap());
        let without = available(
            engine
                .quote(&StayRequest::new(day(1), day(3), 4).without_bunk_beds())
                .await
                .unwrap(),
        );

        let first_unit = |quote: &Quote| match &quote.combination {
            Combination::Flat(flat) => flat.units[0].unit.clone(),
            other => panic!("unexpected combination {:?}", other),
        };
        assert_eq!(first_unit(&with_bunks), "refugio");
        assert_eq!(first_unit(&without), "lenga");
    }

    #[tokio::test]
    async fn test_free_units_lists_unbooked_units() {
        let engine = engine(
            vec![
                AccommodationUnit::new("lenga", 6),
                AccommodationUnit::new("nire", 4),
                AccommodationUnit::new("coihue", 8),
            ],
            vec![],
            vec![ReservationInterval::new("coihue", day(3), day(5))],
        );

        let free = engine.free_units(day(1), day(4), false).await.unwrap();

        let names: Vec<&str> = free.iter().map(|a| a.unit.as_str()).collect();
        assert_eq!(names, vec!["lenga", "nire"]);
    }

    #[tokio::test]
    async fn test_quote_records_metrics() {
        let engine = engine(
            vec![AccommodationUnit::new("lenga", 6)],
            vec![tariff("lenga", dec!(50000))],
            vec![],
        );

        engine.quote(&StayRequest::new(day(1), day(3), 2)).await.unwrap();
        engine
            .quote(&StayRequest::new(day(1), day(3), 2).with_unit_switching())
            .await
            .unwrap();

        let summary = engine.metrics().summary();
        assert_eq!(summary.snapshot_loads, 2);
        assert_eq!(summary.normal_searches, 1);
        assert_eq!(summary.segmented_searches, 1);
        assert_eq!(summary.pricing_runs, 2);
    }
}
