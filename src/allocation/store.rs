// Booking Store
//
// Read-only access to the unit directory, reservations, tariffs and
// exchange rates. The PostgreSQL store caches the unit directory and the
// tariff table for a short TTL; reservations are always read fresh.

use crate::allocation::{
    error::{AllocResult, AllocationError},
    metrics::PerformanceMetrics,
    types::{
        AccommodationUnit, BedBreakdown, ChannelRate, ExchangeRates, ReservationInterval,
        ReservationStatus, TariffRecord,
    },
};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Default time-to-live for the cached unit directory and tariffs (60 seconds)
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Source of the snapshots the engine works on
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn fetch_units(&self) -> AllocResult<Vec<AccommodationUnit>>;

    async fn fetch_tariffs(&self) -> AllocResult<Vec<TariffRecord>>;

    /// Reservations that may overlap `[start, end)`
    ///
    /// Implementations may return a superset; the loader filters again.
    async fn fetch_reservations(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AllocResult<Vec<ReservationInterval>>;

    /// Exchange rates needed to price nights in `[start, end)`: every rate
    /// published inside the range plus the latest one before it, per currency
    async fn fetch_exchange_rates(&self, start: NaiveDate, end: NaiveDate)
        -> AllocResult<ExchangeRates>;
}

#[derive(Debug, FromRow)]
struct UnitRow {
    name: String,
    display_name: Option<String>,
    capacity: i32,
    double_beds: Option<i32>,
    single_beds: Option<i32>,
    bunk_beds: Option<i32>,
}

fn non_negative(value: i32, field: &str, unit: &str) -> AllocResult<u32> {
    u32::try_from(value).map_err(|_| {
        AllocationError::InvalidRecord(format!(
            "{} of unit {} must be non-negative, got {}",
            field, unit, value
        ))
    })
}

impl TryFrom<UnitRow> for AccommodationUnit {
    type Error = AllocationError;

    fn try_from(row: UnitRow) -> AllocResult<Self> {
        let capacity = non_negative(row.capacity, "capacity", &row.name)?;

        let beds = match (row.double_beds, row.single_beds, row.bunk_beds) {
            (None, None, None) => None,
            (double, single, bunk) => Some(BedBreakdown {
                double_beds: non_negative(double.unwrap_or(0), "double_beds", &row.name)?,
                single_beds: non_negative(single.unwrap_or(0), "single_beds", &row.name)?,
                bunk_beds: non_negative(bunk.unwrap_or(0), "bunk_beds", &row.name)?,
            }),
        };

        Ok(AccommodationUnit {
            display_name: row.display_name.unwrap_or_else(|| row.name.clone()),
            name: row.name,
            capacity,
            beds,
        })
    }
}

#[derive(Debug, FromRow)]
struct ReservationRow {
    unit_name: String,
    arrival: NaiveDate,
    departure: NaiveDate,
    status: String,
}

impl TryFrom<ReservationRow> for ReservationInterval {
    type Error = AllocationError;

    fn try_from(row: ReservationRow) -> AllocResult<Self> {
        let status: ReservationStatus = row
            .status
            .parse()
            .map_err(AllocationError::InvalidRecord)?;

        if row.departure < row.arrival {
            return Err(AllocationError::InvalidRecord(format!(
                "Reservation for {} departs ({}) before it arrives ({})",
                row.unit_name, row.departure, row.arrival
            )));
        }

        Ok(ReservationInterval {
            unit: row.unit_name,
            arrival: row.arrival,
            departure: row.departure,
            status,
        })
    }
}

#[derive(Debug, FromRow)]
struct TariffRow {
    unit_name: String,
    valid_from: NaiveDate,
    valid_until: NaiveDate,
    rates: serde_json::Value,
}

impl TryFrom<TariffRow> for TariffRecord {
    type Error = AllocationError;

    fn try_from(row: TariffRow) -> AllocResult<Self> {
        // Rates are stored as {"<channel>": {"nightly_rate": ..., "currency": ...}}
        let rates: HashMap<String, ChannelRate> = serde_json::from_value(row.rates)
            .map_err(|e| {
                AllocationError::InvalidRecord(format!(
                    "Invalid rates JSON for tariff of {}: {}",
                    row.unit_name, e
                ))
            })?;

        if row.valid_until < row.valid_from {
            return Err(AllocationError::InvalidRecord(format!(
                "Tariff of {} ends ({}) before it starts ({})",
                row.unit_name, row.valid_until, row.valid_from
            )));
        }

        if let Some((channel, _)) = rates.iter().find(|(_, rate)| rate.nightly_rate < Decimal::ZERO) {
            return Err(AllocationError::InvalidRecord(format!(
                "Negative {} rate in tariff of {}",
                channel, row.unit_name
            )));
        }

        Ok(TariffRecord {
            unit: row.unit_name,
            valid_from: row.valid_from,
            valid_until: row.valid_until,
            rates,
        })
    }
}

#[derive(Debug, FromRow)]
struct ExchangeRateRow {
    currency: String,
    day: NaiveDate,
    rate: Decimal,
}

fn collect_exchange_rates(rows: Vec<ExchangeRateRow>) -> AllocResult<ExchangeRates> {
    let mut rates = ExchangeRates::new();
    for row in rows {
        if row.rate <= Decimal::ZERO {
            return Err(AllocationError::InvalidRecord(format!(
                "Exchange rate for {} on {} must be positive",
                row.currency, row.day
            )));
        }
        rates.insert(row.currency, row.day, row.rate);
    }
    Ok(rates)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CachedSection {
    Units,
    Tariffs,
}

/// In-memory copy of the slowly changing tables
#[derive(Debug, Default)]
struct DirectoryCache {
    units: Vec<AccommodationUnit>,
    tariffs: Vec<TariffRecord>,
    last_updated: HashMap<CachedSection, Instant>,
}

impl DirectoryCache {
    fn is_stale(&self, section: CachedSection, ttl: Duration) -> bool {
        match self.last_updated.get(&section) {
            Some(last_update) => last_update.elapsed() > ttl,
            None => true,
        }
    }

    fn mark_updated(&mut self, section: CachedSection) {
        self.last_updated.insert(section, Instant::now());
    }
}

/// PostgreSQL-backed booking store
pub struct PgBookingStore {
    pool: PgPool,
    cache: RwLock<DirectoryCache>,
    cache_ttl: Duration,
    metrics: Option<PerformanceMetrics>,
}

impl PgBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            cache: RwLock::new(DirectoryCache::default()),
            cache_ttl: DEFAULT_CACHE_TTL,
            metrics: None,
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_metrics(mut self, metrics: PerformanceMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    async fn load_units(&self) -> AllocResult<Vec<AccommodationUnit>> {
        let rows = sqlx::query_as::<_, UnitRow>(
            r#"
            SELECT name, display_name, capacity, double_beds, single_beds, bunk_beds
            FROM accommodation_units
            WHERE active = true
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AccommodationUnit::try_from).collect()
    }

    async fn load_tariffs(&self) -> AllocResult<Vec<TariffRecord>> {
        let rows = sqlx::query_as::<_, TariffRow>(
            r#"
            SELECT unit_name, valid_from, valid_until, rates
            FROM tariffs
            ORDER BY unit_name, valid_from
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TariffRecord::try_from).collect()
    }

    /// Reload a cached section if its TTL has expired
    async fn refresh_if_stale(&self, section: CachedSection) -> AllocResult<()> {
        {
            let cache = self.cache.read().await;
            if !cache.is_stale(section, self.cache_ttl) {
                if let Some(ref metrics) = self.metrics {
                    metrics.record_cache_hit();
                }
                return Ok(());
            }
        }

        if let Some(ref metrics) = self.metrics {
            metrics.record_cache_miss();
        }

        let mut cache = self.cache.write().await;

        // Another request may have refreshed while we waited for the write lock
        if !cache.is_stale(section, self.cache_ttl) {
            return Ok(());
        }

        match section {
            CachedSection::Units => {
                cache.units = self.load_units().await?;
                tracing::debug!("Reloaded {} accommodation units", cache.units.len());
            }
            CachedSection::Tariffs => {
                cache.tariffs = self.load_tariffs().await?;
                tracing::debug!("Reloaded {} tariff records", cache.tariffs.len());
            }
        }
        cache.mark_updated(section);

        Ok(())
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn fetch_units(&self) -> AllocResult<Vec<AccommodationUnit>> {
        self.refresh_if_stale(CachedSection::Units).await?;
        Ok(self.cache.read().await.units.clone())
    }

    async fn fetch_tariffs(&self) -> AllocResult<Vec<TariffRecord>> {
        self.refresh_if_stale(CachedSection::Tariffs).await?;
        Ok(self.cache.read().await.tariffs.clone())
    }

    async fn fetch_reservations(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AllocResult<Vec<ReservationInterval>> {
        let rows = sqlx::query_as::<_, ReservationRow>(
            r#"
            SELECT unit_name, arrival, departure, status
            FROM reservations
            WHERE arrival < $2 AND departure > $1 AND status <> 'cancelled'
            ORDER BY arrival, unit_name
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ReservationInterval::try_from).collect()
    }

    async fn fetch_exchange_rates(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AllocResult<ExchangeRates> {
        let rows = sqlx::query_as::<_, ExchangeRateRow>(
            r#"
            SELECT currency, day, rate
            FROM exchange_rates
            WHERE day >= $1 AND day <= $2
            UNION ALL
            (
                SELECT DISTINCT ON (currency) currency, day, rate
                FROM exchange_rates
                WHERE day < $1
                ORDER BY currency, day DESC
            )
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        collect_exchange_rates(rows)
    }
}

/// Booking store over a fixed snapshot
///
/// Returns every reservation regardless of the requested range.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBookingStore {
    units: Vec<AccommodationUnit>,
    tariffs: Vec<TariffRecord>,
    reservations: Vec<ReservationInterval>,
    exchange_rates: ExchangeRates,
}

impl InMemoryBookingStore {
    pub fn new(
        units: Vec<AccommodationUnit>,
        tariffs: Vec<TariffRecord>,
        reservations: Vec<ReservationInterval>,
    ) -> Self {
        Self {
            units,
            tariffs,
            reservations,
            exchange_rates: ExchangeRates::new(),
        }
    }

    pub fn with_exchange_rates(mut self, exchange_rates: ExchangeRates) -> Self {
        self.exchange_rates = exchange_rates;
        self
    }

    pub fn into_shared(self) -> Arc<dyn BookingStore> {
        Arc::new(self)
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn fetch_units(&self) -> AllocResult<Vec<AccommodationUnit>> {
        Ok(self.units.clone())
    }

    async fn fetch_tariffs(&self) -> AllocResult<Vec<TariffRecord>> {
        Ok(self.tariffs.clone())
    }

    async fn fetch_reservations(
        &self,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> AllocResult<Vec<ReservationInterval>> {
        Ok(self.reservations.clone())
    }

    async fn fetch_exchange_rates(
        &self,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> AllocResult<ExchangeRates> {
        Ok(self.exchange_rates.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_directory_cache_is_stale() {
        let mut cache = DirectoryCache::default();

        assert!(cache.is_stale(CachedSection::Units, Duration::from_secs(60)));

        cache.mark_updated(CachedSection::Units);

        assert!(!cache.is_stale(CachedSection::Units, Duration::from_secs(60)));
        assert!(cache.is_stale(CachedSection::Tariffs, Duration::from_secs(60)));
        assert!(cache.is_stale(CachedSection::Units, Duration::from_secs(0)));
    }

    #[test]
    fn test_unit_row_without_beds() {
        let unit = AccommodationUnit::try_from(UnitRow {
            name: "lenga".to_string(),
            display_name: None,
            capacity: 6,
            double_beds: None,
            single_beds: None,
            bunk_beds: None,
        })
        .unwrap();

        assert_eq!(unit.display_name, "lenga");
        assert_eq!(unit.capacity, 6);
        assert!(unit.beds.is_none());
    }

    #[test]
    fn test_unit_row_with_partial_beds() {
        let unit = AccommodationUnit::try_from(UnitRow {
            name: "coihue".to_string(),
            display_name: Some("Cabaña Coihue".to_string()),
            capacity: 5,
            double_beds: Some(1),
            single_beds: None,
            bunk_beds: Some(3),
        })
        .unwrap();

        assert_eq!(
            unit.beds,
            Some(BedBreakdown {
                double_beds: 1,
                single_beds: 0,
                bunk_beds: 3,
            })
        );
        assert_eq!(unit.effective_capacity(true), 2);
    }

    #[test]
    fn test_unit_row_rejects_negative_capacity() {
        let result = AccommodationUnit::try_from(UnitRow {
            name: "raulí".to_string(),
            display_name: None,
            capacity: -1,
            double_beds: None,
            single_beds: None,
            bunk_beds: None,
        });

        assert!(matches!(result, Err(AllocationError::InvalidRecord(_))));
    }

    #[test]
    fn test_reservation_row_parses_status() {
        let reservation = ReservationInterval::try_from(ReservationRow {
            unit_name: "lenga".to_string(),
            arrival: day(1),
            departure: day(4),
            status: "checked_in".to_string(),
        })
        .unwrap();

        assert_eq!(reservation.status, ReservationStatus::CheckedIn);
    }

    #[test]
    fn test_reservation_row_rejects_unknown_status() {
        let result = ReservationInterval::try_from(ReservationRow {
            unit_name: "lenga".to_string(),
            arrival: day(1),
            departure: day(4),
            status: "maybe".to_string(),
        });

        assert!(matches!(result, Err(AllocationError::InvalidRecord(_))));
    }

    #[test]
    fn test_reservation_row_rejects_inverted_dates() {
        let result = ReservationInterval::try_from(ReservationRow {
            unit_name: "lenga".to_string(),
            arrival: day(5),
            departure: day(4),
            status: "confirmed".to_string(),
        });

        assert!(matches!(result, Err(AllocationError::InvalidRecord(_))));
    }

    #[test]
    fn test_tariff_row_parses_rates() {
        let tariff = TariffRecord::try_from(TariffRow {
            unit_name: "lenga".to_string(),
            valid_from: day(1),
            valid_until: day(31),
            rates: json!({
                "direct": { "nightly_rate": "85000", "currency": "CLP" },
                "booking": { "nightly_rate": 110.5, "currency": "USD" }
            }),
        })
        .unwrap();

        assert_eq!(tariff.rate_for("direct").unwrap().nightly_rate, dec!(85000));
        assert_eq!(tariff.rate_for("booking").unwrap().currency, "USD");
    }

    #[test]
    fn test_tariff_row_rejects_malformed_rates() {
        let result = TariffRecord::try_from(TariffRow {
            unit_name: "lenga".to_string(),
            valid_from: day(1),
            valid_until: day(31),
            rates: json!({ "direct": 85000 }),
        });

        assert!(matches!(result, Err(AllocationError::InvalidRecord(_))));
    }

    #[test]
    fn test_tariff_row_rejects_negative_rate() {
        let result = TariffRecord::try_from(TariffRow {
            unit_name: "lenga".to_string(),
            valid_from: day(1),
            valid_until: day(31),
            rates: json!({ "direct": { "nightly_rate": "-1", "currency": "CLP" } }),
        });

        assert!(matches!(result, Err(AllocationError::InvalidRecord(_))));
    }

    /// Only the latest rate before the stay is fetched; it stays in force
    /// however long ago it was published
    #[test]
    fn test_old_exchange_rate_applies_to_later_nights() {
        let rates = collect_exchange_rates(vec![
            ExchangeRateRow {
                currency: "USD".to_string(),
                day: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                rate: dec!(905),
            },
            ExchangeRateRow {
                currency: "USD".to_string(),
                day: day(20),
                rate: dec!(950),
            },
        ])
        .unwrap();

        assert_eq!(rates.rate_on("USD", day(1)), Some(dec!(905)));
        assert_eq!(rates.rate_on("USD", day(19)), Some(dec!(905)));
        assert_eq!(rates.rate_on("USD", day(20)), Some(dec!(950)));
        assert_eq!(rates.rate_on("EUR", day(20)), None);
    }

    #[test]
    fn test_exchange_rate_rows_reject_non_positive_rate() {
        let result = collect_exchange_rates(vec![ExchangeRateRow {
            currency: "USD".to_string(),
            day: day(1),
            rate: Decimal::ZERO,
        }]);

        assert!(matches!(result, Err(AllocationError::InvalidRecord(_))));
    }

    #[tokio::test]
    async fn test_in_memory_store_returns_snapshot() {
        let store = InMemoryBookingStore::new(
            vec![AccommodationUnit::new("lenga", 6)],
            vec![],
            vec![ReservationInterval::new("lenga", day(1), day(3))],
        )
        .with_exchange_rates(ExchangeRates::new().with_rate("USD", day(1), dec!(950)));

        assert_eq!(store.fetch_units().await.unwrap().len(), 1);
        assert_eq!(store.fetch_reservations(day(20), day(25)).await.unwrap().len(), 1);
        assert_eq!(
            store
                .fetch_exchange_rates(day(1), day(2))
                .await
                .unwrap()
                .rate_on("USD", day(1)),
            Some(dec!(950))
        );
    }
}
