// Availability Loader
//
// Fetches everything a quote needs for a date range from the booking store
// and narrows reservations down to the active ones overlapping the range.

use crate::allocation::{
    error::{AllocResult, AllocationError},
    store::BookingStore,
    types::{AccommodationUnit, ExchangeRates, ReservationInterval, TariffRecord},
};
use chrono::NaiveDate;
use std::sync::Arc;

/// Everything known about units, bookings and prices for one date range
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub units: Vec<AccommodationUnit>,
    pub tariffs: Vec<TariffRecord>,
    /// Active reservations intersecting the loaded range
    pub reservations: Vec<ReservationInterval>,
    pub exchange_rates: ExchangeRates,
}

impl Snapshot {
    /// Units with no active reservation anywhere in `[start, end)`
    pub fn free_units(&self, start: NaiveDate, end: NaiveDate) -> Vec<&AccommodationUnit> {
        self.units
            .iter()
            .filter(|unit| {
                !self.reservations.iter().any(|reservation| {
                    reservation.unit == unit.name
                        && reservation.status.is_active()
                        && reservation.overlaps(start, end)
                })
            })
            .collect()
    }
}

/// Availability Loader
///
/// Pure I/O adapter over a [`BookingStore`]; it never retries.
#[derive(Clone)]
pub struct AvailabilityLoader {
    store: Arc<dyn BookingStore>,
}

impl AvailabilityLoader {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        Self { store }
    }

    /// Load the snapshot for `[range_start, range_end)`
    pub async fn load(&self, range_start: NaiveDate, range_end: NaiveDate) -> AllocResult<Snapshot> {
        if range_end < range_start {
            return Err(AllocationError::InvalidRequest(format!(
                "Range end {} is before range start {}",
                range_end, range_start
            )));
        }

        tracing::debug!("Loading availability snapshot for {} .. {}", range_start, range_end);

        let units = self.store.fetch_units().await?;
        let tariffs = self.store.fetch_tariffs().await?;
        let exchange_rates = self.store.fetch_exchange_rates(range_start, range_end).await?;
        let reservations: Vec<ReservationInterval> = self
            .store
            .fetch_reservations(range_start, range_end)
            .await?
            .into_iter()
            .filter(|reservation| {
                reservation.status.is_active() && reservation.overlaps(range_start, range_end)
            })
            .collect();

        tracing::debug!(
            "Snapshot loaded: {} units, {} tariffs, {} overlapping reservations",
            units.len(),
            tariffs.len(),
            reservations.len()
        );

        Ok(Snapshot {
            units,
            tariffs,
            reservations,
            exchange_rates,
        })
    }
}
