// Domain type definitions for the allocation engine
// Units, reservations, tariffs and the combinations built from them

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Lifecycle state of a reservation
///
/// Only cancelled reservations are ignored by occupancy checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    CheckedIn,
    CheckedOut,
    Cancelled,
}

impl ReservationStatus {
    /// Whether a reservation in this state blocks its unit
    pub fn is_active(&self) -> bool {
        !matches!(self, ReservationStatus::Cancelled)
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReservationStatus::Pending => write!(f, "pending"),
            ReservationStatus::Confirmed => write!(f, "confirmed"),
            ReservationStatus::CheckedIn => write!(f, "checked_in"),
            ReservationStatus::CheckedOut => write!(f, "checked_out"),
            ReservationStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for ReservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReservationStatus::Pending),
            "confirmed" => Ok(ReservationStatus::Confirmed),
            "checked_in" => Ok(ReservationStatus::CheckedIn),
            "checked_out" => Ok(ReservationStatus::CheckedOut),
            "cancelled" => Ok(ReservationStatus::Cancelled),
            _ => Err(format!("Invalid reservation status: {}", s)),
        }
    }
}

/// Sleeping places of a unit broken down by bed type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BedBreakdown {
    pub double_beds: u32,
    pub single_beds: u32,
    pub bunk_beds: u32,
}

impl BedBreakdown {
    /// Number of guests the beds can sleep
    ///
    /// A double bed sleeps two; single (or queen used as single) and bunk beds sleep one.
    pub fn sleeping_places(&self, allow_bunks: bool) -> u32 {
        let bunks = if allow_bunks { self.bunk_beds } else { 0 };
        self.double_beds
            .saturating_mul(2)
            .saturating_add(self.single_beds)
            .saturating_add(bunks)
    }
}

/// A bookable cabin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccommodationUnit {
    pub name: String,
    pub display_name: String,
    pub capacity: u32,
    pub beds: Option<BedBreakdown>,
}

impl AccommodationUnit {
    pub fn new(name: impl Into<String>, capacity: u32) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            capacity,
            beds: None,
        }
    }

    pub fn with_beds(mut self, beds: BedBreakdown) -> Self {
        self.beds = Some(beds);
        self
    }

    /// Capacity after applying the caller's bed preference
    ///
    /// Units without a bed breakdown always report their nominal capacity.
    pub fn effective_capacity(&self, no_bunk_beds: bool) -> u32 {
        match self.beds {
            Some(beds) => beds.sleeping_places(!no_bunk_beds),
            None => self.capacity,
        }
    }
}

/// An existing reservation, half-open over `[arrival, departure)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationInterval {
    pub unit: String,
    pub arrival: NaiveDate,
    pub departure: NaiveDate,
    pub status: ReservationStatus,
}

impl ReservationInterval {
    pub fn new(unit: impl Into<String>, arrival: NaiveDate, departure: NaiveDate) -> Self {
        Self {
            unit: unit.into(),
            arrival,
            departure,
            status: ReservationStatus::Confirmed,
        }
    }

    pub fn with_status(mut self, status: ReservationStatus) -> Self {
        self.status = status;
        self
    }

    /// Half-open overlap test against `[start, end)`
    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.arrival < end && self.departure > start
    }

    /// Whether the unit is taken on the night starting at `day`
    pub fn occupies(&self, day: NaiveDate) -> bool {
        self.status.is_active() && self.arrival <= day && day < self.departure
    }
}

/// Nightly rate published for one sales channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRate {
    pub nightly_rate: Decimal,
    pub currency: String,
}

/// Seasonal tariff of a unit, valid over the closed range `[valid_from, valid_until]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TariffRecord {
    pub unit: String,
    pub valid_from: NaiveDate,
    pub valid_until: NaiveDate,
    pub rates: HashMap<String, ChannelRate>,
}

impl TariffRecord {
    pub fn new(unit: impl Into<String>, valid_from: NaiveDate, valid_until: NaiveDate) -> Self {
        Self {
            unit: unit.into(),
            valid_from,
            valid_until,
            rates: HashMap::new(),
        }
    }

    pub fn with_rate(
        mut self,
        channel: impl Into<String>,
        nightly_rate: Decimal,
        currency: impl Into<String>,
    ) -> Self {
        self.rates.insert(
            channel.into(),
            ChannelRate {
                nightly_rate,
                currency: currency.into(),
            },
        );
        self
    }

    pub fn covers(&self, night: NaiveDate) -> bool {
        self.valid_from <= night && night <= self.valid_until
    }

    pub fn rate_for(&self, channel: &str) -> Option<&ChannelRate> {
        self.rates.get(channel)
    }
}

/// Daily exchange rates into the local currency, keyed by foreign currency code
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExchangeRates {
    rates: HashMap<String, BTreeMap<NaiveDate, Decimal>>,
}

impl ExchangeRates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, currency: impl Into<String>, day: NaiveDate, rate: Decimal) {
        self.rates.entry(currency.into()).or_default().insert(day, rate);
    }

    pub fn with_rate(mut self, currency: impl Into<String>, day: NaiveDate, rate: Decimal) -> Self {
        self.insert(currency, day, rate);
        self
    }

    /// Rate in force on `day`: the most recent one published on or before it
    pub fn rate_on(&self, currency: &str, day: NaiveDate) -> Option<Decimal> {
        self.rates
            .get(currency)?
            .range(..=day)
            .next_back()
            .map(|(_, rate)| *rate)
    }
}

/// Strategy used to pick a unit for each night of a segmented stay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentStrategy {
    /// Smallest sufficient free unit, re-evaluated every night
    #[default]
    FirstFit,

    /// Keep the current unit while it stays free; on a switch, take the unit
    /// that stays free the longest
    LongestRun,
}

impl fmt::Display for SegmentStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentStrategy::FirstFit => write!(f, "first_fit"),
            SegmentStrategy::LongestRun => write!(f, "longest_run"),
        }
    }
}

impl std::str::FromStr for SegmentStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first_fit" => Ok(SegmentStrategy::FirstFit),
            "longest_run" => Ok(SegmentStrategy::LongestRun),
            _ => Err(format!("Invalid segment strategy: {}", s)),
        }
    }
}

/// A unit picked for the whole stay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitAssignment {
    pub unit: String,
    pub effective_capacity: u32,
}

/// Units used unchanged for the whole stay
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatCombination {
    pub units: Vec<UnitAssignment>,
    pub capacity: u32,
}

impl FlatCombination {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// A contiguous part of the stay, `[start, end)`, bound to one unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub unit: String,
    pub capacity: u32,
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Other units that could have covered this segment (diagnostic only)
    #[serde(default)]
    pub alternates: Vec<String>,
}

impl Segment {
    pub fn nights(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    pub fn covers(&self, day: NaiveDate) -> bool {
        self.start <= day && day < self.end
    }

    pub fn overlaps(&self, other: &Segment) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Segments covering the stay, ordered by start date then unit name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentedCombination {
    pub segments: Vec<Segment>,
    /// Smallest combined capacity over the nights of the stay
    pub capacity: u32,
}

impl SegmentedCombination {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Result of a combination search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Combination {
    Flat(FlatCombination),
    Segmented(SegmentedCombination),
}

impl Combination {
    pub fn capacity(&self) -> u32 {
        match self {
            Combination::Flat(flat) => flat.capacity,
            Combination::Segmented(segmented) => segmented.capacity,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Combination::Flat(flat) => flat.is_empty(),
            Combination::Segmented(segmented) => segmented.is_empty(),
        }
    }

    /// Whether the combination houses a party of `required` guests
    ///
    /// A party of zero is satisfied by the empty combination.
    pub fn satisfies(&self, required: u32) -> bool {
        if required == 0 {
            return true;
        }
        !self.is_empty() && self.capacity() >= required
    }
}
