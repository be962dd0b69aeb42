// Pricing Calculator
//
// Prices a combination night by night against seasonal, per-channel tariffs.
// Foreign-currency rates are converted with the exchange rate of the night
// and grossed up by the tax factor. Nights that cannot be priced become
// zero-valued gap lines with their own status.

use crate::allocation::types::{Combination, ExchangeRates, TariffRecord};
use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;

/// Pricing configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingConfig {
    /// Channel used when the caller does not name one
    pub reference_channel: String,
    /// Currency every total is expressed in
    pub local_currency: String,
    /// Multiplier applied to converted foreign-currency rates
    pub tax_factor: Decimal,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            reference_channel: "direct".to_string(),
            local_currency: "CLP".to_string(),
            tax_factor: Decimal::new(119, 2),
        }
    }
}

/// How the nights of a price line were resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LineStatus {
    Priced,
    /// No tariff in force for the unit on these nights
    NoTariff,
    /// A tariff exists but has no rate for the channel
    NoChannelRate,
    /// The rate is in a foreign currency with no exchange rate published yet
    NoExchangeRate,
}

impl LineStatus {
    pub fn is_gap(&self) -> bool {
        !matches!(self, LineStatus::Priced)
    }
}

/// Consecutive nights of one unit priced the same way
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceLine {
    pub unit: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub nights: i64,
    /// Nightly amount in the local currency
    pub nightly_rate: Decimal,
    pub subtotal: Decimal,
    /// Currency the tariff publishes the rate in
    pub source_currency: Option<String>,
    pub valid_from: Option<NaiveDate>,
    pub valid_until: Option<NaiveDate>,
    pub status: LineStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PricingResult {
    pub currency: String,
    pub total: Decimal,
    /// Unit-nights across all lines
    pub total_nights: i64,
    pub lines: Vec<PriceLine>,
}

impl PricingResult {
    pub fn empty(currency: impl Into<String>) -> Self {
        Self {
            currency: currency.into(),
            total: Decimal::ZERO,
            total_nights: 0,
            lines: Vec::new(),
        }
    }

    /// Whether any night could not be priced
    pub fn has_gaps(&self) -> bool {
        self.lines.iter().any(|line| line.status.is_gap())
    }

    pub fn gaps(&self) -> impl Iterator<Item = &PriceLine> {
        self.lines.iter().filter(|line| line.status.is_gap())
    }

    pub fn uncovered_nights(&self) -> i64 {
        self.gaps().map(|line| line.nights).sum()
    }
}

/// Tariffs per unit, most recent `valid_from` first
struct TariffIndex<'a> {
    by_unit: HashMap<&'a str, Vec<&'a TariffRecord>>,
}

impl<'a> TariffIndex<'a> {
    fn build(tariffs: &'a [TariffRecord]) -> Self {
        let mut by_unit: HashMap<&'a str, Vec<&'a TariffRecord>> = HashMap::new();
        for tariff in tariffs {
            by_unit.entry(tariff.unit.as_str()).or_default().push(tariff);
        }
        for records in by_unit.values_mut() {
            records.sort_by(|a, b| b.valid_from.cmp(&a.valid_from));
        }
        Self { by_unit }
    }

    /// The record with the greatest `valid_from` on or before `night`,
    /// provided it is still valid that night
    fn lookup(&self, unit: &str, night: NaiveDate) -> Option<&'a TariffRecord> {
        self.by_unit
            .get(unit)?
            .iter()
            .find(|tariff| tariff.valid_from <= night)
            .filter(|tariff| tariff.covers(night))
            .copied()
    }
}

/// Price of a single night before grouping
struct NightPrice<'a> {
    status: LineStatus,
    rate: Decimal,
    source_currency: Option<&'a str>,
    tariff: Option<&'a TariffRecord>,
}

impl<'a> NightPrice<'a> {
    fn gap(status: LineStatus, tariff: Option<&'a TariffRecord>, source_currency: Option<&'a str>) -> Self {
        Self {
            status,
            rate: Decimal::ZERO,
            source_currency,
            tariff,
        }
    }

    fn extends(&self, line: &PriceLine, unit: &str, night: NaiveDate) -> bool {
        line.unit == unit
            && line.end == night
            && line.status == self.status
            && line.nightly_rate == self.rate
            && line.valid_from == self.tariff.map(|t| t.valid_from)
            && line.source_currency.as_deref() == self.source_currency
    }
}

/// Pricing Calculator
///
/// Deterministic: the same combination and snapshot always price the same.
#[derive(Debug, Clone, Default)]
pub struct PricingCalculator {
    config: PricingConfig,
}

impl PricingCalculator {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    /// Nights charged for `[start, end)`; a same-day stay counts as one
    pub fn nights_between(start: NaiveDate, end: NaiveDate) -> i64 {
        (end - start).num_days().max(1)
    }

    /// Price a combination for the stay `[stay_start, stay_end)`
    ///
    /// Flat combinations charge every unit for the whole stay; segmented
    /// combinations charge each segment over its own range.
    pub fn price(
        &self,
        combination: &Combination,
        tariffs: &[TariffRecord],
        exchange_rates: &ExchangeRates,
        stay_start: NaiveDate,
        stay_end: NaiveDate,
        channel: &str,
    ) -> PricingResult {
        let index = TariffIndex::build(tariffs);

        let stays: Vec<(&str, NaiveDate, NaiveDate)> = match combination {
            Combination::Flat(flat) => flat
                .units
                .iter()
                .map(|assignment| (assignment.unit.as_str(), stay_start, stay_end))
                .collect(),
            Combination::Segmented(segmented) => segmented
                .segments
                .iter()
                .map(|segment| (segment.unit.as_str(), segment.start, segment.end))
                .collect(),
        };

        let mut lines = Vec::new();
        for (unit, start, end) in stays {
            self.price_unit_stay(&mut lines, &index, exchange_rates, unit, start, end, channel);
        }

        let total = lines.iter().map(|line| line.subtotal).sum();
        let total_nights = lines.iter().map(|line| line.nights).sum();

        let result = PricingResult {
            currency: self.config.local_currency.clone(),
            total,
            total_nights,
            lines,
        };

        if result.has_gaps() {
            tracing::warn!(
                "{} nights could not be priced on channel {} for {} .. {}",
                result.uncovered_nights(),
                channel,
                stay_start,
                stay_end
            );
        }

        result
    }

    #[allow(clippy::too_many_arguments)]
    fn price_unit_stay(
        &self,
        lines: &mut Vec<PriceLine>,
        index: &TariffIndex<'_>,
        exchange_rates: &ExchangeRates,
        unit: &str,
        start: NaiveDate,
        end: NaiveDate,
        channel: &str,
    ) {
        let nights = Self::nights_between(start, end) as usize;

        for night in start.iter_days().take(nights) {
            let Some(next) = night.succ_opt() else {
                break;
            };
            let price = self.price_night(index, exchange_rates, unit, night, channel);

            if let Some(line) = lines.last_mut().filter(|line| price.extends(line, unit, night)) {
                line.end = next;
                line.nights += 1;
                line.subtotal = line.nightly_rate * Decimal::from(line.nights);
                continue;
            }

            lines.push(PriceLine {
                unit: unit.to_string(),
                start: night,
                end: next,
                nights: 1,
                nightly_rate: price.rate,
                subtotal: price.rate,
                source_currency: price.source_currency.map(str::to_string),
                valid_from: price.tariff.map(|t| t.valid_from),
                valid_until: price.tariff.map(|t| t.valid_until),
                status: price.status,
            });
        }
    }

    fn price_night<'a>(
        &self,
        index: &TariffIndex<'a>,
        exchange_rates: &ExchangeRates,
        unit: &str,
        night: NaiveDate,
        channel: &str,
    ) -> NightPrice<'a> {
        let Some(tariff) = index.lookup(unit, night) else {
            return NightPrice::gap(LineStatus::NoTariff, None, None);
        };

        let Some(rate) = tariff.rate_for(channel) else {
            return NightPrice::gap(LineStatus::NoChannelRate, Some(tariff), None);
        };

        if rate.currency == self.config.local_currency {
            return NightPrice {
                status: LineStatus::Priced,
                rate: rate.nightly_rate,
                source_currency: Some(rate.currency.as_str()),
                tariff: Some(tariff),
            };
        }

        match exchange_rates.rate_on(&rate.currency, night) {
            Some(fx) => NightPrice {
                status: LineStatus::Priced,
                rate: self.convert(rate.nightly_rate, fx),
                source_currency: Some(rate.currency.as_str()),
                tariff: Some(tariff),
            },
            None => NightPrice::gap(
                LineStatus::NoExchangeRate,
                Some(tariff),
                Some(rate.currency.as_str()),
            ),
        }
    }

    /// Foreign amount into the local currency, tax included
    fn convert(&self, amount: Decimal, fx_rate: Decimal) -> Decimal {
        (amount * fx_rate * self.config.tax_factor)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::types::{FlatCombination, Segment, SegmentedCombination, UnitAssignment};
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    fn flat(units: &[&str]) -> Combination {
        Combination::Flat(FlatCombination {
            units: units
                .iter()
                .map(|unit| UnitAssignment {
                    unit: unit.to_string(),
                    effective_capacity: 4,
                })
                .collect(),
            capacity: 4 * units.len() as u32,
        })
    }

    fn segment(unit: &str, start: NaiveDate, end: NaiveDate) -> Segment {
        Segment {
            unit: unit.to_string(),
            capacity: 4,
            start,
            end,
            alternates: vec![],
        }
    }

    fn calculator() -> PricingCalculator {
        PricingCalculator::new(PricingConfig::default())
    }

    fn no_fx() -> ExchangeRates {
        ExchangeRates::new()
    }

    #[test]
    fn test_single_tariff_prices_every_night() {
        let tariffs = vec![TariffRecord::new("lenga", day(1), day(31)).with_rate("direct", dec!(45000), "CLP")];

        let result = calculator().price(&flat(&["lenga"]), &tariffs, &no_fx(), day(3), day(7), "direct");

        assert_eq!(result.total, dec!(180000));
        assert_eq!(result.total_nights, 4);
        assert_eq!(result.lines.len(), 1);
        assert_eq!(result.lines[0].status, LineStatus::Priced);
        assert_eq!(result.lines[0].valid_from, Some(day(1)));
        assert!(!result.has_gaps());
    }

    #[test]
    fn test_flat_combination_charges_each_unit() {
        let tariffs = vec![
            TariffRecord::new("lenga", day(1), day(31)).with_rate("direct", dec!(50000), "CLP"),
            TariffRecord::new("nire", day(1), day(31)).with_rate("direct", dec!(30000), "CLP"),
        ];

        let result = calculator().price(&flat(&["lenga", "nire"]), &tariffs, &no_fx(), day(1), day(3), "direct");

        assert_eq!(result.total, dec!(160000));
        assert_eq!(result.total_nights, 4);
        assert_eq!(result.lines.len(), 2);
    }

    /// Tariff covers the first five nights of a ten-night stay
    #[test]
    fn test_partial_tariff_coverage_leaves_gap_line() {
        let tariffs = vec![TariffRecord::new("lenga", day(1), day(5)).with_rate("direct", dec!(40000), "CLP")];

        let result = calculator().price(&flat(&["lenga"]), &tariffs, &no_fx(), day(1), day(11), "direct");

        assert_eq!(result.lines.len(), 2);
        assert_eq!(result.lines[0].status, LineStatus::Priced);
        assert_eq!((result.lines[0].start, result.lines[0].end), (day(1), day(6)));
        assert_eq!(result.lines[0].subtotal, dec!(200000));

        assert_eq!(result.lines[1].status, LineStatus::NoTariff);
        assert_eq!((result.lines[1].start, result.lines[1].end), (day(6), day(11)));
        assert_eq!(result.lines[1].subtotal, Decimal::ZERO);

        assert_eq!(result.total, dec!(200000));
        assert!(result.has_gaps());
        assert_eq!(result.uncovered_nights(), 5);
    }

    #[test]
    fn test_season_change_splits_lines() {
        let tariffs = vec![
            TariffRecord::new("lenga", day(15), day(31)).with_rate("direct", dec!(60000), "CLP"),
            TariffRecord::new("lenga", day(1), day(14)).with_rate("direct", dec!(40000), "CLP"),
        ];

        let result = calculator().price(&flat(&["lenga"]), &tariffs, &no_fx(), day(12), day(17), "direct");

        let lines: Vec<(NaiveDate, i64, Decimal)> = result
            .lines
            .iter()
            .map(|line| (line.start, line.nights, line.nightly_rate))
            .collect();
        assert_eq!(lines, vec![(day(12), 3, dec!(40000)), (day(15), 2, dec!(60000))]);
        assert_eq!(result.total, dec!(240000));
    }

    #[test]
    fn test_most_recent_tariff_wins_even_when_expired() {
        let tariffs = vec![
            TariffRecord::new("lenga", day(1), day(31)).with_rate("direct", dec!(40000), "CLP"),
            TariffRecord::new("lenga", day(10), day(12)).with_rate("direct", dec!(55000), "CLP"),
        ];

        let result = calculator().price(&flat(&["lenga"]), &tariffs, &no_fx(), day(15), day(16), "direct");

        assert_eq!(result.lines[0].status, LineStatus::NoTariff);
        assert_eq!(result.total, Decimal::ZERO);
    }

    #[test]
    fn test_missing_channel_rate_is_a_gap() {
        let tariffs = vec![TariffRecord::new("lenga", day(1), day(31)).with_rate("direct", dec!(40000), "CLP")];

        let result = calculator().price(&flat(&["lenga"]), &tariffs, &no_fx(), day(1), day(3), "booking");

        assert_eq!(result.lines.len(), 1);
        assert_eq!(result.lines[0].status, LineStatus::NoChannelRate);
        assert_eq!(result.lines[0].valid_from, Some(day(1)));
        assert!(result.has_gaps());
    }

    #[test]
    fn test_foreign_rate_is_converted_and_taxed() {
        let tariffs = vec![TariffRecord::new("lenga", day(1), day(31)).with_rate("booking", dec!(100), "USD")];
        let fx = ExchangeRates::new().with_rate("USD", day(1), dec!(950.5));

        let result = calculator().price(&flat(&["lenga"]), &tariffs, &fx, day(2), day(4), "booking");

        // 100 × 950.5 × 1.19
        assert_eq!(result.lines[0].nightly_rate, dec!(113109.50));
        assert_eq!(result.lines[0].source_currency.as_deref(), Some("USD"));
        assert_eq!(result.total, dec!(226219.00));
        assert_eq!(result.currency, "CLP");
    }

    #[test]
    fn test_daily_exchange_rate_splits_lines() {
        let tariffs = vec![TariffRecord::new("lenga", day(1), day(31)).with_rate("booking", dec!(100), "USD")];
        let fx = ExchangeRates::new()
            .with_rate("USD", day(1), dec!(900))
            .with_rate("USD", day(3), dec!(1000));

        let config = PricingConfig {
            tax_factor: Decimal::ONE,
            ..PricingConfig::default()
        };
        let result = PricingCalculator::new(config).price(&flat(&["lenga"]), &tariffs, &fx, day(1), day(5), "booking");

        let lines: Vec<(i64, Decimal)> = result.lines.iter().map(|l| (l.nights, l.nightly_rate)).collect();
        assert_eq!(lines, vec![(2, dec!(90000)), (2, dec!(100000))]);
    }

    #[test]
    fn test_missing_exchange_rate_is_a_gap() {
        let tariffs = vec![TariffRecord::new("lenga", day(1), day(31)).with_rate("booking", dec!(100), "EUR")];
        let fx = ExchangeRates::new().with_rate("EUR", day(5), dec!(1020));

        let result = calculator().price(&flat(&["lenga"]), &tariffs, &fx, day(3), day(7), "booking");

        let statuses: Vec<(LineStatus, i64)> = result.lines.iter().map(|l| (l.status, l.nights)).collect();
        assert_eq!(statuses, vec![(LineStatus::NoExchangeRate, 2), (LineStatus::Priced, 2)]);
    }

    #[test]
    fn test_zero_rate_is_not_a_gap() {
        let tariffs = vec![TariffRecord::new("lenga", day(1), day(31)).with_rate("direct", Decimal::ZERO, "CLP")];

        let free_stay = calculator().price(&flat(&["lenga"]), &tariffs, &no_fx(), day(1), day(3), "direct");
        let missing = calculator().price(&flat(&["nire"]), &tariffs, &no_fx(), day(1), day(3), "direct");

        assert_eq!(free_stay.total, Decimal::ZERO);
        assert!(!free_stay.has_gaps());
        assert_eq!(missing.total, Decimal::ZERO);
        assert!(missing.has_gaps());
    }

    #[test]
    fn test_segments_are_priced_over_their_own_range() {
        let tariffs = vec![
            TariffRecord::new("lenga", day(1), day(31)).with_rate("direct", dec!(50000), "CLP"),
            TariffRecord::new("nire", day(1), day(31)).with_rate("direct", dec!(30000), "CLP"),
        ];
        let combination = Combination::Segmented(SegmentedCombination {
            segments: vec![segment("nire", day(1), day(3)), segment("lenga", day(3), day(6))],
            capacity: 4,
        });

        let result = calculator().price(&combination, &tariffs, &no_fx(), day(1), day(6), "direct");

        assert_eq!(result.total, dec!(210000));
        assert_eq!(result.total_nights, 5);
    }

    #[test]
    fn test_same_day_stay_is_one_night() {
        let tariffs = vec![TariffRecord::new("lenga", day(1), day(31)).with_rate("direct", dec!(45000), "CLP")];

        let result = calculator().price(&flat(&["lenga"]), &tariffs, &no_fx(), day(4), day(4), "direct");

        assert_eq!(PricingCalculator::nights_between(day(4), day(4)), 1);
        assert_eq!(result.total_nights, 1);
        assert_eq!(result.total, dec!(45000));
        assert_eq!(result.lines[0].end, day(5));
    }

    #[test]
    fn test_last_calendar_night_does_not_overflow() {
        let last_night = NaiveDate::MAX.pred_opt().unwrap();
        let tariffs = vec![TariffRecord::new("lenga", last_night, NaiveDate::MAX)
            .with_rate("direct", dec!(45000), "CLP")];

        let result = calculator().price(
            &flat(&["lenga"]),
            &tariffs,
            &no_fx(),
            last_night,
            NaiveDate::MAX,
            "direct",
        );

        assert_eq!(result.total, dec!(45000));
        assert_eq!(result.lines[0].end, NaiveDate::MAX);

        // No night can start on the last calendar day
        let result = calculator().price(
            &flat(&["lenga"]),
            &tariffs,
            &no_fx(),
            NaiveDate::MAX,
            NaiveDate::MAX,
            "direct",
        );
        assert!(result.lines.is_empty());
    }

    #[test]
    fn test_empty_combination_prices_to_zero() {
        let result = calculator().price(&flat(&[]), &[], &no_fx(), day(1), day(3), "direct");

        assert_eq!(result, PricingResult::empty("CLP"));
        assert!(!result.has_gaps());
    }

    #[test]
    fn test_conversion_rounds_midpoint_away_from_zero() {
        let config = PricingConfig {
            tax_factor: Decimal::ONE,
            ..PricingConfig::default()
        };
        assert_eq!(PricingCalculator::new(config).convert(dec!(1), dec!(0.125)), dec!(0.13));
    }
}
