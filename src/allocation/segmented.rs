// Segmented Combination Finder
//
// Covers a stay night by night when the party may move between units.
// Each night gets the smallest sufficient free unit; when no single unit is
// large enough, the night is covered by a set of free units picked the way
// the normal finder picks them. A unit used on consecutive nights stays in
// one segment; only a genuine switch closes it.

use crate::allocation::{
    error::{AllocResult, AllocationError},
    normal::{rank_largest_first, take_until_capacity},
    types::{
        AccommodationUnit, ReservationInterval, Segment, SegmentStrategy, SegmentedCombination,
        UnitAssignment,
    },
};
use chrono::NaiveDate;
use std::collections::HashMap;

/// Occupied `[arrival, departure)` intervals per unit, active reservations only
struct OccupancyCalendar<'a> {
    by_unit: HashMap<&'a str, Vec<(NaiveDate, NaiveDate)>>,
}

impl<'a> OccupancyCalendar<'a> {
    fn build(reservations: &'a [ReservationInterval]) -> Self {
        let mut by_unit: HashMap<&'a str, Vec<(NaiveDate, NaiveDate)>> = HashMap::new();
        for reservation in reservations.iter().filter(|r| r.status.is_active()) {
            by_unit
                .entry(reservation.unit.as_str())
                .or_default()
                .push((reservation.arrival, reservation.departure));
        }
        Self { by_unit }
    }

    fn is_free(&self, unit: &str, day: NaiveDate) -> bool {
        self.by_unit.get(unit).map_or(true, |intervals| {
            !intervals
                .iter()
                .any(|(arrival, departure)| *arrival <= day && day < *departure)
        })
    }

    fn is_free_range(&self, unit: &str, start: NaiveDate, end: NaiveDate) -> bool {
        self.by_unit.get(unit).map_or(true, |intervals| {
            !intervals
                .iter()
                .any(|(arrival, departure)| *arrival < end && *departure > start)
        })
    }

    /// First night in `[from, limit)` on which the unit is taken, or `limit`
    fn free_until(&self, unit: &str, from: NaiveDate, limit: NaiveDate) -> NaiveDate {
        self.by_unit
            .get(unit)
            .and_then(|intervals| {
                intervals
                    .iter()
                    .filter(|(arrival, departure)| *departure > from && *arrival < limit)
                    .map(|(arrival, _)| (*arrival).max(from))
                    .min()
            })
            .unwrap_or(limit)
    }
}

/// Segment still being extended night by night
struct OpenSegment {
    unit: String,
    capacity: u32,
    start: NaiveDate,
}

impl OpenSegment {
    fn close(&self, end: NaiveDate) -> Segment {
        Segment {
            unit: self.unit.clone(),
            capacity: self.capacity,
            start: self.start,
            end,
            alternates: Vec::new(),
        }
    }
}

/// Segmented Combination Finder
#[derive(Debug, Clone, Copy, Default)]
pub struct SegmentedCombinationFinder {
    strategy: SegmentStrategy,
}

impl SegmentedCombinationFinder {
    pub fn new(strategy: SegmentStrategy) -> Self {
        Self { strategy }
    }

    /// Partition `[stay_start, stay_end)` into per-unit segments
    ///
    /// Returns an empty combination (capacity 0) when any single night cannot
    /// be covered; partial coverage is never returned.
    pub fn find(
        &self,
        units: &[AccommodationUnit],
        reservations: &[ReservationInterval],
        required_capacity: u32,
        stay_start: NaiveDate,
        stay_end: NaiveDate,
        no_bunk_beds: bool,
    ) -> SegmentedCombination {
        if required_capacity == 0 || stay_end <= stay_start {
            return SegmentedCombination::empty();
        }

        let calendar = OccupancyCalendar::build(reservations);

        let mut sufficient: Vec<(&AccommodationUnit, u32)> = units
            .iter()
            .map(|unit| (unit, unit.effective_capacity(no_bunk_beds)))
            .filter(|(_, capacity)| *capacity >= required_capacity)
            .collect();
        sufficient.sort_by(|(a, a_capacity), (b, b_capacity)| {
            a_capacity.cmp(b_capacity).then_with(|| a.name.cmp(&b.name))
        });

        let mut open: Vec<OpenSegment> = Vec::new();
        let mut segments: Vec<Segment> = Vec::new();
        let mut capacity = u32::MAX;

        for day in stay_start.iter_days().take_while(|day| *day < stay_end) {
            let selection = match self.select_single(&sufficient, &open, &calendar, day, stay_end) {
                Some(assignment) => vec![assignment],
                None => {
                    let free_tonight = units.iter().filter(|unit| calendar.is_free(&unit.name, day));
                    match take_until_capacity(
                        rank_largest_first(free_tonight, no_bunk_beds),
                        required_capacity,
                    ) {
                        Some((selection, _)) => selection,
                        None => {
                            tracing::debug!(
                                "No free units on {} for a party of {}",
                                day,
                                required_capacity
                            );
                            return SegmentedCombination::empty();
                        }
                    }
                }
            };

            let tonight: u32 = selection.iter().map(|a| a.effective_capacity).sum();
            capacity = capacity.min(tonight);

            open.retain(|segment| {
                let continues = selection.iter().any(|a| a.unit == segment.unit);
                if !continues {
                    segments.push(segment.close(day));
                }
                continues
            });

            for assignment in selection {
                if !open.iter().any(|segment| segment.unit == assignment.unit) {
                    open.push(OpenSegment {
                        unit: assignment.unit,
                        capacity: assignment.effective_capacity,
                        start: day,
                    });
                }
            }
        }

        segments.extend(open.iter().map(|segment| segment.close(stay_end)));
        segments.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.unit.cmp(&b.unit)));

        attach_alternates(&mut segments, units, &calendar, required_capacity, no_bunk_beds);

        tracing::debug!(
            "Segmented stay {} .. {} into {} segments",
            stay_start,
            stay_end,
            segments.len()
        );

        SegmentedCombination { segments, capacity }
    }

    /// Pick one unit large enough for the whole party, if any is free tonight
    fn select_single(
        &self,
        sufficient: &[(&AccommodationUnit, u32)],
        open: &[OpenSegment],
        calendar: &OccupancyCalendar<'_>,
        day: NaiveDate,
        stay_end: NaiveDate,
    ) -> Option<UnitAssignment> {
        let mut free_tonight = sufficient
            .iter()
            .filter(|(unit, _)| calendar.is_free(&unit.name, day));

        let chosen = match self.strategy {
            SegmentStrategy::FirstFit => free_tonight.next(),
            SegmentStrategy::LongestRun => {
                let current = match open {
                    [only] => sufficient
                        .iter()
                        .find(|(unit, _)| unit.name == only.unit && calendar.is_free(&unit.name, day)),
                    _ => None,
                };

                current.or_else(|| {
                    let mut best: Option<(&(&AccommodationUnit, u32), NaiveDate)> = None;
                    for candidate in free_tonight {
                        let until = calendar.free_until(&candidate.0.name, day, stay_end);
                        if best.map_or(true, |(_, best_until)| until > best_until) {
                            best = Some((candidate, until));
                        }
                    }
                    best.map(|(candidate, _)| candidate)
                })
            }
        };

        chosen.map(|(unit, capacity)| UnitAssignment {
            unit: unit.name.clone(),
            effective_capacity: *capacity,
        })
    }

    /// Re-check an accepted combination against the reservations it was built from
    pub fn verify(
        &self,
        combination: &SegmentedCombination,
        reservations: &[ReservationInterval],
        required_capacity: u32,
        stay_start: NaiveDate,
        stay_end: NaiveDate,
    ) -> AllocResult<()> {
        let calendar = OccupancyCalendar::build(reservations);
        let segments = &combination.segments;

        for (i, segment) in segments.iter().enumerate() {
            if segment.start >= segment.end || segment.start < stay_start || segment.end > stay_end {
                return Err(AllocationError::InvariantViolation(format!(
                    "Segment of {} ({} .. {}) lies outside the stay {} .. {}",
                    segment.unit, segment.start, segment.end, stay_start, stay_end
                )));
            }

            if !calendar.is_free_range(&segment.unit, segment.start, segment.end) {
                return Err(AllocationError::InvariantViolation(format!(
                    "Segment of {} ({} .. {}) overlaps an existing reservation",
                    segment.unit, segment.start, segment.end
                )));
            }

            if let Some(other) = segments[i + 1..]
                .iter()
                .find(|other| other.unit == segment.unit && other.overlaps(segment))
            {
                return Err(AllocationError::InvariantViolation(format!(
                    "Unit {} is assigned twice: {} .. {} and {} .. {}",
                    segment.unit, segment.start, segment.end, other.start, other.end
                )));
            }
        }

        for day in stay_start.iter_days().take_while(|day| *day < stay_end) {
            let covered: u32 = segments
                .iter()
                .filter(|segment| segment.covers(day))
                .map(|segment| segment.capacity)
                .sum();
            if covered < required_capacity || covered == 0 {
                return Err(AllocationError::InvariantViolation(format!(
                    "Night {} is covered for {} guests, {} required",
                    day, covered, required_capacity
                )));
            }
        }

        Ok(())
    }
}

/// List, per segment, the other units that could have covered it
fn attach_alternates(
    segments: &mut [Segment],
    units: &[AccommodationUnit],
    calendar: &OccupancyCalendar<'_>,
    required_capacity: u32,
    no_bunk_beds: bool,
) {
    let assigned: Vec<(String, NaiveDate, NaiveDate)> = segments
        .iter()
        .map(|segment| (segment.unit.clone(), segment.start, segment.end))
        .collect();

    for segment in segments.iter_mut() {
        let threshold = segment.capacity.min(required_capacity);
        let mut alternates: Vec<String> = units
            .iter()
            .filter(|unit| unit.name != segment.unit)
            .filter(|unit| unit.effective_capacity(no_bunk_beds) >= threshold)
            .filter(|unit| calendar.is_free_range(&unit.name, segment.start, segment.end))
            .filter(|unit| {
                !assigned.iter().any(|(name, start, end)| {
                    *name == unit.name && *start < segment.end && segment.start < *end
                })
            })
            .map(|unit| unit.name.clone())
            .collect();
        alternates.sort();
        segment.alternates = alternates;
    }
}
