// Normal Combination Finder
//
// Picks a fixed set of free units for the whole stay, largest first,
// stopping as soon as the party fits.

use crate::allocation::types::{AccommodationUnit, FlatCombination, UnitAssignment};

/// Take units from `ranked` in order until their capacity reaches `required`
///
/// Returns `None` if the units run out first.
pub(crate) fn take_until_capacity<I>(ranked: I, required: u32) -> Option<(Vec<UnitAssignment>, u32)>
where
    I: IntoIterator<Item = UnitAssignment>,
{
    let mut selected = Vec::new();
    let mut capacity = 0u32;

    for assignment in ranked {
        if capacity >= required {
            break;
        }
        capacity += assignment.effective_capacity;
        selected.push(assignment);
    }

    (capacity >= required).then_some((selected, capacity))
}

/// Rank units by effective capacity, largest first, ties by name
pub(crate) fn rank_largest_first<'a, I>(units: I, no_bunk_beds: bool) -> Vec<UnitAssignment>
where
    I: IntoIterator<Item = &'a AccommodationUnit>,
{
    let mut ranked: Vec<UnitAssignment> = units
        .into_iter()
        .map(|unit| UnitAssignment {
            unit: unit.name.clone(),
            effective_capacity: unit.effective_capacity(no_bunk_beds),
        })
        .filter(|assignment| assignment.effective_capacity > 0)
        .collect();

    ranked.sort_by(|a, b| {
        b.effective_capacity
            .cmp(&a.effective_capacity)
            .then_with(|| a.unit.cmp(&b.unit))
    });
    ranked
}

/// Normal Combination Finder
///
/// Greedy "fewest units" heuristic: deterministic, not capacity-optimal.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalCombinationFinder;

impl NormalCombinationFinder {
    pub fn new() -> Self {
        Self
    }

    /// Select free units whose combined capacity houses `required_capacity` guests
    ///
    /// `candidates` must already be free for the whole stay. An empty
    /// combination means there is not enough availability, except for a party
    /// of zero, which needs no units at all.
    pub fn find<'a, I>(&self, candidates: I, required_capacity: u32, no_bunk_beds: bool) -> FlatCombination
    where
        I: IntoIterator<Item = &'a AccommodationUnit>,
    {
        if required_capacity == 0 {
            return FlatCombination::empty();
        }

        let ranked = rank_largest_first(candidates, no_bunk_beds);

        match take_until_capacity(ranked, required_capacity) {
            Some((units, capacity)) => FlatCombination { units, capacity },
            None => {
                tracing::debug!(
                    "Free units cannot house a party of {}",
                    required_capacity
                );
                FlatCombination::empty()
            }
        }
    }
}
