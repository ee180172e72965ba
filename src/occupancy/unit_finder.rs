//! Unit selection inside a capacity-bounded chamber.
//!
//! Units are numbered `1..=capacity`. Allocation always takes the lowest free
//! number, so vacated low units are reused before higher ones.

use std::collections::BTreeSet;

/// Smallest number in `1..=capacity` not present in `occupied`, or `None`
/// when every unit is taken.
pub fn lowest_free_unit(capacity: u32, occupied: &BTreeSet<u32>) -> Option<u32> {
    if capacity == 0 {
        return None;
    }
    // Occupied numbers are sorted, so the first gap in the sequence is the answer.
    let mut candidate = 1;
    for &number in occupied.range(1..=capacity) {
        if number != candidate {
            break;
        }
        candidate += 1;
    }
    (candidate <= capacity).then_some(candidate)
}

/// Every free unit number, ascending.
pub fn available_units(capacity: u32, occupied: &BTreeSet<u32>) -> Vec<u32> {
    (1..=capacity)
        .filter(|number| !occupied.contains(number))
        .collect()
}
