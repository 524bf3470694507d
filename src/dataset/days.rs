use std::collections::HashSet;

use log::info;

use crate::data::model::CrimeGrid;
use crate::error::GridError;

/// Keep only the calendar days whose `slots_per_day` slots are all present.
///
/// A day counts as complete when a frame with slot 1 is followed, exactly
/// `slots_per_day - 1` frames later, by a frame with slot `slots_per_day`.
/// Because keys are strictly increasing, that run is the whole day.
pub fn remove_incomplete_days(
    grid: &CrimeGrid,
    slots_per_day: u32,
) -> Result<CrimeGrid, GridError> {
    let keys = grid.timestamps();
    let t = slots_per_day as usize;
    let mut complete: HashSet<&[u8]> = HashSet::new();
    let mut incomplete: Vec<String> = Vec::new();

    let mut i = 0;
    while i < keys.len() {
        if keys[i].slot() != 1 {
            i += 1;
        } else if t > 0 && i + t - 1 < keys.len() && keys[i + t - 1].slot() == slots_per_day {
            complete.insert(keys[i].day());
            i += t;
        } else {
            incomplete.push(String::from_utf8_lossy(keys[i].day()).into_owned());
            i += 1;
        }
    }

    let keep: Vec<usize> = keys
        .iter()
        .enumerate()
        .filter(|(_, k)| complete.contains(k.day()))
        .map(|(i, _)| i)
        .collect();

    info!(
        "kept {} complete days ({} of {} frames); incomplete days: {:?}",
        complete.len(),
        keep.len(),
        keys.len(),
        incomplete
    );
    grid.select(&keep)
}
