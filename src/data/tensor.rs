use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use log::{debug, info, warn};
use ndarray::{Array2, Array4, Axis};

use super::binning::create_bins;
use super::model::{BinnedIncident, CrimeGrid, IncidentRecord};
use super::outliers::remove_outliers;
use super::timeslot::{encode_all, floor_to_interval};
use crate::config::PipelineConfig;
use crate::error::GridError;

/// Place trimmed records on the grid and in their time slot.
pub fn bin_incidents(records: &[IncidentRecord], cfg: &PipelineConfig) -> Vec<BinnedIncident> {
    let cells = create_bins(records, cfg.grid_height, cfg.grid_width);
    let interval = cfg.interval_minutes();

    records
        .iter()
        .zip(cells)
        .filter_map(|(rec, cell)| {
            let cell = cell?;
            Some(BinnedIncident {
                slot: floor_to_interval(rec.timestamp, interval),
                lat_bin: cell.row,
                lon_bin: cell.col,
            })
        })
        .collect()
}

/// Group binned incidents by slot and histogram each group over the grid.
///
/// Frames come out in ascending slot order; slots without incidents have no
/// frame.  The histogram is repeated across all `nb_flow` channels.
pub fn get_arrays_and_timestamps(
    binned: &[BinnedIncident],
    cfg: &PipelineConfig,
) -> Result<CrimeGrid, GridError> {
    let (h, w) = (cfg.grid_height, cfg.grid_width);
    let mut groups: BTreeMap<NaiveDateTime, Array2<u32>> = BTreeMap::new();

    for inc in binned {
        if inc.lat_bin >= h || inc.lon_bin >= w {
            debug!("skipping incident outside histogram range: {inc:?}");
            continue;
        }
        groups
            .entry(inc.slot)
            .or_insert_with(|| Array2::zeros((h, w)))[[inc.lat_bin, inc.lon_bin]] += 1;
    }

    let slots: Vec<NaiveDateTime> = groups.keys().copied().collect();
    let timestamps = encode_all(&slots, cfg.slots_per_day)?;

    let mut data = Array4::<u32>::zeros((groups.len(), cfg.nb_flow, h, w));
    for (mut frame, hist) in data.axis_iter_mut(Axis(0)).zip(groups.values()) {
        for mut flow in frame.axis_iter_mut(Axis(0)) {
            flow.assign(hist);
        }
    }

    CrimeGrid::new(data, timestamps)
}

/// Run the whole preparation stage: trim, bin, floor and histogram.
pub fn build_grid(
    records: Vec<IncidentRecord>,
    cfg: &PipelineConfig,
) -> Result<CrimeGrid, GridError> {
    cfg.validate()?;
    if records.is_empty() {
        return Err(GridError::EmptyInput("no incident records to grid"));
    }
    let records = remove_outliers(records, cfg.lower_quantile, cfg.upper_quantile);
    let binned = bin_incidents(&records, cfg);
    let grid = get_arrays_and_timestamps(&binned, cfg)?;
    if grid.is_empty() {
        warn!("no incidents survived trimming and binning");
    }

    info!(
        "built grid of {} slots, shape {:?}, {} incidents",
        grid.len(),
        grid.data().shape(),
        grid.total_incidents()
    );
    Ok(grid)
}
