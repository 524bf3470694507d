use log::info;

use super::model::IncidentRecord;

// ---------------------------------------------------------------------------
// Quantile trimming of coordinates
// ---------------------------------------------------------------------------

/// Quantile with linear interpolation between order statistics (the default
/// method of pandas and numpy).  Returns `None` for an empty input.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Keep records whose `coord` lies within `[quantile(lower), quantile(upper)]`.
fn trim_by<F>(records: Vec<IncidentRecord>, lower: f64, upper: f64, coord: F) -> Vec<IncidentRecord>
where
    F: Fn(&IncidentRecord) -> f64,
{
    let values: Vec<f64> = records.iter().map(&coord).collect();
    let (Some(lo), Some(hi)) = (quantile(&values, lower), quantile(&values, upper)) else {
        return records;
    };
    records
        .into_iter()
        .filter(|r| {
            let v = coord(r);
            v >= lo && v <= hi
        })
        .collect()
}

/// Trim latitude outliers, then trim longitude outliers among the survivors.
///
/// The longitude bounds are computed after the latitude pass, so the two
/// passes are not independent.
pub fn remove_outliers(
    records: Vec<IncidentRecord>,
    lower: f64,
    upper: f64,
) -> Vec<IncidentRecord> {
    let before = records.len();
    let records = trim_by(records, lower, upper, |r| r.latitude);
    let after_lat = records.len();
    let records = trim_by(records, lower, upper, |r| r.longitude);
    info!(
        "outlier trim: {before} rows → {after_lat} after latitude → {} after longitude",
        records.len()
    );
    records
}
