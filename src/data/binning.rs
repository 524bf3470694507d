use log::debug;

use super::model::IncidentRecord;

// ---------------------------------------------------------------------------
// Equal-width binning (pandas `cut` with an integer bin count)
// ---------------------------------------------------------------------------

/// Right-closed, equal-width intervals fitted to the range of the data.
///
/// The lowest interval also includes its left edge, and that edge sits 0.1%
/// of the range below the minimum, so every fitted value lands in a bin.
#[derive(Debug, Clone, PartialEq)]
pub struct EqualWidthBins {
    edges: Vec<f64>,
}

impl EqualWidthBins {
    /// Fit `n` bins to `values`.  Returns `None` for an empty input, zero
    /// bins, or non-finite data.
    pub fn fit(values: &[f64], n: usize) -> Option<Self> {
        if n == 0 || values.is_empty() || values.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let mut min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let mut max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let widen = |v: f64| if v == 0.0 { 0.001 } else { 0.001 * v.abs() };
        let degenerate = min == max;
        if degenerate {
            min -= widen(min);
            max += widen(max);
        }

        let step = (max - min) / n as f64;
        let mut edges: Vec<f64> = (0..=n).map(|i| min + step * i as f64).collect();
        edges[n] = max;
        if !degenerate {
            edges[0] -= (max - min) * 0.001;
        }
        Some(Self { edges })
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.edges.len() - 1
    }

    /// Index of the interval containing `x`, or `None` outside the edges.
    pub fn assign(&self, x: f64) -> Option<usize> {
        let first = self.edges[0];
        let last = self.edges[self.edges.len() - 1];
        if x.is_nan() || x < first || x > last {
            return None;
        }
        // First upper edge >= x; intervals are (lo, hi].
        let idx = self.edges[1..].partition_point(|&e| e < x);
        Some(idx.min(self.len() - 1))
    }
}

/// Grid cell of a record: latitude bin (row) and longitude bin (column).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridCell {
    pub row: usize,
    pub col: usize,
}

/// Bin every record's latitude into `height` rows and longitude into `width`
/// columns, each fitted over the full set of records.  The result is
/// parallel to `records`.
pub fn create_bins(
    records: &[IncidentRecord],
    height: usize,
    width: usize,
) -> Vec<Option<GridCell>> {
    let lats: Vec<f64> = records.iter().map(|r| r.latitude).collect();
    let lons: Vec<f64> = records.iter().map(|r| r.longitude).collect();
    let (Some(lat_bins), Some(lon_bins)) = (
        EqualWidthBins::fit(&lats, height),
        EqualWidthBins::fit(&lons, width),
    ) else {
        return vec![None; records.len()];
    };
    debug!("latitude edges: {:?}", lat_bins.edges());
    debug!("longitude edges: {:?}", lon_bins.edges());

    lats.iter()
        .zip(&lons)
        .map(|(&lat, &lon)| {
            Some(GridCell {
                row: lat_bins.assign(lat)?,
                col: lon_bins.assign(lon)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn edges_extend_below_minimum() {
        let bins = EqualWidthBins::fit(&[0.0, 10.0], 4).unwrap();
        let edges = bins.edges();
        assert_eq!(edges.len(), 5);
        assert!((edges[0] - -0.01).abs() < 1e-12);
        assert_eq!(edges[1], 2.5);
        assert_eq!(edges[4], 10.0);
    }

    #[test]
    fn intervals_are_right_closed() {
        let bins = EqualWidthBins::fit(&[0.0, 10.0], 4).unwrap();
        assert_eq!(bins.assign(0.0), Some(0));
        assert_eq!(bins.assign(2.5), Some(0));
        assert_eq!(bins.assign(2.5000001), Some(1));
        assert_eq!(bins.assign(7.5), Some(2));
        assert_eq!(bins.assign(10.0), Some(3));
        assert_eq!(bins.assign(10.5), None);
        assert_eq!(bins.assign(-1.0), None);
        assert_eq!(bins.assign(f64::NAN), None);
    }

    #[test]
    fn constant_input_gets_widened_range() {
        let bins = EqualWidthBins::fit(&[5.0, 5.0, 5.0], 3).unwrap();
        assert_eq!(bins.len(), 3);
        assert!((bins.edges()[0] - 4.995).abs() < 1e-12);
        assert!((bins.edges()[3] - 5.005).abs() < 1e-12);
        assert_eq!(bins.assign(5.0), Some(1));

        let zeros = EqualWidthBins::fit(&[0.0], 2).unwrap();
        assert_eq!(zeros.edges(), &[-0.001, 0.0, 0.001]);
        assert_eq!(zeros.assign(0.0), Some(0));
    }

    #[test]
    fn rejects_empty_and_non_finite() {
        assert!(EqualWidthBins::fit(&[], 4).is_none());
        assert!(EqualWidthBins::fit(&[1.0], 0).is_none());
        assert!(EqualWidthBins::fit(&[1.0, f64::INFINITY], 4).is_none());
    }

    #[test]
    fn create_bins_maps_extremes_to_corners() {
        let ts = NaiveDate::from_ymd_opt(2018, 11, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let rec = |lat, lon| IncidentRecord {
            timestamp: ts,
            category: "ROUBO".into(),
            latitude: lat,
            longitude: lon,
        };
        let records = vec![rec(-23.7, -46.8), rec(-23.4, -46.4), rec(-23.56, -46.62)];
        let cells = create_bins(&records, 16, 8);

        assert_eq!(cells[0], Some(GridCell { row: 0, col: 0 }));
        assert_eq!(cells[1], Some(GridCell { row: 15, col: 7 }));
        let mid = cells[2].unwrap();
        assert_eq!(mid.row, 7);
        assert_eq!(mid.col, 3);
    }
}
