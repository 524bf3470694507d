use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use ndarray::{Array4, ArrayView2, Axis, s};
use serde::{Deserialize, Serialize};

use crate::error::GridError;

// ---------------------------------------------------------------------------
// IncidentRecord – one row of the raw export
// ---------------------------------------------------------------------------

/// A single incident after column selection and `dropna`.
#[derive(Debug, Clone, PartialEq)]
pub struct IncidentRecord {
    pub timestamp: NaiveDateTime,
    pub category: String,
    pub latitude: f64,
    pub longitude: f64,
}

// ---------------------------------------------------------------------------
// BinnedIncident – an incident placed on the grid and in a time slot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinnedIncident {
    /// Start of the time slot the incident falls in.
    pub slot: NaiveDateTime,
    /// Latitude bin (grid row).
    pub lat_bin: usize,
    /// Longitude bin (grid column).
    pub lon_bin: usize,
}

// ---------------------------------------------------------------------------
// SlotKey – `YYYYMMDDSS` as ASCII bytes
// ---------------------------------------------------------------------------

/// Encoded time-slot key: 8 date digits followed by a 2-digit, 1-based slot
/// number.  Byte order equals chronological order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SlotKey([u8; SlotKey::LEN]);

impl SlotKey {
    pub const LEN: usize = 10;

    /// Validate raw bytes as a key.  Only the shape is checked here; calendar
    /// validity is checked by [`decode_slot`](super::timeslot::decode_slot).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, GridError> {
        let key: [u8; Self::LEN] = bytes.try_into().map_err(|_| GridError::InvalidKey {
            key: String::from_utf8_lossy(bytes).into_owned(),
            reason: "expected 10 bytes",
        })?;
        if !key.iter().all(u8::is_ascii_digit) {
            return Err(GridError::InvalidKey {
                key: String::from_utf8_lossy(bytes).into_owned(),
                reason: "expected ASCII digits only",
            });
        }
        Ok(SlotKey(key))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        // Construction guarantees ASCII digits.
        std::str::from_utf8(&self.0).unwrap_or_default()
    }

    /// The `YYYYMMDD` part.
    pub fn day(&self) -> &[u8] {
        &self.0[..8]
    }

    /// The 1-based slot number.
    pub fn slot(&self) -> u32 {
        digits(&self.0[8..])
    }

    pub fn year(&self) -> i32 {
        digits(&self.0[..4]) as i32
    }

    pub fn month(&self) -> u32 {
        digits(&self.0[4..6])
    }

    pub fn day_of_month(&self) -> u32 {
        digits(&self.0[6..8])
    }
}

fn digits(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0, |acc, b| acc * 10 + u32::from(b - b'0'))
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SlotKey({})", self.as_str())
    }
}

impl FromStr for SlotKey {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SlotKey::from_bytes(s.as_bytes())
    }
}

impl TryFrom<String> for SlotKey {
    type Error = GridError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<SlotKey> for String {
    fn from(key: SlotKey) -> Self {
        key.as_str().to_string()
    }
}

// ---------------------------------------------------------------------------
// CrimeGrid – per-slot histograms with their keys
// ---------------------------------------------------------------------------

/// Tensor of shape `(slots, flows, height, width)` plus one key per slot.
///
/// Only slots with at least one incident are present, so consecutive keys
/// are increasing but not necessarily adjacent.
#[derive(Debug, Clone, PartialEq)]
pub struct CrimeGrid {
    data: Array4<u32>,
    timestamps: Vec<SlotKey>,
}

impl CrimeGrid {
    pub fn new(data: Array4<u32>, timestamps: Vec<SlotKey>) -> Result<Self, GridError> {
        if data.len_of(Axis(0)) != timestamps.len() {
            let mut expected = data.shape().to_vec();
            expected[0] = timestamps.len();
            return Err(GridError::ShapeMismatch {
                expected,
                actual: data.shape().to_vec(),
            });
        }
        if let Some(i) = timestamps.windows(2).position(|w| w[0] >= w[1]) {
            return Err(GridError::UnorderedTimestamps(i + 1));
        }
        if let Some(i) = data.outer_iter().position(|frame| {
            let mut flows = frame.outer_iter();
            flows
                .next()
                .is_some_and(|first| flows.any(|flow| flow != first))
        }) {
            return Err(GridError::DivergentFlows(i));
        }
        Ok(Self { data, timestamps })
    }

    pub fn data(&self) -> &Array4<u32> {
        &self.data
    }

    pub fn timestamps(&self) -> &[SlotKey] {
        &self.timestamps
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn nb_flow(&self) -> usize {
        self.data.len_of(Axis(1))
    }

    pub fn height(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    pub fn width(&self) -> usize {
        self.data.len_of(Axis(3))
    }

    /// The histogram at `index`, taken from the first flow.
    pub fn histogram(&self, index: usize) -> ArrayView2<'_, u32> {
        self.data.slice(s![index, 0, .., ..])
    }

    /// Number of incidents counted in the grid (first flow only).
    pub fn total_incidents(&self) -> u64 {
        if self.nb_flow() == 0 {
            return 0;
        }
        self.data
            .index_axis(Axis(1), 0)
            .iter()
            .map(|&c| u64::from(c))
            .sum()
    }

    /// Keep only the frames at `indices` (ascending).
    pub fn select(&self, indices: &[usize]) -> Result<Self, GridError> {
        let data = self.data.select(Axis(0), indices);
        let timestamps = indices.iter().map(|&i| self.timestamps[i]).collect();
        CrimeGrid::new(data, timestamps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> SlotKey {
        s.parse().unwrap()
    }

    #[test]
    fn slot_key_fields() {
        let k = key("2018110124");
        assert_eq!(k.year(), 2018);
        assert_eq!(k.month(), 11);
        assert_eq!(k.day_of_month(), 1);
        assert_eq!(k.slot(), 24);
        assert_eq!(k.day(), b"20181101");
        assert_eq!(k.to_string(), "2018110124");
    }

    #[test]
    fn slot_key_rejects_bad_shapes() {
        assert!("201811012".parse::<SlotKey>().is_err());
        assert!("20181101ab".parse::<SlotKey>().is_err());
        assert!(SlotKey::from_bytes(b"20181101011").is_err());
    }

    #[test]
    fn slot_key_serializes_as_string() {
        let k = key("2018110103");
        let json = serde_json::to_string(&k).unwrap();
        assert_eq!(json, "\"2018110103\"");
        let back: SlotKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, k);
        assert!(serde_json::from_str::<SlotKey>("\"nope\"").is_err());
    }

    #[test]
    fn grid_requires_matching_lengths() {
        let data = Array4::<u32>::zeros((2, 1, 2, 2));
        let err = CrimeGrid::new(data, vec![key("2018110101")]).unwrap_err();
        assert!(matches!(err, GridError::ShapeMismatch { .. }));
    }

    #[test]
    fn grid_requires_increasing_keys() {
        let data = Array4::<u32>::zeros((2, 1, 2, 2));
        let err = CrimeGrid::new(data, vec![key("2018110102"), key("2018110101")]).unwrap_err();
        assert!(matches!(err, GridError::UnorderedTimestamps(1)));
    }

    #[test]
    fn grid_requires_identical_flows() {
        let mut data = Array4::<u32>::zeros((2, 2, 1, 2));
        data[[1, 0, 0, 0]] = 5;
        data[[1, 1, 0, 1]] = 9;
        let err = CrimeGrid::new(data, vec![key("2018110101"), key("2018110102")]).unwrap_err();
        assert!(matches!(err, GridError::DivergentFlows(1)));
    }

    #[test]
    fn grid_accessors() {
        let mut data = Array4::<u32>::zeros((2, 2, 3, 2));
        data[[0, 0, 1, 1]] = 4;
        data[[0, 1, 1, 1]] = 4;
        data[[1, 0, 2, 0]] = 1;
        data[[1, 1, 2, 0]] = 1;
        let grid = CrimeGrid::new(data, vec![key("2018110101"), key("2018110105")]).unwrap();

        assert_eq!(grid.len(), 2);
        assert_eq!((grid.nb_flow(), grid.height(), grid.width()), (2, 3, 2));
        assert_eq!(grid.total_incidents(), 5);
        assert_eq!(grid.histogram(0)[[1, 1]], 4);

        let tail = grid.select(&[1]).unwrap();
        assert_eq!(tail.timestamps(), &[key("2018110105")]);
        assert_eq!(tail.total_incidents(), 1);
    }
}
