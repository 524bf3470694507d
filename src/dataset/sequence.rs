use std::collections::HashMap;

use chrono::{Duration, NaiveDateTime};
use log::info;
use ndarray::{Array3, Array4, ArrayView4, Axis, concatenate, s};

use crate::config::DatasetConfig;
use crate::data::model::SlotKey;
use crate::data::timeslot::{MINUTES_PER_DAY, decode_slot};
use crate::error::GridError;

// ---------------------------------------------------------------------------
// Closeness / period / trend samples
// ---------------------------------------------------------------------------

/// Model inputs and targets, one sample per leading axis entry.
///
/// Each input component stacks its lagged frames along the channel axis, so
/// closeness has `nb_flow * len_closeness` channels.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceSet {
    pub closeness: Option<Array4<f64>>,
    pub period: Option<Array4<f64>>,
    pub trend: Option<Array4<f64>>,
    pub target: Array4<f64>,
    pub timestamps: Vec<SlotKey>,
}

impl SequenceSet {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Split into the first `at` samples and the rest.
    pub fn split_at(&self, at: usize) -> (SequenceSet, SequenceSet) {
        let head = |a: &Array4<f64>| a.slice(s![..at, .., .., ..]).to_owned();
        let tail = |a: &Array4<f64>| a.slice(s![at.., .., .., ..]).to_owned();
        (
            SequenceSet {
                closeness: self.closeness.as_ref().map(head),
                period: self.period.as_ref().map(head),
                trend: self.trend.as_ref().map(head),
                target: head(&self.target),
                timestamps: self.timestamps[..at].to_vec(),
            },
            SequenceSet {
                closeness: self.closeness.as_ref().map(tail),
                period: self.period.as_ref().map(tail),
                trend: self.trend.as_ref().map(tail),
                target: tail(&self.target),
                timestamps: self.timestamps[at..].to_vec(),
            },
        )
    }

    /// Shapes of every present array, keyed by component name.
    pub fn shapes(&self) -> Vec<(&'static str, Vec<usize>)> {
        let mut out = Vec::new();
        for (name, arr) in [
            ("closeness", &self.closeness),
            ("period", &self.period),
            ("trend", &self.trend),
        ] {
            if let Some(a) = arr {
                out.push((name, a.shape().to_vec()));
            }
        }
        out.push(("target", self.target.shape().to_vec()));
        out
    }
}

/// Lag offsets (in slots) for each component.
struct Depends {
    closeness: Vec<usize>,
    period: Vec<usize>,
    trend: Vec<usize>,
}

impl Depends {
    fn new(cfg: &DatasetConfig, slots_per_day: usize) -> Self {
        Self {
            closeness: (1..=cfg.len_closeness).collect(),
            period: (1..=cfg.len_period)
                .map(|j| cfg.period_interval * slots_per_day * j)
                .collect(),
            trend: (1..=cfg.len_trend)
                .map(|j| cfg.trend_interval * slots_per_day * j)
                .collect(),
        }
    }

    fn all(&self) -> impl Iterator<Item = usize> + '_ {
        self.closeness
            .iter()
            .chain(&self.period)
            .chain(&self.trend)
            .copied()
    }

    /// First index that could possibly have every lag in range.
    fn first_index(&self) -> usize {
        self.all().max().unwrap_or(0)
    }
}

/// Build samples from normalized frames.
///
/// A frame at index `i` yields a sample only when every lagged timestamp
/// (`t - lag * interval`) also has a frame; missing slots are skipped, not
/// zero-filled.
pub fn create_dataset(
    frames: ArrayView4<'_, f64>,
    keys: &[SlotKey],
    cfg: &DatasetConfig,
    slots_per_day: u32,
) -> Result<SequenceSet, GridError> {
    if frames.len_of(Axis(0)) != keys.len() {
        let mut expected = frames.shape().to_vec();
        expected[0] = keys.len();
        return Err(GridError::ShapeMismatch {
            expected,
            actual: frames.shape().to_vec(),
        });
    }
    let (_, nb_flow, h, w) = frames.dim();
    let interval = Duration::minutes(i64::from(MINUTES_PER_DAY / slots_per_day.max(1)));

    let times: Vec<NaiveDateTime> = keys
        .iter()
        .map(|k| decode_slot(k, slots_per_day))
        .collect::<Result<_, _>>()?;
    let index: HashMap<NaiveDateTime, usize> =
        times.iter().enumerate().map(|(i, &t)| (t, i)).collect();

    let depends = Depends::new(cfg, slots_per_day as usize);
    let lookup = |t: NaiveDateTime, lag: usize| {
        let lag = i32::try_from(lag).ok()?;
        index.get(&(t - interval * lag)).copied()
    };

    let mut xc: Vec<Array3<f64>> = Vec::new();
    let mut xp: Vec<Array3<f64>> = Vec::new();
    let mut xt: Vec<Array3<f64>> = Vec::new();
    let mut y: Vec<Array3<f64>> = Vec::new();
    let mut timestamps = Vec::new();

    for i in depends.first_index()..keys.len() {
        let t = times[i];
        let gather = |lags: &[usize]| -> Option<Array3<f64>> {
            if lags.is_empty() {
                return Some(Array3::zeros((0, h, w)));
            }
            let views = lags
                .iter()
                .map(|&lag| lookup(t, lag).map(|j| frames.index_axis(Axis(0), j)))
                .collect::<Option<Vec<_>>>()?;
            concatenate(Axis(0), &views).ok()
        };

        let (Some(c), Some(p), Some(tr)) = (
            gather(&depends.closeness),
            gather(&depends.period),
            gather(&depends.trend),
        ) else {
            continue;
        };
        xc.push(c);
        xp.push(p);
        xt.push(tr);
        y.push(frames.index_axis(Axis(0), i).to_owned());
        timestamps.push(keys[i]);
    }

    let stacked = |samples: &[Array3<f64>], len: usize| {
        (len > 0).then(|| stack_samples(samples, nb_flow * len, h, w))
    };
    let set = SequenceSet {
        closeness: stacked(&xc, cfg.len_closeness),
        period: stacked(&xp, cfg.len_period),
        trend: stacked(&xt, cfg.len_trend),
        target: stack_samples(&y, nb_flow, h, w),
        timestamps,
    };
    info!("created {} samples: {:?}", set.len(), set.shapes());
    Ok(set)
}

/// Stack equally shaped samples along a new leading axis.  An empty input
/// gives a `(0, channels, h, w)` array.
fn stack_samples(samples: &[Array3<f64>], channels: usize, h: usize, w: usize) -> Array4<f64> {
    let mut out = Array4::zeros((samples.len(), channels, h, w));
    for (mut dst, src) in out.axis_iter_mut(Axis(0)).zip(samples) {
        dst.assign(src);
    }
    out
}
