use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use ndarray::s;
use serde::Serialize;

use super::days::remove_incomplete_days;
use super::normalize::MinMaxNormalizer;
use super::sequence::{SequenceSet, create_dataset};
use crate::config::Settings;
use crate::data::model::CrimeGrid;
use crate::error::GridError;

// ---------------------------------------------------------------------------
// Train / test split
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DatasetSplit {
    pub train: SequenceSet,
    pub test: SequenceSet,
    pub normalizer: MinMaxNormalizer,
}

impl DatasetSplit {
    /// One line per array with its shape.
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        for (part, set) in [("train", &self.train), ("test", &self.test)] {
            for (name, shape) in set.shapes() {
                lines.push(format!("{part:<5} {name:<9} {shape:?}"));
            }
        }
        lines.push(format!(
            "normalizer min={} max={}",
            self.normalizer.min, self.normalizer.max
        ));
        lines.join("\n")
    }

    /// Write every array as JSON (`ndarray`'s serde layout) into `dir`,
    /// alongside the normalizer and the sample timestamps.
    pub fn write_to(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating output directory {}", dir.display()))?;

        for (part, set) in [("train", &self.train), ("test", &self.test)] {
            let arrays = [
                ("x_closeness", set.closeness.as_ref()),
                ("x_period", set.period.as_ref()),
                ("x_trend", set.trend.as_ref()),
                ("y", Some(&set.target)),
            ];
            for (name, arr) in arrays {
                if let Some(arr) = arr {
                    write_json(&dir.join(format!("{name}_{part}.json")), arr)?;
                }
            }
            write_json(&dir.join(format!("timestamps_{part}.json")), &set.timestamps)?;
        }
        write_json(&dir.join("normalizer.json"), &self.normalizer)?;
        info!("wrote dataset split to {}", dir.display());
        Ok(())
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer(BufWriter::new(file), value)
        .with_context(|| format!("writing {}", path.display()))
}

/// Assemble a train/test split from a grid.
///
/// The normalizer is fitted on every frame except the last `len_test`, where
/// `len_test = slots_per_day * days_test`; the last `len_test` samples form
/// the test set.
pub fn build_dataset(grid: &CrimeGrid, settings: &Settings) -> Result<DatasetSplit, GridError> {
    settings.validate()?;
    let t = settings.pipeline.slots_per_day;
    let cfg = &settings.dataset;

    let filtered;
    let grid = if cfg.remove_incomplete_days {
        filtered = remove_incomplete_days(grid, t)?;
        &filtered
    } else {
        grid
    };

    let len_test = t as usize * cfg.days_test;
    if grid.len() <= len_test {
        return Err(GridError::InsufficientSamples {
            needed: len_test,
            available: grid.len(),
        });
    }

    let train_frames = grid.len() - len_test;
    let normalizer = MinMaxNormalizer::fit(grid.data().slice(s![..train_frames, .., .., ..]))?;
    let normalized = normalizer.transform(grid.data().view());

    let samples = create_dataset(normalized.view(), grid.timestamps(), cfg, t)?;
    if samples.is_empty() {
        return Err(GridError::EmptyInput("no slot has all of its lagged frames"));
    }
    if samples.len() <= len_test {
        return Err(GridError::InsufficientSamples {
            needed: len_test,
            available: samples.len(),
        });
    }

    let (train, test) = samples.split_at(samples.len() - len_test);
    info!("train samples: {}, test samples: {}", train.len(), test.len());
    Ok(DatasetSplit {
        train,
        test,
        normalizer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatasetConfig, PipelineConfig};
    use crate::data::model::SlotKey;
    use crate::data::timeslot::encode_slot;
    use chrono::{Duration, NaiveDate};
    use ndarray::{Array4, Axis};

    /// `days` full days of 4 slots each, counts growing with the slot index.
    fn grid(days: usize) -> CrimeGrid {
        let t = 4;
        let n = days * t;
        let start = NaiveDate::from_ymd_opt(2018, 11, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let keys: Vec<SlotKey> = (0..n)
            .map(|i| encode_slot(start + Duration::hours(6) * i as i32, t as u32).unwrap())
            .collect();
        let mut data = Array4::<u32>::zeros((n, 2, 2, 2));
        for (i, mut frame) in data.axis_iter_mut(Axis(0)).enumerate() {
            frame.fill(i as u32);
        }
        CrimeGrid::new(data, keys).unwrap()
    }

    fn settings(days_test: usize) -> Settings {
        Settings {
            pipeline: PipelineConfig {
                slots_per_day: 4,
                ..Default::default()
            },
            dataset: DatasetConfig {
                len_closeness: 2,
                len_period: 1,
                len_trend: 0,
                days_test,
                ..Default::default()
            },
        }
    }

    #[test]
    fn splits_last_days_into_test() {
        let split = build_dataset(&grid(5), &settings(1)).unwrap();

        // 20 frames, first usable index is 4 (one-day period lag): 16 samples.
        assert_eq!(split.test.len(), 4);
        assert_eq!(split.train.len(), 12);
        assert_eq!(split.test.timestamps[0].to_string(), "2018110501");

        // Fitted on frames 0..16, so the maximum training count maps to 1.
        assert_eq!(split.normalizer, MinMaxNormalizer { min: 0.0, max: 15.0 });
        assert_eq!(split.train.target[[0, 0, 0, 0]], 4.0 / 15.0 * 2.0 - 1.0);

        let xp = split.train.period.as_ref().unwrap();
        assert_eq!(xp.shape(), &[12, 2, 2, 2]);
        assert_eq!(split.train.closeness.as_ref().unwrap().shape(), &[12, 4, 2, 2]);
    }

    #[test]
    fn too_few_frames_is_an_error() {
        let err = build_dataset(&grid(2), &settings(2)).unwrap_err();
        assert!(matches!(err, GridError::InsufficientSamples { .. }));

        // Enough frames for the test window, but the lags eat the samples.
        let err = build_dataset(&grid(2), &settings(1)).unwrap_err();
        assert!(matches!(
            err,
            GridError::InsufficientSamples { needed: 4, available: 4 }
        ));
    }

    #[test]
    fn no_complete_sample_is_an_error() {
        // One day cannot supply the one-day period lag.
        let err = build_dataset(&grid(1), &settings(0)).unwrap_err();
        assert!(matches!(err, GridError::EmptyInput(_)));
    }

    #[test]
    fn incomplete_days_are_removed_first() {
        let full = grid(6);
        // Drop one slot of the first day.
        let keep: Vec<usize> = (0..full.len()).filter(|&i| i != 2).collect();
        let gappy = full.select(&keep).unwrap();

        let mut s = settings(1);
        s.dataset.remove_incomplete_days = true;
        let split = build_dataset(&gappy, &s).unwrap();
        let first = split.train.timestamps[0].to_string();
        // Day one is gone, so the first sample needs day two as its period lag.
        assert_eq!(first, "2018110301");
    }

    #[test]
    fn summary_and_export() {
        let split = build_dataset(&grid(5), &settings(1)).unwrap();
        let summary = split.summary();
        assert!(summary.contains("train closeness [12, 4, 2, 2]"));
        assert!(summary.contains("test  target    [4, 2, 2, 2]"));

        let dir = tempfile::tempdir().unwrap();
        split.write_to(dir.path()).unwrap();
        for name in [
            "x_closeness_train.json",
            "x_period_test.json",
            "y_test.json",
            "timestamps_train.json",
            "normalizer.json",
        ] {
            assert!(dir.path().join(name).exists(), "missing {name}");
        }
        assert!(!dir.path().join("x_trend_train.json").exists());

        let y: Array4<f64> = serde_json::from_reader(
            File::open(dir.path().join("y_test.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(y.shape(), split.test.target.shape());
        assert!(y
            .iter()
            .zip(split.test.target.iter())
            .all(|(a, b)| (a - b).abs() < 1e-12));
    }
}
