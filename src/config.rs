use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::timeslot::MINUTES_PER_DAY;
use crate::error::GridError;

// ---------------------------------------------------------------------------
// Column names of the raw incident export
// ---------------------------------------------------------------------------

/// Names of the four columns read from the incident file.  Everything else in
/// the file is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    pub timestamp: String,
    pub category: String,
    pub latitude: String,
    pub longitude: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            timestamp: "data_hora_inclusao".to_string(),
            category: "natureza_descricao".to_string(),
            latitude: "numero_latitude".to_string(),
            longitude: "numero_longitude".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Stage A: incidents → grid
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub columns: ColumnNames,
    /// Quantile below which coordinates are trimmed.
    pub lower_quantile: f64,
    /// Quantile above which coordinates are trimmed.
    pub upper_quantile: f64,
    /// Number of latitude bins (grid rows).
    pub grid_height: usize,
    /// Number of longitude bins (grid columns).
    pub grid_width: usize,
    /// Time slots per day (T).  Must divide a day into whole minutes.
    pub slots_per_day: u32,
    /// Channels per frame; every channel carries the same histogram.
    pub nb_flow: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            columns: ColumnNames::default(),
            lower_quantile: 0.003,
            upper_quantile: 0.997,
            grid_height: 16,
            grid_width: 8,
            slots_per_day: 24,
            nb_flow: 2,
        }
    }
}

impl PipelineConfig {
    /// Length of one time slot in minutes.
    pub fn interval_minutes(&self) -> u32 {
        MINUTES_PER_DAY / self.slots_per_day
    }

    pub fn validate(&self) -> Result<(), GridError> {
        if self.grid_height == 0 || self.grid_width == 0 {
            return Err(GridError::InvalidConfig(format!(
                "grid must be non-empty, got {}x{}",
                self.grid_height, self.grid_width
            )));
        }
        if self.slots_per_day == 0
            || self.slots_per_day > 99
            || MINUTES_PER_DAY % self.slots_per_day != 0
        {
            return Err(GridError::InvalidConfig(format!(
                "slots_per_day must divide {MINUTES_PER_DAY} minutes and be at most 99, got {}",
                self.slots_per_day
            )));
        }
        let quantiles_ok = (0.0..=1.0).contains(&self.lower_quantile)
            && (0.0..=1.0).contains(&self.upper_quantile)
            && self.lower_quantile <= self.upper_quantile;
        if !quantiles_ok {
            return Err(GridError::InvalidConfig(format!(
                "quantiles must satisfy 0 <= lower <= upper <= 1, got {} and {}",
                self.lower_quantile, self.upper_quantile
            )));
        }
        if self.nb_flow == 0 {
            return Err(GridError::InvalidConfig("nb_flow must be at least 1".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Stage B: grid → training dataset
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Number of immediately preceding slots per sample.
    pub len_closeness: usize,
    /// Number of period (daily) lags per sample.
    pub len_period: usize,
    /// Number of trend (weekly) lags per sample.
    pub len_trend: usize,
    /// Period lag in days.
    pub period_interval: usize,
    /// Trend lag in days.
    pub trend_interval: usize,
    /// Trailing days held out as the test set.
    pub days_test: usize,
    /// Effective number of areas, used for the "real" metric rescaling.
    pub nb_area: usize,
    /// Drop calendar days that are missing any slot before building samples.
    pub remove_incomplete_days: bool,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            len_closeness: 6,
            len_period: 0,
            len_trend: 4,
            period_interval: 1,
            trend_interval: 7,
            days_test: 10,
            nb_area: 81,
            remove_incomplete_days: false,
        }
    }
}

impl DatasetConfig {
    pub fn validate(&self) -> Result<(), GridError> {
        if self.len_closeness + self.len_period + self.len_trend == 0 {
            return Err(GridError::InvalidConfig(
                "at least one of closeness, period or trend must be non-zero".into(),
            ));
        }
        if self.nb_area == 0 {
            return Err(GridError::InvalidConfig("nb_area must be at least 1".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Top-level settings file
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub pipeline: PipelineConfig,
    pub dataset: DatasetConfig,
}

impl Settings {
    /// Load settings from a JSON file, or return the defaults when no path is
    /// given.  Missing keys fall back to their defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let settings = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading settings {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("parsing settings {}", path.display()))?
            }
            None => Settings::default(),
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), GridError> {
        self.pipeline.validate()?;
        self.dataset.validate()
    }
}
