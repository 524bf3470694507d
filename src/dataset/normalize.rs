use ndarray::{Array, ArrayView, Dimension};
use serde::{Deserialize, Serialize};

use crate::error::GridError;

/// Min-max scaling into `[-1, 1]`, fitted once on the training frames.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinMaxNormalizer {
    pub min: f64,
    pub max: f64,
}

impl MinMaxNormalizer {
    pub fn fit<D: Dimension>(data: ArrayView<'_, u32, D>) -> Result<Self, GridError> {
        let min = data.iter().copied().min().ok_or(GridError::EmptyInput("normalizer fit"))?;
        let max = data.iter().copied().max().ok_or(GridError::EmptyInput("normalizer fit"))?;
        if min == max {
            return Err(GridError::DegenerateRange(f64::from(min)));
        }
        log::info!("normalizer fitted: min={min} max={max}");
        Ok(Self {
            min: f64::from(min),
            max: f64::from(max),
        })
    }

    pub fn transform<D: Dimension>(&self, data: ArrayView<'_, u32, D>) -> Array<f64, D> {
        data.mapv(|x| self.scale(f64::from(x)))
    }

    pub fn inverse_transform<D: Dimension>(&self, data: ArrayView<'_, f64, D>) -> Array<f64, D> {
        data.mapv(|x| self.unscale(x))
    }

    fn scale(&self, x: f64) -> f64 {
        (x - self.min) / (self.max - self.min) * 2.0 - 1.0
    }

    fn unscale(&self, x: f64) -> f64 {
        (x + 1.0) / 2.0 * (self.max - self.min) + self.min
    }
}
