use std::fmt;

use ndarray::{ArrayView, Dimension, Zip};
use serde::Serialize;

use crate::error::GridError;

// ---------------------------------------------------------------------------
// Error metrics over prediction / target tensors
// ---------------------------------------------------------------------------

fn check_shapes<D: Dimension>(
    pred: &ArrayView<'_, f64, D>,
    target: &ArrayView<'_, f64, D>,
) -> Result<(), GridError> {
    if pred.shape() != target.shape() {
        return Err(GridError::ShapeMismatch {
            expected: target.shape().to_vec(),
            actual: pred.shape().to_vec(),
        });
    }
    if target.is_empty() {
        return Err(GridError::EmptyInput("metric over empty arrays"));
    }
    Ok(())
}

pub fn mse<D: Dimension>(
    pred: ArrayView<'_, f64, D>,
    target: ArrayView<'_, f64, D>,
) -> Result<f64, GridError> {
    check_shapes(&pred, &target)?;
    let sum = Zip::from(&pred)
        .and(&target)
        .fold(0.0, |acc, &p, &t| acc + (p - t).powi(2));
    Ok(sum / target.len() as f64)
}

pub fn rmse<D: Dimension>(
    pred: ArrayView<'_, f64, D>,
    target: ArrayView<'_, f64, D>,
) -> Result<f64, GridError> {
    mse(pred, target).map(f64::sqrt)
}

pub fn mae<D: Dimension>(
    pred: ArrayView<'_, f64, D>,
    target: ArrayView<'_, f64, D>,
) -> Result<f64, GridError> {
    check_shapes(&pred, &target)?;
    let sum = Zip::from(&pred)
        .and(&target)
        .fold(0.0, |acc, &p, &t| acc + (p - t).abs());
    Ok(sum / target.len() as f64)
}

/// Mean absolute percentage error as a fraction.  Cells whose target is zero
/// are left out; if every target is zero the result is 0.
pub fn mape<D: Dimension>(
    pred: ArrayView<'_, f64, D>,
    target: ArrayView<'_, f64, D>,
) -> Result<f64, GridError> {
    check_shapes(&pred, &target)?;
    let (sum, count) = Zip::from(&pred)
        .and(&target)
        .fold((0.0, 0usize), |(sum, count), &p, &t| {
            if t == 0.0 {
                (sum, count)
            } else {
                (sum + ((t - p) / t).abs(), count + 1)
            }
        });
    Ok(if count == 0 { 0.0 } else { sum / count as f64 })
}

/// Rescaling factor from per-cell errors to per-area errors:
/// `sqrt(height * width / nb_area)`.
pub fn m_factor(height: usize, width: usize, nb_area: usize) -> f64 {
    ((height * width) as f64 / nb_area.max(1) as f64).sqrt()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Score {
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
    pub mape: f64,
    pub m_factor: f64,
}

impl Score {
    /// `(rmse, mae, mape)` multiplied by `m_factor`.
    pub fn real(&self) -> (f64, f64, f64) {
        (
            self.rmse * self.m_factor,
            self.mae * self.m_factor,
            self.mape * self.m_factor,
        )
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (rmse_real, mae_real, mape_real) = self.real();
        writeln!(
            f,
            " {:.6}  RMSE (real): {rmse_real:.6} MAE (real): {mae_real:.6} MAPE (real): {mape_real:.6}",
            self.mse
        )?;
        write!(
            f,
            "RMSE: {:.6} MAE: {:.6} MAPE: {:.6}",
            self.rmse, self.mae, self.mape
        )
    }
}

pub fn evaluate<D: Dimension>(
    pred: ArrayView<'_, f64, D>,
    target: ArrayView<'_, f64, D>,
    m_factor: f64,
) -> Result<Score, GridError> {
    Ok(Score {
        mse: mse(pred.view(), target.view())?,
        rmse: rmse(pred.view(), target.view())?,
        mae: mae(pred.view(), target.view())?,
        mape: mape(pred, target)?,
        m_factor,
    })
}
