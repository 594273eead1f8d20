//! Per-feature standardization (zero mean, unit variance)

use crate::error::{Result, SegmentError};
use log::{debug, warn};
use ndarray::{Array1, Array2, ArrayView1, Axis};

/// Fitted per-column mean and standard deviation.
///
/// A column whose spread is numerically zero keeps a standard deviation of 1,
/// so it is only centred and every value maps to `x - mean`.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    means: Array1<f64>,
    std_devs: Array1<f64>,
}

impl StandardScaler {
    /// Fit on the rows of `features` using the population standard deviation
    pub fn fit(features: &Array2<f64>) -> Result<Self> {
        let means = features
            .mean_axis(Axis(0))
            .ok_or(SegmentError::InsufficientData {
                rows: 0,
                required: 1,
            })?;
        let raw_std = features.std_axis(Axis(0), 0.0);

        let std_devs = Array1::from_iter(raw_std.iter().zip(means.iter()).enumerate().map(
            |(column, (&std, &mean))| {
                if std < 10.0 * f64::EPSILON * mean.abs().max(1.0) {
                    warn!("Feature column {} has zero variance; scaling it by 1", column);
                    1.0
                } else {
                    std
                }
            },
        ));
        debug!("Scaler fitted: means={}, std_devs={}", means, std_devs);

        Ok(Self { means, std_devs })
    }

    pub fn transform(&self, features: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_width(features.ncols())?;
        Ok((features - &self.means) / &self.std_devs)
    }

    pub fn fit_transform(features: &Array2<f64>) -> Result<(Self, Array2<f64>)> {
        let scaler = Self::fit(features)?;
        let scaled = scaler.transform(features)?;
        Ok((scaler, scaled))
    }

    /// Scale a single observation, e.g. a customer to predict
    pub fn transform_row(&self, row: &[f64]) -> Result<Array1<f64>> {
        self.check_width(row.len())?;
        let row = ArrayView1::from(row);
        Ok((&row - &self.means) / &self.std_devs)
    }

    pub fn means(&self) -> &Array1<f64> {
        &self.means
    }

    pub fn std_devs(&self) -> &Array1<f64> {
        &self.std_devs
    }

    fn check_width(&self, width: usize) -> Result<()> {
        if width != self.means.len() {
            return Err(SegmentError::feature(
                "features",
                format!(
                    "expected {} feature columns, got {}",
                    self.means.len(),
                    width
                ),
            ));
        }
        Ok(())
    }
}
