use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};

/// Per-column z-score standardisation.
///
/// Fitted once over the full training frame and reused unchanged at
/// inference. Columns with zero variance get a unit scale, so they map to 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    means: Array1<f64>,
    scales: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(data: ArrayView2<f64>) -> Result<Self> {
        if data.nrows() == 0 {
            return Err(ForecastError::InsufficientData { required: 1, available: 0 });
        }

        let means = data
            .mean_axis(Axis(0))
            .ok_or(ForecastError::InsufficientData { required: 1, available: 0 })?;
        let scales = data
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s.is_finite() && s > 1e-12 { s } else { 1.0 });

        Ok(Self { means, scales })
    }

    pub fn n_features(&self) -> usize {
        self.means.len()
    }

    pub fn transform(&self, data: ArrayView2<f64>) -> Result<Array2<f64>> {
        if data.ncols() != self.n_features() {
            return Err(ForecastError::Training(format!(
                "scaler fitted on {} features, got {}",
                self.n_features(),
                data.ncols()
            )));
        }
        Ok((&data - &self.means) / &self.scales)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_fit_transform_standardises_columns() {
        let data = array![[1.0, 10.0], [3.0, 10.0], [5.0, 10.0]];
        let scaler = StandardScaler::fit(data.view()).unwrap();
        let scaled = scaler.transform(data.view()).unwrap();

        let col0 = scaled.column(0);
        assert!((col0.sum()).abs() < 1e-12);
        assert!((col0[2] - 1.224744871391589).abs() < 1e-9);
        // constant column maps to zero instead of dividing by zero
        assert!(scaled.column(1).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_transform_rejects_width_change() {
        let scaler = StandardScaler::fit(array![[1.0, 2.0], [2.0, 3.0]].view()).unwrap();
        assert!(scaler.transform(array![[1.0, 2.0, 3.0]].view()).is_err());
    }

    #[test]
    fn test_serde_preserves_behaviour() {
        let scaler = StandardScaler::fit(array![[1.0, -4.0], [7.0, 2.0], [4.0, 8.0]].view()).unwrap();
        let json = serde_json::to_string(&scaler).unwrap();
        let restored: StandardScaler = serde_json::from_str(&json).unwrap();

        let probe = array![[2.5, 0.5]];
        assert_eq!(
            scaler.transform(probe.view()).unwrap(),
            restored.transform(probe.view()).unwrap()
        );
    }
}
