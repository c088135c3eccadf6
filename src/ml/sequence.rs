use ndarray::{s, Array1, Array2, Array3, Axis};
use tracing::debug;

use super::StandardScaler;
use crate::error::{ForecastError, Result};
use crate::indicators::IndicatorFrame;

/// Windowed, scaled training samples built from an indicator frame.
#[derive(Debug, Clone)]
pub struct SequenceDataset {
    /// `[samples, sequence_length, features]`
    pub x: Array3<f64>,
    /// 1.0 when the forward return over the horizon is strictly positive.
    pub y_dir: Array1<f64>,
    /// Forward return over the horizon, in percent.
    pub y_pct: Array1<f64>,
    pub feature_names: Vec<String>,
    pub scaler: StandardScaler,
}

impl SequenceDataset {
    pub fn len(&self) -> usize {
        self.y_dir.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y_dir.is_empty()
    }

    /// Chronological split: the trailing `fraction` of samples (rounded up)
    /// becomes the validation set. No shuffling.
    pub fn split_tail(&self, fraction: f64) -> (SampleSet, SampleSet) {
        let n = self.len();
        let n_val = ((n as f64) * fraction).ceil() as usize;
        let n_val = n_val.min(n);
        let cut = n - n_val;

        let train = SampleSet {
            x: self.x.slice(s![..cut, .., ..]).to_owned(),
            y_dir: self.y_dir.slice(s![..cut]).to_owned(),
            y_pct: self.y_pct.slice(s![..cut]).to_owned(),
        };
        let validation = SampleSet {
            x: self.x.slice(s![cut.., .., ..]).to_owned(),
            y_dir: self.y_dir.slice(s![cut..]).to_owned(),
            y_pct: self.y_pct.slice(s![cut..]).to_owned(),
        };
        (train, validation)
    }
}

/// Inputs and both label arrays for one side of a train/validation split.
#[derive(Debug, Clone)]
pub struct SampleSet {
    pub x: Array3<f64>,
    pub y_dir: Array1<f64>,
    pub y_pct: Array1<f64>,
}

impl SampleSet {
    pub fn len(&self) -> usize {
        self.y_dir.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y_dir.is_empty()
    }
}

pub struct SequenceBuilder {
    pub horizon: usize,
    pub sequence_length: usize,
    pub min_samples: usize,
}

impl SequenceBuilder {
    pub fn new(horizon: usize, sequence_length: usize, min_samples: usize) -> Self {
        Self {
            horizon,
            sequence_length,
            min_samples,
        }
    }

    /// Forward percent return at each row: `(close[t+h] / close[t] - 1) * 100`.
    /// Undefined past the end of history or on a zero base price.
    pub fn forward_returns(closes: &[f64], horizon: usize) -> Vec<Option<f64>> {
        (0..closes.len())
            .map(|t| {
                let future = *closes.get(t + horizon)?;
                let base = closes[t];
                if base == 0.0 {
                    return None;
                }
                let pct = (future / base - 1.0) * 100.0;
                pct.is_finite().then_some(pct)
            })
            .collect()
    }

    pub fn build(&self, frame: &IndicatorFrame) -> Result<SequenceDataset> {
        let closes = frame
            .closes()
            .ok_or_else(|| ForecastError::SchemaMismatch { missing: vec!["Close".to_string()] })?;
        let forward = Self::forward_returns(&closes, self.horizon);

        let scaler = StandardScaler::fit(frame.values().view())?;
        let scaled = scaler.transform(frame.values().view())?;

        // window i covers rows [i - sequence_length, i) and is labelled with row i
        let end = frame.len().saturating_sub(self.horizon);
        let starts: Vec<usize> = (self.sequence_length..end)
            .filter(|&i| forward[i].is_some())
            .collect();

        let n_features = frame.feature_names().len();
        let mut x = Array3::<f64>::zeros((starts.len(), self.sequence_length, n_features));
        let mut y_dir = Array1::<f64>::zeros(starts.len());
        let mut y_pct = Array1::<f64>::zeros(starts.len());

        for (k, &i) in starts.iter().enumerate() {
            x.index_axis_mut(Axis(0), k)
                .assign(&scaled.slice(s![i - self.sequence_length..i, ..]));
            let pct = forward[i].unwrap_or_default();
            y_pct[k] = pct;
            y_dir[k] = if pct > 0.0 { 1.0 } else { 0.0 };
        }

        debug!(
            "Built {} windows of {}x{} from {} rows",
            starts.len(),
            self.sequence_length,
            n_features,
            frame.len()
        );

        if starts.len() < self.min_samples {
            return Err(ForecastError::InsufficientData {
                required: self.min_samples,
                available: starts.len(),
            });
        }

        Ok(SequenceDataset {
            x,
            y_dir,
            y_pct,
            feature_names: frame.feature_names().to_vec(),
            scaler,
        })
    }

    /// Scales the trailing `sequence_length` rows of `frame`, restricted to
    /// `feature_names`, into a single `[1, sequence_length, features]` window.
    pub fn latest_window(
        frame: &IndicatorFrame,
        feature_names: &[String],
        scaler: &StandardScaler,
        sequence_length: usize,
    ) -> Result<Array2<f64>> {
        let selected = frame.select(feature_names)?;
        if selected.nrows() < sequence_length {
            return Err(ForecastError::InsufficientData {
                required: sequence_length,
                available: selected.nrows(),
            });
        }
        let tail = selected.slice(s![selected.nrows() - sequence_length.., ..]);
        scaler.transform(tail)
    }
}
