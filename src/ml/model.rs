use ndarray::{Array1, Array2, ArrayView2, Axis, Dimension, Zip};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::SampleSet;
use crate::config::TrainingSettings;
use crate::error::{ForecastError, Result};

/// Output of one inference call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictorOutput {
    /// Probability that the forward return is positive.
    pub direction_probability: f64,
    /// Estimated forward return in percent.
    pub magnitude: f64,
}

/// Training report after model fit
#[derive(Debug, Clone)]
pub struct FitReport {
    pub epochs_trained: usize,
    pub best_validation_loss: f64,
}

/// A trainable mapping from a scaled `[sequence_length, features]` window to
/// a direction probability and a magnitude estimate.
pub trait SequencePredictor: Send + Sync {
    fn fit(&mut self, train: &SampleSet, validation: &SampleSet) -> Result<FitReport>;

    fn infer(&self, window: ArrayView2<f64>) -> Result<PredictorOutput>;

    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Weights {
    hidden_w: Array2<f64>,
    hidden_b: Array1<f64>,
    direction_w: Array1<f64>,
    direction_b: Array1<f64>,
    magnitude_w: Array1<f64>,
    magnitude_b: Array1<f64>,
}

impl Weights {
    fn init(input_size: usize, hidden: usize, rng: &mut StdRng) -> Self {
        let limit = (6.0 / (input_size + hidden) as f64).sqrt();
        let head_limit = (6.0 / (hidden + 1) as f64).sqrt();
        Self {
            hidden_w: Array2::from_shape_fn((hidden, input_size), |_| rng.gen_range(-limit..limit)),
            hidden_b: Array1::zeros(hidden),
            direction_w: Array1::from_shape_fn(hidden, |_| rng.gen_range(-head_limit..head_limit)),
            direction_b: Array1::zeros(1),
            magnitude_w: Array1::from_shape_fn(hidden, |_| rng.gen_range(-head_limit..head_limit)),
            magnitude_b: Array1::zeros(1),
        }
    }

    fn zeros_like(&self) -> Self {
        Self {
            hidden_w: Array2::zeros(self.hidden_w.raw_dim()),
            hidden_b: Array1::zeros(self.hidden_b.len()),
            direction_w: Array1::zeros(self.direction_w.len()),
            direction_b: Array1::zeros(1),
            magnitude_w: Array1::zeros(self.magnitude_w.len()),
            magnitude_b: Array1::zeros(1),
        }
    }
}

/// Forward-pass intermediates kept for backpropagation.
struct Activations {
    pre_hidden: Array2<f64>,
    hidden: Array2<f64>,
    probability: Array1<f64>,
    magnitude: Array1<f64>,
}

/// Dual-head network over the flattened window: a shared ReLU layer feeding a
/// sigmoid direction head and a linear magnitude head.
///
/// Loss is binary cross-entropy on direction plus a weighted Huber loss on
/// magnitude, with L2 on the shared layer. Trained with Adam on shuffled
/// mini-batches, early stopping on validation loss (best weights restored)
/// and a reduce-on-plateau learning-rate schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DualHeadPredictor {
    settings: TrainingSettings,
    sequence_length: usize,
    n_features: usize,
    weights: Option<Weights>,
}

impl DualHeadPredictor {
    pub fn new(settings: TrainingSettings, sequence_length: usize, n_features: usize) -> Self {
        Self {
            settings,
            sequence_length,
            n_features,
            weights: None,
        }
    }

    pub fn is_trained(&self) -> bool {
        self.weights.is_some()
    }

    fn input_size(&self) -> usize {
        self.sequence_length * self.n_features
    }

    fn flatten(&self, set: &SampleSet) -> Result<Array2<f64>> {
        let shape = set.x.shape();
        if shape[1] != self.sequence_length || shape[2] != self.n_features {
            return Err(ForecastError::Training(format!(
                "expected windows of {}x{}, got {}x{}",
                self.sequence_length, self.n_features, shape[1], shape[2]
            )));
        }
        set.x
            .to_owned()
            .into_shape_with_order((shape[0], self.input_size()))
            .map_err(|e| ForecastError::Training(e.to_string()))
    }

    fn forward(weights: &Weights, inputs: ArrayView2<f64>) -> Activations {
        let pre_hidden = inputs.dot(&weights.hidden_w.t()) + &weights.hidden_b;
        let hidden = pre_hidden.mapv(|v| v.max(0.0));
        let probability = (hidden.dot(&weights.direction_w) + weights.direction_b[0]).mapv(sigmoid);
        let magnitude = hidden.dot(&weights.magnitude_w) + weights.magnitude_b[0];
        Activations {
            pre_hidden,
            hidden,
            probability,
            magnitude,
        }
    }

    fn loss(&self, weights: &Weights, acts: &Activations, y_dir: &Array1<f64>, y_pct: &Array1<f64>) -> f64 {
        let n = y_dir.len().max(1) as f64;
        let bce: f64 = Zip::from(&acts.probability)
            .and(y_dir)
            .fold(0.0, |acc, &p, &y| {
                let p = p.clamp(1e-7, 1.0 - 1e-7);
                acc - (y * p.ln() + (1.0 - y) * (1.0 - p).ln())
            })
            / n;
        let huber_loss: f64 = Zip::from(&acts.magnitude)
            .and(y_pct)
            .fold(0.0, |acc, &m, &y| acc + huber(m - y, self.settings.huber_delta))
            / n;
        let l2 = self.settings.l2 * weights.hidden_w.mapv(|w| w * w).sum();
        bce + self.settings.magnitude_loss_weight * huber_loss + l2
    }

    fn gradients(&self, weights: &Weights, inputs: ArrayView2<f64>, y_dir: &Array1<f64>, y_pct: &Array1<f64>) -> Weights {
        let acts = Self::forward(weights, inputs);
        let n = y_dir.len().max(1) as f64;
        let delta = self.settings.huber_delta;

        let d_direction = (&acts.probability - y_dir) / n;
        let d_magnitude = Zip::from(&acts.magnitude)
            .and(y_pct)
            .map_collect(|&m, &y| self.settings.magnitude_loss_weight * huber_grad(m - y, delta) / n);

        let direction_w = acts.hidden.t().dot(&d_direction);
        let magnitude_w = acts.hidden.t().dot(&d_magnitude);

        let d_hidden = outer(&d_direction, &weights.direction_w) + outer(&d_magnitude, &weights.magnitude_w);
        let d_pre = d_hidden * acts.pre_hidden.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 });

        let hidden_w = d_pre.t().dot(&inputs) + &(&weights.hidden_w * (2.0 * self.settings.l2));
        let hidden_b = d_pre.sum_axis(Axis(0));

        Weights {
            hidden_w,
            hidden_b,
            direction_w,
            direction_b: Array1::from_elem(1, d_direction.sum()),
            magnitude_w,
            magnitude_b: Array1::from_elem(1, d_magnitude.sum()),
        }
    }
}

impl SequencePredictor for DualHeadPredictor {
    fn fit(&mut self, train: &SampleSet, validation: &SampleSet) -> Result<FitReport> {
        if train.is_empty() {
            return Err(ForecastError::InsufficientData { required: 1, available: 0 });
        }
        let train_x = self.flatten(train)?;
        let val_x = self.flatten(validation)?;
        // an empty validation split falls back to monitoring the training loss
        let (monitor_x, monitor_dir, monitor_pct) = if validation.is_empty() {
            (&train_x, &train.y_dir, &train.y_pct)
        } else {
            (&val_x, &validation.y_dir, &validation.y_pct)
        };

        let settings = self.settings.clone();
        let mut rng = StdRng::seed_from_u64(settings.seed);
        let mut weights = Weights::init(self.input_size(), settings.hidden_units, &mut rng);
        let mut adam = Adam::new(&weights);

        let mut learning_rate = settings.learning_rate;
        let mut best_loss = f64::INFINITY;
        let mut best_weights = weights.clone();
        let mut since_best = 0;
        let mut since_lr_drop = 0;
        let mut plateau_best = f64::INFINITY;
        let mut epochs_trained = 0;

        let mut order: Vec<usize> = (0..train.len()).collect();
        let batch_size = settings.batch_size.max(1);

        for epoch in 0..settings.epochs {
            order.shuffle(&mut rng);
            for batch in order.chunks(batch_size) {
                let xb = train_x.select(Axis(0), batch);
                let yb_dir = train.y_dir.select(Axis(0), batch);
                let yb_pct = train.y_pct.select(Axis(0), batch);
                let grads = self.gradients(&weights, xb.view(), &yb_dir, &yb_pct);
                adam.step(&mut weights, &grads, learning_rate);
            }
            epochs_trained = epoch + 1;

            let acts = Self::forward(&weights, monitor_x.view());
            let val_loss = self.loss(&weights, &acts, monitor_dir, monitor_pct);
            if !val_loss.is_finite() {
                return Err(ForecastError::Training(format!("loss diverged at epoch {}", epoch + 1)));
            }
            debug!("epoch {}: val_loss={:.5} lr={:.2e}", epoch + 1, val_loss, learning_rate);

            if val_loss < best_loss {
                best_loss = val_loss;
                best_weights = weights.clone();
                since_best = 0;
            } else {
                since_best += 1;
                if since_best >= settings.early_stopping_patience {
                    debug!("Early stopping after {} epochs", epoch + 1);
                    break;
                }
            }

            if val_loss < plateau_best {
                plateau_best = val_loss;
                since_lr_drop = 0;
            } else {
                since_lr_drop += 1;
                if since_lr_drop >= settings.lr_patience {
                    learning_rate = (learning_rate * settings.lr_factor).max(settings.min_learning_rate);
                    since_lr_drop = 0;
                }
            }
        }

        self.weights = Some(best_weights);
        info!(
            "Dual-head model trained: {} samples, {} epochs, best val_loss={:.5}",
            train.len(),
            epochs_trained,
            best_loss
        );

        Ok(FitReport {
            epochs_trained,
            best_validation_loss: best_loss,
        })
    }

    fn infer(&self, window: ArrayView2<f64>) -> Result<PredictorOutput> {
        let weights = self
            .weights
            .as_ref()
            .ok_or_else(|| ForecastError::Training("model has not been trained".to_string()))?;
        if window.dim() != (self.sequence_length, self.n_features) {
            return Err(ForecastError::Training(format!(
                "expected window {}x{}, got {}x{}",
                self.sequence_length,
                self.n_features,
                window.nrows(),
                window.ncols()
            )));
        }

        let flat = window
            .to_owned()
            .into_shape_with_order((1, self.input_size()))
            .map_err(|e| ForecastError::Training(e.to_string()))?;
        let acts = Self::forward(weights, flat.view());
        let output = PredictorOutput {
            direction_probability: acts.probability[0],
            magnitude: acts.magnitude[0],
        };

        if !output.direction_probability.is_finite() || !output.magnitude.is_finite() {
            return Err(ForecastError::Training("model produced a non-finite output".to_string()));
        }
        Ok(output)
    }

    fn name(&self) -> &str {
        "dual_head_mlp"
    }
}

/// Adam optimiser state mirroring the weight layout.
struct Adam {
    m: Weights,
    v: Weights,
    t: i32,
}

impl Adam {
    const BETA1: f64 = 0.9;
    const BETA2: f64 = 0.999;
    const EPS: f64 = 1e-7;

    fn new(weights: &Weights) -> Self {
        Self {
            m: weights.zeros_like(),
            v: weights.zeros_like(),
            t: 0,
        }
    }

    fn step(&mut self, weights: &mut Weights, grads: &Weights, lr: f64) {
        self.t += 1;
        let correction1 = 1.0 - Self::BETA1.powi(self.t);
        let correction2 = 1.0 - Self::BETA2.powi(self.t);
        let step_size = lr * correction2.sqrt() / correction1;

        adam_update(&mut weights.hidden_w, &grads.hidden_w, &mut self.m.hidden_w, &mut self.v.hidden_w, step_size);
        adam_update(&mut weights.hidden_b, &grads.hidden_b, &mut self.m.hidden_b, &mut self.v.hidden_b, step_size);
        adam_update(&mut weights.direction_w, &grads.direction_w, &mut self.m.direction_w, &mut self.v.direction_w, step_size);
        adam_update(&mut weights.direction_b, &grads.direction_b, &mut self.m.direction_b, &mut self.v.direction_b, step_size);
        adam_update(&mut weights.magnitude_w, &grads.magnitude_w, &mut self.m.magnitude_w, &mut self.v.magnitude_w, step_size);
        adam_update(&mut weights.magnitude_b, &grads.magnitude_b, &mut self.m.magnitude_b, &mut self.v.magnitude_b, step_size);
    }
}

fn adam_update<D: Dimension>(
    param: &mut ndarray::Array<f64, D>,
    grad: &ndarray::Array<f64, D>,
    m: &mut ndarray::Array<f64, D>,
    v: &mut ndarray::Array<f64, D>,
    step_size: f64,
) {
    Zip::from(param).and(grad).and(m).and(v).for_each(|p, &g, m, v| {
        *m = Adam::BETA1 * *m + (1.0 - Adam::BETA1) * g;
        *v = Adam::BETA2 * *v + (1.0 - Adam::BETA2) * g * g;
        *p -= step_size * *m / (v.sqrt() + Adam::EPS);
    });
}

fn outer(column: &Array1<f64>, row: &Array1<f64>) -> Array2<f64> {
    let col = column.view().insert_axis(Axis(1));
    let row = row.view().insert_axis(Axis(0));
    &col * &row
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

fn huber(residual: f64, delta: f64) -> f64 {
    let abs = residual.abs();
    if abs <= delta {
        0.5 * residual * residual
    } else {
        delta * (abs - 0.5 * delta)
    }
}

fn huber_grad(residual: f64, delta: f64) -> f64 {
    residual.clamp(-delta, delta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array3, Array1};

    fn settings(epochs: usize) -> TrainingSettings {
        TrainingSettings {
            epochs,
            hidden_units: 8,
            learning_rate: 0.01,
            ..TrainingSettings::default()
        }
    }

    /// Windows whose mean sign decides the label; magnitude tracks the mean.
    fn separable_set(n: usize, offset: usize) -> SampleSet {
        let mut x = Array3::<f64>::zeros((n, 4, 3));
        let mut y_dir = Array1::<f64>::zeros(n);
        let mut y_pct = Array1::<f64>::zeros(n);
        for i in 0..n {
            let sign = if (i + offset) % 2 == 0 { 1.0 } else { -1.0 };
            let level = sign * (0.5 + ((i * 37 + offset) % 10) as f64 / 10.0);
            for t in 0..4 {
                for f in 0..3 {
                    x[[i, t, f]] = level + 0.05 * (t as f64 - f as f64);
                }
            }
            y_dir[i] = if sign > 0.0 { 1.0 } else { 0.0 };
            y_pct[i] = level * 3.0;
        }
        SampleSet { x, y_dir, y_pct }
    }

    #[test]
    fn test_learns_separable_direction() {
        let train = separable_set(80, 0);
        let validation = separable_set(20, 1);
        let mut model = DualHeadPredictor::new(settings(60), 4, 3);

        let report = model.fit(&train, &validation).unwrap();
        assert!(report.epochs_trained >= 1 && report.epochs_trained <= 60);
        assert!(model.is_trained());

        let up = model.infer(validation.x.index_axis(Axis(0), 1)).unwrap();
        let down = model.infer(validation.x.index_axis(Axis(0), 0)).unwrap();
        assert_eq!(validation.y_dir[1], 1.0);
        assert!(up.direction_probability > 0.5);
        assert!(down.direction_probability < 0.5);
        assert!(up.magnitude > down.magnitude);
    }

    #[test]
    fn test_fit_is_deterministic_for_seed() {
        let train = separable_set(40, 0);
        let validation = separable_set(10, 1);
        let mut a = DualHeadPredictor::new(settings(5), 4, 3);
        let mut b = DualHeadPredictor::new(settings(5), 4, 3);
        a.fit(&train, &validation).unwrap();
        b.fit(&train, &validation).unwrap();

        let window = validation.x.index_axis(Axis(0), 3);
        assert_eq!(a.infer(window).unwrap(), b.infer(window).unwrap());
    }

    #[test]
    fn test_infer_requires_training_and_shape() {
        let model = DualHeadPredictor::new(settings(1), 4, 3);
        let window = Array2::<f64>::zeros((4, 3));
        assert!(model.infer(window.view()).is_err());

        let mut trained = model.clone();
        trained.fit(&separable_set(10, 0), &separable_set(4, 1)).unwrap();
        assert!(trained.infer(window.view()).is_ok());
        assert!(trained.infer(Array2::<f64>::zeros((5, 3)).view()).is_err());
    }

    #[test]
    fn test_json_round_trip_keeps_outputs() {
        let mut model = DualHeadPredictor::new(settings(3), 4, 3);
        let validation = separable_set(6, 1);
        model.fit(&separable_set(20, 0), &validation).unwrap();

        let json = serde_json::to_string(&model).unwrap();
        let restored: DualHeadPredictor = serde_json::from_str(&json).unwrap();
        let window = validation.x.index_axis(Axis(0), 2);
        assert_eq!(model.infer(window).unwrap(), restored.infer(window).unwrap());
    }

    #[test]
    fn test_huber_pieces() {
        assert_eq!(huber(0.5, 1.0), 0.125);
        assert_eq!(huber(-3.0, 1.0), 2.5);
        assert_eq!(huber_grad(-3.0, 1.0), -1.0);
        assert_eq!(huber_grad(0.25, 1.0), 0.25);
    }
}
