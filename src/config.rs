//! Estimator configuration.
//!
//! `MlpConfig` holds every user-facing knob of a regressor or classifier. It is
//! plain data: construct it with `MlpConfig::new`, tweak the public fields, and
//! the estimator validates it when `fit` starts.

use rand::Rng;
use rand_distr::{Distribution, Normal, StandardNormal, Uniform};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Activation, Error, Loss, Result, Solver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
/// Weight initializer.
pub enum Init {
    /// Independent `N(0, 1)` draws for every weight, bias row included.
    #[default]
    StandardNormal,
    /// Xavier/Glorot uniform: `U(-a, a)`, `a = sqrt(6 / (fan_in + fan_out))`.
    Xavier,
    /// He/Kaiming normal: `N(0, 2 / fan_in)`.
    He,
}

impl Init {
    /// Fill a `(fan_in + 1, fan_out)` weight window.
    pub(crate) fn fill<R: Rng + ?Sized>(
        self,
        weights: &mut [f64],
        fan_in: usize,
        fan_out: usize,
        rng: &mut R,
    ) -> Result<()> {
        match self {
            Init::StandardNormal => {
                for w in weights.iter_mut() {
                    *w = StandardNormal.sample(rng);
                }
            }
            Init::Xavier => {
                let limit = (6.0 / (fan_in + fan_out) as f64).sqrt();
                let dist = Uniform::new_inclusive(-limit, limit);
                for w in weights.iter_mut() {
                    *w = dist.sample(rng);
                }
            }
            Init::He => {
                let std = (2.0 / fan_in as f64).sqrt();
                let dist = Normal::new(0.0, std)
                    .map_err(|e| Error::InvalidConfig(format!("invalid He init std {std}: {e}")))?;
                for w in weights.iter_mut() {
                    *w = dist.sample(rng);
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(from = "ConfigRepr"))]
/// Configuration shared by `MlpRegressor` and `MlpClassifier`.
pub struct MlpConfig {
    /// Widths of the hidden layers, input side first. May be empty.
    pub hidden_layer_sizes: Vec<usize>,
    /// Activation of the hidden layers (and of the output layer for `Square` loss).
    pub activation: Activation,
    pub solver: Solver,
    /// Regularization strength; `0.0` disables the penalty.
    pub alpha: f64,
    /// Elastic-net mix in `[0, 1]`: `0.0` is ridge, `1.0` is lasso.
    pub l1_ratio: f64,
    /// Per-layer gradient norm threshold; `0.0` disables clipping.
    pub gradient_clipping: f64,
    /// Number of epochs; `0` means `ceil(1_000_000 / n_samples)`.
    pub epochs: usize,
    /// Minibatch size; `0` means `min(n_samples, 200)`.
    pub mini_batch_size: usize,
    pub loss: Loss,
    /// Jointly shuffle the training rows before every epoch.
    pub shuffle: bool,
    pub init: Init,
    /// Seed for initialization and shuffling; `None` seeds from entropy.
    pub seed: Option<u64>,
    /// Fail with `Error::NonFinite` on the first NaN/Inf produced while training.
    pub check_finite: bool,
}

impl Default for MlpConfig {
    fn default() -> Self {
        Self::new(vec![100], Activation::ReLU, Solver::default(), 0.0)
    }
}

impl MlpConfig {
    /// Configuration with the estimator defaults.
    ///
    /// The loss defaults to `Square` for an identity activation and to `Log`
    /// otherwise.
    pub fn new(
        hidden_layer_sizes: Vec<usize>,
        activation: Activation,
        solver: Solver,
        alpha: f64,
    ) -> Self {
        Self {
            hidden_layer_sizes,
            activation,
            solver,
            alpha,
            l1_ratio: 0.0,
            gradient_clipping: 0.0,
            epochs: 0,
            mini_batch_size: 0,
            loss: default_loss(activation),
            shuffle: true,
            init: Init::default(),
            seed: None,
            check_finite: false,
        }
    }

    /// Validate every field.
    pub fn validate(&self) -> Result<()> {
        if let Some(idx) = self.hidden_layer_sizes.iter().position(|&n| n == 0) {
            return Err(Error::InvalidConfig(format!(
                "hidden layer {idx} must have at least one unit"
            )));
        }
        if !(self.alpha.is_finite() && self.alpha >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "alpha must be finite and >= 0, got {}",
                self.alpha
            )));
        }
        if !(self.l1_ratio.is_finite() && (0.0..=1.0).contains(&self.l1_ratio)) {
            return Err(Error::InvalidConfig(format!(
                "l1_ratio must be in [0,1], got {}",
                self.l1_ratio
            )));
        }
        if !(self.gradient_clipping.is_finite() && self.gradient_clipping >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "gradient_clipping must be finite and >= 0, got {}",
                self.gradient_clipping
            )));
        }
        self.solver.validate()
    }

    /// Number of epochs a fit on `n_samples` rows runs.
    pub fn effective_epochs(&self, n_samples: usize) -> usize {
        if self.epochs > 0 {
            self.epochs
        } else {
            1_000_000_usize.div_ceil(n_samples.max(1))
        }
    }

    /// Minibatch size used for a fit on `n_samples` rows.
    pub fn effective_batch_size(&self, n_samples: usize) -> usize {
        match self.mini_batch_size {
            0 => n_samples.min(200),
            m if m <= n_samples => m,
            _ => n_samples,
        }
    }

    /// Parse a configuration from JSON. Missing fields take their defaults; a
    /// missing `loss` follows `activation` the same way `MlpConfig::new` does.
    #[cfg(feature = "serde")]
    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(s)
            .map_err(|e| Error::InvalidConfig(format!("failed to parse config json: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }
}

fn default_loss(activation: Activation) -> Loss {
    if activation == Activation::Identity {
        Loss::Square
    } else {
        Loss::Log
    }
}

/// Wire form of `MlpConfig`: every field optional, `loss` resolved after the
/// activation is known.
#[cfg(feature = "serde")]
#[derive(Deserialize)]
#[serde(default)]
struct ConfigRepr {
    hidden_layer_sizes: Vec<usize>,
    activation: Activation,
    solver: Solver,
    alpha: f64,
    l1_ratio: f64,
    gradient_clipping: f64,
    epochs: usize,
    mini_batch_size: usize,
    loss: Option<Loss>,
    shuffle: bool,
    init: Init,
    seed: Option<u64>,
    check_finite: bool,
}

#[cfg(feature = "serde")]
impl Default for ConfigRepr {
    fn default() -> Self {
        let d = MlpConfig::default();
        Self {
            hidden_layer_sizes: d.hidden_layer_sizes,
            activation: d.activation,
            solver: d.solver,
            alpha: d.alpha,
            l1_ratio: d.l1_ratio,
            gradient_clipping: d.gradient_clipping,
            epochs: d.epochs,
            mini_batch_size: d.mini_batch_size,
            loss: None,
            shuffle: d.shuffle,
            init: d.init,
            seed: d.seed,
            check_finite: d.check_finite,
        }
    }
}

#[cfg(feature = "serde")]
impl From<ConfigRepr> for MlpConfig {
    fn from(r: ConfigRepr) -> Self {
        Self {
            loss: r.loss.unwrap_or_else(|| default_loss(r.activation)),
            hidden_layer_sizes: r.hidden_layer_sizes,
            activation: r.activation,
            solver: r.solver,
            alpha: r.alpha,
            l1_ratio: r.l1_ratio,
            gradient_clipping: r.gradient_clipping,
            epochs: r.epochs,
            mini_batch_size: r.mini_batch_size,
            shuffle: r.shuffle,
            init: r.init,
            seed: r.seed,
            check_finite: r.check_finite,
        }
    }
}
