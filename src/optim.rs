//! Optimizers.
//!
//! A `Solver` describes an update rule and its hyperparameters. Each layer gets its
//! own `OptimizerState`, sized to that layer's parameter window, which turns a
//! gradient buffer into an update buffer of identical shape.
//!
//! Design notes:
//! - Updates are *added* to the weights, so every rule emits `-lr * direction`.
//! - State (momentum, running averages) persists inside the layer's state across
//!   minibatches and epochs; it is allocated once per fit.

use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
/// Update rule choice for training.
pub enum Solver {
    /// Gradient descent, optionally with (Nesterov) momentum.
    Sgd {
        lr: f64,
        momentum: f64,
        nesterov: bool,
    },
    /// Adagrad: per-parameter step shrinks with the accumulated squared gradient.
    Adagrad { lr: f64, eps: f64 },
    /// RMSProp: step scaled by a running average of squared gradients.
    #[cfg_attr(feature = "serde", serde(rename = "rmsprop"))]
    RmsProp { lr: f64, gamma: f64, eps: f64 },
    /// AdaDelta: unit-corrected RMSProp without a learning rate.
    #[cfg_attr(feature = "serde", serde(rename = "adadelta"))]
    AdaDelta { gamma: f64, eps: f64 },
    /// Adam (bias-corrected).
    Adam {
        lr: f64,
        beta1: f64,
        beta2: f64,
        eps: f64,
    },
}

impl Default for Solver {
    fn default() -> Self {
        Solver::adam()
    }
}

impl Solver {
    /// Plain gradient descent.
    pub fn sgd(lr: f64) -> Self {
        Solver::Sgd {
            lr,
            momentum: 0.0,
            nesterov: false,
        }
    }

    /// Accelerated (Nesterov momentum) gradient descent.
    pub fn agd() -> Self {
        Solver::Sgd {
            lr: 1e-3,
            momentum: 0.9,
            nesterov: true,
        }
    }

    pub fn adagrad() -> Self {
        Solver::Adagrad { lr: 1e-2, eps: 1e-8 }
    }

    pub fn rmsprop() -> Self {
        Solver::RmsProp {
            lr: 1e-3,
            gamma: 0.9,
            eps: 1e-8,
        }
    }

    pub fn adadelta() -> Self {
        Solver::AdaDelta {
            gamma: 0.95,
            eps: 1e-6,
        }
    }

    pub fn adam() -> Self {
        Solver::Adam {
            lr: 1e-3,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
        }
    }

    /// Replace the learning rate. `AdaDelta` has none and is returned unchanged.
    pub fn with_lr(self, new_lr: f64) -> Self {
        match self {
            Solver::Sgd {
                momentum, nesterov, ..
            } => Solver::Sgd {
                lr: new_lr,
                momentum,
                nesterov,
            },
            Solver::Adagrad { eps, .. } => Solver::Adagrad { lr: new_lr, eps },
            Solver::RmsProp { gamma, eps, .. } => Solver::RmsProp {
                lr: new_lr,
                gamma,
                eps,
            },
            Solver::AdaDelta { .. } => self,
            Solver::Adam {
                beta1, beta2, eps, ..
            } => Solver::Adam {
                lr: new_lr,
                beta1,
                beta2,
                eps,
            },
        }
    }

    /// Validate solver hyperparameters.
    pub fn validate(self) -> Result<()> {
        match self {
            Solver::Sgd { lr, momentum, .. } => {
                check_lr(lr)?;
                check_unit_interval("momentum", momentum)
            }
            Solver::Adagrad { lr, eps } => {
                check_lr(lr)?;
                check_positive("adagrad eps", eps)
            }
            Solver::RmsProp { lr, gamma, eps } => {
                check_lr(lr)?;
                check_unit_interval("rmsprop gamma", gamma)?;
                check_positive("rmsprop eps", eps)
            }
            Solver::AdaDelta { gamma, eps } => {
                check_unit_interval("adadelta gamma", gamma)?;
                check_positive("adadelta eps", eps)
            }
            Solver::Adam {
                lr,
                beta1,
                beta2,
                eps,
            } => {
                check_lr(lr)?;
                check_unit_interval("adam beta1", beta1)?;
                check_unit_interval("adam beta2", beta2)?;
                check_positive("adam eps", eps)
            }
        }
    }

    /// Allocate zeroed state for a parameter window of `len` values.
    pub fn state(self, len: usize) -> Result<OptimizerState> {
        self.validate()?;

        let state = match self {
            Solver::Sgd { lr, momentum, nesterov } => OptimizerState::Sgd {
                lr,
                momentum,
                nesterov,
                velocity: if momentum > 0.0 { vec![0.0; len] } else { Vec::new() },
            },
            Solver::Adagrad { lr, eps } => OptimizerState::Adagrad {
                lr,
                eps,
                sum_sq: vec![0.0; len],
            },
            Solver::RmsProp { lr, gamma, eps } => OptimizerState::RmsProp {
                lr,
                gamma,
                eps,
                mean_sq: vec![0.0; len],
            },
            Solver::AdaDelta { gamma, eps } => OptimizerState::AdaDelta {
                gamma,
                eps,
                mean_sq_grad: vec![0.0; len],
                mean_sq_update: vec![0.0; len],
            },
            Solver::Adam {
                lr,
                beta1,
                beta2,
                eps,
            } => OptimizerState::Adam {
                lr,
                beta1,
                beta2,
                eps,
                beta1_pow: 1.0,
                beta2_pow: 1.0,
                m: vec![0.0; len],
                v: vec![0.0; len],
            },
        };
        Ok(state)
    }
}

impl FromStr for Solver {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sgd" => Ok(Solver::sgd(1e-3)),
            "agd" => Ok(Solver::agd()),
            "adagrad" => Ok(Solver::adagrad()),
            "rmsprop" => Ok(Solver::rmsprop()),
            "adadelta" => Ok(Solver::adadelta()),
            "adam" => Ok(Solver::adam()),
            other => Err(Error::InvalidConfig(format!(
                "unknown solver {other:?}; expected sgd, agd, adagrad, rmsprop, adadelta or adam"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
/// Owned per-layer optimizer state.
pub enum OptimizerState {
    Sgd {
        lr: f64,
        momentum: f64,
        nesterov: bool,
        velocity: Vec<f64>,
    },
    Adagrad {
        lr: f64,
        eps: f64,
        sum_sq: Vec<f64>,
    },
    RmsProp {
        lr: f64,
        gamma: f64,
        eps: f64,
        mean_sq: Vec<f64>,
    },
    AdaDelta {
        gamma: f64,
        eps: f64,
        mean_sq_grad: Vec<f64>,
        mean_sq_update: Vec<f64>,
    },
    Adam {
        lr: f64,
        beta1: f64,
        beta2: f64,
        eps: f64,
        beta1_pow: f64,
        beta2_pow: f64,
        m: Vec<f64>,
        v: Vec<f64>,
    },
}

impl OptimizerState {
    /// Turn `grad` into a parameter delta written to `update` (overwrite semantics).
    ///
    /// Shape contract: `grad.len() == update.len()` == the window size the state
    /// was allocated for.
    pub fn get_update(&mut self, grad: &[f64], update: &mut [f64]) {
        assert_eq!(
            grad.len(),
            update.len(),
            "grad len {} does not match update len {}",
            grad.len(),
            update.len()
        );

        match self {
            OptimizerState::Sgd {
                lr,
                momentum,
                nesterov,
                velocity,
            } => {
                if *momentum > 0.0 {
                    debug_assert_eq!(velocity.len(), grad.len());
                    for i in 0..grad.len() {
                        let step = -*lr * grad[i];
                        velocity[i] = *momentum * velocity[i] + step;
                        update[i] = if *nesterov {
                            *momentum * velocity[i] + step
                        } else {
                            velocity[i]
                        };
                    }
                } else {
                    for (u, &g) in update.iter_mut().zip(grad) {
                        *u = -*lr * g;
                    }
                }
            }
            OptimizerState::Adagrad { lr, eps, sum_sq } => {
                debug_assert_eq!(sum_sq.len(), grad.len());
                for i in 0..grad.len() {
                    let g = grad[i];
                    sum_sq[i] += g * g;
                    update[i] = -*lr * g / (sum_sq[i].sqrt() + *eps);
                }
            }
            OptimizerState::RmsProp {
                lr,
                gamma,
                eps,
                mean_sq,
            } => {
                debug_assert_eq!(mean_sq.len(), grad.len());
                for i in 0..grad.len() {
                    let g = grad[i];
                    mean_sq[i] = *gamma * mean_sq[i] + (1.0 - *gamma) * g * g;
                    update[i] = -*lr * g / (mean_sq[i].sqrt() + *eps);
                }
            }
            OptimizerState::AdaDelta {
                gamma,
                eps,
                mean_sq_grad,
                mean_sq_update,
            } => {
                debug_assert_eq!(mean_sq_grad.len(), grad.len());
                for i in 0..grad.len() {
                    let g = grad[i];
                    mean_sq_grad[i] = *gamma * mean_sq_grad[i] + (1.0 - *gamma) * g * g;
                    let delta =
                        -((mean_sq_update[i] + *eps).sqrt() / (mean_sq_grad[i] + *eps).sqrt()) * g;
                    mean_sq_update[i] =
                        *gamma * mean_sq_update[i] + (1.0 - *gamma) * delta * delta;
                    update[i] = delta;
                }
            }
            OptimizerState::Adam {
                lr,
                beta1,
                beta2,
                eps,
                beta1_pow,
                beta2_pow,
                m,
                v,
            } => {
                debug_assert_eq!(m.len(), grad.len());
                *beta1_pow *= *beta1;
                *beta2_pow *= *beta2;

                let corr1 = 1.0 - *beta1_pow;
                let corr2 = 1.0 - *beta2_pow;

                for i in 0..grad.len() {
                    let g = grad[i];
                    m[i] = *beta1 * m[i] + (1.0 - *beta1) * g;
                    v[i] = *beta2 * v[i] + (1.0 - *beta2) * g * g;

                    let m_hat = m[i] / corr1;
                    let v_hat = v[i] / corr2;
                    update[i] = -*lr * m_hat / (v_hat.sqrt() + *eps);
                }
            }
        }
    }
}

fn check_lr(lr: f64) -> Result<()> {
    if !(lr.is_finite() && lr > 0.0) {
        return Err(Error::InvalidConfig(format!(
            "learning rate must be finite and > 0, got {lr}"
        )));
    }
    Ok(())
}

fn check_unit_interval(name: &str, value: f64) -> Result<()> {
    if !(value.is_finite() && (0.0..1.0).contains(&value)) {
        return Err(Error::InvalidConfig(format!(
            "{name} must be finite and in [0,1), got {value}"
        )));
    }
    Ok(())
}

fn check_positive(name: &str, value: f64) -> Result<()> {
    if !(value.is_finite() && value > 0.0) {
        return Err(Error::InvalidConfig(format!(
            "{name} must be finite and > 0, got {value}"
        )));
    }
    Ok(())
}
