//! Elastic-net weight penalty and gradient clipping.
//!
//! Both operate on one layer's window of the flat parameter/gradient arenas.
//! A window is the row-major `(inputs + 1, outputs)` weight matrix whose first
//! `outputs` values are the bias row. The bias row is never penalized.

use tracing::trace;

/// Elastic-net penalty `alpha * (l1_ratio * L1 + (1 - l1_ratio) * L2)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Penalty {
    pub alpha: f64,
    /// `0.0` is pure L2 (ridge), `1.0` pure L1 (lasso).
    pub l1_ratio: f64,
}

impl Penalty {
    /// Add the penalty gradient to `grad` and return the penalty value.
    ///
    /// `n_samples` is the size of the full training set, not the minibatch.
    /// With `alpha <= 0` nothing is read or written and the result is `0.0`.
    pub fn apply(&self, weights: &[f64], grad: &mut [f64], outputs: usize, n_samples: usize) -> f64 {
        assert_eq!(
            weights.len(),
            grad.len(),
            "weights len {} does not match grad len {}",
            weights.len(),
            grad.len()
        );
        assert!(outputs <= weights.len(), "bias row wider than the window");

        if self.alpha <= 0.0 {
            return 0.0;
        }

        let n = n_samples as f64;
        let w_reg = &weights[outputs..];
        let g_reg = &mut grad[outputs..];
        let mut penalty = 0.0_f64;

        if self.l1_ratio > 0.0 {
            let scale = self.alpha * self.l1_ratio / n;
            let mut abs_sum = 0.0_f64;
            for (g, &w) in g_reg.iter_mut().zip(w_reg) {
                abs_sum += w.abs();
                *g += scale * sign(w);
            }
            penalty += scale * abs_sum;
        }

        if self.l1_ratio < 1.0 {
            let scale = self.alpha * (1.0 - self.l1_ratio) / n;
            let mut sq_sum = 0.0_f64;
            for (g, &w) in g_reg.iter_mut().zip(w_reg) {
                sq_sum = w.mul_add(w, sq_sum);
                *g = scale.mul_add(w, *g);
            }
            penalty += 0.5 * scale * sq_sum;
        }

        penalty
    }
}

/// Rescale `grad` so that its L2 norm is at most `threshold`.
///
/// Returns `true` when the gradient was rescaled. A non-positive threshold
/// disables clipping.
pub fn clip_by_norm(grad: &mut [f64], threshold: f64) -> bool {
    if threshold <= 0.0 {
        return false;
    }

    let norm = l2_norm(grad);
    if norm <= threshold {
        return false;
    }

    let scale = threshold / norm;
    for g in grad.iter_mut() {
        *g *= scale;
    }
    trace!(norm, threshold, "clipped layer gradient");
    true
}

#[inline]
pub(crate) fn l2_norm(values: &[f64]) -> f64 {
    values.iter().fold(0.0_f64, |acc, &v| v.mul_add(v, acc)).sqrt()
}

#[inline]
fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}
