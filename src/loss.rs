//! Loss functions.
//!
//! A loss is evaluated on a whole minibatch at once:
//!
//! - the returned value is the mean over rows of the per-row loss
//! - the gradient written into the caller buffer is per element and *unscaled*
//!   (not divided by the number of rows), e.g. `pred - target` for `Square`
//!
//! Keeping the gradient unscaled is what lets hidden layers reuse the `Square`
//! loss on a pseudo-target to write their error signal in place.

use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Error, MatrixView, Result};

/// Predictions are clamped to `[PROB_EPS, 1 - PROB_EPS]` inside the log-based losses.
pub const PROB_EPS: f64 = 1e-15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
/// Supported loss functions.
pub enum Loss {
    /// Half squared error: `(p - t)^2 / 2` per element.
    Square,
    /// Log loss on the positive class only: `-t ln p` per element.
    Log,
    /// Binary cross-entropy: `-(t ln p + (1 - t) ln(1 - p))` per element.
    CrossEntropy,
}

impl Loss {
    /// The lookup name of this loss.
    pub fn name(self) -> &'static str {
        match self {
            Loss::Square => "square",
            Loss::Log => "log",
            Loss::CrossEntropy => "cross-entropy",
        }
    }

    /// Whether this loss expects probabilities, which forces a logistic output layer.
    #[inline]
    pub fn is_probabilistic(self) -> bool {
        matches!(self, Loss::Log | Loss::CrossEntropy)
    }

    /// The loss actually applied at an output layer of width `n_outputs`.
    ///
    /// A single-output `Log` head is a binary problem and uses `CrossEntropy`.
    #[inline]
    pub fn for_output_width(self, n_outputs: usize) -> Loss {
        if self == Loss::Log && n_outputs == 1 {
            Loss::CrossEntropy
        } else {
            self
        }
    }

    /// Per-element `(loss, dloss/dpred)`.
    #[inline]
    fn element(self, t: f64, p: f64) -> (f64, f64) {
        match self {
            Loss::Square => {
                let diff = p - t;
                (0.5 * diff * diff, diff)
            }
            Loss::Log => {
                let p = p.clamp(PROB_EPS, 1.0 - PROB_EPS);
                (-t * p.ln(), -t / p)
            }
            Loss::CrossEntropy => {
                let p = p.clamp(PROB_EPS, 1.0 - PROB_EPS);
                let value = -(t * p.ln() + (1.0 - t) * (1.0 - p).ln());
                (value, -t / p + (1.0 - t) / (1.0 - p))
            }
        }
    }

    /// Compute the loss and write `dloss/dpred` into `grad`.
    ///
    /// Shape contract:
    /// - `y_true.len() == grad.len() == y_pred.rows() * y_pred.cols()`
    ///   (both row-major with `y_pred.cols()` columns)
    pub fn evaluate(self, y_true: &[f64], y_pred: MatrixView<'_>, grad: &mut [f64]) -> f64 {
        let (rows, cols) = (y_pred.rows(), y_pred.cols());
        assert_eq!(
            y_true.len(),
            rows * cols,
            "target len {} does not match prediction shape {rows}x{cols}",
            y_true.len()
        );
        assert_eq!(
            grad.len(),
            rows * cols,
            "grad len {} does not match prediction shape {rows}x{cols}",
            grad.len()
        );

        if rows == 0 {
            return 0.0;
        }

        let mut sum = 0.0_f64;
        for r in 0..rows {
            let pred = y_pred.row(r);
            let start = r * cols;
            for c in 0..cols {
                let (value, g) = self.element(y_true[start + c], pred[c]);
                sum += value;
                grad[start + c] = g;
            }
        }
        sum / rows as f64
    }

    /// Compute only the loss value.
    pub fn value(self, y_true: MatrixView<'_>, y_pred: MatrixView<'_>) -> f64 {
        assert_eq!(
            (y_true.rows(), y_true.cols()),
            (y_pred.rows(), y_pred.cols()),
            "target shape does not match prediction shape"
        );

        if y_pred.rows() == 0 {
            return 0.0;
        }

        let mut sum = 0.0_f64;
        for r in 0..y_pred.rows() {
            for (&t, &p) in y_true.row(r).iter().zip(y_pred.row(r)) {
                sum += self.element(t, p).0;
            }
        }
        sum / y_pred.rows() as f64
    }
}

impl fmt::Display for Loss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Loss {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "square" => Ok(Loss::Square),
            "log" => Ok(Loss::Log),
            "cross-entropy" => Ok(Loss::CrossEntropy),
            other => Err(Error::InvalidConfig(format!(
                "unknown loss {other:?}; expected square, log or cross-entropy"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Matrix;
    use approx::assert_abs_diff_eq;

    #[test]
    fn square_is_half_mean_row_sum() {
        let pred = Matrix::from_flat(vec![1.0, 3.0, 0.0, 0.0], 2).unwrap();
        let target = [2.0, 1.0, 0.0, 0.0];
        let mut grad = [0.0; 4];
        let loss = Loss::Square.evaluate(&target, pred.view(), &mut grad);

        // Row sums: 0.5 * (1 + 4) and 0; mean over 2 rows.
        assert_abs_diff_eq!(loss, 1.25);
        assert_eq!(grad, [-1.0, 2.0, 0.0, 0.0]);
    }

    #[test]
    fn output_width_selects_cross_entropy_for_binary_log() {
        assert_eq!(Loss::Log.for_output_width(1), Loss::CrossEntropy);
        assert_eq!(Loss::Log.for_output_width(3), Loss::Log);
        assert_eq!(Loss::Square.for_output_width(1), Loss::Square);
    }

    #[test]
    fn cross_entropy_is_finite_at_saturated_predictions() {
        let pred = Matrix::from_flat(vec![1.0, 0.0], 1).unwrap();
        let target = [0.0, 1.0];
        let mut grad = [0.0; 2];
        let loss = Loss::CrossEntropy.evaluate(&target, pred.view(), &mut grad);
        assert!(loss.is_finite());
        assert!(grad.iter().all(|g| g.is_finite()));
    }

    #[test]
    fn cross_entropy_gradient_matches_finite_difference() {
        let h = 1e-7;
        for (t, p) in [(1.0, 0.3), (0.0, 0.8), (1.0, 0.95)] {
            let (_, analytic) = Loss::CrossEntropy.element(t, p);
            let numeric = (Loss::CrossEntropy.element(t, p + h).0
                - Loss::CrossEntropy.element(t, p - h).0)
                / (2.0 * h);
            assert_abs_diff_eq!(analytic, numeric, epsilon = 1e-5);
        }
    }

    #[test]
    fn value_matches_evaluate() {
        let pred = Matrix::from_flat(vec![0.2, 0.7, 0.9], 1).unwrap();
        let target = Matrix::from_flat(vec![0.0, 1.0, 1.0], 1).unwrap();
        let mut grad = [0.0; 3];
        for loss in [Loss::Square, Loss::Log, Loss::CrossEntropy] {
            let a = loss.evaluate(target.as_slice(), pred.view(), &mut grad);
            let b = loss.value(target.view(), pred.view());
            assert_abs_diff_eq!(a, b);
        }
    }

    #[test]
    fn unknown_name_is_a_config_error() {
        assert!(matches!(
            "hinge".parse::<Loss>(),
            Err(Error::InvalidConfig(_))
        ));
        assert_eq!(
            "cross-entropy".parse::<Loss>().unwrap(),
            Loss::CrossEntropy
        );
    }
}
