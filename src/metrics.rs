//! Metrics.
//!
//! Metrics are evaluation helpers (they do not participate in backprop). They are
//! used by `score` on the estimators and can be called directly on any pair of
//! equally shaped matrices.

use crate::MatrixView;

/// Coefficient of determination, averaged uniformly over output columns.
///
/// A column whose targets are constant scores `1.0` when predicted exactly and
/// `0.0` otherwise.
///
/// Shape contract (panics on violation): `y_true` and `y_pred` have the same shape.
pub fn r2_score(y_true: MatrixView<'_>, y_pred: MatrixView<'_>) -> f64 {
    assert_shapes_match(y_true, y_pred);
    let (rows, cols) = (y_true.rows(), y_true.cols());
    if rows == 0 || cols == 0 {
        return 0.0;
    }

    let mut total = 0.0_f64;
    for c in 0..cols {
        let mean = (0..rows).map(|r| y_true.get(r, c)).sum::<f64>() / rows as f64;

        let mut ss_res = 0.0_f64;
        let mut ss_tot = 0.0_f64;
        for r in 0..rows {
            let t = y_true.get(r, c);
            let res = t - y_pred.get(r, c);
            let dev = t - mean;
            ss_res += res * res;
            ss_tot += dev * dev;
        }

        total += if ss_tot > 0.0 {
            1.0 - ss_res / ss_tot
        } else if ss_res == 0.0 {
            1.0
        } else {
            0.0
        };
    }
    total / cols as f64
}

/// Fraction of rows whose predicted labels all equal the true labels.
///
/// Shape contract (panics on violation): `y_true` and `y_pred` have the same shape.
pub fn accuracy_score(y_true: MatrixView<'_>, y_pred: MatrixView<'_>) -> f64 {
    assert_shapes_match(y_true, y_pred);
    if y_true.rows() == 0 {
        return 0.0;
    }

    let hits = (0..y_true.rows())
        .filter(|&r| y_true.row(r) == y_pred.row(r))
        .count();
    hits as f64 / y_true.rows() as f64
}

fn assert_shapes_match(y_true: MatrixView<'_>, y_pred: MatrixView<'_>) {
    assert_eq!(
        (y_true.rows(), y_true.cols()),
        (y_pred.rows(), y_pred.cols()),
        "y_true is {}x{}, y_pred is {}x{}",
        y_true.rows(),
        y_true.cols(),
        y_pred.rows(),
        y_pred.cols()
    );
}
