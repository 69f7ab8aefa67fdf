use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::warn;

use crate::regularization::{Penalty, clip_by_norm, l2_norm};
use crate::{Activation, Error, Layer, Loss, Matrix, MatrixView, MlpConfig, Result};

/// A stack of dense layers backed by three flat arenas.
///
/// `params`, `grads` and `updates` each hold every layer's `(inputs + 1, outputs)`
/// matrix back to back; `Layer::span()` is a layer's window into all three.
#[derive(Debug, Clone)]
pub struct Mlp {
    n_features: usize,
    layers: Vec<Layer>,
    params: Vec<f64>,
    grads: Vec<f64>,
    updates: Vec<f64>,

    loss: Loss,
    penalty: Penalty,
    gradient_clipping: f64,
    check_finite: bool,
}

impl Mlp {
    pub fn new_with_seed(
        config: &MlpConfig,
        n_features: usize,
        n_outputs: usize,
        seed: u64,
    ) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::new_with_rng(config, n_features, n_outputs, &mut rng)
    }

    /// Allocate a network for `n_features -> hidden... -> n_outputs` and draw its
    /// weights with `config.init` from `rng`.
    ///
    /// The output layer uses a logistic activation when the loss expects
    /// probabilities and `config.activation` otherwise.
    pub fn new_with_rng<R: Rng + ?Sized>(
        config: &MlpConfig,
        n_features: usize,
        n_outputs: usize,
        rng: &mut R,
    ) -> Result<Self> {
        let mut mlp = Self::allocate(config, n_features, n_outputs)?;
        for layer in &mlp.layers {
            config.init.fill(
                &mut mlp.params[layer.span()],
                layer.inputs(),
                layer.outputs(),
                rng,
            )?;
        }
        Ok(mlp)
    }

    /// Allocate a zero-initialized network.
    pub(crate) fn allocate(config: &MlpConfig, n_features: usize, n_outputs: usize) -> Result<Self> {
        config.validate()?;
        if n_features == 0 {
            return Err(Error::InvalidShape("n_features must be > 0".to_owned()));
        }
        if n_outputs == 0 {
            return Err(Error::InvalidShape("n_outputs must be > 0".to_owned()));
        }

        let output_activation = if config.loss.is_probabilistic() {
            Activation::Logistic
        } else {
            config.activation
        };

        let widths = config
            .hidden_layer_sizes
            .iter()
            .map(|&w| (w, config.activation))
            .chain(std::iter::once((n_outputs, output_activation)));

        let mut layers = Vec::with_capacity(config.hidden_layer_sizes.len() + 1);
        let mut offset = 0;
        let mut prev = n_features;
        for (outputs, activation) in widths {
            let len = (prev + 1) * outputs;
            let optimizer = config.solver.state(len)?;
            layers.push(Layer::new(prev, outputs, activation, offset, optimizer));
            offset += len;
            prev = outputs;
        }

        Ok(Self {
            n_features,
            layers,
            params: vec![0.0; offset],
            grads: vec![0.0; offset],
            updates: vec![0.0; offset],
            loss: config.loss,
            penalty: Penalty {
                alpha: config.alpha,
                l1_ratio: config.l1_ratio,
            },
            gradient_clipping: config.gradient_clipping,
            check_finite: config.check_finite,
        })
    }

    #[inline]
    pub fn input_dim(&self) -> usize {
        self.n_features
    }

    #[inline]
    pub fn output_dim(&self) -> usize {
        self.layers.last().map_or(0, Layer::outputs)
    }

    #[inline]
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    #[inline]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    #[inline]
    pub fn layer(&self, idx: usize) -> Option<&Layer> {
        self.layers.get(idx)
    }

    /// The configured loss (before the binary `Log` -> `CrossEntropy` substitution).
    #[inline]
    pub fn loss(&self) -> Loss {
        self.loss
    }

    #[inline]
    pub fn num_params(&self) -> usize {
        self.params.len()
    }

    /// Every layer's weights, back to back.
    #[inline]
    pub fn params(&self) -> &[f64] {
        &self.params
    }

    #[inline]
    pub fn params_mut(&mut self) -> &mut [f64] {
        &mut self.params
    }

    /// Every layer's gradient from the last backward pass, back to back.
    #[inline]
    pub fn gradients(&self) -> &[f64] {
        &self.grads
    }

    /// Global L2 norm over all layer gradients.
    pub fn gradient_norm(&self) -> f64 {
        l2_norm(&self.grads)
    }

    /// Weights of layer `idx` as a `(inputs + 1, outputs)` view, bias row first.
    pub fn weights(&self, idx: usize) -> MatrixView<'_> {
        let layer = &self.layers[idx];
        let (rows, cols) = layer.weight_shape();
        MatrixView::new(&self.params[layer.span()], rows, cols, cols)
    }

    /// Output of the most recent forward pass.
    pub fn output(&self) -> MatrixView<'_> {
        self.layers
            .last()
            .expect("mlp must have at least one layer")
            .prediction()
    }

    /// Forward pass over a minibatch.
    ///
    /// Fills every layer's pre-activation and prediction buffers in input-to-output
    /// order and returns the output layer's prediction. When `logits` is given, the
    /// output layer's pre-activation is copied into it.
    ///
    /// Shape contract (panics on violation):
    /// - `x.cols() == self.input_dim()` and `x.rows() > 0`
    pub fn forward(
        &mut self,
        x: MatrixView<'_>,
        logits: Option<&mut Matrix>,
    ) -> Result<MatrixView<'_>> {
        assert_eq!(
            x.cols(),
            self.n_features,
            "input has {} features, model expects {}",
            x.cols(),
            self.n_features
        );
        assert!(x.rows() > 0, "forward requires at least one row");

        let batch = x.rows();
        for idx in 0..self.layers.len() {
            let (done, rest) = self.layers.split_at_mut(idx);
            let layer = &mut rest[0];
            let span = layer.span();

            layer.initialize_for(batch);
            let input = if idx == 0 {
                x
            } else {
                done[idx - 1].prediction()
            };
            layer.forward(input, &self.params[span]);

            ensure_finite(self.check_finite, "pre-activation", idx, layer.z_buf())?;
            ensure_finite(self.check_finite, "prediction", idx, layer.output_buf())?;
        }

        if let Some(z) = logits {
            let last = self.layers.last().expect("mlp must have at least one layer");
            z.copy_from_view(last.pre_activation());
        }

        Ok(self.output())
    }

    /// Backward pass without the parameter update.
    ///
    /// You must call `forward` first with the same `x`. Walks the layers from output
    /// to input and fills every layer's window of the gradient arena with
    /// `dJ/dW`, including the elastic-net penalty and clipping. Weights are not
    /// touched, so the error signal of layer `l` is propagated through layer
    /// `l + 1`'s current weights.
    ///
    /// `n_samples` is the size of the full training set: the data loss is scaled
    /// by `x.rows() / n_samples` so minibatch losses of an epoch sum to the epoch
    /// loss, and the penalty is normalized by it.
    ///
    /// Returns the minibatch loss `J`.
    pub fn compute_gradients(
        &mut self,
        x: MatrixView<'_>,
        y: MatrixView<'_>,
        n_samples: usize,
    ) -> Result<f64> {
        let batch = x.rows();
        assert_eq!(
            y.rows(),
            batch,
            "targets have {} rows, inputs have {batch}",
            y.rows()
        );
        assert!(n_samples >= batch, "n_samples {n_samples} < batch {batch}");

        let fraction = batch as f64 / n_samples as f64;
        let last = self.layers.len() - 1;
        let output_loss = self.loss.for_output_width(self.output_dim());
        let mut j = 0.0_f64;

        for idx in (0..=last).rev() {
            let (lower, upper) = self.layers.split_at_mut(idx);
            let layer = &mut upper[0];
            let span = layer.span();
            assert_eq!(
                layer.batch_size(),
                batch,
                "forward must run on the same minibatch before backward"
            );

            if idx == last {
                j = layer.output_delta(y, output_loss) * fraction;
            } else {
                layer.hidden_delta();
            }
            layer.fold_activation_gradient();
            ensure_finite(self.check_finite, "delta", idx, layer.delta_buf())?;

            let grad = &mut self.grads[span.clone()];
            let input = if idx == 0 {
                x
            } else {
                lower[idx - 1].prediction()
            };
            layer.weight_gradient(input, grad);

            if idx > 0 {
                layer.backpropagate_into(&self.params[span.clone()], lower[idx - 1].delta_mut());
            }

            j += self
                .penalty
                .apply(&self.params[span], grad, layer.outputs(), n_samples);
            clip_by_norm(grad, self.gradient_clipping);
            ensure_finite(self.check_finite, "gradient", idx, grad)?;
        }

        Ok(j)
    }

    /// Let every layer's optimizer turn its gradient into an update and add it to
    /// the weights.
    pub fn apply_updates(&mut self) -> Result<()> {
        for (idx, layer) in self.layers.iter_mut().enumerate() {
            let span = layer.span();
            layer.step(
                &self.grads[span.clone()],
                &mut self.updates[span.clone()],
                &mut self.params[span.clone()],
            );
            ensure_finite(self.check_finite, "update", idx, &self.updates[span])?;
        }
        Ok(())
    }

    /// One training step on the minibatch last passed to `forward`:
    /// `compute_gradients` followed by `apply_updates`.
    pub fn backward(
        &mut self,
        x: MatrixView<'_>,
        y: MatrixView<'_>,
        n_samples: usize,
    ) -> Result<f64> {
        let j = self.compute_gradients(x, y, n_samples)?;
        self.apply_updates()?;
        Ok(j)
    }

    /// Replace the weights with `params` (same layout as `params()`).
    #[cfg(feature = "serde")]
    pub(crate) fn load_params(&mut self, params: &[f64]) -> Result<()> {
        if params.len() != self.params.len() {
            return Err(Error::InvalidShape(format!(
                "parameter arena has {} values, network needs {}",
                params.len(),
                self.params.len()
            )));
        }
        self.params.copy_from_slice(params);
        Ok(())
    }
}

/// Optional validation pass run after every buffer-producing step.
fn ensure_finite(enabled: bool, stage: &'static str, layer: usize, values: &[f64]) -> Result<()> {
    if enabled && values.iter().any(|v| !v.is_finite()) {
        warn!(stage, layer, "non-finite value detected");
        return Err(Error::NonFinite { stage, layer });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Init, Solver};
    use approx::assert_abs_diff_eq;

    fn config(hidden: Vec<usize>, activation: Activation, loss: Loss) -> MlpConfig {
        let mut cfg = MlpConfig::new(hidden, activation, Solver::sgd(0.1), 0.0);
        cfg.loss = loss;
        cfg
    }

    fn batch() -> (Matrix, Matrix) {
        let x = Matrix::from_rows(&[
            vec![0.3, -0.7, 1.1],
            vec![-0.5, 0.2, 0.4],
            vec![0.9, 0.1, -0.6],
        ])
        .unwrap();
        let y = Matrix::from_rows(&[vec![0.2, 1.0], vec![0.7, 0.0], vec![0.1, 1.0]]).unwrap();
        (x, y)
    }

    /// `sum over rows` of the data loss, the quantity `compute_gradients` differentiates
    /// when `n_samples == x.rows()`.
    fn objective(mlp: &mut Mlp, x: &Matrix, y: &Matrix) -> f64 {
        mlp.forward(x.view(), None).unwrap();
        let j = mlp
            .compute_gradients(x.view(), y.view(), x.rows())
            .unwrap();
        j * x.rows() as f64
    }

    fn check_gradients(cfg: &MlpConfig, seed: u64) {
        let (x, y) = batch();
        let mut mlp = Mlp::new_with_seed(cfg, 3, 2, seed).unwrap();
        mlp.forward(x.view(), None).unwrap();
        mlp.compute_gradients(x.view(), y.view(), x.rows()).unwrap();
        let analytic = mlp.gradients().to_vec();

        let h = 1e-6;
        for p in 0..mlp.num_params() {
            let orig = mlp.params()[p];
            mlp.params_mut()[p] = orig + h;
            let plus = objective(&mut mlp, &x, &y);
            mlp.params_mut()[p] = orig - h;
            let minus = objective(&mut mlp, &x, &y);
            mlp.params_mut()[p] = orig;

            let numeric = (plus - minus) / (2.0 * h);
            assert_abs_diff_eq!(analytic[p], numeric, epsilon = 1e-4);
        }
    }

    #[test]
    fn seeded_init_is_deterministic() {
        let cfg = config(vec![4], Activation::Tanh, Loss::Square);
        let a = Mlp::new_with_seed(&cfg, 3, 2, 123).unwrap();
        let b = Mlp::new_with_seed(&cfg, 3, 2, 123).unwrap();
        assert_eq!(a.params(), b.params());
        assert_eq!(a.num_params(), (3 + 1) * 4 + (4 + 1) * 2);
    }

    #[test]
    fn layer_shapes_chain_through_bias_rows() {
        let cfg = config(vec![5, 4], Activation::ReLU, Loss::Square);
        let mlp = Mlp::new_with_seed(&cfg, 3, 2, 0).unwrap();
        let shapes: Vec<_> = mlp.layers().iter().map(Layer::weight_shape).collect();
        assert_eq!(shapes, vec![(4, 5), (6, 4), (5, 2)]);

        let mut end = 0;
        for layer in mlp.layers() {
            assert_eq!(layer.span().start, end);
            end = layer.span().end;
        }
        assert_eq!(end, mlp.num_params());

        let w = mlp.weights(1);
        assert_eq!((w.rows(), w.cols()), (6, 4));
        assert_eq!(w.row(0), &mlp.params()[20..24]);
    }

    #[test]
    fn probabilistic_loss_forces_logistic_head() {
        let cfg = config(vec![3], Activation::ReLU, Loss::Log);
        let mlp = Mlp::new_with_seed(&cfg, 2, 1, 0).unwrap();
        assert_eq!(mlp.layers()[0].activation(), Activation::ReLU);
        assert_eq!(mlp.layers()[1].activation(), Activation::Logistic);

        let cfg = config(vec![3], Activation::Tanh, Loss::Square);
        let mlp = Mlp::new_with_seed(&cfg, 2, 1, 0).unwrap();
        assert_eq!(mlp.layers()[1].activation(), Activation::Tanh);
    }

    #[test]
    fn forward_shapes_follow_batch_size() {
        let cfg = config(vec![4, 3], Activation::Tanh, Loss::Square);
        let mut mlp = Mlp::new_with_seed(&cfg, 3, 2, 1).unwrap();
        let (x, _) = batch();

        for rows in [3, 1, 2] {
            let xb = x.slice_rows(0, rows);
            let out = mlp.forward(xb, None).unwrap();
            assert_eq!((out.rows(), out.cols()), (rows, 2));
            for layer in mlp.layers() {
                assert_eq!(layer.pre_activation().rows(), rows);
                assert_eq!(layer.prediction().cols(), layer.outputs());
                let aug = layer.augmented_output();
                assert_eq!(aug.rows(), rows);
                for r in 0..rows {
                    assert_eq!(aug.get(r, 0), 1.0);
                }
            }
        }
    }

    #[test]
    fn logits_buffer_receives_output_pre_activation() {
        let cfg = config(vec![4], Activation::ReLU, Loss::CrossEntropy);
        let mut mlp = Mlp::new_with_seed(&cfg, 3, 2, 5).unwrap();
        let (x, _) = batch();
        let mut z = Matrix::default();
        mlp.forward(x.view(), Some(&mut z)).unwrap();

        let out = mlp.output();
        for r in 0..x.rows() {
            for c in 0..2 {
                let p = crate::activation::logistic(z.get(r, c));
                assert_abs_diff_eq!(out.get(r, c), p, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn backward_matches_numeric_gradients_square() {
        check_gradients(&config(vec![4], Activation::Tanh, Loss::Square), 0);
    }

    #[test]
    fn backward_matches_numeric_gradients_deep_logistic() {
        check_gradients(
            &config(vec![4, 3], Activation::Logistic, Loss::CrossEntropy),
            3,
        );
    }

    #[test]
    fn backward_matches_numeric_gradients_multi_output_log() {
        check_gradients(&config(vec![3], Activation::Tanh, Loss::Log), 11);
    }

    #[test]
    fn penalty_gradient_matches_numeric_gradient() {
        // With one row and n_samples == 1, J is exactly the differentiated objective.
        let mut cfg = config(vec![3], Activation::Tanh, Loss::Square);
        cfg.alpha = 0.7;
        cfg.l1_ratio = 0.4;
        cfg.init = Init::Xavier;
        let x = Matrix::from_rows(&[vec![0.3, -0.7, 1.1]]).unwrap();
        let y = Matrix::from_rows(&[vec![0.2, -0.4]]).unwrap();

        let mut mlp = Mlp::new_with_seed(&cfg, 3, 2, 9).unwrap();
        mlp.forward(x.view(), None).unwrap();
        mlp.compute_gradients(x.view(), y.view(), 1).unwrap();
        let analytic = mlp.gradients().to_vec();

        let j_at = |mlp: &mut Mlp| {
            mlp.forward(x.view(), None).unwrap();
            mlp.compute_gradients(x.view(), y.view(), 1).unwrap()
        };

        let h = 1e-6;
        for p in 0..mlp.num_params() {
            let orig = mlp.params()[p];
            mlp.params_mut()[p] = orig + h;
            let plus = j_at(&mut mlp);
            mlp.params_mut()[p] = orig - h;
            let minus = j_at(&mut mlp);
            mlp.params_mut()[p] = orig;
            assert_abs_diff_eq!(analytic[p], (plus - minus) / (2.0 * h), epsilon = 1e-4);
        }
    }

    #[test]
    fn minibatch_losses_sum_to_full_batch_loss() {
        let cfg = config(vec![3], Activation::Tanh, Loss::Square);
        let (x, y) = batch();
        let mut mlp = Mlp::new_with_seed(&cfg, 3, 2, 2).unwrap();

        mlp.forward(x.view(), None).unwrap();
        let full = mlp.compute_gradients(x.view(), y.view(), 3).unwrap();

        let mut parts = 0.0;
        for (s, e) in [(0, 2), (2, 3)] {
            mlp.forward(x.slice_rows(s, e), None).unwrap();
            parts += mlp
                .compute_gradients(x.slice_rows(s, e), y.slice_rows(s, e), 3)
                .unwrap();
        }
        assert_abs_diff_eq!(full, parts, epsilon = 1e-12);
    }

    #[test]
    fn clipping_bounds_every_layer_gradient() {
        let mut cfg = config(vec![4], Activation::Tanh, Loss::Square);
        cfg.gradient_clipping = 1e-3;
        let (x, y) = batch();
        let mut mlp = Mlp::new_with_seed(&cfg, 3, 2, 4).unwrap();
        mlp.forward(x.view(), None).unwrap();
        mlp.compute_gradients(x.view(), y.view(), 3).unwrap();
        for layer in mlp.layers() {
            let norm = l2_norm(&mlp.gradients()[layer.span()]);
            assert!(norm <= 1e-3 + 1e-12, "norm {norm}");
        }
    }

    #[test]
    fn backward_moves_weights_downhill() {
        let mut cfg = config(vec![4], Activation::Tanh, Loss::Square);
        cfg.solver = Solver::sgd(0.01);
        let (x, y) = batch();
        let mut mlp = Mlp::new_with_seed(&cfg, 3, 2, 8).unwrap();

        mlp.forward(x.view(), None).unwrap();
        let before = mlp.backward(x.view(), y.view(), 3).unwrap();
        mlp.forward(x.view(), None).unwrap();
        let after = mlp.compute_gradients(x.view(), y.view(), 3).unwrap();
        assert!(after < before, "{after} >= {before}");
    }

    #[test]
    fn check_finite_reports_first_nan() {
        let mut cfg = config(vec![2], Activation::Tanh, Loss::Square);
        cfg.check_finite = true;
        let mut mlp = Mlp::new_with_seed(&cfg, 3, 2, 0).unwrap();
        mlp.params_mut()[0] = f64::NAN;
        let (x, _) = batch();
        let err = mlp.forward(x.view(), None).unwrap_err();
        assert_eq!(
            err,
            Error::NonFinite {
                stage: "pre-activation",
                layer: 0
            }
        );
    }

    #[test]
    fn check_finite_reports_overflowing_gradient() {
        let mut cfg = config(vec![], Activation::Identity, Loss::Square);
        cfg.check_finite = true;
        let mut mlp = Mlp::new_with_seed(&cfg, 3, 2, 0).unwrap();
        mlp.params_mut().fill(1e-10);

        // Z and delta stay near 1e290; only X^T * delta overflows.
        let (mut x, y) = batch();
        x.set(0, 0, 1e300);
        mlp.forward(x.view(), None).unwrap();
        let err = mlp
            .compute_gradients(x.view(), y.view(), 3)
            .unwrap_err();
        assert_eq!(
            err,
            Error::NonFinite {
                stage: "gradient",
                layer: 0
            }
        );
    }

    #[test]
    fn gradient_norm_combines_layer_norms() {
        let mut cfg = config(vec![4, 3], Activation::Tanh, Loss::Square);
        let (x, y) = batch();
        let mut mlp = Mlp::new_with_seed(&cfg, 3, 2, 5).unwrap();
        mlp.forward(x.view(), None).unwrap();
        mlp.compute_gradients(x.view(), y.view(), 3).unwrap();

        let per_layer: Vec<f64> = mlp
            .layers()
            .iter()
            .map(|l| l2_norm(&mlp.gradients()[l.span()]))
            .collect();
        let expected = per_layer.iter().map(|n| n * n).sum::<f64>().sqrt();
        assert!(expected > 0.0);
        assert_abs_diff_eq!(mlp.gradient_norm(), expected, epsilon = 1e-12);

        cfg.gradient_clipping = 1e-3;
        let mut clipped = Mlp::new_with_seed(&cfg, 3, 2, 5).unwrap();
        clipped.forward(x.view(), None).unwrap();
        clipped.compute_gradients(x.view(), y.view(), 3).unwrap();
        assert!(clipped.gradient_norm() <= 3.0_f64.sqrt() * 1e-3 + 1e-12);
    }

    #[test]
    fn hidden_layer_target_is_prediction_minus_backpropagated_error() {
        let cfg = config(vec![4], Activation::Tanh, Loss::Square);
        let (x, y) = batch();
        let mut mlp = Mlp::new_with_seed(&cfg, 3, 2, 11).unwrap();
        mlp.forward(x.view(), None).unwrap();
        let j = mlp.compute_gradients(x.view(), y.view(), 3).unwrap();

        let out = &mlp.layers()[1];
        assert_eq!(out.target().row(1), y.row(1));
        assert_abs_diff_eq!(
            Loss::Square.value(y.view(), out.prediction()),
            j,
            epsilon = 1e-12
        );

        let hidden = &mlp.layers()[0];
        let w = mlp.weights(1);
        for r in 0..3 {
            for i in 0..4 {
                let back: f64 = (0..2).map(|c| out.delta().get(r, c) * w.get(1 + i, c)).sum();
                let p = hidden.prediction().get(r, i);
                let h = hidden.activation_gradient().get(r, i);
                assert_abs_diff_eq!(p - hidden.target().get(r, i), back, epsilon = 1e-12);
                assert_abs_diff_eq!(h, 1.0 - p * p, epsilon = 1e-12);
                assert_abs_diff_eq!(hidden.delta().get(r, i), back * h, epsilon = 1e-12);
            }
        }
    }

    #[test]
    #[should_panic]
    fn forward_panics_on_feature_mismatch() {
        let cfg = config(vec![2], Activation::Tanh, Loss::Square);
        let mut mlp = Mlp::new_with_seed(&cfg, 2, 1, 0).unwrap();
        let (x, _) = batch();
        let _ = mlp.forward(x.view(), None);
    }
}
