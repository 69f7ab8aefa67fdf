//! One dense layer: an affine transform with a bias row, then an activation.
//!
//! A layer does not own its weights. They live in a window of the network's flat
//! parameter arena (`span()`), as do its gradient and update buffers. The layer
//! owns everything that depends on the current minibatch:
//!
//! - `z`: pre-activation, `(batch, outputs)`
//! - `next_x1`: augmented output `[1 | prediction]`, `(batch, 1 + outputs)`;
//!   the prediction is the view onto columns `1..`, and it is the input of the
//!   next layer, which only ever reads it
//! - `y_true`, `y_diff`, `h_grad`: backprop scratch, `(batch, outputs)`
//!
//! Scratch buffers are grow-only: shrinking the batch keeps their capacity.

use std::ops::Range;

use crate::matmul::gemm_f64;
use crate::{Activation, Loss, MatrixView, OptimizerState};

#[derive(Debug, Clone)]
pub struct Layer {
    inputs: usize,
    outputs: usize,
    activation: Activation,
    /// Start of this layer's window in the parameter/gradient/update arenas.
    offset: usize,
    optimizer: OptimizerState,

    batch: usize,
    z: Vec<f64>,
    y_true: Vec<f64>,
    next_x1: Vec<f64>,
    y_diff: Vec<f64>,
    h_grad: Vec<f64>,
}

impl Layer {
    pub(crate) fn new(
        inputs: usize,
        outputs: usize,
        activation: Activation,
        offset: usize,
        optimizer: OptimizerState,
    ) -> Self {
        Self {
            inputs,
            outputs,
            activation,
            offset,
            optimizer,
            batch: 0,
            z: Vec::new(),
            y_true: Vec::new(),
            next_x1: Vec::new(),
            y_diff: Vec::new(),
            h_grad: Vec::new(),
        }
    }

    /// Number of input features (excluding the implicit bias feature).
    #[inline]
    pub fn inputs(&self) -> usize {
        self.inputs
    }

    #[inline]
    pub fn outputs(&self) -> usize {
        self.outputs
    }

    #[inline]
    pub fn activation(&self) -> Activation {
        self.activation
    }

    /// Weight matrix shape: `(inputs + 1, outputs)`, bias row first.
    #[inline]
    pub fn weight_shape(&self) -> (usize, usize) {
        (self.inputs + 1, self.outputs)
    }

    #[inline]
    pub fn num_params(&self) -> usize {
        (self.inputs + 1) * self.outputs
    }

    /// This layer's window in the network arenas.
    #[inline]
    pub fn span(&self) -> Range<usize> {
        self.offset..self.offset + self.num_params()
    }

    /// Rows of the current minibatch (0 before the first forward pass).
    #[inline]
    pub fn batch_size(&self) -> usize {
        self.batch
    }

    /// Size every per-sample buffer to `batch` rows and reset the bias column.
    ///
    /// Capacity is never released, so alternating batch sizes does not reallocate.
    pub fn initialize_for(&mut self, batch: usize) {
        let n = batch * self.outputs;
        self.z.resize(n, 0.0);
        self.y_true.resize(n, 0.0);
        self.y_diff.resize(n, 0.0);
        self.h_grad.resize(n, 0.0);

        let stride = self.outputs + 1;
        self.next_x1.resize(batch * stride, 0.0);
        for r in 0..batch {
            self.next_x1[r * stride] = 1.0;
        }

        self.batch = batch;
    }

    /// Pre-activation `Z = [1 X] · W`.
    #[inline]
    pub fn pre_activation(&self) -> MatrixView<'_> {
        MatrixView::new(&self.z, self.batch, self.outputs, self.outputs)
    }

    /// Prediction `activation(Z)`: a view onto columns `1..` of `augmented_output`.
    #[inline]
    pub fn prediction(&self) -> MatrixView<'_> {
        prediction_view(&self.next_x1, self.batch, self.outputs)
    }

    /// `[1 | prediction]`, the bias-augmented input of the next layer.
    #[inline]
    pub fn augmented_output(&self) -> MatrixView<'_> {
        MatrixView::new(&self.next_x1, self.batch, self.outputs + 1, self.outputs + 1)
    }

    /// The (pseudo-)target used by the last backward pass.
    #[inline]
    pub fn target(&self) -> MatrixView<'_> {
        MatrixView::new(&self.y_true, self.batch, self.outputs, self.outputs)
    }

    /// `dLoss/dZ` after a backward pass.
    #[inline]
    pub fn delta(&self) -> MatrixView<'_> {
        MatrixView::new(&self.y_diff, self.batch, self.outputs, self.outputs)
    }

    #[inline]
    pub fn activation_gradient(&self) -> MatrixView<'_> {
        MatrixView::new(&self.h_grad, self.batch, self.outputs, self.outputs)
    }

    #[inline]
    pub(crate) fn z_buf(&self) -> &[f64] {
        &self.z
    }

    #[inline]
    pub(crate) fn output_buf(&self) -> &[f64] {
        &self.next_x1
    }

    #[inline]
    pub(crate) fn delta_buf(&self) -> &[f64] {
        &self.y_diff
    }

    /// Forward pass for the current minibatch.
    ///
    /// `input` is the raw feature matrix for the first layer and the previous
    /// layer's `prediction()` otherwise. The bias is applied by seeding every
    /// row of `Z` with the bias row and accumulating `X · W[1..]` on top, so the
    /// ones column is never materialized for the input.
    ///
    /// Shape contract (panics on violation):
    /// - `input` is `(batch, inputs)` where `batch` was set by `initialize_for`
    /// - `weights.len() == num_params()`
    pub(crate) fn forward(&mut self, input: MatrixView<'_>, weights: &[f64]) {
        assert_eq!(
            input.cols(),
            self.inputs,
            "input has {} columns, layer expects {}",
            input.cols(),
            self.inputs
        );
        assert_eq!(
            input.rows(),
            self.batch,
            "input has {} rows, layer was initialized for {}",
            input.rows(),
            self.batch
        );
        assert_eq!(weights.len(), self.num_params());

        let out = self.outputs;
        let (bias, w) = weights.split_at(out);
        for row in self.z.chunks_exact_mut(out) {
            row.copy_from_slice(bias);
        }

        gemm_f64(
            self.batch,
            out,
            self.inputs,
            1.0,
            input.data(),
            input.row_stride(),
            1,
            w,
            out,
            1,
            1.0,
            &mut self.z,
            out,
            1,
        );

        let stride = out + 1;
        for (r, z_row) in self.z.chunks_exact(out).enumerate() {
            let y_row = &mut self.next_x1[r * stride + 1..(r + 1) * stride];
            for (y, &z) in y_row.iter_mut().zip(z_row) {
                *y = self.activation.forward(z);
            }
        }
    }

    /// Seed the error signal of the output layer and return the loss value.
    ///
    /// Copies `y` into the target buffer and lets `loss` write `dLoss/dprediction`
    /// into the delta buffer.
    pub(crate) fn output_delta(&mut self, y: MatrixView<'_>, loss: Loss) -> f64 {
        assert_eq!(
            (y.rows(), y.cols()),
            (self.batch, self.outputs),
            "targets are {}x{}, output layer is {}x{}",
            y.rows(),
            y.cols(),
            self.batch,
            self.outputs
        );

        let out = self.outputs;
        for r in 0..self.batch {
            self.y_true[r * out..(r + 1) * out].copy_from_slice(y.row(r));
        }

        let pred = prediction_view(&self.next_x1, self.batch, out);
        loss.evaluate(&self.y_true, pred, &mut self.y_diff)
    }

    /// Turn a back-propagated `dLoss/dprediction` (already in the delta buffer)
    /// into this layer's error signal through a squared-error pseudo-target.
    ///
    /// The pseudo-target is `prediction - delta`; the `Square` gradient
    /// `prediction - target` then rewrites the delta buffer in place.
    pub(crate) fn hidden_delta(&mut self) {
        let out = self.outputs;
        let pred = prediction_view(&self.next_x1, self.batch, out);
        for (r, t_row) in self.y_true.chunks_exact_mut(out).enumerate() {
            let d_row = &self.y_diff[r * out..(r + 1) * out];
            for ((t, &p), &d) in t_row.iter_mut().zip(pred.row(r)).zip(d_row) {
                *t = p - d;
            }
        }

        Loss::Square.evaluate(&self.y_true, pred, &mut self.y_diff);
    }

    /// `h_grad = activation'(Z)` and `delta *= h_grad`, giving `dLoss/dZ`.
    pub(crate) fn fold_activation_gradient(&mut self) {
        let out = self.outputs;
        let stride = out + 1;
        for r in 0..self.batch {
            let y_row = &self.next_x1[r * stride + 1..(r + 1) * stride];
            let base = r * out;
            for c in 0..out {
                let h = self.activation.derivative(self.z[base + c], y_row[c]);
                self.h_grad[base + c] = h;
                self.y_diff[base + c] *= h;
            }
        }
    }

    /// `grad = [1 X]ᵀ · delta`, shaped like the weights.
    pub(crate) fn weight_gradient(&self, input: MatrixView<'_>, grad: &mut [f64]) {
        assert_eq!(grad.len(), self.num_params());
        assert_eq!(
            (input.rows(), input.cols()),
            (self.batch, self.inputs),
            "layer input shape changed between forward and backward"
        );

        let out = self.outputs;
        let (bias_grad, w_grad) = grad.split_at_mut(out);

        // The bias feature is constant 1, so its row is the column sum of delta.
        bias_grad.fill(0.0);
        for d_row in self.y_diff.chunks_exact(out) {
            for (g, &d) in bias_grad.iter_mut().zip(d_row) {
                *g += d;
            }
        }

        gemm_f64(
            self.inputs,
            out,
            self.batch,
            1.0,
            input.data(),
            1,
            input.row_stride(),
            &self.y_diff,
            out,
            1,
            0.0,
            w_grad,
            out,
            1,
        );
    }

    /// `prev_delta = delta · W[1..]ᵀ`: the error signal w.r.t. this layer's input.
    ///
    /// The bias row is skipped; the constant feature has no upstream producer.
    pub(crate) fn backpropagate_into(&self, weights: &[f64], prev_delta: &mut [f64]) {
        assert_eq!(weights.len(), self.num_params());
        assert_eq!(prev_delta.len(), self.batch * self.inputs);

        let out = self.outputs;
        gemm_f64(
            self.batch,
            self.inputs,
            out,
            1.0,
            &self.y_diff,
            out,
            1,
            &weights[out..],
            1,
            out,
            0.0,
            prev_delta,
            self.inputs,
            1,
        );
    }

    #[inline]
    pub(crate) fn delta_mut(&mut self) -> &mut [f64] {
        &mut self.y_diff
    }

    /// Run the optimizer on `grad` and add the resulting update to `weights`.
    pub(crate) fn step(&mut self, grad: &[f64], update: &mut [f64], weights: &mut [f64]) {
        self.optimizer.get_update(grad, update);
        for (w, &u) in weights.iter_mut().zip(update.iter()) {
            *w += u;
        }
    }
}

#[inline]
fn prediction_view(next_x1: &[f64], batch: usize, outputs: usize) -> MatrixView<'_> {
    let data = if next_x1.is_empty() { next_x1 } else { &next_x1[1..] };
    MatrixView::new(data, batch, outputs, outputs + 1)
}
