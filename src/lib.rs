//! A from-scratch multilayer perceptron (MLP) estimator.
//!
//! `mlp-estimator` fits a dense feed-forward network to tabular data with minibatch
//! backpropagation. It provides a regressor and a binary/multi-label classifier,
//! configurable hidden topology, pluggable activations, losses and update rules,
//! elastic-net regularization and per-layer gradient clipping.
//!
//! # Design goals
//!
//! - Predictable performance: every layer keeps grow-only scratch buffers, and all
//!   weights, gradients and updates live in three flat arenas owned by the network.
//!   After the first minibatch, training does not allocate.
//! - Clear contracts: shapes are explicit and validated at the API boundary.
//!
//! # Panics vs `Result`
//!
//! This crate intentionally exposes two layers of API:
//!
//! - Low-level hot path (panics on misuse):
//!   - [`Mlp::forward`], [`Mlp::compute_gradients`], [`Mlp::backward`]
//!     Shape mismatches are treated as programmer error and will panic via `assert!`.
//!     They still return [`Result`] for the optional `check_finite` validation.
//!
//! - High-level estimators (shape-checked):
//!   - [`MlpRegressor::fit`], [`MlpRegressor::predict`], [`MlpRegressor::score`]
//!   - the same surface on [`MlpClassifier`]
//!     These validate inputs and return [`Result`].
//!
//! # Data layout and shapes
//!
//! - Scalars are `f64`.
//! - [`Matrix`] stores rows contiguously (row-major); rows are samples.
//! - Layer weights are row-major with shape `(inputs + 1, outputs)`; row 0 is the bias.
//! - Each layer's output is stored as `[1 | prediction]`, so the next layer reads a
//!   strided [`MatrixView`] of it without copying.
//!
//! # Quick start
//!
//! ```rust
//! use mlp_estimator::{Activation, Matrix, MlpClassifier, Solver};
//!
//! # fn main() -> mlp_estimator::Result<()> {
//! let x = Matrix::from_rows(&[
//!     vec![0.0, 0.0],
//!     vec![0.0, 1.0],
//!     vec![1.0, 0.0],
//!     vec![1.0, 1.0],
//! ])?;
//! let y = Matrix::from_rows(&[vec![0.0], vec![1.0], vec![1.0], vec![0.0]])?;
//!
//! let mut clf = MlpClassifier::new(vec![8], Activation::Tanh, Solver::adam().with_lr(0.05), 0.0);
//! clf.config_mut().epochs = 200;
//! clf.config_mut().seed = Some(0);
//!
//! let report = clf.fit(&x, &y)?;
//! assert!(report.final_loss.is_finite());
//!
//! let labels = clf.predict(&x)?;
//! assert!(labels.as_slice().iter().all(|&v| v == 0.0 || v == 1.0));
//! Ok(())
//! # }
//! ```
//!
//! # Driving the network directly
//!
//! ```rust
//! use mlp_estimator::{Activation, Loss, Matrix, Mlp, MlpConfig, Solver};
//!
//! # fn main() -> mlp_estimator::Result<()> {
//! let mut cfg = MlpConfig::new(vec![8], Activation::Tanh, Solver::sgd(0.01), 0.0);
//! cfg.loss = Loss::Square;
//! let mut mlp = Mlp::new_with_seed(&cfg, 3, 2, 0)?;
//!
//! let x = Matrix::from_rows(&[vec![0.1, -0.2, 0.3], vec![0.5, 0.0, -0.4]])?;
//! let y = Matrix::from_rows(&[vec![0.0, 1.0], vec![1.0, 0.0]])?;
//!
//! mlp.forward(x.view(), None)?;
//! let j = mlp.backward(x.view(), y.view(), x.rows())?;
//! assert!(j.is_finite());
//! Ok(())
//! # }
//! ```

pub mod activation;
pub mod config;
pub mod error;
pub mod layer;
pub mod loss;
pub(crate) mod matmul;
pub mod matrix;
pub mod metrics;
pub mod mlp;
pub mod optim;
pub mod regularization;
pub mod train;

#[cfg(feature = "serde")]
pub mod serde_model;

pub use activation::Activation;
pub use config::{Init, MlpConfig};
pub use error::{Error, Result};
pub use layer::Layer;
pub use loss::Loss;
pub use matrix::{Matrix, MatrixView};
pub use metrics::{accuracy_score, r2_score};
pub use mlp::Mlp;
pub use optim::{OptimizerState, Solver};
pub use regularization::{Penalty, clip_by_norm};
pub use train::{FitReport, MlpClassifier, MlpRegressor};
