//! Estimators: the epoch/minibatch training driver and the predict/score surface.
//!
//! `MlpRegressor::fit` reallocates the whole network for the dataset it is given,
//! then runs a fixed epoch budget. Each epoch optionally shuffles the (copied)
//! training rows and walks contiguous minibatch windows over them; the last window
//! shrinks to whatever rows remain. After the network buffers have grown to the
//! first minibatch, the loop does not allocate.

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info};

use crate::metrics::{accuracy_score, r2_score};
use crate::{Activation, Error, Loss, Matrix, Mlp, MlpConfig, Result, Solver};

/// Summary of a `fit` call.
#[derive(Debug, Clone, PartialEq)]
pub struct FitReport {
    pub epochs: usize,
    pub batch_size: usize,
    /// Total loss of the first epoch run (epoch index 0), not of the second.
    pub first_loss: f64,
    /// Total loss of the last epoch.
    pub final_loss: f64,
    /// Total loss of every epoch, in order.
    pub losses: Vec<f64>,
}

/// Multilayer perceptron regressor.
#[derive(Debug, Clone)]
pub struct MlpRegressor {
    config: MlpConfig,
    mlp: Option<Mlp>,
    loss: f64,
    first_loss: f64,
}

impl MlpRegressor {
    /// Regressor with the default configuration for these four knobs.
    ///
    /// See `MlpConfig::new` for the loss default.
    pub fn new(
        hidden_layer_sizes: Vec<usize>,
        activation: Activation,
        solver: Solver,
        alpha: f64,
    ) -> Self {
        Self::with_config(MlpConfig::new(hidden_layer_sizes, activation, solver, alpha))
    }

    pub fn with_config(config: MlpConfig) -> Self {
        Self {
            config,
            mlp: None,
            loss: f64::INFINITY,
            first_loss: f64::INFINITY,
        }
    }

    #[inline]
    pub fn config(&self) -> &MlpConfig {
        &self.config
    }

    /// Mutable configuration. Changes take effect at the next `fit`.
    #[inline]
    pub fn config_mut(&mut self) -> &mut MlpConfig {
        &mut self.config
    }

    /// Total loss of the last epoch run; `INFINITY` before the first fit.
    #[inline]
    pub fn loss(&self) -> f64 {
        self.loss
    }

    /// Total loss of the first epoch of the last fit.
    #[inline]
    pub fn first_loss(&self) -> f64 {
        self.first_loss
    }

    /// The trained network, if `fit` has completed.
    #[inline]
    pub fn network(&self) -> Option<&Mlp> {
        self.mlp.as_ref()
    }

    #[cfg(feature = "serde")]
    pub(crate) fn from_parts(config: MlpConfig, mlp: Mlp) -> Self {
        Self {
            config,
            mlp: Some(mlp),
            loss: f64::INFINITY,
            first_loss: f64::INFINITY,
        }
    }

    /// Train a fresh network on `(x, y)`.
    ///
    /// Rows of `x` are samples; `y` has one row per sample and one column per
    /// output. Any previously trained network is discarded. The caller's
    /// matrices are never reordered: shuffling works on copies.
    pub fn fit(&mut self, x: &Matrix, y: &Matrix) -> Result<FitReport> {
        validate_training_data(x, y)?;
        self.config.validate()?;

        let n_samples = x.rows();
        let epochs = self.config.effective_epochs(n_samples);
        let batch_size = self.config.effective_batch_size(n_samples);

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut mlp = Mlp::new_with_rng(&self.config, x.cols(), y.cols(), &mut rng)?;
        self.mlp = None;
        self.loss = f64::INFINITY;
        self.first_loss = f64::INFINITY;

        info!(
            n_samples,
            n_features = x.cols(),
            n_outputs = y.cols(),
            epochs,
            batch_size,
            params = mlp.num_params(),
            "fit started"
        );

        let mut x_work = x.clone();
        let mut y_work = y.clone();
        let mut losses = Vec::with_capacity(epochs);

        for epoch in 0..epochs {
            if self.config.shuffle {
                x_work.shuffle_rows_with(&mut y_work, &mut rng);
            }
            let j = run_epoch(&mut mlp, &x_work, &y_work, batch_size)?;
            if epoch == 0 {
                self.first_loss = j;
            }
            self.loss = j;
            losses.push(j);
            debug!(epoch, loss = j, "epoch finished");
        }

        info!(
            first_loss = self.first_loss,
            final_loss = self.loss,
            "fit finished"
        );
        self.mlp = Some(mlp);

        Ok(FitReport {
            epochs,
            batch_size,
            first_loss: self.first_loss,
            final_loss: self.loss,
            losses,
        })
    }

    /// Predict raw outputs for every row of `x`.
    pub fn predict(&mut self, x: &Matrix) -> Result<Matrix> {
        let mut out = Matrix::default();
        self.predict_into(x, &mut out)?;
        Ok(out)
    }

    /// Predict into a caller buffer, reusing its allocation when possible.
    pub fn predict_into(&mut self, x: &Matrix, out: &mut Matrix) -> Result<()> {
        let mlp = fitted_for(&mut self.mlp, x)?;
        let pred = mlp.forward(x.view(), None)?;
        out.copy_from_view(pred);
        Ok(())
    }

    /// Output-layer pre-activations (before the output activation).
    pub fn predict_logits(&mut self, x: &Matrix) -> Result<Matrix> {
        let mlp = fitted_for(&mut self.mlp, x)?;
        let mut logits = Matrix::default();
        mlp.forward(x.view(), Some(&mut logits))?;
        Ok(logits)
    }

    /// R² for the `Square` loss; for the probabilistic losses, accuracy of the
    /// predictions thresholded at `0.5`.
    pub fn score(&mut self, x: &Matrix, y: &Matrix) -> Result<f64> {
        let mut pred = self.predict(x)?;
        check_targets(&pred, y)?;
        if self.config.loss == Loss::Square {
            Ok(r2_score(y.view(), pred.view()))
        } else {
            threshold(&mut pred);
            Ok(accuracy_score(y.view(), pred.view()))
        }
    }
}

/// Multilayer perceptron classifier producing hard `{0, 1}` labels per output.
///
/// A thin wrapper over `MlpRegressor` that always trains a probabilistic loss:
/// a `Square` loss in the configuration is replaced by `Log`.
#[derive(Debug, Clone)]
pub struct MlpClassifier {
    inner: MlpRegressor,
}

impl MlpClassifier {
    pub fn new(
        hidden_layer_sizes: Vec<usize>,
        activation: Activation,
        solver: Solver,
        alpha: f64,
    ) -> Self {
        Self::with_config(MlpConfig::new(hidden_layer_sizes, activation, solver, alpha))
    }

    /// Classifier over `config`, with `Loss::Square` swapped for `Loss::Log`.
    pub fn with_config(mut config: MlpConfig) -> Self {
        if config.loss == Loss::Square {
            config.loss = Loss::Log;
        }
        Self {
            inner: MlpRegressor::with_config(config),
        }
    }

    #[inline]
    pub fn config(&self) -> &MlpConfig {
        self.inner.config()
    }

    /// Mutable configuration. `fit` rejects a `Square` loss set through here.
    #[inline]
    pub fn config_mut(&mut self) -> &mut MlpConfig {
        self.inner.config_mut()
    }

    #[inline]
    pub fn loss(&self) -> f64 {
        self.inner.loss()
    }

    #[inline]
    pub fn first_loss(&self) -> f64 {
        self.inner.first_loss()
    }

    #[inline]
    pub fn network(&self) -> Option<&Mlp> {
        self.inner.network()
    }

    /// The underlying regressor.
    #[inline]
    pub fn as_regressor(&self) -> &MlpRegressor {
        &self.inner
    }

    #[cfg(feature = "serde")]
    pub(crate) fn from_regressor(inner: MlpRegressor) -> Self {
        Self { inner }
    }

    pub fn fit(&mut self, x: &Matrix, y: &Matrix) -> Result<FitReport> {
        if !self.config().loss.is_probabilistic() {
            return Err(Error::InvalidConfig(format!(
                "classifier needs a probabilistic loss, got {}",
                self.config().loss.name()
            )));
        }
        self.inner.fit(x, y)
    }

    /// Hard labels: every output `>= 0.5` maps to `1.0`, everything else to `0.0`.
    pub fn predict(&mut self, x: &Matrix) -> Result<Matrix> {
        let mut out = Matrix::default();
        self.predict_into(x, &mut out)?;
        Ok(out)
    }

    pub fn predict_into(&mut self, x: &Matrix, out: &mut Matrix) -> Result<()> {
        self.inner.predict_into(x, out)?;
        threshold(out);
        Ok(())
    }

    /// Raw output-layer probabilities.
    pub fn predict_proba(&mut self, x: &Matrix) -> Result<Matrix> {
        self.inner.predict(x)
    }

    /// Accuracy of `predict(x)` against `y`.
    pub fn score(&mut self, x: &Matrix, y: &Matrix) -> Result<f64> {
        let pred = self.predict(x)?;
        check_targets(&pred, y)?;
        Ok(accuracy_score(y.view(), pred.view()))
    }
}

/// One pass over every minibatch window; returns the epoch's total loss.
fn run_epoch(mlp: &mut Mlp, x: &Matrix, y: &Matrix, batch_size: usize) -> Result<f64> {
    let n_samples = x.rows();
    let mut total = 0.0_f64;
    let mut start = 0;
    while start < n_samples {
        let end = (start + batch_size).min(n_samples);
        let xb = x.slice_rows(start, end);
        let yb = y.slice_rows(start, end);
        mlp.forward(xb, None)?;
        total += mlp.backward(xb, yb, n_samples)?;
        start = end;
    }
    Ok(total)
}

fn threshold(m: &mut Matrix) {
    for v in m.as_mut_slice() {
        *v = if *v >= 0.5 { 1.0 } else { 0.0 };
    }
}

fn fitted_for<'a>(mlp: &'a mut Option<Mlp>, x: &Matrix) -> Result<&'a mut Mlp> {
    let mlp = mlp.as_mut().ok_or(Error::NotFitted)?;
    if x.rows() == 0 {
        return Err(Error::InvalidData("x must not be empty".to_owned()));
    }
    if x.cols() != mlp.input_dim() {
        return Err(Error::InvalidShape(format!(
            "x has {} features, model was fitted on {}",
            x.cols(),
            mlp.input_dim()
        )));
    }
    Ok(mlp)
}

fn check_targets(pred: &Matrix, y: &Matrix) -> Result<()> {
    if (pred.rows(), pred.cols()) != (y.rows(), y.cols()) {
        return Err(Error::InvalidShape(format!(
            "y is {}x{}, predictions are {}x{}",
            y.rows(),
            y.cols(),
            pred.rows(),
            pred.cols()
        )));
    }
    Ok(())
}

fn validate_training_data(x: &Matrix, y: &Matrix) -> Result<()> {
    if x.rows() == 0 || x.cols() == 0 {
        return Err(Error::InvalidData(
            "x must have at least one row and one column".to_owned(),
        ));
    }
    if y.cols() == 0 {
        return Err(Error::InvalidData(
            "y must have at least one column".to_owned(),
        ));
    }
    if y.rows() != x.rows() {
        return Err(Error::InvalidShape(format!(
            "x has {} rows, y has {}",
            x.rows(),
            y.rows()
        )));
    }
    if x.as_slice().iter().chain(y.as_slice()).any(|v| !v.is_finite()) {
        return Err(Error::InvalidData(
            "training data must contain only finite values".to_owned(),
        ));
    }
    Ok(())
}
