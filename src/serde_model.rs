//! Model serialization/deserialization (feature: `serde`).
//!
//! This module defines a versioned on-disk format for trained estimators.
//!
//! Design notes:
//! - We do NOT directly serialize `Mlp`/`Layer`: scratch buffers and optimizer
//!   state are not part of a trained model, and the file format should stay
//!   stable if the arena layout changes.
//! - Deserialization validates the format version, the configuration, every
//!   layer shape against the network the configuration describes, and that all
//!   weights are finite.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Activation, Error, Mlp, MlpClassifier, MlpConfig, MlpRegressor, Result};

pub const MODEL_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedModel {
    pub format_version: u32,
    pub config: MlpConfig,
    pub n_features: usize,
    pub n_outputs: usize,
    pub layers: Vec<SerializedLayer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedLayer {
    pub inputs: usize,
    pub outputs: usize,
    pub activation: Activation,
    /// Row-major `(inputs + 1, outputs)`, bias row first.
    pub weights: Vec<f64>,
}

impl SerializedModel {
    pub fn new(config: &MlpConfig, mlp: &Mlp) -> Self {
        let layers = mlp
            .layers()
            .iter()
            .map(|layer| SerializedLayer {
                inputs: layer.inputs(),
                outputs: layer.outputs(),
                activation: layer.activation(),
                weights: mlp.params()[layer.span()].to_vec(),
            })
            .collect();
        Self {
            format_version: MODEL_FORMAT_VERSION,
            config: config.clone(),
            n_features: mlp.input_dim(),
            n_outputs: mlp.output_dim(),
            layers,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.format_version != MODEL_FORMAT_VERSION {
            return Err(Error::InvalidData(format!(
                "unsupported model format_version {}; expected {}",
                self.format_version, MODEL_FORMAT_VERSION
            )));
        }
        self.config
            .validate()
            .map_err(|e| Error::InvalidData(format!("invalid stored config: {e}")))?;
        if self.layers.len() != self.config.hidden_layer_sizes.len() + 1 {
            return Err(Error::InvalidData(format!(
                "model has {} layers, config describes {}",
                self.layers.len(),
                self.config.hidden_layer_sizes.len() + 1
            )));
        }

        let mut prev = self.n_features;
        for (i, layer) in self.layers.iter().enumerate() {
            if layer.inputs != prev {
                return Err(Error::InvalidData(format!(
                    "layer {i} inputs {} does not match previous outputs {prev}",
                    layer.inputs
                )));
            }
            let expected = (layer.inputs + 1)
                .checked_mul(layer.outputs)
                .ok_or_else(|| Error::InvalidData("layer weight shape overflow".to_owned()))?;
            if layer.weights.len() != expected {
                return Err(Error::InvalidData(format!(
                    "layer {i} weights length {} does not match (inputs + 1) * outputs = {expected}",
                    layer.weights.len()
                )));
            }
            if layer.weights.iter().any(|v| !v.is_finite()) {
                return Err(Error::InvalidData(format!(
                    "layer {i} weights must contain only finite values"
                )));
            }
            prev = layer.outputs;
        }
        if prev != self.n_outputs {
            return Err(Error::InvalidData(format!(
                "last layer outputs {prev} does not match n_outputs {}",
                self.n_outputs
            )));
        }

        Ok(())
    }

    /// Rebuild the network. Optimizer state starts fresh.
    pub fn into_network(self) -> Result<(MlpConfig, Mlp)> {
        self.validate()?;

        let mut mlp = Mlp::allocate(&self.config, self.n_features, self.n_outputs)?;
        for (i, (stored, layer)) in self.layers.iter().zip(mlp.layers()).enumerate() {
            if (stored.outputs, stored.activation) != (layer.outputs(), layer.activation()) {
                return Err(Error::InvalidData(format!(
                    "layer {i} ({} units, {}) does not match config ({} units, {})",
                    stored.outputs,
                    stored.activation,
                    layer.outputs(),
                    layer.activation()
                )));
            }
        }

        let params: Vec<f64> = self
            .layers
            .into_iter()
            .flat_map(|layer| layer.weights)
            .collect();
        mlp.load_params(&params)?;
        Ok((self.config, mlp))
    }
}

impl MlpRegressor {
    /// Serialize the trained model to a pretty-printed JSON string.
    pub fn to_json_string_pretty(&self) -> Result<String> {
        let ser = self.serialized()?;
        serde_json::to_string_pretty(&ser)
            .map_err(|e| Error::InvalidData(format!("failed to serialize model: {e}")))
    }

    /// Serialize the trained model to a compact JSON string.
    pub fn to_json_string(&self) -> Result<String> {
        let ser = self.serialized()?;
        serde_json::to_string(&ser)
            .map_err(|e| Error::InvalidData(format!("failed to serialize model: {e}")))
    }

    /// Parse a trained model from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let ser: SerializedModel = serde_json::from_str(s)
            .map_err(|e| Error::InvalidData(format!("failed to parse model json: {e}")))?;
        let (config, mlp) = ser.into_network()?;
        Ok(Self::from_parts(config, mlp))
    }

    /// Save the trained model to a JSON file (pretty-printed).
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let s = self.to_json_string_pretty()?;
        let p = path.as_ref();
        std::fs::write(p, s)
            .map_err(|e| Error::InvalidData(format!("failed to write {}: {e}", p.display())))?;
        Ok(())
    }

    /// Load a trained model from a JSON file.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();
        let s = std::fs::read_to_string(p)
            .map_err(|e| Error::InvalidData(format!("failed to read {}: {e}", p.display())))?;
        Self::from_json_str(&s)
    }

    fn serialized(&self) -> Result<SerializedModel> {
        let mlp = self.network().ok_or(Error::NotFitted)?;
        Ok(SerializedModel::new(self.config(), mlp))
    }
}

impl MlpClassifier {
    pub fn to_json_string_pretty(&self) -> Result<String> {
        self.as_regressor().to_json_string_pretty()
    }

    pub fn to_json_string(&self) -> Result<String> {
        self.as_regressor().to_json_string()
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        MlpRegressor::from_json_str(s).map(Self::from_regressor)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.as_regressor().save_json(path)
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        MlpRegressor::load_json(path).map(Self::from_regressor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Loss, Matrix, Solver};

    fn trained() -> (MlpRegressor, Matrix) {
        let x = Matrix::from_rows(&[
            vec![0.0, 1.0, 2.0],
            vec![1.0, 0.0, -1.0],
            vec![0.5, 0.5, 0.5],
        ])
        .unwrap();
        let y = Matrix::from_rows(&[vec![1.0, 0.0], vec![0.0, 1.0], vec![0.5, 0.5]]).unwrap();
        let mut r = MlpRegressor::new(vec![4, 3], Activation::Tanh, Solver::adam(), 0.1);
        r.config_mut().loss = Loss::Square;
        r.config_mut().epochs = 5;
        r.config_mut().seed = Some(11);
        r.fit(&x, &y).unwrap();
        (r, x)
    }

    #[test]
    fn json_roundtrip_preserves_predictions() {
        let (mut r, x) = trained();
        let json = r.to_json_string_pretty().unwrap();

        let mut loaded = MlpRegressor::from_json_str(&json).unwrap();
        assert_eq!(loaded.config(), r.config());
        assert_eq!(
            loaded.network().unwrap().params(),
            r.network().unwrap().params()
        );
        assert_eq!(loaded.predict(&x).unwrap(), r.predict(&x).unwrap());

        let json2 = loaded.to_json_string_pretty().unwrap();
        assert_eq!(json, json2);
    }

    #[test]
    fn unfitted_model_cannot_be_saved() {
        let r = MlpRegressor::new(vec![2], Activation::ReLU, Solver::adam(), 0.0);
        assert_eq!(r.to_json_string().unwrap_err(), Error::NotFitted);
    }

    #[test]
    fn rejects_unknown_version() {
        let (r, _) = trained();
        let mut ser = r.serialized().unwrap();
        ser.format_version = 999;
        let bad = serde_json::to_string(&ser).unwrap();
        let err = MlpRegressor::from_json_str(&bad).unwrap_err();
        assert!(format!("{err}").contains("format_version"));
    }

    #[test]
    fn rejects_truncated_weights() {
        let (r, _) = trained();
        let mut ser = r.serialized().unwrap();
        ser.layers[1].weights.pop();
        let err = ser.into_network().unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
    }

    #[test]
    fn rejects_activation_disagreeing_with_config() {
        let (r, _) = trained();
        let mut ser = r.serialized().unwrap();
        ser.layers[0].activation = Activation::ReLU;
        assert!(ser.into_network().is_err());
    }

    #[test]
    fn rejects_broken_layer_chain() {
        let (r, _) = trained();
        let mut ser = r.serialized().unwrap();
        ser.n_features = 7;
        assert!(matches!(ser.validate(), Err(Error::InvalidData(_))));
    }

    #[test]
    fn file_roundtrip() {
        let (r, _) = trained();
        let path = std::env::temp_dir().join(format!(
            "mlp_estimator_model_{}.json",
            std::process::id()
        ));
        r.save_json(&path).unwrap();
        let loaded = MlpRegressor::load_json(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(
            loaded.network().unwrap().params(),
            r.network().unwrap().params()
        );
    }
}
