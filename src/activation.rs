//! Activation functions.
//!
//! A dense layer computes a pre-activation value `z = [1 x] · W` and then applies an
//! activation function element-wise: `y = activation(z)`.
//!
//! Layers cache both `z` and `y`, so the derivative is expressed in terms of
//! whichever of the two is cheaper and exact for each kind.

use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
/// Element-wise activation function.
pub enum Activation {
    Identity,
    Logistic,
    Tanh,
    #[cfg_attr(feature = "serde", serde(rename = "relu"))]
    ReLU,
}

impl Activation {
    /// The lookup name of this activation.
    pub fn name(self) -> &'static str {
        match self {
            Activation::Identity => "identity",
            Activation::Logistic => "logistic",
            Activation::Tanh => "tanh",
            Activation::ReLU => "relu",
        }
    }

    #[inline]
    pub(crate) fn forward(self, z: f64) -> f64 {
        match self {
            Activation::Identity => z,
            Activation::Logistic => logistic(z),
            Activation::Tanh => z.tanh(),
            Activation::ReLU => z.max(0.0),
        }
    }

    /// Derivative `dy/dz` given the cached pre-activation `z` and output `y`.
    #[inline]
    pub(crate) fn derivative(self, z: f64, y: f64) -> f64 {
        match self {
            Activation::Identity => 1.0,
            Activation::Logistic => y * (1.0 - y),
            Activation::Tanh => 1.0 - y * y,
            Activation::ReLU => {
                if z > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Activation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "identity" => Ok(Activation::Identity),
            "logistic" | "sigmoid" => Ok(Activation::Logistic),
            "tanh" => Ok(Activation::Tanh),
            "relu" => Ok(Activation::ReLU),
            other => Err(Error::InvalidConfig(format!(
                "unknown activation {other:?}; expected identity, logistic, tanh or relu"
            ))),
        }
    }
}

#[inline]
pub(crate) fn logistic(x: f64) -> f64 {
    // Numerically stable sigmoid.
    if x >= 0.0 {
        let z = (-x).exp();
        1.0 / (1.0 + z)
    } else {
        let z = x.exp();
        z / (1.0 + z)
    }
}
