use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("invalid shape: {0}")]
    InvalidShape(String),
    /// A NaN or infinity was produced while `check_finite` was enabled.
    #[error("non-finite value in {stage} of layer {layer}")]
    NonFinite { stage: &'static str, layer: usize },
    #[error("model is not fitted")]
    NotFitted,
}

pub type Result<T> = std::result::Result<T, Error>;
