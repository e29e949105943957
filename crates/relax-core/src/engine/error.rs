use super::config::ConfigError;
use crate::core::dispersion::DispersionError;
use crate::core::frame_order::FrameOrderError;
use crate::core::io::ParamLoadError;
use crate::core::model_free::ModelFreeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid configuration: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("Failed to load input: {source}")]
    Load {
        #[from]
        source: ParamLoadError,
    },

    #[error("Frame-order error: {source}")]
    FrameOrder {
        #[from]
        source: FrameOrderError,
    },

    #[error("Dispersion error: {source}")]
    Dispersion {
        #[from]
        source: DispersionError,
    },

    #[error("Model-free error: {source}")]
    ModelFree {
        #[from]
        source: ModelFreeError,
    },

    #[error("Target '{target}' produced a non-finite value")]
    NonFinite { target: &'static str },

    #[error("Optimization phase '{phase}' failed: {reason}")]
    PhaseFailed { phase: &'static str, reason: String },

    #[error("Internal logic error: {0}")]
    Internal(String),
}
