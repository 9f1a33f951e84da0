//! FILENAME: core/cube-engine/src/error.rs

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Cube not found: {0}")]
    CubeNotFound(String),

    #[error("Cube already registered: {0}")]
    DuplicateCube(String),

    #[error("Cube '{0}' must declare at least one dimension")]
    EmptyDimensions(String),

    #[error("Invalid cube definition: {0}")]
    InvalidDefinition(String),

    #[error("Unknown dimension: {0}")]
    UnknownDimension(String),

    #[error("Unknown level '{level}' on dimension '{dimension}'")]
    UnknownLevel { dimension: String, level: String },

    #[error("Unknown measure: {0}")]
    UnknownMeasure(String),

    #[error("Invalid drill: {0}")]
    InvalidDrill(String),

    #[error("Invalid rollup: {0}")]
    InvalidRollup(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Helper parse error: {0}")]
    HelperSyntax(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Numeric status class used when the error crosses an HTTP boundary.
    pub fn status_class(&self) -> u16 {
        match self {
            EngineError::CubeNotFound(_) => 404,
            EngineError::Internal(_) => 500,
            _ => 400,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
