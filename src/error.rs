//! Renderer error types

use thiserror::Error;

use crate::backend::BackendError;

/// Why a pass could not produce its output
#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("Shader '{0}' is not available")]
    MissingShader(String),
    #[error("Render target {0} does not exist")]
    MissingTarget(String),
}

pub type RenderResult<T> = Result<T, RenderError>;
