use thiserror::Error;

use super::transform::TransformError;
use crate::index::IndexError;
use crate::source::SourceError;
use crate::state::StateError;

/// Error surfaced by any pipeline stage during a cycle.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Transform(#[from] TransformError),
}

impl PipelineError {
    /// True for operational failures the resilience loop should retry with
    /// a reconnect. Validation and state-file failures are not retried:
    /// the former are data bugs, the latter would repeat identically.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Source(e) => e.is_transient(),
            Self::Index(e) => e.is_transient(),
            Self::State(_) | Self::Transform(_) => false,
        }
    }
}
