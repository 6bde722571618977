//! The change-detection-and-propagation pipeline.
//!
//! Stages hand batches forward through plain synchronous calls, each
//! taking ownership of its input: scanner -> (expander ->) enricher ->
//! transform -> index write. The scanner only advances its watermark after
//! the downstream call for a page returns, which is what makes delivery
//! at-least-once across crashes and restarts.

pub mod enricher;
pub mod error;
pub mod expander;
pub mod scanner;
pub mod transform;

pub use enricher::{Enricher, genre_enricher, movie_enricher, person_enricher};
pub use error::PipelineError;
pub use expander::DependencyExpander;
pub use scanner::{ChangeScanner, ScanReport};
pub use transform::TransformError;
