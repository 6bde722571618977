pub mod config;
pub mod index;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod shutdown;
pub mod source;
pub mod state;
pub mod sync;

pub use config::Settings;
pub use index::{DocKind, SearchIndex};
pub use model::{Genre, Movie, Person};
pub use pipeline::{ChangeScanner, DependencyExpander, PipelineError};
pub use shutdown::Shutdown;
pub use source::SourceStore;
pub use state::{Watermark, WatermarkKey, WatermarkStore};
pub use sync::{Backoff, CycleStats, SyncService};
