//! The resilient cycle loop: owns the store handles, drives the pipeline,
//! and turns transient failures into capped backoff-and-reconnect.

pub mod backoff;
pub mod runner;

pub use backoff::Backoff;
pub use runner::{CycleStats, LoopState, SyncService};
