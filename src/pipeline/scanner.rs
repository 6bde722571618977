//! Change detection over one tracked `(index, table)` pair.

use std::ops::ControlFlow;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::error::PipelineError;
use crate::shutdown::Shutdown;
use crate::source::{SourceStore, TrackedTable};
use crate::state::{Watermark, WatermarkKey, WatermarkStore};

/// Outcome of one scan pass.
#[derive(Debug, Clone, Copy)]
pub struct ScanReport {
    pub pages: u64,
    /// False when shutdown stopped the scan before the cursor ran dry; the
    /// watermark is left fuzzy so the next pass re-checks the boundary.
    pub drained: bool,
}

pub struct ChangeScanner<'a> {
    source: &'a SourceStore,
    state: &'a WatermarkStore,
    key: WatermarkKey,
    table: TrackedTable,
    default_is_now: bool,
    batch_size: usize,
    shutdown: Shutdown,
}

impl<'a> ChangeScanner<'a> {
    pub fn new(
        source: &'a SourceStore,
        state: &'a WatermarkStore,
        key: WatermarkKey,
        table: TrackedTable,
        default_is_now: bool,
        batch_size: usize,
        shutdown: Shutdown,
    ) -> Self {
        debug_assert!(batch_size > 0);
        Self {
            source,
            state,
            key,
            table,
            default_is_now,
            batch_size,
            shutdown,
        }
    }

    /// Runs one scan pass, forwarding each page of changed ids to `sink`
    /// before the watermark moves.
    ///
    /// A crash between the hand-off and the watermark write re-delivers
    /// that page on the next pass; a crash after the write only re-delivers
    /// boundary ties, because the watermark stays fuzzy until the cursor
    /// drains. Pages are never interrupted between hand-off and write.
    pub fn scan<F>(&self, mut sink: F) -> Result<ScanReport, PipelineError>
    where
        F: FnMut(Vec<String>) -> Result<(), PipelineError>,
    {
        let current = self.state.get(&self.key);
        let threshold = current.map(|w| w.last_updated).unwrap_or_else(|| {
            if self.default_is_now {
                Utc::now()
            } else {
                DateTime::UNIX_EPOCH
            }
        });
        let inclusive = current.map(|w| w.fuzzy).unwrap_or(false);
        debug!(
            key = %self.key,
            threshold = %threshold,
            inclusive,
            "scanning for changes"
        );

        let mut last_seen: Option<DateTime<Utc>> = None;
        let run = self.source.for_each_change_page::<PipelineError, _>(
            self.table,
            threshold,
            inclusive,
            self.batch_size,
            |page| {
                let page_last = page.last_updated;
                sink(page.ids)?;
                // Rows sharing the boundary timestamp may land in the next
                // page, so the comparator stays inclusive until the cursor
                // drains.
                self.state.set(
                    &self.key,
                    Watermark {
                        last_updated: page_last,
                        fuzzy: true,
                    },
                )?;
                last_seen = Some(page_last);
                if self.shutdown.is_requested() {
                    Ok(ControlFlow::Break(()))
                } else {
                    Ok(ControlFlow::Continue(()))
                }
            },
        )?;

        // Clearing the fuzzy flag is only sound once every row at or past
        // the threshold has been handed off.
        if run.drained {
            let caught_up = last_seen.or(current.map(|w| w.last_updated));
            let dirty = run.pages > 0 || current.is_some_and(|w| w.fuzzy);
            if let (Some(last_updated), true) = (caught_up, dirty) {
                self.state.set(
                    &self.key,
                    Watermark {
                        last_updated,
                        fuzzy: false,
                    },
                )?;
            }
        }

        if run.pages > 0 {
            info!(key = %self.key, pages = run.pages, drained = run.drained, "scan forwarded changes");
        }
        Ok(ScanReport {
            pages: run.pages,
            drained: run.drained,
        })
    }
}
