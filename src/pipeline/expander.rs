//! Dependency expansion: changed related-table ids to the root entities
//! whose documents must be refreshed.

use tracing::debug;

use super::error::PipelineError;
use crate::source::{Relation, SourceStore};

pub struct DependencyExpander<'a> {
    source: &'a SourceStore,
    relation: Relation,
    batch_size: usize,
}

impl<'a> DependencyExpander<'a> {
    pub fn new(source: &'a SourceStore, relation: Relation, batch_size: usize) -> Self {
        Self {
            source,
            relation,
            batch_size,
        }
    }

    /// Resolves the distinct root id set for `ids` and forwards it
    /// downstream in `batch_size` chunks. An empty input produces no
    /// downstream call. Returns the number of root ids forwarded.
    pub fn expand<F>(&self, ids: &[String], mut sink: F) -> Result<usize, PipelineError>
    where
        F: FnMut(Vec<String>) -> Result<(), PipelineError>,
    {
        if ids.is_empty() {
            return Ok(0);
        }
        let roots = self.source.expand_root_ids(self.relation, ids)?;
        debug!(
            relation = ?self.relation,
            changed = ids.len(),
            roots = roots.len(),
            "expanded related changes to root ids"
        );
        let total = roots.len();
        for chunk in roots.chunks(self.batch_size) {
            sink(chunk.to_vec())?;
        }
        Ok(total)
    }
}
