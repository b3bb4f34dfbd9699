//! Inline job backend (§4.3): executes synchronously on the caller's
//! thread. Used for tests and single-threaded embeddings.

use std::sync::Arc;

use crate::error::Result;

use super::{execute_once, EnrichmentContext, Job, JobRunner};

/// Runs every job on the calling thread and propagates errors immediately.
#[derive(Default)]
pub struct InlineBackend;

impl InlineBackend {
    /// Creates a new inline backend.
    pub fn new() -> Self {
        Self
    }
}

impl JobRunner for InlineBackend {
    fn enqueue(&self, ctx: Arc<EnrichmentContext>, job: Job) -> Result<()> {
        execute_once(&ctx, job)
    }

    fn drain(&self) {}
}
