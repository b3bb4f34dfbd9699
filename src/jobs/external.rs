//! External-queue job backend (§4.3 "external queue A/B"): the integration
//! seam for an at-least-once durable broker or a framework-native job
//! system.
//!
//! This crate's dependency stack does not pin a specific broker client
//! (Kafka, SQS, a framework queue), so this backend simulates the delivery
//! contract an operator would get from one — submission never blocks,
//! execution happens off the caller's thread, and the same job body may in
//! principle be redelivered — on top of the in-process worker pool. A
//! deployment that wires in a real broker replaces this file; the job
//! idempotency contract ([`super::run_embedding_job`], [`super::run_tagging_job`])
//! is what makes that swap safe.

use std::sync::Arc;

use crate::error::Result;

use super::{EnrichmentContext, Job, JobRunner, ThreadPoolBackend};

/// At-least-once-flavored backend built on the in-process worker pool.
pub struct ExternalQueueBackend {
    inner: ThreadPoolBackend,
}

impl ExternalQueueBackend {
    /// Creates a new external-queue-flavored backend with `worker_count`
    /// workers.
    pub fn new(worker_count: usize) -> Self {
        Self {
            inner: ThreadPoolBackend::new(worker_count),
        }
    }
}

impl JobRunner for ExternalQueueBackend {
    fn enqueue(&self, ctx: Arc<EnrichmentContext>, job: Job) -> Result<()> {
        self.inner.enqueue(ctx, job)
    }

    fn drain(&self) {
        self.inner.drain();
    }
}
