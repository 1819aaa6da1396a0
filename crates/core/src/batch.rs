//! Pending batch work
//!
//! A FIFO of labelled jobs queued by earlier operations (for example deferred
//! lifecycle hooks). The orchestrator drains it, blocking, before it starts a
//! new run of migration steps.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

type JobFn = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

/// One unit of queued work
pub struct BatchJob {
    label: String,
    operation: JobFn,
}

impl BatchJob {
    pub fn new<F>(label: impl Into<String>, operation: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        Self {
            label: label.into(),
            operation: Box::new(operation),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for BatchJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchJob")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Counts from one drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: usize,
    pub failed: usize,
}

/// Shared handle to the pending job queue
#[derive(Debug, Clone, Default)]
pub struct BatchQueue {
    jobs: Arc<Mutex<VecDeque<BatchJob>>>,
}

impl BatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<BatchJob>> {
        self.jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn enqueue(&self, job: BatchJob) {
        debug!("Queued batch job: {}", job.label);
        self.lock().push_back(job);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Run every pending job in order, including jobs queued while draining
    ///
    /// `on_job` sees each job's label and result. A failed job does not stop the drain.
    pub fn drain<F>(&self, mut on_job: F) -> BatchSummary
    where
        F: FnMut(&str, &anyhow::Result<()>),
    {
        let mut summary = BatchSummary::default();

        loop {
            // Guard must be dropped before the job runs; jobs may enqueue more work.
            let next = self.lock().pop_front();
            let Some(BatchJob { label, operation }) = next else {
                break;
            };
            let result = operation();
            if result.is_err() {
                summary.failed += 1;
            }
            summary.processed += 1;
            on_job(&label, &result);
        }

        summary
    }
}
