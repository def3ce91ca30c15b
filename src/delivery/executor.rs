//! Execution contexts that run delivery jobs.

use crate::error::{Error, ErrorContext};
use crate::Result;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

/// A unit of delivery work.
pub type Job = Box<dyn FnOnce() + Send>;

/// The caller's execution context for callbacks.
pub trait DeliveryExecutor: Send + Sync {
    fn execute(&self, job: Job);
}

/// Runs jobs inline on the posting worker.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateExecutor;

impl DeliveryExecutor for ImmediateExecutor {
    fn execute(&self, job: Job) {
        job();
    }
}

/// Spawns each job onto a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Executor bound to the runtime of the calling task.
    pub fn current() -> Result<Self> {
        let handle = Handle::try_current().map_err(|e| {
            Error::runtime_with_context(
                "no tokio runtime available for delivery",
                ErrorContext::new()
                    .with_details(e.to_string())
                    .with_source("tokio_executor"),
            )
        })?;
        Ok(Self::new(handle))
    }
}

impl DeliveryExecutor for TokioExecutor {
    fn execute(&self, job: Job) {
        self.handle.spawn(async move { job() });
    }
}

/// Queues jobs for a single-threaded [`DeliveryLoop`], the equivalent of a
/// UI event loop.
#[derive(Debug, Clone)]
pub struct ChannelExecutor {
    tx: mpsc::UnboundedSender<Job>,
}

impl ChannelExecutor {
    pub fn new() -> (Self, DeliveryLoop) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, DeliveryLoop { rx })
    }
}

impl DeliveryExecutor for ChannelExecutor {
    fn execute(&self, job: Job) {
        if self.tx.send(job).is_err() {
            tracing::warn!("delivery loop dropped, job discarded");
        }
    }
}

/// Receiving end of a [`ChannelExecutor`]; runs jobs on the driving task.
pub struct DeliveryLoop {
    rx: mpsc::UnboundedReceiver<Job>,
}

impl DeliveryLoop {
    /// Run every job already queued. Returns how many ran.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }

    /// Wait for one job and run it. Returns `false` once every sender is gone.
    pub async fn next(&mut self) -> bool {
        match self.rx.recv().await {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }

    /// Run jobs until every sender is gone.
    pub async fn run(mut self) {
        while self.next().await {}
    }
}

impl std::fmt::Debug for DeliveryLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryLoop").finish_non_exhaustive()
    }
}
