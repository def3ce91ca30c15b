use super::{QueueConfig, RequestQueue};
use crate::cache::{Cache, DiskCache};
use crate::delivery::{ExecutorDelivery, ResponseDelivery, TokioExecutor};
use crate::error::{Error, ErrorContext};
use crate::network::{NetworkExecutor, ReqwestExecutor};
use crate::Result;
use std::sync::Arc;

/// Builder for [`RequestQueue`].
///
/// Anything left unset falls back to a default: a [`DiskCache`] at the
/// configured directory, a [`ReqwestExecutor`], and delivery spawned onto
/// the current tokio runtime.
pub struct RequestQueueBuilder {
    config: QueueConfig,
    cache: Option<Arc<dyn Cache>>,
    network: Option<Arc<dyn NetworkExecutor>>,
    delivery: Option<Arc<dyn ResponseDelivery>>,
}

impl RequestQueueBuilder {
    pub fn new() -> Self {
        Self {
            config: QueueConfig::default(),
            cache: None,
            network: None,
            delivery: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    pub fn network_threads(mut self, n: usize) -> Self {
        self.config.network_threads = n;
        self
    }

    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn network(mut self, network: Arc<dyn NetworkExecutor>) -> Self {
        self.network = Some(network);
        self
    }

    pub fn delivery(mut self, delivery: Arc<dyn ResponseDelivery>) -> Self {
        self.delivery = Some(delivery);
        self
    }

    /// Build the queue without starting it.
    pub fn build(self) -> Result<RequestQueue> {
        if self.config.network_threads == 0 {
            return Err(Error::configuration_with_context(
                "network_threads must be at least 1",
                ErrorContext::new()
                    .with_field_path("config.network_threads")
                    .with_source("queue_builder"),
            ));
        }

        let cache = match self.cache {
            Some(cache) => cache,
            None => Arc::new(DiskCache::new(
                self.config.cache_dir.clone(),
                self.config.max_cache_bytes,
            )),
        };
        let delivery = match self.delivery {
            Some(delivery) => delivery,
            None => Arc::new(ExecutorDelivery::new(TokioExecutor::current()?)),
        };
        let network = match self.network {
            Some(network) => network,
            None => Arc::new(ReqwestExecutor::new()?),
        };

        Ok(RequestQueue::new(
            cache,
            network,
            delivery,
            self.config.network_threads,
        ))
    }
}

impl Default for RequestQueueBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a queue with default collaborators and start it.
///
/// Must be called from within a tokio runtime.
pub fn new_request_queue(config: QueueConfig) -> Result<RequestQueue> {
    let queue = RequestQueueBuilder::new().config(config).build()?;
    queue.start()?;
    Ok(queue)
}
