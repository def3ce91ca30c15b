use crate::cache::Cache;
use crate::delivery::ResponseDelivery;
use crate::error::RequestError;
use crate::network::NetworkOutcome;
use crate::queue::PriorityQueue;
use crate::request::Dispatch;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Single worker triaging requests against the cache.
pub struct CacheDispatcher {
    cache_queue: Arc<PriorityQueue>,
    network_queue: Arc<PriorityQueue>,
    cache: Arc<dyn Cache>,
    delivery: Arc<dyn ResponseDelivery>,
}

impl CacheDispatcher {
    pub fn new(
        cache_queue: Arc<PriorityQueue>,
        network_queue: Arc<PriorityQueue>,
        cache: Arc<dyn Cache>,
        delivery: Arc<dyn ResponseDelivery>,
    ) -> Self {
        Self {
            cache_queue,
            network_queue,
            cache,
            delivery,
        }
    }

    /// Initialize the cache, then drain the cache queue until `shutdown`.
    pub async fn run(self, shutdown: CancellationToken) {
        debug!(cache = self.cache.name(), "cache dispatcher starting");
        self.cache.initialize().await;

        loop {
            let request = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                request = self.cache_queue.take() => request,
            };

            let outcome = AssertUnwindSafe(self.process(request.clone()))
                .catch_unwind()
                .await;
            if outcome.is_err() {
                warn!(
                    sequence = request.core().sequence(),
                    url = request.core().origin_url(),
                    "unhandled panic during cache triage"
                );
                if request.core().has_had_response_delivered() {
                    request.finish("unhandled-panic");
                } else {
                    self.delivery.post_error(
                        request,
                        RequestError::network("unhandled failure during cache triage"),
                    );
                }
            }
        }

        debug!("cache dispatcher stopped");
    }

    async fn process(&self, request: Arc<dyn Dispatch>) {
        let core = request.core();
        core.add_marker("cache-queue-take");

        if core.is_canceled() {
            request.finish("cache-discard-canceled");
            return;
        }

        let entry = match self.cache.get(&core.cache_key()).await {
            Some(entry) => entry,
            None => {
                core.add_marker("cache-miss");
                self.network_queue.push(request);
                return;
            }
        };

        if entry.is_expired() {
            core.add_marker("cache-hit-expired");
            core.set_cache_entry(Some(entry));
            self.network_queue.push(request);
            return;
        }

        core.add_marker("cache-hit");
        let mut response = request.parse(&NetworkOutcome::from_cache_entry(&entry));
        core.add_marker("cache-hit-parsed");

        if !entry.refresh_needed() {
            self.delivery.post_response(request, response);
            return;
        }

        // Serve stale, then refresh in the background.
        core.add_marker("cache-hit-refresh-needed");
        core.set_cache_entry(Some(entry));
        response.intermediate = true;

        let network_queue = self.network_queue.clone();
        let refresh = request.clone();
        self.delivery.post_response_with(
            request,
            response,
            Box::new(move || network_queue.push(refresh)),
        );
    }
}
