use crate::cache::{conditional_headers, Cache};
use crate::delivery::ResponseDelivery;
use crate::error::RequestError;
use crate::network::{classify_status, NetworkExecutor, NetworkOutcome};
use crate::queue::PriorityQueue;
use crate::request::Dispatch;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// One of the N network workers.
pub struct NetworkDispatcher {
    worker_id: usize,
    network_queue: Arc<PriorityQueue>,
    network: Arc<dyn NetworkExecutor>,
    cache: Arc<dyn Cache>,
    delivery: Arc<dyn ResponseDelivery>,
}

impl NetworkDispatcher {
    pub fn new(
        worker_id: usize,
        network_queue: Arc<PriorityQueue>,
        network: Arc<dyn NetworkExecutor>,
        cache: Arc<dyn Cache>,
        delivery: Arc<dyn ResponseDelivery>,
    ) -> Self {
        Self {
            worker_id,
            network_queue,
            network,
            cache,
            delivery,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        debug!(worker = self.worker_id, "network dispatcher starting");

        loop {
            let request = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                request = self.network_queue.take() => request,
            };

            let outcome = AssertUnwindSafe(self.process(request.clone()))
                .catch_unwind()
                .await;
            if outcome.is_err() {
                warn!(
                    worker = self.worker_id,
                    sequence = request.core().sequence(),
                    url = request.core().origin_url(),
                    "unhandled panic during network dispatch"
                );
                if request.core().has_had_response_delivered() {
                    request.finish("unhandled-panic");
                } else {
                    self.delivery.post_error(
                        request,
                        RequestError::network("unhandled failure during network dispatch"),
                    );
                }
            }
        }

        debug!(worker = self.worker_id, "network dispatcher stopped");
    }

    async fn process(&self, request: Arc<dyn Dispatch>) {
        let core = request.core();
        core.add_marker("network-queue-take");

        if core.is_canceled() {
            request.finish("network-discard-canceled");
            return;
        }

        let started = Instant::now();
        let entry = core.cache_entry();
        let extra_headers = conditional_headers(entry.as_ref());
        let http_request = core.http_request();

        let outcome = match self.network.perform(&http_request, &extra_headers).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.handle_failure(request, RequestError::from(e), started.elapsed());
                return;
            }
        };
        core.add_marker("network-http-complete");

        let outcome = if outcome.status == 304 {
            match &entry {
                Some(entry) => outcome.revalidated(entry),
                None => NetworkOutcome {
                    not_modified: true,
                    ..outcome
                },
            }
        } else {
            outcome
        };

        // A background refresh that found nothing new has nothing to deliver.
        if outcome.not_modified && core.has_had_response_delivered() {
            request.finish("not-modified");
            return;
        }

        if let Err(kind) = classify_status(&outcome) {
            self.handle_failure(request, RequestError::from(kind), started.elapsed());
            return;
        }

        let response = request.parse(&outcome);
        core.add_marker("network-parse-complete");

        if core.should_cache() {
            if let Some(entry) = &response.cache_entry {
                self.cache.put(&core.cache_key(), entry.clone()).await;
                core.add_marker("network-cache-written");
            }
        }

        self.delivery.post_response(request, response);
    }

    fn handle_failure(&self, request: Arc<dyn Dispatch>, error: RequestError, elapsed: Duration) {
        let core = request.core();

        if !error.is_retryable() {
            core.add_marker(error.class());
            self.delivery
                .post_error(request, error.with_network_time(elapsed));
            return;
        }

        match core.retry(error) {
            Ok(()) => {
                debug!(
                    worker = self.worker_id,
                    sequence = core.sequence(),
                    attempt = core.retry_count(),
                    timeout_ms = core.timeout().as_millis() as u64,
                    "retrying request"
                );
                core.add_marker("network-retry");
                self.network_queue.push(request);
            }
            Err(error) => {
                core.add_marker("network-retry-exhausted");
                self.delivery
                    .post_error(request, error.with_network_time(elapsed));
            }
        }
    }
}
