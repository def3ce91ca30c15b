//! 请求队列模块：排序、去重与工作线程生命周期。
//!
//! # Request Queue Module
//!
//! [`RequestQueue`] assigns sequence numbers, keeps the in-flight set,
//! defers duplicate requests for a cache key behind the first one (the
//! driver), and owns the cache and network priority queues together with
//! the dispatcher tasks draining them.
//!
//! ## Example
//!
//! ```rust,no_run
//! use bees_http::queue::{new_request_queue, QueueConfig};
//! use bees_http::request::{Method, Request};
//!
//! # async fn demo() -> bees_http::Result<()> {
//! let queue = new_request_queue(QueueConfig::from_env())?;
//! queue.add(
//!     Request::string(Method::Get, "https://example.com/")
//!         .with_tag("home")
//!         .on_response(|body| println!("{} bytes", body.len())),
//! );
//! queue.cancel_all_by_tag("home");
//! queue.stop();
//! # Ok(())
//! # }
//! ```

mod builder;
mod config;
mod priority_queue;

pub use builder::{new_request_queue, RequestQueueBuilder};
pub use config::{QueueConfig, DEFAULT_CACHE_DIR, DEFAULT_NETWORK_THREADS};
pub use priority_queue::PriorityQueue;

use crate::cache::Cache;
use crate::delivery::ResponseDelivery;
use crate::dispatch::{CacheDispatcher, NetworkDispatcher};
use crate::error::{Error, ErrorContext};
use crate::network::NetworkExecutor;
use crate::request::{lock, CompletionSink, Dispatch, Request, RequestCore};
use crate::Result;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Requests parked behind the driver for one cache key.
struct Waiting {
    driver: u64,
    deferred: VecDeque<Arc<dyn Dispatch>>,
}

/// State shared with the workers and the requests' completion sink.
struct QueueShared {
    sequence: AtomicU64,
    current: Mutex<HashMap<u64, Arc<dyn Dispatch>>>,
    waiting: Mutex<HashMap<String, Waiting>>,
    cache_queue: Arc<PriorityQueue>,
    network_queue: Arc<PriorityQueue>,
}

impl QueueShared {
    fn enqueue(&self, request: Arc<dyn Dispatch>) {
        let core = request.core();
        lock(&self.current).insert(core.sequence(), request.clone());
        core.add_marker("add-to-queue");

        if !core.should_cache() {
            self.network_queue.push(request);
            return;
        }

        let key = core.cache_key();
        let mut waiting = lock(&self.waiting);
        match waiting.entry(key) {
            Entry::Occupied(mut slot) => {
                debug!(
                    key = slot.key().as_str(),
                    sequence = core.sequence(),
                    driver = slot.get().driver,
                    "request for cache key already in flight, deferring"
                );
                slot.get_mut().deferred.push_back(request);
            }
            Entry::Vacant(slot) => {
                slot.insert(Waiting {
                    driver: core.sequence(),
                    deferred: VecDeque::new(),
                });
                self.cache_queue.push(request);
            }
        }
    }
}

impl CompletionSink for QueueShared {
    fn request_finished(&self, request: &RequestCore) {
        lock(&self.current).remove(&request.sequence());

        if !request.should_cache() {
            return;
        }

        let key = request.cache_key();
        let mut waiting = lock(&self.waiting);
        let is_driver = waiting
            .get(&key)
            .map(|w| w.driver == request.sequence())
            .unwrap_or(false);
        if !is_driver {
            return;
        }
        if let Some(released) = waiting.remove(&key) {
            if !released.deferred.is_empty() {
                debug!(
                    key = key.as_str(),
                    count = released.deferred.len(),
                    "releasing deferred requests"
                );
            }
            for deferred in released.deferred {
                self.cache_queue.push(deferred);
            }
        }
    }
}

struct Workers {
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

/// Request dispatch queue with a cache worker and a pool of network workers.
pub struct RequestQueue {
    shared: Arc<QueueShared>,
    cache: Arc<dyn Cache>,
    network: Arc<dyn NetworkExecutor>,
    delivery: Arc<dyn ResponseDelivery>,
    network_threads: usize,
    workers: Mutex<Option<Workers>>,
}

impl RequestQueue {
    pub fn builder() -> RequestQueueBuilder {
        RequestQueueBuilder::new()
    }

    pub(crate) fn new(
        cache: Arc<dyn Cache>,
        network: Arc<dyn NetworkExecutor>,
        delivery: Arc<dyn ResponseDelivery>,
        network_threads: usize,
    ) -> Self {
        Self {
            shared: Arc::new(QueueShared {
                sequence: AtomicU64::new(0),
                current: Mutex::new(HashMap::new()),
                waiting: Mutex::new(HashMap::new()),
                cache_queue: Arc::new(PriorityQueue::new()),
                network_queue: Arc::new(PriorityQueue::new()),
            }),
            cache,
            network,
            delivery,
            network_threads,
            workers: Mutex::new(None),
        }
    }

    /// Spawn the cache worker and the network workers. No-op when running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<()> {
        let mut workers = lock(&self.workers);
        if workers.is_some() {
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            Error::runtime_with_context(
                "request queue started outside a tokio runtime",
                ErrorContext::new()
                    .with_details(e.to_string())
                    .with_source("request_queue"),
            )
        })?;

        let shutdown = CancellationToken::new();
        let mut handles = Vec::with_capacity(self.network_threads + 1);

        let cache_dispatcher = CacheDispatcher::new(
            self.shared.cache_queue.clone(),
            self.shared.network_queue.clone(),
            self.cache.clone(),
            self.delivery.clone(),
        );
        handles.push(runtime.spawn(cache_dispatcher.run(shutdown.clone())));

        for worker_id in 0..self.network_threads {
            let dispatcher = NetworkDispatcher::new(
                worker_id,
                self.shared.network_queue.clone(),
                self.network.clone(),
                self.cache.clone(),
                self.delivery.clone(),
            );
            handles.push(runtime.spawn(dispatcher.run(shutdown.clone())));
        }

        info!(
            network_threads = self.network_threads,
            cache = self.cache.name(),
            "request queue started"
        );
        *workers = Some(Workers { shutdown, handles });
        Ok(())
    }

    /// Signal every worker to leave its take loop. Items already being
    /// processed run to completion. No-op when stopped.
    pub fn stop(&self) {
        if let Some(workers) = lock(&self.workers).take() {
            workers.shutdown.cancel();
            debug!(workers = workers.handles.len(), "request queue stopping");
        }
    }

    /// Stop and wait for every worker to exit.
    pub async fn shutdown(&self) {
        let workers = lock(&self.workers).take();
        if let Some(workers) = workers {
            workers.shutdown.cancel();
            for handle in workers.handles {
                let _ = handle.await;
            }
            info!("request queue stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.workers).is_some()
    }

    /// Enqueue a request and return a handle to it.
    ///
    /// Taking the request by value keeps it from being enqueued twice.
    pub fn add<T: Send + 'static>(&self, mut request: Request<T>) -> Arc<Request<T>> {
        let sequence = self.shared.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let shared: Arc<dyn CompletionSink> = self.shared.clone();
        request.core_mut().prepare(sequence, Arc::downgrade(&shared));

        let request = Arc::new(request);
        self.shared.enqueue(request.clone());
        request
    }

    /// Cancel every in-flight request matching `predicate`.
    pub fn cancel_all<F>(&self, predicate: F)
    where
        F: Fn(&RequestCore) -> bool,
    {
        let current = lock(&self.shared.current);
        for request in current.values() {
            if predicate(request.core()) {
                request.core().cancel();
            }
        }
    }

    /// Cancel every in-flight request carrying `tag`.
    pub fn cancel_all_by_tag(&self, tag: &str) {
        self.cancel_all(|core| core.tag() == Some(tag));
    }

    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.cache
    }

    /// Requests added and not yet finished.
    pub fn in_flight_count(&self) -> usize {
        lock(&self.shared.current).len()
    }

    /// Requests waiting for a free network worker.
    pub fn network_backlog(&self) -> usize {
        self.shared.network_queue.len()
    }

    /// Requests deferred behind the driver for `cache_key`.
    pub fn waiting_count(&self, cache_key: &str) -> usize {
        lock(&self.shared.waiting)
            .get(cache_key)
            .map(|w| w.deferred.len())
            .unwrap_or(0)
    }

    pub fn network_threads(&self) -> usize {
        self.network_threads
    }
}

impl Drop for RequestQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for RequestQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestQueue")
            .field("network_threads", &self.network_threads)
            .field("in_flight", &self.in_flight_count())
            .field("running", &self.is_running())
            .finish()
    }
}
