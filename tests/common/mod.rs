//! Shared fixtures: a scripted network executor and a queue harness that
//! delivers on a test-driven loop.

#![allow(dead_code)]

use async_trait::async_trait;
use bees_http::cache::{Cache, DiskCache, Headers};
use bees_http::delivery::{ChannelExecutor, DeliveryLoop, ExecutorDelivery};
use bees_http::network::{HttpRequest, NetworkExecutor, NetworkOutcome, TransportError};
use bees_http::queue::RequestQueue;
use bees_http::request::{Method, Request};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Semaphore;

type Script =
    Box<dyn Fn(usize, &HttpRequest) -> Result<NetworkOutcome, TransportError> + Send + Sync>;

/// One observed executor call.
#[derive(Debug, Clone)]
pub struct Call {
    pub url: String,
    pub timeout: Duration,
    pub extra_headers: Headers,
}

/// Network executor answering from a script and recording every call.
pub struct ScriptedNetwork {
    script: Script,
    calls: Mutex<Vec<Call>>,
    attempts: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedNetwork {
    pub fn new(
        script: impl Fn(usize, &HttpRequest) -> Result<NetworkOutcome, TransportError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            gate: None,
        }
    }

    /// Hold every call until permits are added to the returned semaphore.
    pub fn gated(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.gate = Some(gate.clone());
        (self, gate)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NetworkExecutor for ScriptedNetwork {
    async fn perform(
        &self,
        request: &HttpRequest,
        extra_headers: &Headers,
    ) -> Result<NetworkOutcome, TransportError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(Call {
            url: request.url.clone(),
            timeout: request.timeout,
            extra_headers: extra_headers.clone(),
        });
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        (self.script)(attempt, request)
    }
}

/// 200 response with a one-minute freshness lifetime.
pub fn cacheable(body: &str) -> NetworkOutcome {
    let mut headers = Headers::new();
    headers.insert("Cache-Control".into(), "max-age=60".into());
    headers.insert("Content-Type".into(), "text/plain; charset=utf-8".into());
    NetworkOutcome::new(200, body.to_string(), headers)
}

pub fn status(code: u16) -> NetworkOutcome {
    NetworkOutcome::new(code, "", Headers::new())
}

pub type Events = Arc<Mutex<Vec<String>>>;

/// Request recording `ok:<body>` / `err:<class>` into `events`.
pub fn recorded(url: &str, events: &Events) -> Request<String> {
    let ok = events.clone();
    let err = events.clone();
    Request::string(Method::Get, url)
        .on_response(move |body| ok.lock().unwrap().push(format!("ok:{}", body)))
        .on_error(move |e| err.lock().unwrap().push(format!("err:{}", e.class())))
}

pub fn init_tracing() {
    if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
}

/// A queue over a temp-dir disk cache whose callbacks run only when the
/// test drives [`Harness::deliver_until`].
pub struct Harness {
    pub queue: RequestQueue,
    pub network: Arc<ScriptedNetwork>,
    pub cache: Arc<DiskCache>,
    pub events: Events,
    driver: DeliveryLoop,
    _dir: TempDir,
}

impl Harness {
    pub fn new(network: ScriptedNetwork, network_threads: usize) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(DiskCache::new(dir.path(), 1024 * 1024));
        Self::with_cache(network, network_threads, cache, dir)
    }

    /// Harness over a caller-built cache; `dir` is kept alive with it.
    pub fn with_cache(
        network: ScriptedNetwork,
        network_threads: usize,
        cache: Arc<DiskCache>,
        dir: TempDir,
    ) -> Self {
        init_tracing();
        let network = Arc::new(network);
        let (executor, driver) = ChannelExecutor::new();

        let queue = RequestQueue::builder()
            .network_threads(network_threads)
            .cache(cache.clone())
            .network(network.clone())
            .delivery(Arc::new(ExecutorDelivery::new(executor)))
            .build()
            .unwrap();

        Self {
            queue,
            network,
            cache,
            events: Arc::new(Mutex::new(Vec::new())),
            driver,
            _dir: dir,
        }
    }

    pub fn start(&self) {
        self.queue.start().unwrap();
    }

    pub async fn seed(&self, url: &str, entry: bees_http::CacheEntry) {
        self.cache.put(&format!("GET:{}", url), entry).await;
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    /// Run delivery jobs until `n` callbacks have fired.
    pub async fn deliver_until(&mut self, n: usize) {
        while self.events.lock().unwrap().len() < n {
            let ran = tokio::time::timeout(Duration::from_secs(5), self.driver.next())
                .await
                .expect("timed out waiting for delivery");
            assert!(ran, "delivery loop closed");
        }
    }

    /// Run whatever arrives within `window`, then stop.
    pub async fn drain_for(&mut self, window: Duration) {
        let deadline = tokio::time::Instant::now() + window;
        while let Ok(true) = tokio::time::timeout_at(deadline, self.driver.next()).await {}
    }

    /// Poll until `cond` holds.
    pub async fn wait_for(&self, cond: impl Fn(&Self) -> bool) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !cond(self) {
            assert!(
                tokio::time::Instant::now() < deadline,
                "condition not reached in time"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}
