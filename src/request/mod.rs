//! 请求模块：请求标识、优先级、重试策略与响应解析。
//!
//! # Request Module
//!
//! A [`Request`] is the unit of work submitted to a
//! [`RequestQueue`](crate::queue::RequestQueue). Everything the dispatch core
//! needs is on the type-erased [`RequestCore`]; payload-specific behavior sits
//! behind the [`Dispatch`] capability set so the queues never see `T`.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`Request`] | Typed request with parser and callbacks |
//! | [`RequestCore`] | Identity, priority, flags, retry state |
//! | [`Dispatch`] | parse / deliver / finish over an erased payload |
//! | [`RetryPolicy`] | Per-request retry and timeout state |
//! | [`ResponseParser`] | Turns a network outcome into a typed [`Response`] |

mod parser;
mod retry;

pub use parser::{BytesParser, JsonParser, Response, ResponseParser, StringParser};
pub use retry::{
    DefaultRetryPolicy, RetryPolicy, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_MAX_RETRIES,
    DEFAULT_TIMEOUT_MS,
};

use crate::cache::{cache_key, CacheEntry, Headers};
use crate::error::RequestError;
use crate::network::{HttpRequest, NetworkOutcome};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";

pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
        }
    }

    fn carries_query_params(&self) -> bool {
        matches!(self, Method::Get | Method::Head | Method::Delete)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dispatch priority. Higher variants dequeue first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Immediate,
}

/// Receives the completion of a request. Implemented by the owning queue.
pub trait CompletionSink: Send + Sync {
    fn request_finished(&self, request: &RequestCore);
}

/// Type-erased request state shared by the queue and the dispatchers.
pub struct RequestCore {
    id: Uuid,
    method: Method,
    url: String,
    redirect_url: Mutex<Option<String>>,
    headers: Headers,
    params: Vec<(String, String)>,
    body: Option<Bytes>,
    content_type: Option<String>,
    priority: Priority,
    tag: Option<String>,
    should_cache: bool,
    sequence: u64,
    canceled: AtomicBool,
    delivered: AtomicBool,
    finished: AtomicBool,
    cache_entry: Mutex<Option<CacheEntry>>,
    retry_policy: Mutex<Box<dyn RetryPolicy>>,
    sink: Mutex<Option<Weak<dyn CompletionSink>>>,
    created: Instant,
}

impl RequestCore {
    fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            method,
            url: url.into(),
            redirect_url: Mutex::new(None),
            headers: Headers::new(),
            params: Vec::new(),
            body: None,
            content_type: None,
            priority: Priority::Normal,
            tag: None,
            should_cache: true,
            sequence: 0,
            canceled: AtomicBool::new(false),
            delivered: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            cache_entry: Mutex::new(None),
            retry_policy: Mutex::new(Box::new(DefaultRetryPolicy::default())),
            sink: Mutex::new(None),
            created: Instant::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// Redirect target when one was recorded, else the original URL.
    pub fn url(&self) -> String {
        lock(&self.redirect_url)
            .clone()
            .unwrap_or_else(|| self.url.clone())
    }

    pub fn origin_url(&self) -> &str {
        &self.url
    }

    pub fn set_redirect_url(&self, url: impl Into<String>) {
        *lock(&self.redirect_url) = Some(url.into());
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn should_cache(&self) -> bool {
        self.should_cache
    }

    pub fn cache_key(&self) -> String {
        cache_key(self.method.as_str(), &self.url)
    }

    /// Sequence assigned by the queue at enqueue time.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Higher priority first, then earlier enqueue. `Less` sorts first.
    pub fn dispatch_order(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| self.sequence.cmp(&other.sequence))
    }

    /// Advisory; checked by the dispatchers and at delivery.
    pub fn cancel(&self) {
        self.canceled.store(true, AtomicOrdering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(AtomicOrdering::SeqCst)
    }

    pub fn mark_delivered(&self) {
        self.delivered.store(true, AtomicOrdering::SeqCst);
    }

    pub fn has_had_response_delivered(&self) -> bool {
        self.delivered.load(AtomicOrdering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(AtomicOrdering::SeqCst)
    }

    pub fn cache_entry(&self) -> Option<CacheEntry> {
        lock(&self.cache_entry).clone()
    }

    pub fn set_cache_entry(&self, entry: Option<CacheEntry>) {
        *lock(&self.cache_entry) = entry;
    }

    /// Timeout for the next attempt.
    pub fn timeout(&self) -> Duration {
        lock(&self.retry_policy).current_timeout()
    }

    pub fn retry_count(&self) -> u32 {
        lock(&self.retry_policy).current_retry_count()
    }

    /// Consult the retry policy; `Ok` means attempt again.
    pub fn retry(&self, error: RequestError) -> Result<(), RequestError> {
        lock(&self.retry_policy).retry(error)
    }

    /// Record a lifecycle marker.
    pub fn add_marker(&self, marker: &str) {
        debug!(
            sequence = self.sequence,
            marker,
            elapsed_ms = self.created.elapsed().as_millis() as u64,
            url = self.url.as_str(),
            "request marker"
        );
    }

    /// Snapshot handed to the network executor for one attempt.
    pub fn http_request(&self) -> HttpRequest {
        HttpRequest {
            method: self.method,
            url: self.url(),
            headers: self.headers.clone(),
            body: self.body.clone(),
            content_type: self.content_type.clone(),
            timeout: self.timeout(),
        }
    }

    /// Encode params into the URL or body and attach queue state.
    pub(crate) fn prepare(&mut self, sequence: u64, sink: Weak<dyn CompletionSink>) {
        self.sequence = sequence;
        *lock(&self.sink) = Some(sink);

        if self.params.is_empty() {
            return;
        }
        if self.method.carries_query_params() {
            self.url = append_query(&self.url, &self.params);
        } else if self.body.is_none() {
            let encoded = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(self.params.iter())
                .finish();
            self.body = Some(Bytes::from(encoded));
            self.content_type = Some(FORM_CONTENT_TYPE.to_string());
        }
    }

    /// Mark finished and report to the queue. Returns `false` if the request
    /// had already finished.
    fn complete(&self, reason: &str) -> bool {
        if self.finished.swap(true, AtomicOrdering::SeqCst) {
            debug!(sequence = self.sequence, reason, "finish ignored, already finished");
            return false;
        }
        let sink = lock(&self.sink).take();
        if let Some(sink) = sink.and_then(|weak| weak.upgrade()) {
            sink.request_finished(self);
        }
        debug!(
            sequence = self.sequence,
            reason,
            total_ms = self.created.elapsed().as_millis() as u64,
            url = self.url.as_str(),
            "request finished"
        );
        true
    }
}

impl fmt::Debug for RequestCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestCore")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("url", &self.url)
            .field("priority", &self.priority)
            .field("sequence", &self.sequence)
            .field("canceled", &self.is_canceled())
            .finish()
    }
}

fn append_query(base: &str, params: &[(String, String)]) -> String {
    match url::Url::parse(base) {
        Ok(mut url) => {
            url.query_pairs_mut().extend_pairs(params.iter());
            url.to_string()
        }
        Err(_) => {
            let encoded = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(params.iter())
                .finish();
            let sep = if base.contains('?') { '&' } else { '?' };
            format!("{}{}{}", base, sep, encoded)
        }
    }
}

/// Erased payload moved between parse and delivery.
pub type Payload = Box<dyn Any + Send>;

/// Capability set the queue and dispatchers use, independent of the payload
/// type.
pub trait Dispatch: Send + Sync {
    fn core(&self) -> &RequestCore;

    fn parse(&self, outcome: &NetworkOutcome) -> Response<Payload>;

    fn deliver_response(&self, payload: Payload);

    fn deliver_error(&self, error: RequestError);

    /// Drop per-request callback state; called once after finish.
    fn release(&self);

    /// Finish exactly once: report to the queue, then release callbacks.
    fn finish(&self, reason: &str) {
        if self.core().complete(reason) {
            self.release();
        }
    }
}

type Listener<T> = Box<dyn FnMut(T) + Send>;
type ErrorListener = Box<dyn FnMut(RequestError) + Send>;

/// Typed request: core state plus a parser and result callbacks.
pub struct Request<T> {
    core: RequestCore,
    parser: Arc<dyn ResponseParser<T>>,
    listener: Mutex<Option<Listener<T>>>,
    error_listener: Mutex<Option<ErrorListener>>,
}

impl<T: Send + 'static> Request<T> {
    pub fn new(method: Method, url: impl Into<String>, parser: impl ResponseParser<T> + 'static) -> Self {
        Self {
            core: RequestCore::new(method, url),
            parser: Arc::new(parser),
            listener: Mutex::new(None),
            error_listener: Mutex::new(None),
        }
    }

    pub fn get(url: impl Into<String>, parser: impl ResponseParser<T> + 'static) -> Self {
        Self::new(Method::Get, url, parser)
    }

    pub fn core(&self) -> &RequestCore {
        &self.core
    }

    pub fn on_response(self, f: impl FnMut(T) + Send + 'static) -> Self {
        *lock(&self.listener) = Some(Box::new(f));
        self
    }

    pub fn on_error(self, f: impl FnMut(RequestError) + Send + 'static) -> Self {
        *lock(&self.error_listener) = Some(Box::new(f));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.core.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.core.headers = headers;
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.core.params.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        self.core.body = Some(body.into());
        self.core.content_type = Some(content_type.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.core.priority = priority;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.core.tag = Some(tag.into());
        self
    }

    pub fn with_should_cache(mut self, should_cache: bool) -> Self {
        self.core.should_cache = should_cache;
        self
    }

    pub fn with_redirect_url(self, url: impl Into<String>) -> Self {
        self.core.set_redirect_url(url);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        lock(&self.core.retry_policy).set_timeout(timeout);
        self
    }

    pub fn with_max_retries(self, max_retries: u32) -> Self {
        lock(&self.core.retry_policy).set_max_retries(max_retries);
        self
    }

    pub fn with_retry_policy(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.core.retry_policy = Mutex::new(Box::new(policy));
        self
    }

    pub(crate) fn core_mut(&mut self) -> &mut RequestCore {
        &mut self.core
    }
}

impl Request<String> {
    /// Request whose body is decoded as text.
    pub fn string(method: Method, url: impl Into<String>) -> Self {
        Self::new(method, url, StringParser)
    }
}

impl Request<Bytes> {
    /// Request delivering the raw body.
    pub fn bytes(method: Method, url: impl Into<String>) -> Self {
        Self::new(method, url, BytesParser)
    }
}

impl<V: DeserializeOwned + Send + 'static> Request<V> {
    /// Request whose body is deserialized from JSON.
    pub fn json(method: Method, url: impl Into<String>) -> Self {
        Self::new(method, url, JsonParser::<V>::new())
    }
}

impl<T: Send + 'static> Dispatch for Request<T> {
    fn core(&self) -> &RequestCore {
        &self.core
    }

    fn parse(&self, outcome: &NetworkOutcome) -> Response<Payload> {
        self.parser.parse(outcome).map(|v| Box::new(v) as Payload)
    }

    fn deliver_response(&self, payload: Payload) {
        match payload.downcast::<T>() {
            Ok(value) => {
                if let Some(listener) = lock(&self.listener).as_mut() {
                    listener(*value);
                }
            }
            Err(_) => warn!(
                sequence = self.core.sequence,
                "payload type mismatch, response dropped"
            ),
        }
    }

    fn deliver_error(&self, error: RequestError) {
        if let Some(listener) = lock(&self.error_listener).as_mut() {
            listener(error);
        }
    }

    fn release(&self) {
        lock(&self.listener).take();
        lock(&self.error_listener).take();
    }
}

impl<T> fmt::Debug for Request<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request").field("core", &self.core).finish()
    }
}
