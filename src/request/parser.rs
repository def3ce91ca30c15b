//! Payload parsers turning a [`NetworkOutcome`] into a typed [`Response`].

use crate::cache::{parse_cache_headers, parse_charset, CacheEntry};
use crate::error::RequestError;
use crate::network::NetworkOutcome;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

/// Parsed result of one resolution, plus what to persist.
#[derive(Debug)]
pub struct Response<T> {
    pub result: Result<T, RequestError>,
    /// Entry to write to the cache for this request's key.
    pub cache_entry: Option<CacheEntry>,
    /// More deliveries follow for this request; do not finish it yet.
    pub intermediate: bool,
}

impl<T> Response<T> {
    pub fn success(value: T, cache_entry: Option<CacheEntry>) -> Self {
        Self {
            result: Ok(value),
            cache_entry,
            intermediate: false,
        }
    }

    pub fn error(error: RequestError) -> Self {
        Self {
            result: Err(error),
            cache_entry: None,
            intermediate: false,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Response<U> {
        Response {
            result: self.result.map(f),
            cache_entry: self.cache_entry,
            intermediate: self.intermediate,
        }
    }
}

/// Decodes a network outcome for one request variant.
///
/// A body that cannot be decoded yields an error [`Response`], never a panic.
pub trait ResponseParser<T>: Send + Sync {
    fn parse(&self, outcome: &NetworkOutcome) -> Response<T>;
}

impl<T, F> ResponseParser<T> for F
where
    F: Fn(&NetworkOutcome) -> Response<T> + Send + Sync,
{
    fn parse(&self, outcome: &NetworkOutcome) -> Response<T> {
        self(outcome)
    }
}

/// Text body decoded with the charset named by `Content-Type`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringParser;

impl ResponseParser<String> for StringParser {
    fn parse(&self, outcome: &NetworkOutcome) -> Response<String> {
        let charset = parse_charset(&outcome.headers, crate::cache::DEFAULT_CONTENT_CHARSET);
        let text = decode_text(&outcome.data, &charset);
        Response::success(text, parse_cache_headers(outcome))
    }
}

fn decode_text(data: &[u8], charset: &str) -> String {
    let charset = charset.to_ascii_lowercase();
    match charset.as_str() {
        "iso-8859-1" | "latin1" | "latin-1" | "us-ascii" => {
            data.iter().map(|&b| b as char).collect()
        }
        _ => match std::str::from_utf8(data) {
            Ok(s) => s.to_string(),
            Err(_) => String::from_utf8_lossy(data).into_owned(),
        },
    }
}

/// JSON body deserialized with `serde_json`.
pub struct JsonParser<V> {
    _marker: PhantomData<fn() -> V>,
}

impl<V> JsonParser<V> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<V> Default for JsonParser<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> ResponseParser<V> for JsonParser<V>
where
    V: DeserializeOwned,
{
    fn parse(&self, outcome: &NetworkOutcome) -> Response<V> {
        match serde_json::from_slice::<V>(&outcome.data) {
            Ok(value) => Response::success(value, parse_cache_headers(outcome)),
            Err(e) => Response::error(RequestError::parse(e.to_string())),
        }
    }
}

/// Raw body bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesParser;

impl ResponseParser<Bytes> for BytesParser {
    fn parse(&self, outcome: &NetworkOutcome) -> Response<Bytes> {
        Response::success(outcome.data.clone(), parse_cache_headers(outcome))
    }
}
