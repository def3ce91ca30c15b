use super::{HttpRequest, NetworkExecutor, NetworkOutcome, TransportError};
use crate::cache::Headers;
use crate::request::Method;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::Proxy;
use std::env;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Requests slower than this are logged at info level.
const SLOW_REQUEST_THRESHOLD: Duration = Duration::from_millis(3000);

/// Network executor backed by a pooled `reqwest` client.
pub struct ReqwestExecutor {
    client: reqwest::Client,
}

impl ReqwestExecutor {
    pub fn new() -> Result<Self> {
        // Minimal production-friendly defaults (env-overridable).
        let mut builder = reqwest::Client::builder()
            .pool_max_idle_per_host(
                env::var("BEES_HTTP_POOL_MAX_IDLE_PER_HOST")
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(32),
            )
            .pool_idle_timeout(Some(Duration::from_secs(90)));

        if let Ok(proxy_url) = env::var("BEES_PROXY_URL") {
            if let Ok(proxy) = Proxy::all(&proxy_url) {
                builder = builder.proxy(proxy);
            }
        }

        let client = builder
            .build()
            .map_err(|e| Error::Transport(TransportError::Other(e.to_string())))?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn map_error(e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Http(e)
        }
    }
}

#[async_trait]
impl NetworkExecutor for ReqwestExecutor {
    async fn perform(
        &self,
        request: &HttpRequest,
        extra_headers: &Headers,
    ) -> std::result::Result<NetworkOutcome, TransportError> {
        let started = Instant::now();

        let mut req = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
            Method::Put => self.client.put(&request.url),
            Method::Delete => self.client.delete(&request.url),
            Method::Head => self.client.head(&request.url),
        }
        .timeout(request.timeout);

        for (name, value) in request.headers.iter().chain(extra_headers.iter()) {
            req = req.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            if let Some(ct) = &request.content_type {
                req = req.header(reqwest::header::CONTENT_TYPE, ct.as_str());
            }
            req = req.body(body.clone());
        }

        let resp = req.send().await.map_err(Self::map_error)?;
        let status = resp.status().as_u16();

        let mut headers = Headers::new();
        for (name, value) in resp.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.as_str().to_string(), v.to_string());
            }
        }

        let data = if request.method == Method::Head || status == 204 || status == 304 {
            bytes::Bytes::new()
        } else {
            resp.bytes().await.map_err(Self::map_error)?
        };

        let elapsed = started.elapsed();
        if elapsed > SLOW_REQUEST_THRESHOLD {
            info!(
                url = request.url.as_str(),
                http_status = status,
                size = data.len(),
                duration_ms = elapsed.as_millis() as u64,
                "slow HTTP response"
            );
        } else {
            debug!(
                url = request.url.as_str(),
                http_status = status,
                duration_ms = elapsed.as_millis() as u64,
                "HTTP response"
            );
        }

        Ok(NetworkOutcome::new(status, data, headers).with_network_time(elapsed))
    }
}
