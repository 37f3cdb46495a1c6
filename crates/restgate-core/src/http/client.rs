//! Gateway client orchestrating the request pipeline
//!
//! Every verb call is queued on the [`RequestScheduler`] and, once admitted,
//! walks the same pipeline: cache lookup for reads, gating on the route's
//! rate-limit bucket, header and body assembly, the transport call, bucket
//! refresh, response classification, and hand-off to the dispatch
//! collaborator.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::Method;
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

use crate::config::ClientConfig;
use crate::http::cache::ResponseCache;
use crate::http::dispatch::{Dispatch, PassthroughDispatch};
use crate::http::error::decode_failure;
use crate::http::payload::{RequestPayload, JSON_CONTENT_TYPE};
use crate::http::rate_limit::BucketTable;
use crate::http::route::Route;
use crate::http::scheduler::RequestScheduler;
use crate::http::transport::{ReqwestTransport, Transport, TransportRequest, TransportResponse};
use crate::{Error, Result};

/// Rate-limit aware REST client
pub struct GatewayClient<D: Dispatch = PassthroughDispatch> {
    inner: Arc<ClientInner<D>>,
    scheduler: RequestScheduler,
}

struct ClientInner<D: Dispatch> {
    config: ClientConfig,
    api_root: String,
    default_headers: HeaderMap,
    transport: Arc<dyn Transport>,
    dispatch: D,
    buckets: BucketTable,
    cache: ResponseCache<D::Output>,
}

impl GatewayClient<PassthroughDispatch> {
    /// Create a client that talks HTTP through reqwest and returns raw JSON
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(Duration::from_secs(config.timeout_secs))?;
        Self::with_parts(config, Arc::new(transport), PassthroughDispatch)
    }
}

impl<D: Dispatch> GatewayClient<D> {
    /// Create a client from its collaborators.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn with_parts(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        dispatch: D,
    ) -> Result<Self> {
        config.validate()?;

        let default_headers = default_headers(&config)?;
        let scheduler = RequestScheduler::new(config.concurrency);
        let buckets = BucketTable::new(config.reset_margin(), config.bucket_poll());

        let inner = ClientInner {
            api_root: config.api_root(),
            config,
            default_headers,
            transport,
            dispatch,
            buckets,
            cache: ResponseCache::new(),
        };

        Ok(Self {
            inner: Arc::new(inner),
            scheduler,
        })
    }

    pub async fn get(
        &self,
        route: &str,
        payload: Option<RequestPayload>,
    ) -> Result<Option<D::Output>> {
        self.request(Method::GET, route, payload).await
    }

    pub async fn post(
        &self,
        route: &str,
        payload: Option<RequestPayload>,
    ) -> Result<Option<D::Output>> {
        self.request(Method::POST, route, payload).await
    }

    pub async fn put(
        &self,
        route: &str,
        payload: Option<RequestPayload>,
    ) -> Result<Option<D::Output>> {
        self.request(Method::PUT, route, payload).await
    }

    pub async fn patch(
        &self,
        route: &str,
        payload: Option<RequestPayload>,
    ) -> Result<Option<D::Output>> {
        self.request(Method::PATCH, route, payload).await
    }

    pub async fn delete(
        &self,
        route: &str,
        payload: Option<RequestPayload>,
    ) -> Result<Option<D::Output>> {
        self.request(Method::DELETE, route, payload).await
    }

    /// Queue a call and wait for its result.
    ///
    /// Resolves to `None` when the server answered with an empty body.
    pub async fn request(
        &self,
        method: Method,
        route: &str,
        payload: Option<RequestPayload>,
    ) -> Result<Option<D::Output>> {
        self.request_with_headers(method, route, payload, HeaderMap::new())
            .await
    }

    /// Like [`request`](Self::request), with headers applied over the defaults.
    ///
    /// Overrides carried by the payload still take precedence over `headers`.
    pub async fn request_with_headers(
        &self,
        method: Method,
        route: &str,
        payload: Option<RequestPayload>,
        headers: HeaderMap,
    ) -> Result<Option<D::Output>> {
        let route = Route::new(method, route);
        let inner = Arc::clone(&self.inner);
        self.scheduler
            .submit(async move { inner.execute(route, payload, headers).await })
            .await
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn buckets(&self) -> &BucketTable {
        &self.inner.buckets
    }

    pub fn cache(&self) -> &ResponseCache<D::Output> {
        &self.inner.cache
    }

    pub fn scheduler(&self) -> &RequestScheduler {
        &self.scheduler
    }

    /// Drop the cached read result for an exact route
    pub fn invalidate_cached(&self, route: &str) -> Option<D::Output> {
        self.inner.cache.invalidate(Route::new(Method::GET, route).path())
    }
}

impl<D: Dispatch> Clone for GatewayClient<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<D: Dispatch> ClientInner<D> {
    async fn execute(
        &self,
        route: Route,
        payload: Option<RequestPayload>,
        overrides: HeaderMap,
    ) -> Result<Option<D::Output>> {
        let bucket = route.bucket_key();

        if route.is_cacheable() {
            if let Some(cached) = self.cache.get(route.path()) {
                debug!(route = %route.path(), "Serving read from cache");
                return Ok(Some(cached));
            }
        }

        let waited = self.buckets.wait_until_available(&bucket).await;
        if !waited.is_zero() {
            debug!(
                bucket = %bucket,
                waited_ms = waited.as_millis() as u64,
                "Request was gated on an exhausted bucket"
            );
        }

        let request = self.build_request(&route, payload.as_ref(), &overrides)?;

        let started = Instant::now();
        let response = self.transport.send(request).await?;
        debug!(
            method = %route.method(),
            route = %route.path(),
            bucket = %bucket,
            status = response.status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Request completed"
        );

        self.buckets.update_from_headers(&bucket, &response.headers);

        let resolved = self.classify(response)?;

        if route.is_cacheable() {
            if let Some(value) = &resolved {
                self.cache.insert(route.path(), value.clone());
            }
        }

        Ok(resolved)
    }

    fn build_request(
        &self,
        route: &Route,
        payload: Option<&RequestPayload>,
        overrides: &HeaderMap,
    ) -> Result<TransportRequest> {
        let mut headers = self.default_headers.clone();
        for (name, value) in overrides {
            headers.insert(name.clone(), value.clone());
        }

        let body = match payload {
            None => Vec::new(),
            Some(payload) => {
                let encoded = payload.encode()?;

                let metadata = payload.metadata();
                if !metadata.is_empty() {
                    for (name, value) in metadata.headers() {
                        headers.insert(name.clone(), value.clone());
                    }
                }

                // Multipart bodies are only valid with their own boundary
                if encoded.forced_content_type {
                    let content_type =
                        HeaderValue::from_str(&encoded.content_type).map_err(|_| {
                            Error::encoding("generated content type is not a valid header")
                        })?;
                    headers.insert(CONTENT_TYPE, content_type);
                }

                encoded.body
            }
        };

        Ok(TransportRequest {
            method: route.method().clone(),
            url: route.url(&self.api_root),
            headers,
            body,
        })
    }

    fn classify(&self, response: TransportResponse) -> Result<Option<D::Output>> {
        if !response.is_success() {
            return Err(decode_failure(
                response.status.as_u16(),
                response.reason(),
                &response.body,
            ));
        }

        if response.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        let value: Value = serde_json::from_slice(&response.body).map_err(|e| Error::Json {
            message: format!(
                "response body for status {} is not valid JSON",
                response.status.as_u16()
            ),
            source: e,
        })?;

        self.dispatch.dispatch(value).map(Some)
    }
}

fn default_headers(config: &ClientConfig) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();

    let authorization = HeaderValue::from_str(&config.authorization())
        .map_err(|_| Error::configuration("token contains characters not allowed in a header"))?;
    let user_agent = HeaderValue::from_str(&config.user_agent)
        .map_err(|_| Error::configuration("user_agent is not a valid header value"))?;

    headers.insert(AUTHORIZATION, authorization);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
    headers.insert(USER_AGENT, user_agent);

    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct NoTransport;

    #[async_trait]
    impl Transport for NoTransport {
        async fn send(&self, _request: TransportRequest) -> Result<TransportResponse> {
            Err(Error::transport("offline"))
        }
    }

    fn client() -> GatewayClient {
        GatewayClient::with_parts(
            ClientConfig::new("secret").with_base_url("https://api.test"),
            Arc::new(NoTransport),
            PassthroughDispatch,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_default_headers_without_payload() {
        let client = client();
        let request = client
            .inner
            .build_request(&Route::new(Method::GET, "/users/@me"), None, &HeaderMap::new())
            .unwrap();

        assert_eq!(request.url, "https://api.test/api/v10/users/@me");
        assert_eq!(request.headers.get(AUTHORIZATION).unwrap(), "Bot secret");
        assert_eq!(request.headers.get(CONTENT_TYPE).unwrap(), "application/json");
        assert!(request.headers.contains_key(USER_AGENT));
        assert!(request.body.is_empty());
    }

    #[tokio::test]
    async fn test_overrides_apply_to_structured_payloads() {
        let client = client();
        let payload = RequestPayload::json(json!({"a": 1}))
            .with_header("Content-Type", "application/merge-patch+json")
            .unwrap();
        let request = client
            .inner
            .build_request(&Route::new(Method::PATCH, "/x"), Some(&payload), &HeaderMap::new())
            .unwrap();

        assert_eq!(
            request.headers.get(CONTENT_TYPE).unwrap(),
            "application/merge-patch+json"
        );
    }

    #[tokio::test]
    async fn test_multipart_content_type_cannot_be_overridden() {
        let client = client();
        let payload = RequestPayload::json(json!({}))
            .with_attachment(crate::http::Attachment::new("a.png", vec![1, 2, 3]).unwrap())
            .with_header("Content-Type", "text/evil")
            .unwrap();
        let request = client
            .inner
            .build_request(&Route::new(Method::POST, "/x"), Some(&payload), &HeaderMap::new())
            .unwrap();

        let content_type = request.headers.get(CONTENT_TYPE).unwrap().to_str().unwrap();
        assert!(content_type.starts_with("multipart/form-data; boundary="));
    }

    #[tokio::test]
    async fn test_header_overrides_without_payload() {
        let client = client();
        let mut overrides = HeaderMap::new();
        overrides.insert("x-audit-log-reason", HeaderValue::from_static("tidy%20up"));
        overrides.insert(USER_AGENT, HeaderValue::from_static("custom-agent"));

        let request = client
            .inner
            .build_request(&Route::new(Method::DELETE, "/x"), None, &overrides)
            .unwrap();

        assert_eq!(request.headers.get("x-audit-log-reason").unwrap(), "tidy%20up");
        assert_eq!(request.headers.get(USER_AGENT).unwrap(), "custom-agent");
        assert_eq!(request.headers.get(AUTHORIZATION).unwrap(), "Bot secret");
        assert!(request.body.is_empty());
    }

    #[tokio::test]
    async fn test_payload_overrides_beat_call_headers() {
        let client = client();
        let mut overrides = HeaderMap::new();
        overrides.insert("x-trace", HeaderValue::from_static("call"));
        let payload = RequestPayload::json(json!({}))
            .with_header("X-Trace", "payload")
            .unwrap();

        let request = client
            .inner
            .build_request(&Route::new(Method::POST, "/x"), Some(&payload), &overrides)
            .unwrap();

        assert_eq!(request.headers.get("x-trace").unwrap(), "payload");
    }

    #[tokio::test]
    async fn test_transport_failure_surfaces() {
        let client = client();
        let result = client.post("/channels/1/messages", None).await;
        assert!(matches!(result, Err(Error::Transport { .. })));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let result = GatewayClient::with_parts(
            ClientConfig::default(),
            Arc::new(NoTransport),
            PassthroughDispatch,
        );
        assert!(matches!(result, Err(Error::Configuration { .. })));
    }
}
