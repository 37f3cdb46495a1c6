//! Shared test support utilities for integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use restgate_core::http::{HeaderValue, StatusCode};
use restgate_core::{ClientConfig, Error, Result, Transport, TransportRequest, TransportResponse};
use serde_json::Value;

/// Transport that replays queued responses and records every request
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<TransportResponse>>,
    requests: Mutex<Vec<TransportRequest>>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Transport that takes `latency` to answer each call
    pub fn with_latency(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            latency: Some(latency),
            ..Default::default()
        })
    }

    pub fn push(&self, response: TransportResponse) {
        self.responses.lock().push_back(response);
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    /// Highest number of calls that were in flight at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        self.requests.lock().push(request);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.responses
            .lock()
            .pop_front()
            .ok_or_else(|| Error::transport("no scripted response left"))
    }
}

pub fn json_response(status: u16, body: Value) -> TransportResponse {
    let mut response = TransportResponse::new(StatusCode::from_u16(status).unwrap());
    response.body = serde_json::to_vec(&body).unwrap();
    response
}

pub fn raw_response(status: u16, body: &str) -> TransportResponse {
    let mut response = TransportResponse::new(StatusCode::from_u16(status).unwrap());
    response.body = body.as_bytes().to_vec();
    response
}

pub fn empty_response(status: u16) -> TransportResponse {
    TransportResponse::new(StatusCode::from_u16(status).unwrap())
}

/// Attach rate-limit headers to a response
pub fn with_rate_limit(
    mut response: TransportResponse,
    remaining: u32,
    reset_after: &str,
) -> TransportResponse {
    response
        .headers
        .insert("x-ratelimit-limit", HeaderValue::from_static("5"));
    response.headers.insert(
        "x-ratelimit-remaining",
        HeaderValue::from_str(&remaining.to_string()).unwrap(),
    );
    response.headers.insert(
        "x-ratelimit-reset-after",
        HeaderValue::from_str(reset_after).unwrap(),
    );
    response
}

/// Test configuration without a reset guard margin
pub fn test_config() -> ClientConfig {
    ClientConfig::new("test-token")
        .with_base_url("https://api.test")
        .with_reset_margin(Duration::ZERO)
        .with_bucket_poll(Duration::from_millis(100))
}
