//! HTTP request pipeline for the REST API
//!
//! This module provides:
//! - Route handling and rate-limit bucket key derivation
//! - Per-bucket rate-limit tracking fed by response headers
//! - JSON and multipart payload encoding
//! - A bounded-concurrency FIFO scheduler
//! - An overwrite-only cache for read requests
//! - Error envelope decoding
//! - The gateway client tying all of it together

pub mod cache;
pub mod client;
pub mod dispatch;
pub mod error;
pub mod payload;
pub mod rate_limit;
pub mod route;
pub mod scheduler;
pub mod transport;

pub use cache::ResponseCache;
pub use client::GatewayClient;
pub use dispatch::{DeserializeDispatch, Dispatch, PassthroughDispatch};
pub use error::{flatten_error_tree, ApiError, ErrorEnvelope};
pub use payload::{
    encode_reason, mime_for_filename, Attachment, EncodedPayload, PayloadKind, PayloadMetadata,
    RequestPayload,
};
pub use rate_limit::{BucketState, BucketTable, RateLimitBucket, RateLimitHeaders};
pub use route::{bucket_key, Route};
pub use scheduler::{OperationHandle, OperationState, RequestScheduler};
pub use transport::{ReqwestTransport, Transport, TransportRequest, TransportResponse};

// Re-export commonly used types
pub use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
pub use reqwest::{Method, StatusCode};
