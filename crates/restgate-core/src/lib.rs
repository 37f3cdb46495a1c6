//! Restgate Core - rate-limit aware request pipeline for REST APIs
//!
//! This crate paces, encodes and executes HTTP calls against a service that
//! enforces server-driven, per-route rate limits, and normalizes failures
//! into a single error model.
//!
//! # Main Components
//!
//! - **Scheduler**: bounded-concurrency FIFO admission of calls
//! - **Rate limits**: per-route buckets refreshed from response headers
//! - **Payloads**: JSON and multipart (JSON + attachments) bodies
//! - **Client**: the [`GatewayClient`] verbs tying everything together
//!
//! # Example
//!
//! ```no_run
//! use restgate_core::{ClientConfig, GatewayClient, RequestPayload, Result};
//! use serde_json::json;
//!
//! async fn example() -> Result<()> {
//!     let client = GatewayClient::new(ClientConfig::new("my-token"))?;
//!     let message = client
//!         .post(
//!             "/channels/123456789012345678/messages",
//!             Some(RequestPayload::json(json!({"content": "hello"}))),
//!         )
//!         .await?;
//!     println!("{:?}", message);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod http;

pub use config::{AuthScheme, ClientConfig};
pub use error::{Error, Result};
pub use http::{
    ApiError, Attachment, DeserializeDispatch, Dispatch, GatewayClient, PassthroughDispatch,
    RequestPayload, Transport, TransportRequest, TransportResponse,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
