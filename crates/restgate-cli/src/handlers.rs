//! Handler issuing one verb call through the gateway client

use std::fs;
use std::path::Path;

use restgate_core::http::payload::AUDIT_LOG_REASON;
use restgate_core::http::{encode_reason, HeaderMap, HeaderName, HeaderValue, Method};
use restgate_core::{Attachment, GatewayClient, RequestPayload};
use serde_json::{json, Value};
use tracing::{info, instrument};

use crate::cli::RequestArgs;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::logging::timing::Timer;
use crate::output::OutputWriter;

/// Run a single call and print its decoded result
#[instrument(skip(args, config, output), fields(route = %args.route))]
pub async fn handle_request(
    method: Method,
    args: RequestArgs,
    config: &Config,
    output: &mut OutputWriter,
) -> Result<()> {
    let _timer = Timer::with_details("request", &format!("{} {}", method, args.route));

    let payload = build_payload(&args).await?;
    let headers = build_headers(&args)?;
    if let Some(payload) = &payload {
        if payload.is_multipart() {
            output.info(&format!(
                "Uploading {} attachment(s)",
                payload.attachments().len()
            ))?;
        }
    }

    let client = GatewayClient::new(config.client.clone())?;
    info!(method = %method, "Issuing request");

    let value = client
        .request_with_headers(method, &args.route, payload, headers)
        .await?;
    output.response(value.as_ref())
}

/// Build the request body from `--json` and `--file`.
///
/// Returns `None` when neither was given. Attachments without `--json`
/// travel with an empty JSON object as their structured part.
pub async fn build_payload(args: &RequestArgs) -> Result<Option<RequestPayload>> {
    let body = args.json.as_deref().map(parse_json_arg).transpose()?;

    if body.is_none() && args.files.is_empty() {
        return Ok(None);
    }

    let mut payload = RequestPayload::json(body.unwrap_or_else(|| json!({})));

    for path in &args.files {
        if !path.exists() {
            return Err(Error::FileNotFound { path: path.clone() });
        }
        payload = payload.with_attachment(Attachment::from_path(path).await?);
    }

    Ok(Some(payload))
}

/// Build per-call header overrides from `--header` and `--reason`
pub fn build_headers(args: &RequestArgs) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();

    for (name, value) in &args.headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| Error::invalid_args(format!("invalid header name '{}'", name)))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|_| Error::invalid_args(format!("invalid value for header '{}'", name)))?;
        headers.insert(header_name, header_value);
    }

    if let Some(reason) = &args.reason {
        let value = HeaderValue::from_str(&encode_reason(reason))
            .map_err(|_| Error::invalid_args("reason cannot be sent as a header"))?;
        headers.insert(AUDIT_LOG_REASON, value);
    }

    Ok(headers)
}

/// Parse an inline JSON body or read it from `@FILE`
fn parse_json_arg(raw: &str) -> Result<Value> {
    match raw.strip_prefix('@') {
        Some(file) => {
            let path = Path::new(file);
            if !path.exists() {
                return Err(Error::FileNotFound {
                    path: path.to_path_buf(),
                });
            }
            let content = fs::read_to_string(path)?;
            serde_json::from_str(&content).map_err(|_| Error::InvalidFormat {
                path: path.to_path_buf(),
                expected: "JSON".to_string(),
            })
        }
        None => serde_json::from_str(raw)
            .map_err(|e| Error::invalid_args(format!("--json is not valid JSON: {}", e))),
    }
}
