//! Request payloads and their wire encodings
//!
//! A [`RequestPayload`] is either a structured JSON value or a JSON value
//! accompanied by file attachments. Encoding produces the body bytes plus the
//! content type they imply; the route the payload is sent to plays no part.

use std::path::Path;

use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde_json::Value;

use crate::{Error, Result};

/// Content type of structured bodies
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Content type used for attachments with unknown extensions
pub const DEFAULT_ATTACHMENT_TYPE: &str = "text/plain";

/// Form field holding the structured part of a multipart body
pub const PAYLOAD_PART_NAME: &str = "payload_json";

/// Header carrying the audit-log reason for moderation endpoints
pub const AUDIT_LOG_REASON: &str = "x-audit-log-reason";

const MIME_TYPES: &[(&str, &str)] = &[
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("svg", "image/svg+xml"),
    ("bmp", "image/bmp"),
    ("txt", "text/plain"),
    ("md", "text/markdown"),
    ("csv", "text/csv"),
    ("html", "text/html"),
    ("json", "application/json"),
    ("pdf", "application/pdf"),
    ("zip", "application/zip"),
    ("mp3", "audio/mpeg"),
    ("ogg", "audio/ogg"),
    ("wav", "audio/wav"),
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
    ("mov", "video/quicktime"),
];

/// Resolve a MIME type from a file name's extension
pub fn mime_for_filename(file_name: &str) -> &'static str {
    let extension = match file_name.rsplit_once('.') {
        Some((_, extension)) => extension.to_ascii_lowercase(),
        None => return DEFAULT_ATTACHMENT_TYPE,
    };

    MIME_TYPES
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, mime)| *mime)
        .unwrap_or(DEFAULT_ATTACHMENT_TYPE)
}

/// Percent-encode an audit-log reason for use as a header value
pub fn encode_reason(reason: &str) -> String {
    url::form_urlencoded::byte_serialize(reason.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// A file sent alongside a structured payload
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    file_name: String,
    mime_type: &'static str,
    data: Vec<u8>,
}

impl Attachment {
    /// Create an attachment; the MIME type is derived from the file name.
    ///
    /// Names that are empty or would break the part headers are rejected.
    pub fn new(file_name: impl Into<String>, data: impl Into<Vec<u8>>) -> Result<Self> {
        let file_name = file_name.into();

        if file_name.trim().is_empty() {
            return Err(Error::encoding("attachment file name cannot be empty"));
        }
        if file_name.contains(['"', '\r', '\n']) {
            return Err(Error::encoding(format!(
                "attachment file name contains forbidden characters: {:?}",
                file_name
            )));
        }

        let mime_type = mime_for_filename(&file_name);
        Ok(Self {
            file_name,
            mime_type,
            data: data.into(),
        })
    }

    /// Read an attachment from disk, named after the file
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                Error::encoding(format!("attachment path has no file name: {}", path.display()))
            })?
            .to_string();

        let data = tokio::fs::read(path).await.map_err(|e| Error::Encoding {
            message: format!("failed to read attachment {}", path.display()),
            source: Some(e.into()),
        })?;

        Self::new(file_name, data)
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn mime_type(&self) -> &'static str {
        self.mime_type
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Body shape of a payload
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadKind {
    /// Sent as a JSON body
    Structured(Value),
    /// Sent as `multipart/form-data`, attachments in order
    MultipartAttachments(Value, Vec<Attachment>),
}

/// Caller supplied header overrides
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PayloadMetadata {
    headers: HeaderMap,
}

impl PayloadMetadata {
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

/// Body of an outbound request plus its header overrides
#[derive(Debug, Clone, PartialEq)]
pub struct RequestPayload {
    kind: PayloadKind,
    metadata: PayloadMetadata,
}

/// Wire form of a payload
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedPayload {
    pub content_type: String,
    pub body: Vec<u8>,
    /// Whether the content type must win over caller overrides
    pub forced_content_type: bool,
}

impl RequestPayload {
    /// Structured payload from a JSON value
    pub fn json(value: Value) -> Self {
        Self {
            kind: PayloadKind::Structured(value),
            metadata: PayloadMetadata::default(),
        }
    }

    /// Structured payload from any serializable value
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        let value = serde_json::to_value(value).map_err(|e| Error::Json {
            message: "failed to serialize payload".to_string(),
            source: e,
        })?;
        Ok(Self::json(value))
    }

    /// Multipart payload with a structured part and attachments
    pub fn multipart(value: Value, attachments: Vec<Attachment>) -> Self {
        Self {
            kind: PayloadKind::MultipartAttachments(value, attachments),
            metadata: PayloadMetadata::default(),
        }
    }

    /// Append an attachment, switching a structured payload to multipart
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.kind = match self.kind {
            PayloadKind::Structured(value) => {
                PayloadKind::MultipartAttachments(value, vec![attachment])
            }
            PayloadKind::MultipartAttachments(value, mut attachments) => {
                attachments.push(attachment);
                PayloadKind::MultipartAttachments(value, attachments)
            }
        };
        self
    }

    /// Add a header override; name and value are validated here
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| Error::encoding(format!("invalid header name: {:?}", name)))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|_| Error::encoding(format!("invalid value for header {}", name)))?;
        self.metadata.headers.insert(header_name, header_value);
        Ok(self)
    }

    /// Attach an audit-log reason, percent-encoded
    pub fn with_reason(self, reason: &str) -> Result<Self> {
        self.with_header(AUDIT_LOG_REASON, &encode_reason(reason))
    }

    pub fn kind(&self) -> &PayloadKind {
        &self.kind
    }

    pub fn metadata(&self) -> &PayloadMetadata {
        &self.metadata
    }

    /// Attachments in part order; empty for structured payloads
    pub fn attachments(&self) -> &[Attachment] {
        match &self.kind {
            PayloadKind::Structured(_) => &[],
            PayloadKind::MultipartAttachments(_, attachments) => attachments,
        }
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self.kind, PayloadKind::MultipartAttachments(..))
    }

    /// Encode the payload, generating a fresh boundary for multipart bodies
    pub fn encode(&self) -> Result<EncodedPayload> {
        match &self.kind {
            PayloadKind::Structured(value) => Ok(EncodedPayload {
                content_type: JSON_CONTENT_TYPE.to_string(),
                body: encode_json(value)?,
                forced_content_type: false,
            }),
            PayloadKind::MultipartAttachments(value, attachments) => {
                self.encode_multipart(value, attachments, &generate_boundary())
            }
        }
    }

    fn encode_multipart(
        &self,
        value: &Value,
        attachments: &[Attachment],
        boundary: &str,
    ) -> Result<EncodedPayload> {
        let json = encode_json(value)?;
        let mut body = Vec::with_capacity(
            json.len() + attachments.iter().map(|a| a.data.len() + 160).sum::<usize>() + 256,
        );

        write_part_head(&mut body, boundary, PAYLOAD_PART_NAME, None, JSON_CONTENT_TYPE);
        body.extend_from_slice(&json);
        body.extend_from_slice(b"\r\n");

        for (index, attachment) in attachments.iter().enumerate() {
            let name = format!("files[{}]", index);
            write_part_head(
                &mut body,
                boundary,
                &name,
                Some(&attachment.file_name),
                attachment.mime_type,
            );
            body.extend_from_slice(&attachment.data);
            body.extend_from_slice(b"\r\n");
        }

        body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());

        Ok(EncodedPayload {
            content_type: format!("multipart/form-data; boundary={}", boundary),
            body,
            forced_content_type: true,
        })
    }
}

fn encode_json(value: &Value) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| Error::Json {
        message: "failed to encode structured payload".to_string(),
        source: e,
    })
}

fn write_part_head(
    body: &mut Vec<u8>,
    boundary: &str,
    name: &str,
    file_name: Option<&str>,
    content_type: &str,
) {
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    match file_name {
        Some(file_name) => body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                name, file_name
            )
            .as_bytes(),
        ),
        None => body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{}\"\r\n", name).as_bytes(),
        ),
    }
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
}

fn generate_boundary() -> String {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();
    format!("restgate-{}", token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn boundary_of(encoded: &EncodedPayload) -> String {
        encoded
            .content_type
            .strip_prefix("multipart/form-data; boundary=")
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_mime_table() {
        assert_eq!(mime_for_filename("a.png"), "image/png");
        assert_eq!(mime_for_filename("photo.JPEG"), "image/jpeg");
        assert_eq!(mime_for_filename("b.txt"), "text/plain");
        assert_eq!(mime_for_filename("archive.tar.zip"), "application/zip");
        assert_eq!(mime_for_filename("unknown.xyz"), DEFAULT_ATTACHMENT_TYPE);
        assert_eq!(mime_for_filename("README"), DEFAULT_ATTACHMENT_TYPE);
    }

    #[test]
    fn test_attachment_validation() {
        assert!(Attachment::new("", b"x".to_vec()).is_err());
        assert!(Attachment::new("bad\"name.png", b"x".to_vec()).is_err());
        assert!(Attachment::new("line\nbreak.txt", b"x".to_vec()).is_err());

        let attachment = Attachment::new("ok.gif", b"GIF89a".to_vec()).unwrap();
        assert_eq!(attachment.mime_type(), "image/gif");
        assert_eq!(attachment.data(), b"GIF89a");
    }

    #[test]
    fn test_structured_encoding() {
        let payload = RequestPayload::json(json!({"content": "hi"}));
        let encoded = payload.encode().unwrap();
        assert_eq!(encoded.content_type, "application/json");
        assert!(!encoded.forced_content_type);
        let decoded: Value = serde_json::from_slice(&encoded.body).unwrap();
        assert_eq!(decoded, json!({"content": "hi"}));
    }

    #[test]
    fn test_multipart_layout() {
        let payload = RequestPayload::json(json!({"content": "files"}))
            .with_attachment(Attachment::new("a.png", b"PNGDATA".to_vec()).unwrap())
            .with_attachment(Attachment::new("b.txt", b"hello".to_vec()).unwrap());

        let encoded = payload.encode().unwrap();
        assert!(encoded.forced_content_type);
        let boundary = boundary_of(&encoded);
        let body = String::from_utf8(encoded.body).unwrap();

        let delimiter = format!("--{}\r\n", boundary);
        let parts: Vec<&str> = body.split(delimiter.as_str()).skip(1).collect();
        assert_eq!(parts.len(), 3);

        assert!(parts[0].starts_with("Content-Disposition: form-data; name=\"payload_json\"\r\n"));
        assert!(parts[0].contains("Content-Type: application/json"));
        assert!(parts[0].contains(r#"{"content":"files"}"#));

        assert!(parts[1].contains("name=\"files[0]\"; filename=\"a.png\""));
        assert!(parts[1].contains("Content-Type: image/png\r\n\r\nPNGDATA\r\n"));

        assert!(parts[2].contains("name=\"files[1]\"; filename=\"b.txt\""));
        assert!(parts[2].contains("Content-Type: text/plain\r\n\r\nhello\r\n"));

        assert!(body.ends_with(&format!("--{}--\r\n", boundary)));
    }

    #[test]
    fn test_boundary_is_fresh_per_encode() {
        let payload = RequestPayload::multipart(
            json!({}),
            vec![Attachment::new("a.txt", b"a".to_vec()).unwrap()],
        );
        let first = boundary_of(&payload.encode().unwrap());
        let second = boundary_of(&payload.encode().unwrap());
        assert_ne!(first, second);
    }

    #[test]
    fn test_header_overrides_are_validated() {
        assert!(RequestPayload::json(json!({}))
            .with_header("bad header", "x")
            .is_err());
        assert!(RequestPayload::json(json!({}))
            .with_header("X-Ok", "line\nbreak")
            .is_err());

        assert!(RequestPayload::json(json!({})).metadata().is_empty());

        let payload = RequestPayload::json(json!({}))
            .with_header("X-Custom", "1")
            .unwrap();
        assert!(!payload.metadata().is_empty());
        let headers = payload.metadata().headers();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("x-custom").unwrap(), "1");
    }

    #[test]
    fn test_reason_is_percent_encoded() {
        let payload = RequestPayload::json(json!({}))
            .with_reason("spam & abuse")
            .unwrap();
        let value = payload.metadata().headers().get(AUDIT_LOG_REASON).unwrap();
        assert_eq!(value.to_str().unwrap(), "spam%20%26%20abuse");
    }

    #[tokio::test]
    async fn test_attachment_from_missing_path() {
        let result = Attachment::from_path("/definitely/not/here.png").await;
        assert!(matches!(result, Err(Error::Encoding { .. })));
    }
}
