//! Routes and rate-limit bucket keys
//!
//! A route is a method plus a path relative to the versioned API root. Calls
//! whose paths only differ by a resource id share server-side rate-limit
//! state, so the bucket key replaces every id segment with a wildcard.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use reqwest::Method;

/// Marker substituted for id segments in bucket keys
pub const ID_WILDCARD: &str = ":id";

static ID_SEGMENT: OnceLock<Regex> = OnceLock::new();

fn id_segment() -> &'static Regex {
    ID_SEGMENT.get_or_init(|| Regex::new(r"^\d{16,}$").expect("Valid regex pattern"))
}

/// Derive the bucket key for a route path.
///
/// The query string is dropped and every segment that is a long numeric
/// token becomes [`ID_WILDCARD`]. Only the path string is consulted.
pub fn bucket_key(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let path = path.trim_start_matches('/');

    let segments: Vec<&str> = path
        .split('/')
        .map(|segment| {
            if id_segment().is_match(segment) {
                ID_WILDCARD
            } else {
                segment
            }
        })
        .collect();

    format!("/{}", segments.join("/"))
}

/// A method plus a path below the API root
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    method: Method,
    path: String,
}

impl Route {
    /// Create a route, prefixing the path with `/` when missing
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        let path = if path.starts_with('/') {
            path
        } else {
            format!("/{}", path)
        };
        Self { method, path }
    }

    /// HTTP method
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Exact path including any query string
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Rate-limit bucket key for this route
    pub fn bucket_key(&self) -> String {
        bucket_key(&self.path)
    }

    /// Only idempotent reads are served from the response cache
    pub fn is_cacheable(&self) -> bool {
        self.method == Method::GET
    }

    /// Full URL below an API root such as `https://host/api/v10`
    pub fn url(&self, api_root: &str) -> String {
        format!("{}{}", api_root.trim_end_matches('/'), self.path)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}
