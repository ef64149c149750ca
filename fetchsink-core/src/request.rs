//! Request descriptions and the raw responses transports hand back.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::transport::TransportError;

/// Ordered string-to-string mapping used for query parameters and headers.
pub type OrderedPairs = IndexMap<String, String>;

/// A single GET request: URL, ordered query parameters and ordered headers.
///
/// # Examples
///
/// ```
/// use fetchsink_core::RequestSpec;
///
/// let request = RequestSpec::new("https://api.datamuse.com/words")
///     .with_param("rel_rhy", "forgetful")
///     .with_header("Accept", "application/json");
/// assert_eq!(request.params.get("rel_rhy").map(String::as_str), Some("forgetful"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequestSpec {
    /// Target URL without the query string.
    pub url: String,
    /// Query parameters in the order they were supplied.
    #[serde(default)]
    pub params: OrderedPairs,
    /// Request headers in the order they were supplied.
    #[serde(default)]
    pub headers: OrderedPairs,
}

impl RequestSpec {
    /// Create a request with no parameters or headers.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Append (or replace) a query parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Append (or replace) a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Status, body and declared content type of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// URL the response was fetched from, including the query string.
    pub url: String,
    /// HTTP status code.
    pub status: u16,
    /// Declared `Content-Type`, if the server sent one.
    pub content_type: Option<String>,
    /// Raw body bytes.
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Whether the status is in the 2xx range.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Convert a non-2xx response into [`TransportError::Status`].
    pub fn error_for_status(self) -> Result<Self, TransportError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(TransportError::Status {
                url: self.url,
                status: self.status,
            })
        }
    }
}

/// How a response body should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    /// Parse as a JSON document.
    #[default]
    Json,
    /// Keep the body as text.
    Text,
}

impl ResponseFormat {
    /// File extension used for artefacts holding this format.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Text => "txt",
        }
    }
}
