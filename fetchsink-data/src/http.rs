//! HTTP `Transport` backed by `reqwest`.
//!
//! The [`Transport`] trait is synchronous so the pipeline stays embeddable in
//! synchronous programs. [`HttpTransport`] bridges to the async client by
//! blocking on a Tokio runtime it owns.
//!
//! # Example
//!
//! ```no_run
//! use fetchsink_core::{RequestSpec, Transport};
//! use fetchsink_data::http::HttpTransport;
//!
//! let transport = HttpTransport::new()?;
//! let request = RequestSpec::new("https://api.datamuse.com/words").with_param("rel_rhy", "forgetful");
//! let response = transport.fetch(&request)?;
//! println!("{} bytes", response.body.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::time::Duration;

use fetchsink_core::{RawResponse, RequestSpec, Transport, TransportError};
use log::debug;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};

/// Default user agent for outbound requests.
pub const DEFAULT_USER_AGENT: &str = "fetchsink/0.1";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Failure constructing an [`HttpTransport`].
#[derive(Debug, Error)]
pub enum HttpTransportBuildError {
    /// Failed to build the Tokio runtime.
    #[error("failed to build Tokio runtime")]
    Runtime(#[source] std::io::Error),
}

/// Configuration for [`HttpTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpTransportConfig {
    /// Connect and overall request timeout.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

impl HttpTransportConfig {
    /// Set the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent string.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Performs one GET per [`Transport::fetch`] call.
///
/// A fresh `reqwest::Client` is built for every call, so no connection or
/// cookie state survives between fetches.
///
/// # Runtime behaviour
///
/// Outside any Tokio runtime the transport blocks on its own current-thread
/// runtime. Inside a multi-threaded runtime it uses that runtime's handle with
/// [`tokio::task::block_in_place`].
///
/// # Panics
///
/// [`Transport::fetch`] panics when called from inside a `current_thread`
/// runtime, since neither runtime can block there. Call it from
/// `spawn_blocking` or a multi-threaded runtime instead.
pub struct HttpTransport {
    config: HttpTransportConfig,
    runtime: Runtime,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("config", &self.config)
            .field("runtime", &"<tokio::runtime::Runtime>")
            .finish()
    }
}

impl HttpTransport {
    /// Create a transport with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the Tokio runtime fails to build.
    pub fn new() -> Result<Self, HttpTransportBuildError> {
        Self::with_config(HttpTransportConfig::default())
    }

    /// Create a transport with explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the Tokio runtime fails to build.
    pub fn with_config(config: HttpTransportConfig) -> Result<Self, HttpTransportBuildError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(HttpTransportBuildError::Runtime)?;
        Ok(Self { config, runtime })
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &HttpTransportConfig {
        &self.config
    }

    fn client(&self, url: &str) -> Result<Client, TransportError> {
        Client::builder()
            .user_agent(&self.config.user_agent)
            .connect_timeout(self.config.timeout)
            .timeout(self.config.timeout)
            .build()
            .map_err(|err| TransportError::Network {
                url: url.to_owned(),
                message: format!("failed to build HTTP client: {err}"),
            })
    }

    async fn fetch_async(&self, request: &RequestSpec) -> Result<RawResponse, TransportError> {
        let client = self.client(&request.url)?;
        let mut builder = client.get(&request.url).query(&request.params);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|err| self.convert_reqwest_error(&err, &request.url))?;

        let url = response.url().to_string();
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = response
            .bytes()
            .await
            .map_err(|err| self.convert_reqwest_error(&err, &url))?
            .to_vec();

        debug!("GET {url} -> {status} ({} bytes)", body.len());
        Ok(RawResponse {
            url,
            status,
            content_type,
            body,
        })
    }

    fn convert_reqwest_error(&self, error: &reqwest::Error, url: &str) -> TransportError {
        if error.is_timeout() {
            return TransportError::Timeout {
                url: url.to_owned(),
                timeout_secs: self.config.timeout.as_secs(),
            };
        }

        if error.is_builder() {
            return TransportError::InvalidRequest {
                url: url.to_owned(),
                message: error.to_string(),
            };
        }

        TransportError::Network {
            url: url.to_owned(),
            message: error.to_string(),
        }
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, request: &RequestSpec) -> Result<RawResponse, TransportError> {
        let future = self.fetch_async(request);
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| handle.block_on(future))
            }
            // Panics inside a current_thread runtime.
            _ => self.runtime.block_on(future),
        }
    }
}
