use crate::client::Client;
use crate::config::{ClientConfig, JsonConfig, TlsRootConfig, TransportSecurity};
use crate::error::HttpError;
use crate::transport::HttpTransport;
use std::time::Duration;

/// Builder for constructing a [`Client`].
///
/// Transport settings only take effect when the builder creates the default
/// hyper transport; a transport passed to [`ClientBuilder::with_transport`]
/// is used as-is. Body limits, JSON options and the scheme policy always
/// apply.
#[must_use = "a builder does nothing until `build()` is called"]
pub struct ClientBuilder {
    config: ClientConfig,
    transport: Option<HttpTransport>,
}

impl ClientBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            transport: None,
        }
    }

    /// Create a builder with a specific configuration
    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            config,
            transport: None,
        }
    }

    /// Set the per-request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the user agent string
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Add a header sent on every request that does not set it
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.insert(name.into(), value.into());
        self
    }

    /// Set the maximum response body size, applied before and after decompression
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    /// Set transport security mode
    ///
    /// Use `TransportSecurity::AllowInsecureHttp` only for testing with mock servers.
    pub fn transport(mut self, transport: TransportSecurity) -> Self {
        self.config.transport = transport;
        self
    }

    /// Allow insecure HTTP connections (for testing only)
    ///
    /// Equivalent to `.transport(TransportSecurity::AllowInsecureHttp)`.
    /// Only available in debug builds or with the `allow-insecure-http`
    /// feature.
    #[cfg(any(debug_assertions, feature = "allow-insecure-http"))]
    pub fn allow_insecure_http(mut self) -> Self {
        tracing::warn!(
            target: "httipi::security",
            "allow_insecure_http() called - HTTP traffic will NOT be encrypted"
        );
        self.config.transport = TransportSecurity::AllowInsecureHttp;
        self
    }

    /// Select the TLS root certificate store
    pub fn tls_roots(mut self, roots: TlsRootConfig) -> Self {
        self.config.tls_roots = roots;
        self
    }

    /// Set the maximum number of redirects to follow
    ///
    /// `0` disables redirect following; 3xx responses are then handled like
    /// any other non-2xx status.
    pub fn max_redirects(mut self, max_redirects: usize) -> Self {
        self.config.max_redirects = max_redirects;
        self
    }

    /// Disable redirect following
    pub fn no_redirects(self) -> Self {
        self.max_redirects(0)
    }

    /// Set the idle connection timeout for the connection pool
    pub fn pool_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.pool_idle_timeout = timeout;
        self
    }

    /// Set the maximum number of idle connections per host
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.config.pool_max_idle_per_host = max;
        self
    }

    /// Set the buffer capacity for concurrent request handling
    ///
    /// A capacity of 0 is clamped to 1.
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.buffer_capacity = capacity.max(1);
        self
    }

    /// Set JSON decoding options
    pub fn json(mut self, json: JsonConfig) -> Self {
        self.config.json = json;
        self
    }

    /// Use `transport` instead of building the default hyper transport
    pub fn with_transport(mut self, transport: HttpTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build the client
    ///
    /// Must be called inside a Tokio runtime when no transport was injected.
    ///
    /// # Errors
    /// Returns an error if TLS initialization fails or a configured header
    /// is invalid
    pub fn build(self) -> Result<Client, HttpError> {
        if self.config.transport == TransportSecurity::AllowInsecureHttp {
            tracing::warn!(
                "insecure HTTP enabled (TransportSecurity::AllowInsecureHttp); \
                 use only for testing with mock servers"
            );
        }

        let transport = match self.transport {
            Some(transport) => transport,
            None => HttpTransport::from_config(&self.config)?,
        };

        Ok(Client::from_parts(
            transport,
            self.config.transport,
            self.config.max_body_size,
            self.config.json,
        ))
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
