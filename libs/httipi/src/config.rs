use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Default User-Agent string for HTTP requests
pub const DEFAULT_USER_AGENT: &str = concat!("httipi/", env!("CARGO_PKG_VERSION"));

/// `Accept-Encoding` value added to every request that does not set its own
pub const DEFAULT_ACCEPT_ENCODING: &str = "gzip, deflate";

/// TLS root certificate configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum TlsRootConfig {
    /// Use Mozilla's root certificates (webpki-roots, no OS dependency)
    #[default]
    WebPki,
    /// Use OS native root certificate store
    Native,
}

/// Transport security configuration
///
/// Controls whether the client enforces TLS or allows plain HTTP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum TransportSecurity {
    /// Require TLS for all connections (HTTPS only) - default and recommended
    #[default]
    TlsOnly,
    /// Allow plain HTTP connections
    ///
    /// **WARNING**: traffic is not encrypted. Intended for local services and
    /// mock servers.
    AllowInsecureHttp,
}

/// JSON handling applied when decoding typed response bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JsonConfig {
    /// Treat an empty or whitespace-only success body as JSON `null`
    /// (default: true).
    ///
    /// With this set, `Option<T>` targets decode to `None` and `()` targets
    /// succeed on `204 No Content` style responses.
    pub empty_body_as_null: bool,
}

impl Default for JsonConfig {
    fn default() -> Self {
        Self {
            empty_body_as_null: true,
        }
    }
}

/// Overall client configuration
///
/// Deserializable from YAML/JSON; durations use humantime notation
/// (`"30s"`, `"1m 30s"`).
///
/// ```yaml
/// request_timeout: 10s
/// user_agent: my-app/1.0
/// transport: allow_insecure_http
/// default_headers:
///   x-api-key: secret
/// json:
///   empty_body_as_null: false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Per-request timeout (default: 30 seconds)
    #[serde(with = "humantime_duration")]
    pub request_timeout: Duration,

    /// Maximum response body size in bytes, applied to both the wire bytes
    /// and the decompressed bytes (default: 10 MB)
    pub max_body_size: usize,

    /// User-Agent header value (default: "httipi/<version>")
    pub user_agent: String,

    /// Headers added to every request that does not already carry them
    pub default_headers: BTreeMap<String, String>,

    /// Transport security mode (default: `TlsOnly`)
    pub transport: TransportSecurity,

    /// TLS root certificate strategy (default: `WebPki`)
    pub tls_roots: TlsRootConfig,

    /// Maximum number of redirects to follow; `0` disables following
    /// (default: 10)
    pub max_redirects: usize,

    /// Buffer capacity for concurrent request handling (default: 1024)
    pub buffer_capacity: usize,

    /// Timeout for idle connections in the pool (default: 90 seconds)
    ///
    /// Set to `None` to use hyper-util's default idle timeout.
    #[serde(with = "humantime_duration::option")]
    pub pool_idle_timeout: Option<Duration>,

    /// Maximum number of idle connections per host (default: 32)
    pub pool_max_idle_per_host: usize,

    /// JSON decoding options
    pub json: JsonConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_body_size: 10 * 1024 * 1024, // 10 MB
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            default_headers: BTreeMap::new(),
            transport: TransportSecurity::TlsOnly,
            tls_roots: TlsRootConfig::default(),
            max_redirects: 10,
            buffer_capacity: 1024,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
            json: JsonConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Configuration for talking to local mock servers: plain HTTP allowed,
    /// short timeout, no redirects, 1 MB body limit.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            max_body_size: 1024 * 1024,
            transport: TransportSecurity::AllowInsecureHttp,
            max_redirects: 0,
            buffer_capacity: 64,
            ..Self::default()
        }
    }
}

/// Serde adapter storing `Duration` as a humantime string.
mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer, de};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        humantime::parse_duration(&raw)
            .map_err(|e| de::Error::custom(format!("invalid duration '{raw}': {e}")))
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer, de};
        use std::time::Duration;

        // serde's `with` contract fixes the `&Option<_>` signature
        #[allow(clippy::ref_option)]
        pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
            match value {
                Some(d) => s.serialize_some(&humantime::format_duration(*d).to_string()),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
            Option::<String>::deserialize(d)?
                .map(|raw| {
                    humantime::parse_duration(&raw)
                        .map_err(|e| de::Error::custom(format!("invalid duration '{raw}': {e}")))
                })
                .transpose()
        }
    }
}
