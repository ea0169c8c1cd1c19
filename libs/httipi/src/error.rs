use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Classification of URL validation failures.
///
/// Provides programmatic matching for different failure modes without
/// relying on unstable error message strings.
///
/// # Example
///
/// ```ignore
/// match RequestBuilder::new().url(input) {
///     Err(HttpError::InvalidUri { kind: InvalidUriKind::Empty, .. }) => println!("no URL given"),
///     Err(HttpError::InvalidUri { kind: InvalidUriKind::MissingScheme, .. }) => println!("URL is relative"),
///     Err(other) => return Err(other),
///     Ok(builder) => { /* ... */ }
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidUriKind {
    /// No URL was set on the builder before `build()`
    Missing,
    /// URL string was empty or whitespace only
    Empty,
    /// URL could not be parsed (malformed syntax)
    ParseError,
    /// URL is missing required host/authority component
    MissingAuthority,
    /// URL is missing required scheme (http/https)
    MissingScheme,
}

/// Structured error for a response whose status is outside the 2xx range.
///
/// Carries the numeric status code, a composed human-readable message that
/// names the request URI, and the full (decoded) response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusError {
    /// Numeric HTTP status code, e.g. `404`
    pub status_code: u16,
    /// `"{code}: {reason} Request({uri}) failed with error: {body}"`
    ///
    /// `reason` is the canonical reason phrase (`404: Not Found`), not a
    /// status identifier such as `NotFound`; codes without one read
    /// `Unknown Status`.
    pub message: String,
    /// Raw response body text
    pub body: String,
}

impl StatusError {
    /// Builds the error for `status` returned by a request to `uri`.
    #[must_use]
    pub fn new(status: http::StatusCode, uri: &http::Uri, body: String) -> Self {
        let reason = status.canonical_reason().unwrap_or("Unknown Status");
        let message = format!(
            "{}: {reason} Request({uri}) failed with error: {body}",
            status.as_u16()
        );
        Self {
            status_code: status.as_u16(),
            message,
            body,
        }
    }

    /// Returns the status as an [`http::StatusCode`].
    ///
    /// Falls back to `500` for codes `http` does not accept, which cannot
    /// happen for errors built by [`StatusError::new`].
    #[must_use]
    pub fn status(&self) -> http::StatusCode {
        http::StatusCode::from_u16(self.status_code)
            .unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for StatusError {}

/// HTTP client error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    /// Request building failed
    #[error("Failed to build request: {0}")]
    RequestBuild(#[from] http::Error),

    /// Invalid header name
    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// Invalid header value
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// Single request attempt timed out
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Transport error (network, connection, etc)
    #[error("Transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// TLS error
    #[error("TLS error: {0}")]
    Tls(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Internal service failure (buffer worker died, channel closed)
    #[error("Service unavailable: internal failure")]
    ServiceClosed,

    /// Response body exceeded size limit
    #[error("Response body too large: limit {limit} bytes, got {actual} bytes")]
    BodyTooLarge { limit: usize, actual: usize },

    /// Decompressing the response body failed
    #[error("Failed to decode {encoding} response body: {source}")]
    Decode {
        /// The content coding that was being removed (`gzip`, `deflate`)
        encoding: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// HTTP non-2xx status
    #[error(transparent)]
    Status(#[from] StatusError),

    /// JSON parsing error
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Form URL encoding error
    #[error("Form encoding failed: {0}")]
    FormEncode(#[from] serde_urlencoded::ser::Error),

    /// Invalid URL (empty, unparsable or not absolute)
    ///
    /// Use the `kind` field for programmatic matching. The `reason` field contains
    /// a diagnostic message intended for logging only.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUri {
        /// The URL that failed to parse
        url: String,
        /// Structured failure classification for programmatic matching
        kind: InvalidUriKind,
        /// Diagnostic message (unstable format, for logging only)
        reason: String,
    },

    /// Invalid URL scheme for transport security configuration
    #[error("URL scheme '{scheme}' not allowed: {reason}")]
    InvalidScheme {
        /// The URL scheme that was rejected
        scheme: String,
        /// Reason the scheme was rejected
        reason: String,
    },
}

impl HttpError {
    /// Status code of a non-2xx response, `None` for every other failure.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            HttpError::Status(err) => Some(err.status_code),
            _ => None,
        }
    }

    /// Returns the structured status error, if this is one.
    #[must_use]
    pub fn as_status(&self) -> Option<&StatusError> {
        match self {
            HttpError::Status(err) => Some(err),
            _ => None,
        }
    }
}

impl From<hyper::Error> for HttpError {
    fn from(err: hyper::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}

impl From<hyper_util::client::legacy::Error> for HttpError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::error::Error;

    #[derive(Debug)]
    struct TestError(&'static str);

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl Error for TestError {}

    #[test]
    fn test_status_error_message_format() {
        let uri: http::Uri = "https://api.example.com/users/7".parse().unwrap();
        let err = StatusError::new(http::StatusCode::NOT_FOUND, &uri, "not found".to_owned());

        assert_eq!(err.status_code, 404);
        assert_eq!(err.body, "not found");
        assert_eq!(
            err.message,
            "404: Not Found Request(https://api.example.com/users/7) failed with error: not found"
        );
        assert_eq!(err.to_string(), err.message);
        assert_eq!(err.status(), http::StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_status_error_unknown_reason() {
        let uri: http::Uri = "https://example.com/".parse().unwrap();
        let status = http::StatusCode::from_u16(599).unwrap();
        let err = StatusError::new(status, &uri, String::new());

        assert!(err.message.starts_with("599: Unknown Status Request("));
    }

    #[test]
    fn test_http_error_status_accessors() {
        let uri: http::Uri = "https://example.com/".parse().unwrap();
        let err: HttpError =
            StatusError::new(http::StatusCode::BAD_GATEWAY, &uri, "upstream".to_owned()).into();

        assert_eq!(err.status_code(), Some(502));
        assert_eq!(err.as_status().map(|s| s.body.as_str()), Some("upstream"));
        // Status errors display the composed message unchanged
        assert!(err.to_string().starts_with("502: Bad Gateway"));

        let other = HttpError::ServiceClosed;
        assert_eq!(other.status_code(), None);
        assert!(other.as_status().is_none());
    }

    #[test]
    fn test_transport_error_preserves_source() {
        let err = HttpError::Transport(Box::new(TestError("connection refused")));

        let source = err.source();
        assert!(source.is_some(), "Transport error should have a source");

        let downcast = source.unwrap().downcast_ref::<TestError>();
        assert_eq!(downcast.unwrap().0, "connection refused");
    }

    #[test]
    fn test_decode_error_chain() {
        let err = HttpError::Decode {
            encoding: "gzip",
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, "corrupt deflate stream"),
        };

        let mut count = 0;
        let mut current: Option<&(dyn Error + 'static)> = Some(&err);
        while let Some(e) = current {
            count += 1;
            current = e.source();
        }

        assert_eq!(count, 2, "HttpError and io::Error in chain");
        assert!(err.to_string().contains("gzip"));
    }
}
