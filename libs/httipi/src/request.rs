use crate::config::DEFAULT_ACCEPT_ENCODING;
use crate::error::{HttpError, InvalidUriKind};
use bytes::Bytes;
use http::header::{ACCEPT_ENCODING, CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, Method, Uri};
use http_body_util::Full;
use serde::Serialize;

/// Content type used for JSON request bodies
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// A request body together with its content type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Content {
    body: Bytes,
    content_type: HeaderValue,
}

impl Content {
    /// Pre-serialized JSON text, sent as UTF-8 `application/json`.
    pub fn json_str(json: impl Into<String>) -> Self {
        Self {
            body: Bytes::from(json.into()),
            content_type: HeaderValue::from_static(JSON_CONTENT_TYPE),
        }
    }

    /// Serializes `value` with `serde_json`.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::Json` if serialization fails.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, HttpError> {
        let body = serde_json::to_vec(value)?;
        Ok(Self {
            body: Bytes::from(body),
            content_type: HeaderValue::from_static(JSON_CONTENT_TYPE),
        })
    }

    /// UTF-8 text with the given media type, e.g. `text/plain`.
    ///
    /// `; charset=utf-8` is appended to the media type.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::InvalidHeaderValue` if `media_type` is not a valid
    /// header value.
    pub fn text(text: impl Into<String>, media_type: &str) -> Result<Self, HttpError> {
        let content_type = HeaderValue::try_from(format!("{media_type}; charset=utf-8"))?;
        Ok(Self {
            body: Bytes::from(text.into()),
            content_type,
        })
    }

    /// URL-encoded form fields.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::FormEncode` if encoding fails.
    pub fn form<T: Serialize + ?Sized>(fields: &T) -> Result<Self, HttpError> {
        let body = serde_urlencoded::to_string(fields)?;
        Ok(Self {
            body: Bytes::from(body),
            content_type: HeaderValue::from_static(FORM_CONTENT_TYPE),
        })
    }

    /// Raw bytes with an explicit content type.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::InvalidHeaderValue` if `content_type` is not a
    /// valid header value.
    pub fn bytes(body: impl Into<Bytes>, content_type: &str) -> Result<Self, HttpError> {
        Ok(Self {
            body: body.into(),
            content_type: HeaderValue::try_from(content_type)?,
        })
    }

    /// Content type sent with the body unless the request overrides it
    #[must_use]
    pub fn content_type(&self) -> &HeaderValue {
        &self.content_type
    }

    /// Body bytes
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

/// An immutable, validated HTTP request.
///
/// Produced by [`RequestBuilder::build`]; consumed by the client when
/// dispatched.
#[derive(Clone, Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    content: Option<Content>,
}

impl Request {
    /// Start building a request
    pub fn builder() -> RequestBuilder {
        RequestBuilder::new()
    }

    /// Request method
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Absolute target URI
    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Final header set, including defaults and the content type
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Request body, if any
    #[must_use]
    pub fn content(&self) -> Option<&Content> {
        self.content.as_ref()
    }

    pub(crate) fn into_http(self) -> http::Request<Full<Bytes>> {
        let body = self.content.map(|c| c.body).unwrap_or_default();
        let mut request = http::Request::new(Full::new(body));
        *request.method_mut() = self.method;
        *request.uri_mut() = self.uri;
        *request.headers_mut() = self.headers;
        request
    }
}

/// Fluent builder for [`Request`]
///
/// The builder is a plain value: every mutator takes it by value and hands
/// it back, and [`build()`](RequestBuilder::build) consumes it. It is meant
/// for single-use construction on one task.
///
/// # Header semantics
///
/// - [`header()`](RequestBuilder::header) appends; repeated names produce
///   repeated header lines.
/// - [`headers()`](RequestBuilder::headers) merges a mapping with
///   last-write-wins: every supplied name replaces all earlier values of
///   that name.
/// - `Accept-Encoding: gzip, deflate` is added at build time unless the
///   caller set an `Accept-Encoding` header.
/// - The body's content type is added unless the caller set `Content-Type`.
///
/// # Example
///
/// ```ignore
/// use httipi::{Content, Request};
/// use http::Method;
///
/// let request = Request::builder()
///     .url("https://api.example.com/users")?
///     .method(Method::POST)
///     .header("x-request-id", "abc123")
///     .content(Content::json_str(r#"{"name":"Alice"}"#))
///     .build()?;
/// ```
#[must_use = "RequestBuilder does nothing until .build() is called"]
#[derive(Debug)]
pub struct RequestBuilder {
    uri: Option<Uri>,
    method: Method,
    headers: Vec<(HeaderName, HeaderValue)>,
    content: Option<Content>,
    /// Error captured during building (deferred to `build()`)
    error: Option<HttpError>,
}

impl RequestBuilder {
    /// Create an empty GET request builder
    pub fn new() -> Self {
        Self {
            uri: None,
            method: Method::GET,
            headers: Vec::new(),
            content: None,
            error: None,
        }
    }

    /// Set the target URL
    ///
    /// # Errors
    ///
    /// Returns `HttpError::InvalidUri` immediately if the string is empty,
    /// whitespace only, unparsable, or not an absolute URI with scheme and
    /// host.
    pub fn url(mut self, url: &str) -> Result<Self, HttpError> {
        self.uri = Some(parse_absolute_uri(url)?);
        Ok(self)
    }

    /// Set the HTTP method (default: GET)
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Append a single header
    ///
    /// An invalid name or value is reported by [`build()`](Self::build).
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if self.error.is_some() {
            return self;
        }

        match parse_header(name, value) {
            Ok(pair) => self.headers.push(pair),
            Err(e) => self.error = Some(e),
        }
        self
    }

    /// Merge a header mapping, last write wins on name collisions
    ///
    /// # Example
    ///
    /// ```ignore
    /// let mut extra = HashMap::new();
    /// extra.insert("authorization", "Bearer token");
    ///
    /// let request = Request::builder()
    ///     .url("https://api.example.com")?
    ///     .header("authorization", "Basic old")
    ///     .headers(&extra) // replaces the Basic credentials
    ///     .build()?;
    /// ```
    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        if self.error.is_some() {
            return self;
        }

        for (name, value) in headers {
            match parse_header(name.as_ref(), value.as_ref()) {
                Ok((name, value)) => {
                    self.headers.retain(|(existing, _)| *existing != name);
                    self.headers.push((name, value));
                }
                Err(e) => {
                    self.error = Some(e);
                    return self;
                }
            }
        }
        self
    }

    /// Attach a body
    pub fn content(mut self, content: Content) -> Self {
        self.content = Some(content);
        self
    }

    /// Attach pre-serialized JSON text as the body
    pub fn json_str(self, json: impl Into<String>) -> Self {
        self.content(Content::json_str(json))
    }

    /// Serialize `body` as the JSON request body
    ///
    /// # Errors
    ///
    /// Returns any error deferred by earlier calls, or `HttpError::Json` if
    /// serialization fails.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, HttpError> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        let content = Content::json(body)?;
        Ok(self.content(content))
    }

    /// Produce the immutable request
    ///
    /// # Errors
    ///
    /// Returns the first invalid header captured while building, or
    /// `HttpError::InvalidUri` with [`InvalidUriKind::Missing`] when no URL
    /// was set.
    pub fn build(self) -> Result<Request, HttpError> {
        if let Some(e) = self.error {
            return Err(e);
        }

        let uri = self.uri.ok_or_else(|| HttpError::InvalidUri {
            url: String::new(),
            kind: InvalidUriKind::Missing,
            reason: "no URL set on request builder".to_owned(),
        })?;

        let mut headers = HeaderMap::with_capacity(self.headers.len() + 2);
        if !self.headers.iter().any(|(name, _)| name == ACCEPT_ENCODING) {
            headers.insert(
                ACCEPT_ENCODING,
                HeaderValue::from_static(DEFAULT_ACCEPT_ENCODING),
            );
        }
        for (name, value) in self.headers {
            headers.append(name, value);
        }
        if let Some(content) = &self.content
            && !headers.contains_key(CONTENT_TYPE)
        {
            headers.insert(CONTENT_TYPE, content.content_type.clone());
        }

        Ok(Request {
            method: self.method,
            uri,
            headers,
            content: self.content,
        })
    }
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), HttpError> {
    let name = HeaderName::try_from(name)?;
    let value = HeaderValue::try_from(value)?;
    Ok((name, value))
}

/// Parse `raw` as an absolute URI (scheme and authority required).
fn parse_absolute_uri(raw: &str) -> Result<Uri, HttpError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(HttpError::InvalidUri {
            url: raw.to_owned(),
            kind: InvalidUriKind::Empty,
            reason: "URL is empty".to_owned(),
        });
    }

    let uri: Uri = trimmed
        .parse()
        .map_err(|e: http::uri::InvalidUri| HttpError::InvalidUri {
            url: raw.to_owned(),
            kind: InvalidUriKind::ParseError,
            reason: e.to_string(),
        })?;

    if uri.scheme().is_none() {
        return Err(HttpError::InvalidUri {
            url: raw.to_owned(),
            kind: InvalidUriKind::MissingScheme,
            reason: "URL is not absolute: missing scheme".to_owned(),
        });
    }

    if uri.authority().is_none() {
        return Err(HttpError::InvalidUri {
            url: raw.to_owned(),
            kind: InvalidUriKind::MissingAuthority,
            reason: "missing host/authority".to_owned(),
        });
    }

    Ok(uri)
}
