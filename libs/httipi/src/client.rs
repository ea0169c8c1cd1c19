use crate::builder::ClientBuilder;
use crate::config::{JsonConfig, TransportSecurity};
use crate::error::{HttpError, StatusError};
use crate::request::{Request, RequestBuilder};
use crate::response::{ContentCoding, DecodedBody, ResponseBody, ResponseMeta, read_body_limited};
use crate::transport::HttpTransport;
use http::{Method, Uri};
use serde::de::DeserializeOwned;
use std::any::{Any, TypeId};
use std::io;
use tracing::Instrument;

/// Callback invoked with the status line and headers of a successful
/// response, before its body is decoded.
pub type ResponseHook<'a> = dyn FnMut(&ResponseMeta) + Send + 'a;

/// HTTP client that dispatches [`Request`]s and decodes their responses.
///
/// Each call performs exactly one round-trip:
///
/// 1. the URL scheme is checked against the client's [`TransportSecurity`];
/// 2. the request is sent through the [`HttpTransport`];
/// 3. the body is collected (bounded by the body size limit) and wrapped in
///    a gzip or deflate decoder when `Content-Encoding` asks for it;
/// 4. a status outside 2xx becomes [`HttpError::Status`] carrying the full
///    decoded body, and is logged at error level;
/// 5. otherwise the optional [`ResponseHook`] runs and the decoded body is
///    turned into the caller's result.
///
/// `Client` is `Clone + Send + Sync`; clones share the same transport.
///
/// # Example
///
/// ```ignore
/// use httipi::{Client, Request};
///
/// let client = Client::new()?;
///
/// let user: User = client.get("https://api.example.com/users/7", &[], None).await?;
///
/// let request = Request::builder()
///     .url("https://api.example.com/users")?
///     .method(http::Method::POST)
///     .json(&NewUser { name: "Ada" })?
///     .build()?;
/// let created: User = client.execute(request).await?;
/// ```
#[derive(Clone, Debug)]
pub struct Client {
    transport: HttpTransport,
    security: TransportSecurity,
    max_body_size: usize,
    json: JsonConfig,
    span: tracing::Span,
}

impl Client {
    /// Create a client with default configuration (HTTPS only)
    ///
    /// # Errors
    /// Returns an error if TLS initialization fails
    pub fn new() -> Result<Self, HttpError> {
        ClientBuilder::new().build()
    }

    /// Create a builder for configuring the client
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub(crate) fn from_parts(
        transport: HttpTransport,
        security: TransportSecurity,
        max_body_size: usize,
        json: JsonConfig,
    ) -> Self {
        Self {
            transport,
            security,
            max_body_size,
            json,
            span: tracing::Span::none(),
        }
    }

    /// Record this client's events inside `span`.
    #[must_use]
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    /// Replace the JSON decoding options
    #[must_use]
    pub fn with_json_config(mut self, json: JsonConfig) -> Self {
        self.json = json;
        self
    }

    /// Replace the response body size limit
    #[must_use]
    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    /// Transport used by this client
    #[must_use]
    pub fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    /// JSON decoding options used by this client
    #[must_use]
    pub fn json_config(&self) -> &JsonConfig {
        &self.json
    }

    /// Send `request` and deserialize the JSON body as `T`.
    ///
    /// A `String` target receives the body text verbatim, without JSON
    /// parsing.
    ///
    /// # Errors
    /// `HttpError::Status` for non-2xx responses, `HttpError::Json` if the
    /// body does not deserialize, plus any transport or decoding failure
    pub async fn execute<T>(&self, request: Request) -> Result<T, HttpError>
    where
        T: DeserializeOwned + 'static,
    {
        self.execute_with(request, None).await
    }

    /// [`Client::execute`] with a callback that sees the successful response's
    /// status and headers.
    ///
    /// # Errors
    /// Same as [`Client::execute`]; the callback is not invoked on failure
    pub async fn execute_with<T>(
        &self,
        request: Request,
        on_response: Option<&mut ResponseHook<'_>>,
    ) -> Result<T, HttpError>
    where
        T: DeserializeOwned + 'static,
    {
        self.run(request, on_response, |body| decode_typed(body, &self.json))
            .await
    }

    /// Send `request` and return the decoded body as text.
    ///
    /// # Errors
    /// `HttpError::Status` for non-2xx responses, plus any transport or
    /// decoding failure
    pub async fn execute_text(
        &self,
        request: Request,
        on_response: Option<&mut ResponseHook<'_>>,
    ) -> Result<String, HttpError> {
        self.run(request, on_response, DecodedBody::read_text).await
    }

    /// Send `request` and discard the body.
    ///
    /// # Errors
    /// `HttpError::Status` for non-2xx responses, plus any transport failure
    pub async fn execute_unit(
        &self,
        request: Request,
        on_response: Option<&mut ResponseHook<'_>>,
    ) -> Result<(), HttpError> {
        self.run(request, on_response, |_| Ok(())).await
    }

    /// Send `request` and hand the decoded body stream to `handler`.
    ///
    /// The stream is a [`std::io::BufRead`]; reading past the body size
    /// limit fails inside the handler and is reported as
    /// `HttpError::BodyTooLarge`.
    ///
    /// # Errors
    /// `HttpError::Status` for non-2xx responses (the handler is not
    /// invoked), transport failures, or the handler's own I/O error mapped
    /// to `HttpError::Decode`
    pub async fn execute_with_reader<R, F>(
        &self,
        request: Request,
        on_response: Option<&mut ResponseHook<'_>>,
        handler: F,
    ) -> Result<R, HttpError>
    where
        F: FnOnce(&mut DecodedBody) -> io::Result<R>,
    {
        self.run(request, on_response, |body| {
            handler(&mut *body).map_err(|e| body.map_io_error(e))
        })
        .await
    }

    /// GET `url` and deserialize the JSON response
    ///
    /// # Errors
    /// See [`Client::execute`]
    pub async fn get<T>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        on_response: Option<&mut ResponseHook<'_>>,
    ) -> Result<T, HttpError>
    where
        T: DeserializeOwned + 'static,
    {
        let request = simple_request(Method::GET, url, None, headers)?;
        self.execute_with(request, on_response).await
    }

    /// GET `url` and return the body text
    ///
    /// # Errors
    /// See [`Client::execute_text`]
    pub async fn get_string(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        on_response: Option<&mut ResponseHook<'_>>,
    ) -> Result<String, HttpError> {
        let request = simple_request(Method::GET, url, None, headers)?;
        self.execute_text(request, on_response).await
    }

    /// GET `url`, ignoring the body
    ///
    /// # Errors
    /// See [`Client::execute_unit`]
    pub async fn get_unit(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        on_response: Option<&mut ResponseHook<'_>>,
    ) -> Result<(), HttpError> {
        let request = simple_request(Method::GET, url, None, headers)?;
        self.execute_unit(request, on_response).await
    }

    /// POST the JSON string `json` to `url` and deserialize the response
    ///
    /// # Errors
    /// See [`Client::execute`]
    pub async fn post<T>(
        &self,
        url: &str,
        json: &str,
        headers: &[(&str, &str)],
        on_response: Option<&mut ResponseHook<'_>>,
    ) -> Result<T, HttpError>
    where
        T: DeserializeOwned + 'static,
    {
        let request = simple_request(Method::POST, url, Some(json), headers)?;
        self.execute_with(request, on_response).await
    }

    /// POST the JSON string `json` to `url`, ignoring the response body
    ///
    /// # Errors
    /// See [`Client::execute_unit`]
    pub async fn post_unit(
        &self,
        url: &str,
        json: &str,
        headers: &[(&str, &str)],
        on_response: Option<&mut ResponseHook<'_>>,
    ) -> Result<(), HttpError> {
        let request = simple_request(Method::POST, url, Some(json), headers)?;
        self.execute_unit(request, on_response).await
    }

    /// PUT to `url` with an optional JSON body and deserialize the response
    ///
    /// # Errors
    /// See [`Client::execute`]
    pub async fn put<T>(
        &self,
        url: &str,
        json: Option<&str>,
        headers: &[(&str, &str)],
        on_response: Option<&mut ResponseHook<'_>>,
    ) -> Result<T, HttpError>
    where
        T: DeserializeOwned + 'static,
    {
        let request = simple_request(Method::PUT, url, json, headers)?;
        self.execute_with(request, on_response).await
    }

    /// PUT to `url` with an optional JSON body, ignoring the response body
    ///
    /// # Errors
    /// See [`Client::execute_unit`]
    pub async fn put_unit(
        &self,
        url: &str,
        json: Option<&str>,
        headers: &[(&str, &str)],
        on_response: Option<&mut ResponseHook<'_>>,
    ) -> Result<(), HttpError> {
        let request = simple_request(Method::PUT, url, json, headers)?;
        self.execute_unit(request, on_response).await
    }

    /// PATCH `url` with an optional JSON body and deserialize the response
    ///
    /// # Errors
    /// See [`Client::execute`]
    pub async fn patch<T>(
        &self,
        url: &str,
        json: Option<&str>,
        headers: &[(&str, &str)],
        on_response: Option<&mut ResponseHook<'_>>,
    ) -> Result<T, HttpError>
    where
        T: DeserializeOwned + 'static,
    {
        let request = simple_request(Method::PATCH, url, json, headers)?;
        self.execute_with(request, on_response).await
    }

    /// PATCH `url` with an optional JSON body, ignoring the response body
    ///
    /// # Errors
    /// See [`Client::execute_unit`]
    pub async fn patch_unit(
        &self,
        url: &str,
        json: Option<&str>,
        headers: &[(&str, &str)],
        on_response: Option<&mut ResponseHook<'_>>,
    ) -> Result<(), HttpError> {
        let request = simple_request(Method::PATCH, url, json, headers)?;
        self.execute_unit(request, on_response).await
    }

    /// DELETE `url` and deserialize the response
    ///
    /// # Errors
    /// See [`Client::execute`]
    pub async fn delete<T>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        on_response: Option<&mut ResponseHook<'_>>,
    ) -> Result<T, HttpError>
    where
        T: DeserializeOwned + 'static,
    {
        let request = simple_request(Method::DELETE, url, None, headers)?;
        self.execute_with(request, on_response).await
    }

    /// DELETE `url`, ignoring the response body
    ///
    /// # Errors
    /// See [`Client::execute_unit`]
    pub async fn delete_unit(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        on_response: Option<&mut ResponseHook<'_>>,
    ) -> Result<(), HttpError> {
        let request = simple_request(Method::DELETE, url, None, headers)?;
        self.execute_unit(request, on_response).await
    }

    async fn run<R>(
        &self,
        request: Request,
        on_response: Option<&mut ResponseHook<'_>>,
        handler: impl FnOnce(&mut DecodedBody) -> Result<R, HttpError>,
    ) -> Result<R, HttpError> {
        let mut body = self
            .dispatch(request, on_response)
            .instrument(self.span.clone())
            .await?;
        let _entered = self.span.enter();
        handler(&mut body)
    }

    async fn dispatch(
        &self,
        request: Request,
        on_response: Option<&mut ResponseHook<'_>>,
    ) -> Result<DecodedBody, HttpError> {
        check_scheme(request.uri(), self.security)?;
        let method = request.method().clone();
        let uri = request.uri().clone();

        let response = self.transport.send(request.into_http()).await?;
        let (parts, body) = response.into_parts();
        let coding = ContentCoding::from_headers(&parts.headers);
        let code = parts.status.as_u16();

        if !parts.status.is_success() {
            let text = self.error_body_text(body, coding).await?;
            let err = StatusError::new(parts.status, &uri, text);
            tracing::error!(status = code, %method, %uri, "{err}");
            return Err(err.into());
        }

        let raw = read_body_limited(body, self.max_body_size).await?;

        let reason = parts.status.canonical_reason().unwrap_or("Unknown Status");
        tracing::info!(status = code, %method, %uri, "{code}: {reason} Request({uri}) succeeded");

        if let Some(hook) = on_response {
            hook(&ResponseMeta::new(&parts, uri));
        }

        Ok(DecodedBody::new(raw, coding, self.max_body_size))
    }

    /// Body text for a status error.
    ///
    /// An oversized or undecodable body is replaced by a placeholder so the
    /// status itself is still reported.
    async fn error_body_text(
        &self,
        body: ResponseBody,
        coding: ContentCoding,
    ) -> Result<String, HttpError> {
        let raw = match read_body_limited(body, self.max_body_size).await {
            Ok(raw) => raw,
            Err(err @ HttpError::BodyTooLarge { .. }) => {
                return Ok(format!("<body unavailable: {err}>"));
            }
            Err(err) => return Err(err),
        };
        Ok(DecodedBody::new(raw, coding, self.max_body_size)
            .read_text()
            .unwrap_or_else(|err| format!("<body unavailable: {err}>")))
    }
}

fn check_scheme(uri: &Uri, security: TransportSecurity) -> Result<(), HttpError> {
    match uri.scheme_str() {
        Some("https") => Ok(()),
        Some("http") if security == TransportSecurity::AllowInsecureHttp => Ok(()),
        Some("http") => Err(HttpError::InvalidScheme {
            scheme: "http".to_owned(),
            reason: "HTTP not allowed; use HTTPS or enable allow_insecure_http()".to_owned(),
        }),
        other => Err(HttpError::InvalidScheme {
            scheme: other.unwrap_or_default().to_owned(),
            reason: "only http and https are supported".to_owned(),
        }),
    }
}

fn decode_typed<T>(body: &mut DecodedBody, json: &JsonConfig) -> Result<T, HttpError>
where
    T: DeserializeOwned + 'static,
{
    // String targets get the raw text, not a JSON string literal
    if TypeId::of::<T>() == TypeId::of::<String>() {
        let text: Box<dyn Any> = Box::new(body.read_text()?);
        if let Ok(text) = text.downcast::<T>() {
            return Ok(*text);
        }
    }
    body.read_json(json)
}

fn simple_request(
    method: Method,
    url: &str,
    json: Option<&str>,
    headers: &[(&str, &str)],
) -> Result<Request, HttpError> {
    let mut builder = RequestBuilder::new()
        .url(url)?
        .method(method)
        .headers(headers.iter().copied());
    if let Some(json) = json {
        builder = builder.json_str(json);
    }
    builder.build()
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::request::JSON_CONTENT_TYPE;
    use bytes::Bytes;
    use http_body_util::Full;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::convert::Infallible;
    use std::io::{BufRead, Read};

    #[derive(Debug, PartialEq, serde::Deserialize)]
    struct User {
        id: u64,
        name: String,
    }

    fn test_client() -> Client {
        ClientBuilder::with_config(ClientConfig::for_testing())
            .build()
            .unwrap()
    }

    fn gzip_compress(data: &[u8]) -> Vec<u8> {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn zlib_compress(data: &[u8]) -> Vec<u8> {
        use flate2::Compression;
        use flate2::write::ZlibEncoder;
        use std::io::Write;

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[tokio::test]
    async fn test_get_typed_struct() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/users/7");
            then.status(200).json_body(json!({"id": 7, "name": "Ada"}));
        });

        let client = test_client();
        let user: User = client.get(&server.url("/users/7"), &[], None).await.unwrap();
        assert_eq!(
            user,
            User {
                id: 7,
                name: "Ada".to_owned()
            }
        );
        mock.assert();
    }

    #[tokio::test]
    async fn test_get_typed_primitives() {
        let server = MockServer::start();
        let _n = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/count");
            then.status(200).body("42");
        });
        let _b = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/flag");
            then.status(200).body("true");
        });
        let _v = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/tags");
            then.status(200).json_body(json!(["a", "b"]));
        });

        let client = test_client();
        let count: i64 = client.get(&server.url("/count"), &[], None).await.unwrap();
        let flag: bool = client.get(&server.url("/flag"), &[], None).await.unwrap();
        let tags: Vec<String> = client.get(&server.url("/tags"), &[], None).await.unwrap();

        assert_eq!(count, 42);
        assert!(flag);
        assert_eq!(tags, ["a", "b"]);
    }

    #[tokio::test]
    async fn test_accept_encoding_sent_by_default() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::GET)
                .path("/enc")
                .header("accept-encoding", "gzip, deflate");
            then.status(200).body("ok");
        });

        let client = test_client();
        let body = client.get_string(&server.url("/enc"), &[], None).await.unwrap();
        assert_eq!(body, "ok");
        mock.assert();
    }

    #[tokio::test]
    async fn test_gzip_body_matches_plain_body() {
        let server = MockServer::start();
        let original = "Hello, this is a test body that will be gzip compressed!".repeat(8);
        let compressed = gzip_compress(original.as_bytes());

        let _plain = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/plain");
            then.status(200).body(original.clone());
        });
        let _gz = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/gzip");
            then.status(200)
                .header("content-encoding", "gzip")
                .body(compressed);
        });

        let client = test_client();
        let plain = client.get_string(&server.url("/plain"), &[], None).await.unwrap();
        let gzipped = client.get_string(&server.url("/gzip"), &[], None).await.unwrap();

        assert_eq!(plain, original);
        assert_eq!(gzipped, plain, "decompressed body should match the plain one");
    }

    #[tokio::test]
    async fn test_gzip_json_deserializes() {
        let server = MockServer::start();
        let compressed = gzip_compress(br#"{"id": 3, "name": "Grace"}"#);
        let _m = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/user");
            then.status(200)
                .header("content-type", "application/json")
                .header("content-encoding", "gzip")
                .body(compressed);
        });

        let client = test_client();
        let user: User = client.get(&server.url("/user"), &[], None).await.unwrap();
        assert_eq!(user.name, "Grace");
    }

    #[tokio::test]
    async fn test_deflate_body_decoded() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/deflate");
            then.status(200)
                .header("content-encoding", "deflate")
                .body(zlib_compress(b"deflated text"));
        });

        let client = test_client();
        let body = client.get_string(&server.url("/deflate"), &[], None).await.unwrap();
        assert_eq!(body, "deflated text");
    }

    #[tokio::test]
    async fn test_non_2xx_returns_status_error() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/missing");
            then.status(404).body("not found");
        });

        let client = test_client();
        let url = server.url("/missing");
        let err = client.get::<User>(&url, &[], None).await.unwrap_err();

        assert_eq!(err.status_code(), Some(404));
        let status = err.as_status().unwrap();
        assert_eq!(status.body, "not found");
        assert_eq!(
            status.message,
            format!("404: Not Found Request({url}) failed with error: not found")
        );
    }

    #[tokio::test]
    async fn test_gzip_error_body_decoded_into_status_error() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(httpmock::Method::POST).path("/orders");
            then.status(422)
                .header("content-encoding", "gzip")
                .body(gzip_compress(br#"{"error":"quantity must be positive"}"#));
        });

        let client = test_client();
        let err = client
            .post_unit(&server.url("/orders"), r#"{"quantity":0}"#, &[], None)
            .await
            .unwrap_err();

        let status = err.as_status().unwrap();
        assert_eq!(status.status_code, 422);
        assert_eq!(status.body, r#"{"error":"quantity must be positive"}"#);
    }

    #[tokio::test]
    async fn test_error_response_with_large_body_still_reports_status() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/huge-error");
            then.status(500).body(vec![b'x'; 4096]);
        });

        let client = test_client().with_max_body_size(1024);
        let err = client
            .get_unit(&server.url("/huge-error"), &[], None)
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), Some(500));
        assert!(err.as_status().unwrap().body.starts_with("<body unavailable"));
    }

    #[tokio::test]
    async fn test_string_target_bypasses_json() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/text");
            then.status(200).body("plain text, not json");
        });

        let client = test_client();
        let text: String = client.get(&server.url("/text"), &[], None).await.unwrap();
        assert_eq!(text, "plain text, not json");
    }

    #[tokio::test]
    async fn test_string_target_keeps_json_quotes() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/quoted");
            then.status(200).body(r#""quoted""#);
        });

        let client = test_client();
        let text: String = client.get(&server.url("/quoted"), &[], None).await.unwrap();
        assert_eq!(text, r#""quoted""#);
    }

    #[tokio::test]
    async fn test_empty_success_body() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(httpmock::Method::DELETE).path("/items/1");
            then.status(204);
        });

        let client = test_client();
        let url = server.url("/items/1");

        let none: Option<User> = client.delete(&url, &[], None).await.unwrap();
        assert!(none.is_none());
        client.delete::<()>(&url, &[], None).await.unwrap();
        client.delete_unit(&url, &[], None).await.unwrap();

        let strict = test_client().with_json_config(JsonConfig {
            empty_body_as_null: false,
        });
        let err = strict.delete::<Option<User>>(&url, &[], None).await.unwrap_err();
        assert!(matches!(err, HttpError::Json(_)));
    }

    #[tokio::test]
    async fn test_malformed_json_is_json_error() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/broken");
            then.status(200).body("{\"id\": 1,");
        });

        let client = test_client();
        let err = client.get::<User>(&server.url("/broken"), &[], None).await.unwrap_err();
        assert!(matches!(err, HttpError::Json(_)));
    }

    #[tokio::test]
    async fn test_response_hook_runs_on_success_only() {
        let server = MockServer::start();
        let _ok = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/ok");
            then.status(200).header("x-request-id", "r-1").body("{}");
        });
        let _fail = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/fail");
            then.status(503).body("down");
        });

        let client = test_client();
        let mut seen = Vec::new();
        let mut hook = |meta: &ResponseMeta| {
            seen.push((
                meta.status(),
                meta.headers()
                    .get("x-request-id")
                    .map(|v| v.to_str().unwrap().to_owned()),
            ));
        };

        let _: serde_json::Value = client
            .get(&server.url("/ok"), &[], Some(&mut hook))
            .await
            .unwrap();
        let err = client
            .get_unit(&server.url("/fail"), &[], Some(&mut hook))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(503));

        assert_eq!(seen, [(http::StatusCode::OK, Some("r-1".to_owned()))]);
    }

    #[tokio::test]
    async fn test_http_rejected_under_tls_only() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/secure");
            then.status(200);
        });

        let client = Client::new().unwrap();
        let err = client
            .get_unit(&server.url("/secure"), &[], None)
            .await
            .unwrap_err();

        assert!(matches!(err, HttpError::InvalidScheme { ref scheme, .. } if scheme == "http"));
        mock.assert_calls(0);
    }

    #[test]
    fn test_check_scheme() {
        let https: Uri = "https://example.com".parse().unwrap();
        let http: Uri = "http://example.com".parse().unwrap();
        let ftp: Uri = "ftp://example.com".parse().unwrap();

        assert!(check_scheme(&https, TransportSecurity::TlsOnly).is_ok());
        assert!(check_scheme(&http, TransportSecurity::AllowInsecureHttp).is_ok());
        assert!(check_scheme(&http, TransportSecurity::TlsOnly).is_err());
        assert!(matches!(
            check_scheme(&ftp, TransportSecurity::AllowInsecureHttp),
            Err(HttpError::InvalidScheme { ref scheme, .. }) if scheme == "ftp"
        ));
    }

    #[tokio::test]
    async fn test_headers_sent() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::GET)
                .path("/headers")
                .header("x-first", "one")
                .header("authorization", "Bearer token123");
            then.status(200).body("ok");
        });

        let client = test_client();
        client
            .get_unit(
                &server.url("/headers"),
                &[("x-first", "one"), ("authorization", "Bearer token123")],
                None,
            )
            .await
            .unwrap();
        mock.assert();
    }

    #[tokio::test]
    async fn test_post_sends_json_content_type() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::POST)
                .path("/users")
                .header("content-type", JSON_CONTENT_TYPE)
                .json_body(json!({"name": "Alice"}));
            then.status(201).json_body(json!({"id": 1, "name": "Alice"}));
        });

        let client = test_client();
        let user: User = client
            .post(&server.url("/users"), r#"{"name":"Alice"}"#, &[], None)
            .await
            .unwrap();
        assert_eq!(user.id, 1);
        mock.assert();
    }

    #[tokio::test]
    async fn test_put_and_patch_with_optional_body() {
        let server = MockServer::start();
        let put = server.mock(|when, then| {
            when.method(httpmock::Method::PUT)
                .path("/resource")
                .json_body(json!({"v": 2}));
            then.status(200).json_body(json!({"id": 1, "name": "v2"}));
        });
        let patch = server.mock(|when, then| {
            when.method(httpmock::Method::PATCH).path("/resource");
            then.status(204);
        });

        let client = test_client();
        let url = server.url("/resource");
        let user: User = client.put(&url, Some(r#"{"v":2}"#), &[], None).await.unwrap();
        assert_eq!(user.name, "v2");
        client.patch_unit(&url, None, &[], None).await.unwrap();
        let nothing: Option<User> = client.patch(&url, None, &[], None).await.unwrap();
        assert!(nothing.is_none());

        put.assert();
        patch.assert_calls(2);
    }

    #[tokio::test]
    async fn test_execute_with_built_request() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::PUT)
                .path("/users/7")
                .header("x-trace", "abc");
            then.status(200).json_body(json!({"id": 7, "name": "Ada L."}));
        });

        let request = Request::builder()
            .url(&server.url("/users/7"))
            .unwrap()
            .method(Method::PUT)
            .header("x-trace", "abc")
            .json(&json!({"name": "Ada L."}))
            .unwrap()
            .build()
            .unwrap();

        let client = test_client();
        let user: User = client.execute(request).await.unwrap();
        assert_eq!(user.name, "Ada L.");
        mock.assert();
    }

    #[tokio::test]
    async fn test_execute_with_reader_streams_lines() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/events");
            then.status(200)
                .header("content-encoding", "gzip")
                .body(gzip_compress(b"one\ntwo\nthree\n"));
        });

        let client = test_client();
        let request = Request::builder()
            .url(&server.url("/events"))
            .unwrap()
            .build()
            .unwrap();
        let lines = client
            .execute_with_reader(request, None, |body| {
                body.lines().collect::<std::io::Result<Vec<_>>>()
            })
            .await
            .unwrap();
        assert_eq!(lines, ["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_body_too_large() {
        let server = MockServer::start();
        let _wire = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/large");
            then.status(200).body(vec![b'a'; 2048]);
        });
        let _bomb = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/bomb");
            then.status(200)
                .header("content-encoding", "gzip")
                .body(gzip_compress(&vec![b'a'; 64 * 1024]));
        });

        let client = test_client().with_max_body_size(1024);

        let err = client.get_string(&server.url("/large"), &[], None).await.unwrap_err();
        assert!(matches!(err, HttpError::BodyTooLarge { limit: 1024, .. }));

        let request = Request::builder()
            .url(&server.url("/bomb"))
            .unwrap()
            .build()
            .unwrap();
        let err = client
            .execute_with_reader(request, None, |body| {
                let mut sink = Vec::new();
                body.read_to_end(&mut sink).map(|_| sink.len())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::BodyTooLarge { limit: 1024, .. }));
    }

    #[tokio::test]
    async fn test_injected_transport() {
        let transport = HttpTransport::from_service(tower::service_fn(
            |req: http::Request<Full<Bytes>>| async move {
                let accept = req
                    .headers()
                    .get(http::header::ACCEPT_ENCODING)
                    .map(|v| v.to_str().unwrap_or_default().to_owned())
                    .unwrap_or_default();
                let body = json!({"id": 1, "name": accept}).to_string();
                Ok::<_, Infallible>(http::Response::new(Full::new(Bytes::from(body))))
            },
        ));

        let client = Client::builder().with_transport(transport).build().unwrap();
        let user: User = client
            .get("https://svc.internal/users/1", &[], None)
            .await
            .unwrap();
        assert_eq!(user.name, "gzip, deflate");
    }

    #[tokio::test]
    async fn test_empty_gzip_204_decodes_as_empty() {
        let transport = HttpTransport::from_service(tower::service_fn(
            |_req: http::Request<Full<Bytes>>| async move {
                let response = http::Response::builder()
                    .status(http::StatusCode::NO_CONTENT)
                    .header(http::header::CONTENT_ENCODING, "gzip")
                    .body(Full::new(Bytes::new()))
                    .unwrap();
                Ok::<_, Infallible>(response)
            },
        ));
        let client = Client::builder().with_transport(transport).build().unwrap();

        let value: Option<u32> = client
            .get("https://svc.internal/empty", &[], None)
            .await
            .unwrap();
        assert_eq!(value, None);

        let text = client
            .get_string("https://svc.internal/empty", &[], None)
            .await
            .unwrap();
        assert_eq!(text, "");
    }

    #[tokio::test]
    async fn test_invalid_url_fails_before_io() {
        let client = test_client();
        let err = client.get_unit("not a url", &[], None).await.unwrap_err();
        assert!(matches!(err, HttpError::InvalidUri { .. }));

        let err = client
            .get_unit("https://example.com", &[("bad header", "v")], None)
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::InvalidHeaderName(_)));
    }

    #[tokio::test]
    async fn test_client_is_clone_send_sync() {
        fn assert_send_sync<T: Send + Sync + Clone>() {}
        assert_send_sync::<Client>();

        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/concurrent");
            then.status(200).body("ok");
        });

        let client = test_client();
        let url = server.url("/concurrent");
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let client = client.clone();
                let url = url.clone();
                tokio::spawn(async move { client.get_string(&url, &[], None).await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "ok");
        }
        mock.assert_calls(8);
    }

    #[tokio::test]
    async fn test_status_failure_logged_at_error_level() {
        use std::sync::{Arc, Mutex};
        use tracing_subscriber::layer::SubscriberExt;

        #[derive(Clone, Default)]
        struct Capture {
            events: Arc<Mutex<Vec<(tracing::Level, String)>>>,
        }

        impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for Capture {
            fn on_event(
                &self,
                event: &tracing::Event<'_>,
                _ctx: tracing_subscriber::layer::Context<'_, S>,
            ) {
                if event.metadata().target().starts_with("httipi") {
                    let mut visitor = MessageVisitor(String::new());
                    event.record(&mut visitor);
                    self.events
                        .lock()
                        .unwrap()
                        .push((*event.metadata().level(), visitor.0));
                }
            }
        }

        struct MessageVisitor(String);
        impl tracing::field::Visit for MessageVisitor {
            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                if field.name() == "message" {
                    self.0 = format!("{value:?}");
                }
            }
        }

        let server = MockServer::start();
        let _ok = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/ok");
            then.status(200).body("1");
        });
        let _gone = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/gone");
            then.status(410).body("archived");
        });

        let capture = Capture::default();
        let events = capture.events.clone();
        let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(capture));

        let client = test_client();
        let _: u8 = client.get(&server.url("/ok"), &[], None).await.unwrap();
        let err = client.get_unit(&server.url("/gone"), &[], None).await.unwrap_err();

        let events = events.lock().unwrap();
        let ok_url = server.url("/ok");
        assert!(
            events.iter().any(|(level, msg)| *level == tracing::Level::INFO
                && *msg == format!("200: OK Request({ok_url}) succeeded")),
            "missing success event: {events:?}"
        );
        assert!(
            events
                .iter()
                .any(|(level, msg)| *level == tracing::Level::ERROR && *msg == err.to_string()),
            "missing failure event: {events:?}"
        );
    }

    #[tokio::test]
    async fn test_with_span_does_not_change_results() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/span");
            then.status(200).body("7");
        });

        let client = test_client().with_span(tracing::info_span!("billing_sync", job = 12));
        let value: u8 = client.get(&server.url("/span"), &[], None).await.unwrap();
        assert_eq!(value, 7);
    }
}
