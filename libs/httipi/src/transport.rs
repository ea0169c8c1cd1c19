use crate::config::{ClientConfig, TlsRootConfig, TransportSecurity};
use crate::error::HttpError;
use crate::layers::DefaultHeadersLayer;
use crate::response::ResponseBody;
use crate::tls;
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::fmt;
use std::time::Duration;
use tower::buffer::Buffer;
use tower::timeout::TimeoutLayer;
use tower::util::BoxCloneService;
use tower::{Service, ServiceBuilder, ServiceExt};
use tower_http::follow_redirect::FollowRedirectLayer;
use tower_http::follow_redirect::policy::Limited;

/// Future returned by the type-erased transport service
pub type ServiceFuture = std::pin::Pin<
    Box<dyn std::future::Future<Output = Result<Response<ResponseBody>, HttpError>> + Send>,
>;

/// Buffered transport service.
///
/// `Buffer<Req, F>` in tower 0.5, where `F` is the inner service future.
pub type BufferedService = Buffer<Request<Full<Bytes>>, ServiceFuture>;

type InnerService = BoxCloneService<Request<Full<Bytes>>, Response<ResponseBody>, HttpError>;

/// Queue depth used for services handed to [`HttpTransport::from_service`]
const INJECTED_BUFFER_CAPACITY: usize = 1024;

/// Handle to the service that performs HTTP round-trips for a client.
///
/// Cloning is cheap: every clone shares one `tower::buffer::Buffer` worker,
/// so the transport can be used from many tasks at once without locking.
/// Response bodies come back exactly as received (no decompression).
///
/// Constructing a transport spawns the buffer worker and therefore must
/// happen inside a Tokio runtime.
#[derive(Clone)]
pub struct HttpTransport {
    service: BufferedService,
}

impl HttpTransport {
    /// Default hyper-based transport built from `config`.
    ///
    /// Stack (outer to inner): `Buffer → Timeout → DefaultHeaders →
    /// FollowRedirect (omitted when max_redirects = 0) → hyper client`.
    ///
    /// # Errors
    /// Returns `HttpError::Tls` if the TLS roots cannot be loaded, or a header
    /// error if the user agent or a default header is invalid
    pub fn from_config(config: &ClientConfig) -> Result<Self, HttpError> {
        let timeout = config.request_timeout;
        let https = build_https_connector(config.tls_roots, config.transport)?;

        let mut client_builder = Client::builder(TokioExecutor::new());
        // pool_timer is required for pool_idle_timeout to take effect
        client_builder
            .pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(config.pool_max_idle_per_host);
        if let Some(idle_timeout) = config.pool_idle_timeout {
            client_builder.pool_idle_timeout(idle_timeout);
        }
        let hyper_client = client_builder.build::<_, Full<Bytes>>(https);

        let headers = DefaultHeadersLayer::try_new(&config.user_agent, &config.default_headers)?;
        let redirects = (config.max_redirects > 0)
            .then(|| FollowRedirectLayer::with_policy(Limited::new(config.max_redirects)));

        let service = ServiceBuilder::new()
            .layer(TimeoutLayer::new(timeout))
            .layer(headers)
            .option_layer(redirects)
            .service(hyper_client)
            .map_response(box_response)
            .map_err(move |e: tower::BoxError| map_tower_error(e, timeout))
            .boxed_clone();

        Ok(Self::from_boxed(service, config.buffer_capacity))
    }

    /// Wrap any tower service as a transport.
    ///
    /// Used to inject test doubles or custom stacks. The service receives
    /// requests exactly as the client built them; no default headers,
    /// timeout or redirect handling is added.
    pub fn from_service<S, B>(service: S) -> Self
    where
        S: Service<Request<Full<Bytes>>, Response = Response<B>> + Clone + Send + 'static,
        S::Error: Into<tower::BoxError>,
        S::Future: Send + 'static,
        B: http_body::Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let service = service
            .map_response(box_response)
            .map_err(|e| map_boxed_error(e.into()))
            .boxed_clone();
        Self::from_boxed(service, INJECTED_BUFFER_CAPACITY)
    }

    fn from_boxed(service: InnerService, capacity: usize) -> Self {
        // tower's Buffer panics with capacity 0
        Self {
            service: Buffer::new(service, capacity.max(1)),
        }
    }

    /// Perform a single round-trip.
    ///
    /// Resolves for every HTTP status; only transport-level failures are
    /// returned as errors.
    ///
    /// # Errors
    /// Returns `HttpError::Transport`, `Timeout`, `Tls` or `ServiceClosed`
    pub async fn send(
        &self,
        request: Request<Full<Bytes>>,
    ) -> Result<Response<ResponseBody>, HttpError> {
        let mut service = self.service.clone();
        service.ready().await.map_err(map_buffer_error)?;
        service.call(request).await.map_err(map_buffer_error)
    }
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport").finish_non_exhaustive()
    }
}

/// Map buffer errors to `HttpError`.
///
/// Errors from the inner service arrive boxed and are unwrapped; anything
/// else means the buffer worker is gone.
fn map_buffer_error(err: tower::BoxError) -> HttpError {
    match err.downcast::<HttpError>() {
        Ok(http_err) => *http_err,
        Err(err) => {
            tracing::error!(
                error = %err,
                "buffer worker closed unexpectedly; service unavailable"
            );
            HttpError::ServiceClosed
        }
    }
}

/// Map tower errors to `HttpError`, reporting elapsed timeouts with the
/// configured duration.
fn map_tower_error(err: tower::BoxError, timeout: Duration) -> HttpError {
    if err.is::<tower::timeout::error::Elapsed>() {
        return HttpError::Timeout(timeout);
    }
    map_boxed_error(err)
}

fn map_boxed_error(err: tower::BoxError) -> HttpError {
    match err.downcast::<HttpError>() {
        Ok(http_err) => *http_err,
        Err(other) => HttpError::Transport(other),
    }
}

fn box_response<B>(response: Response<B>) -> Response<ResponseBody>
where
    B: http_body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = response.into_parts();
    Response::from_parts(parts, body.map_err(Into::into).boxed())
}

/// HTTPS connector for the configured root store.
///
/// ALPN advertises both h2 and http/1.1. Plain `http://` is only dialled
/// with `TransportSecurity::AllowInsecureHttp`.
fn build_https_connector(
    tls_roots: TlsRootConfig,
    transport: TransportSecurity,
) -> Result<HttpsConnector<HttpConnector>, HttpError> {
    let allow_http = transport == TransportSecurity::AllowInsecureHttp;

    let builder = match tls_roots {
        TlsRootConfig::WebPki => hyper_rustls::HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(tls::crypto_provider())
            .map_err(|e| HttpError::Tls(Box::new(e)))?,
        TlsRootConfig::Native => {
            hyper_rustls::HttpsConnectorBuilder::new().with_tls_config(tls::native_roots_client_config()?)
        }
    };

    let connector = if allow_http {
        builder.https_or_http().enable_all_versions().build()
    } else {
        builder.https_only().enable_all_versions().build()
    };
    Ok(connector)
}
