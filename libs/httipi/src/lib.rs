#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Fluent HTTP request builder and JSON client
//!
//! This crate provides:
//! - A [`RequestBuilder`] that validates absolute URLs up front, merges
//!   headers and attaches JSON, text, form or raw bodies
//! - A [`Client`] that sends one request per call and:
//!   - Advertises `Accept-Encoding: gzip, deflate` and decompresses matching
//!     responses itself, with the body limit applied to **decompressed** bytes
//!   - Turns any status outside 2xx into [`HttpError::Status`] carrying the
//!     status code, a composed message and the full body text
//!   - Deserializes JSON straight from the decoded stream, or hands the
//!     stream to a caller-supplied reader
//! - A hyper-based [`HttpTransport`] (rustls, HTTPS only by default,
//!   connection pooling, per-request timeout, redirect following) that can
//!   be swapped for any tower service
//!
//! There are no retries: a failed round-trip is reported to the caller as-is.
//!
//! # Example
//!
//! ```ignore
//! use httipi::{Client, HttpError};
//!
//! let client = Client::builder()
//!     .user_agent("billing-sync/2.1")
//!     .default_header("x-api-key", api_key)
//!     .build()?;
//!
//! match client.get::<Invoice>(&url, &[("x-tenant", "acme")], None).await {
//!     Ok(invoice) => process(invoice),
//!     Err(HttpError::Status(err)) if err.status_code == 404 => skip(),
//!     Err(other) => return Err(other.into()),
//! }
//! ```

mod builder;
mod client;
mod config;
mod error;
mod layers;
mod request;
mod response;
mod tls;
mod transport;

pub use builder::ClientBuilder;
pub use client::{Client, ResponseHook};
pub use config::{
    ClientConfig, DEFAULT_ACCEPT_ENCODING, DEFAULT_USER_AGENT, JsonConfig, TlsRootConfig,
    TransportSecurity,
};
pub use error::{HttpError, InvalidUriKind, StatusError};
pub use layers::{DefaultHeadersLayer, DefaultHeadersService};
pub use request::{Content, JSON_CONTENT_TYPE, Request, RequestBuilder};
pub use response::{ContentCoding, DecodedBody, ResponseBody, ResponseMeta, read_body_limited};
pub use transport::{BufferedService, HttpTransport, ServiceFuture};
