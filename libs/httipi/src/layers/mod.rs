//! Tower layers for the transport middleware stack

mod default_headers;

pub use default_headers::{DefaultHeadersLayer, DefaultHeadersService};
