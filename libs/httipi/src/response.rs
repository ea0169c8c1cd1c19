use crate::config::JsonConfig;
use crate::error::HttpError;
use bytes::Bytes;
use flate2::read::{MultiGzDecoder, ZlibDecoder};
use http::{HeaderMap, StatusCode, Uri, Version};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use std::io::{self, BufRead, BufReader, Cursor, Read};

/// Type alias for the boxed response body produced by a transport.
///
/// Bodies are delivered exactly as received on the wire; content decoding
/// happens in [`DecodedBody`].
pub type ResponseBody =
    http_body_util::combinators::BoxBody<Bytes, Box<dyn std::error::Error + Send + Sync>>;

/// Status line and headers of a successful response.
///
/// Handed to the optional response callback of the client's `execute`
/// family before the body is decoded.
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    uri: Uri,
}

impl ResponseMeta {
    pub(crate) fn new(parts: &http::response::Parts, uri: Uri) -> Self {
        Self {
            status: parts.status,
            version: parts.version,
            headers: parts.headers.clone(),
            uri,
        }
    }

    /// Get the response status code
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Get the HTTP version of the response
    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    /// Get the response headers
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// URI the request was sent to
    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }
}

/// Content coding of a response body, taken from `Content-Encoding`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentCoding {
    /// No (or an unrecognised) coding: body is read as-is
    Identity,
    /// `gzip` / `x-gzip`
    Gzip,
    /// `deflate` (zlib-wrapped, RFC 9110)
    Deflate,
}

impl ContentCoding {
    /// Inspect every `Content-Encoding` value; gzip takes precedence over
    /// deflate when both are listed.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut coding = Self::Identity;
        let tokens = headers
            .get_all(http::header::CONTENT_ENCODING)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(str::trim);

        for token in tokens {
            if token.eq_ignore_ascii_case("gzip") || token.eq_ignore_ascii_case("x-gzip") {
                return Self::Gzip;
            }
            if token.eq_ignore_ascii_case("deflate") {
                coding = Self::Deflate;
            }
        }
        coding
    }

    /// Lowercase token for logs and errors
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Gzip => "gzip",
            Self::Deflate => "deflate",
        }
    }
}

enum Decoder {
    Identity(Cursor<Bytes>),
    Gzip(MultiGzDecoder<Cursor<Bytes>>),
    Deflate(ZlibDecoder<Cursor<Bytes>>),
}

impl Read for Decoder {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Identity(r) => r.read(buf),
            Self::Gzip(r) => r.read(buf),
            Self::Deflate(r) => r.read(buf),
        }
    }
}

/// Counts decoded bytes and fails once `limit` is crossed.
struct Limited {
    inner: Decoder,
    limit: usize,
    read: usize,
}

impl Read for Limited {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.read += n;
        if self.read > self.limit {
            return Err(io::Error::other("decoded response body exceeds size limit"));
        }
        Ok(n)
    }
}

/// Decoded, size-limited view of a response body.
///
/// Wraps the received bytes in a gzip or zlib decompressor according to
/// the response's [`ContentCoding`], and enforces the body limit on the
/// **decompressed** bytes. Implements [`BufRead`], so it can be handed to a
/// stream handler or to `serde_json::from_reader` directly.
pub struct DecodedBody {
    reader: BufReader<Limited>,
    coding: ContentCoding,
}

impl DecodedBody {
    /// Wrap `raw` (as received) for decoding with `coding`.
    ///
    /// An empty body is read as empty regardless of `coding`; HEAD, 204 and
    /// 304 responses often advertise an encoding without sending a stream.
    #[must_use]
    pub fn new(raw: Bytes, coding: ContentCoding, limit: usize) -> Self {
        let effective = if raw.is_empty() {
            ContentCoding::Identity
        } else {
            coding
        };
        let cursor = Cursor::new(raw);
        let inner = match effective {
            ContentCoding::Identity => Decoder::Identity(cursor),
            ContentCoding::Gzip => Decoder::Gzip(MultiGzDecoder::new(cursor)),
            ContentCoding::Deflate => Decoder::Deflate(ZlibDecoder::new(cursor)),
        };
        Self {
            reader: BufReader::new(Limited {
                inner,
                limit,
                read: 0,
            }),
            coding,
        }
    }

    /// Coding being removed from the body
    #[must_use]
    pub fn coding(&self) -> ContentCoding {
        self.coding
    }

    /// Number of decoded bytes produced so far
    #[must_use]
    pub fn bytes_read(&self) -> usize {
        self.reader.get_ref().read
    }

    fn limit_exceeded(&self) -> bool {
        let limited = self.reader.get_ref();
        limited.read > limited.limit
    }

    /// Translate an I/O failure raised while reading this body.
    ///
    /// Crossing the size limit becomes `BodyTooLarge`; anything else is a
    /// `Decode` error for the body's coding.
    #[must_use]
    pub fn map_io_error(&self, source: io::Error) -> HttpError {
        if self.limit_exceeded() {
            let limited = self.reader.get_ref();
            return HttpError::BodyTooLarge {
                limit: limited.limit,
                actual: limited.read,
            };
        }
        HttpError::Decode {
            encoding: self.coding.as_str(),
            source,
        }
    }

    /// Read the remaining body as text.
    ///
    /// Invalid UTF-8 sequences are replaced with the Unicode replacement
    /// character.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::BodyTooLarge` or `HttpError::Decode`.
    pub fn read_text(&mut self) -> Result<String, HttpError> {
        let mut buf = Vec::new();
        if let Err(e) = self.reader.read_to_end(&mut buf) {
            return Err(self.map_io_error(e));
        }
        Ok(match String::from_utf8(buf) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }

    /// Deserialize the remaining body as JSON, streaming from the decoder.
    ///
    /// An empty or whitespace-only body is parsed as `null` when
    /// [`JsonConfig::empty_body_as_null`] is set.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::Json` for malformed JSON, or `BodyTooLarge` /
    /// `Decode` for failures of the underlying stream.
    pub fn read_json<T: DeserializeOwned>(&mut self, config: &JsonConfig) -> Result<T, HttpError> {
        if config.empty_body_as_null && self.skip_whitespace()? {
            return Ok(serde_json::from_slice(b"null")?);
        }

        serde_json::from_reader(&mut self.reader).map_err(|e| {
            if self.limit_exceeded() || e.is_io() {
                let kind = e.io_error_kind().unwrap_or(io::ErrorKind::Other);
                self.map_io_error(io::Error::new(kind, e))
            } else {
                HttpError::Json(e)
            }
        })
    }

    /// Consume leading JSON whitespace; `true` if the body is exhausted.
    fn skip_whitespace(&mut self) -> Result<bool, HttpError> {
        loop {
            let buf = match self.reader.fill_buf() {
                Ok(buf) => buf,
                Err(e) => return Err(self.map_io_error(e)),
            };
            if buf.is_empty() {
                return Ok(true);
            }
            let blank = buf
                .iter()
                .take_while(|b| matches!(b, b' ' | b'\t' | b'\n' | b'\r'))
                .count();
            let whole_chunk = blank == buf.len();
            self.reader.consume(blank);
            if !whole_chunk {
                return Ok(false);
            }
        }
    }
}

impl Read for DecodedBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl BufRead for DecodedBody {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.reader.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.reader.consume(amt);
    }
}

/// Collect a response body, failing once more than `limit` bytes arrive.
///
/// The limit applies to the bytes as received; [`DecodedBody`] applies it
/// again to the decompressed output.
///
/// # Errors
///
/// Returns `HttpError::Transport` for body stream failures and
/// `HttpError::BodyTooLarge` when the limit is crossed.
pub async fn read_body_limited<B>(body: B, limit: usize) -> Result<Bytes, HttpError>
where
    B: http_body::Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let mut collected = Vec::new();
    let mut body = std::pin::pin!(body);

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(|e| HttpError::Transport(e.into()))?;
        if let Some(chunk) = frame.data_ref() {
            if collected.len() + chunk.len() > limit {
                return Err(HttpError::BodyTooLarge {
                    limit,
                    actual: collected.len() + chunk.len(),
                });
            }
            collected.extend_from_slice(chunk);
        }
    }

    Ok(Bytes::from(collected))
}
