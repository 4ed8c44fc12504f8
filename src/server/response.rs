//! Buffered response with a single terminal `send()`.
//!
//! Status, headers, cookies and content are collected in memory. `send()`
//! writes the head, one `set-cookie` line per cookie, and the body
//! gzip-compressed over chunked transfer encoding. After that the response
//! is frozen: mutators log and do nothing.

use std::collections::HashMap;
use std::fmt::{self, Write as _};
use std::io::{self, Write};
use std::sync::Arc;

use flate2::write::GzEncoder;
use flate2::Compression;
use http::{HeaderName, HeaderValue, StatusCode};
use serde::Serialize;
use serde_json::Value;
use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::error::ResponseError;
use crate::ids::REQUEST_ID_HEADER;

/// Maximum number of headers before heap allocation.
pub const MAX_INLINE_HEADERS: usize = 16;

/// Stack-allocated header storage. Names are stored lowercase.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_TEXT: &str = "text/plain";

/// Headers owned by the framing logic in `send()`; user values are ignored.
const MANAGED_HEADERS: [&str; 5] = [
    "content-length",
    "transfer-encoding",
    "content-encoding",
    "connection",
    "set-cookie",
];

/// Reply body with its natural content type.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Objects and arrays, served as `application/json`
    Json(Value),
    Text(String),
    Bytes(Vec<u8>),
}

impl Payload {
    pub fn content_type(&self) -> &'static str {
        match self {
            Payload::Json(_) => CONTENT_TYPE_JSON,
            Payload::Text(_) | Payload::Bytes(_) => CONTENT_TYPE_TEXT,
        }
    }

    fn into_bytes(self) -> Result<Vec<u8>, ResponseError> {
        Ok(match self {
            Payload::Json(v) => serde_json::to_vec(&v)?,
            Payload::Text(s) => s.into_bytes(),
            Payload::Bytes(b) => b,
        })
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(_) | Value::Array(_) => Payload::Json(value),
            Value::String(s) => Payload::Text(s),
            other => Payload::Text(other.to_string()),
        }
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Text(s)
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Text(s.to_string())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(b: Vec<u8>) -> Self {
        Payload::Bytes(b)
    }
}

/// Anything that can be normalized into a [`HeaderVec`].
pub trait IntoHeaders {
    fn into_headers(self) -> HeaderVec;
}

fn header_pair(name: &str, value: impl Into<String>) -> (Arc<str>, String) {
    (Arc::from(name.to_ascii_lowercase()), value.into())
}

impl IntoHeaders for HeaderVec {
    fn into_headers(self) -> HeaderVec {
        self.into_iter()
            .map(|(k, v)| header_pair(&k, v))
            .collect()
    }
}

impl<K: AsRef<str>, V: Into<String>> IntoHeaders for Vec<(K, V)> {
    fn into_headers(self) -> HeaderVec {
        self.into_iter()
            .map(|(k, v)| header_pair(k.as_ref(), v))
            .collect()
    }
}

impl<K: AsRef<str>, V: Into<String>, const N: usize> IntoHeaders for [(K, V); N] {
    fn into_headers(self) -> HeaderVec {
        self.into_iter()
            .map(|(k, v)| header_pair(k.as_ref(), v))
            .collect()
    }
}

impl<K: AsRef<str>, V: Into<String>, S> IntoHeaders for HashMap<K, V, S> {
    fn into_headers(self) -> HeaderVec {
        self.into_iter()
            .map(|(k, v)| header_pair(k.as_ref(), v))
            .collect()
    }
}

impl IntoHeaders for http::HeaderMap {
    fn into_headers(self) -> HeaderVec {
        self.iter()
            .map(|(k, v)| header_pair(k.as_str(), String::from_utf8_lossy(v.as_bytes())))
            .collect()
    }
}

/// Structured argument for [`Response::reply_with`].
#[derive(Debug, Clone, Default)]
pub struct Reply {
    status: Option<u16>,
    payload: Option<Payload>,
    content_type: Option<String>,
    headers: HeaderVec,
}

impl Reply {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn payload(mut self, payload: impl Into<Payload>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Overrides the type derived from the payload
    #[must_use]
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    #[must_use]
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push(header_pair(name, value));
        self
    }

    #[must_use]
    pub fn headers(mut self, headers: impl IntoHeaders) -> Self {
        self.headers.extend(headers.into_headers());
        self
    }
}

impl From<u16> for Reply {
    fn from(status: u16) -> Self {
        Reply::new().status(status)
    }
}

impl From<StatusCode> for Reply {
    fn from(status: StatusCode) -> Self {
        Reply::new().status(status.as_u16())
    }
}

impl From<Payload> for Reply {
    fn from(payload: Payload) -> Self {
        Reply::new().payload(payload)
    }
}

/// Wraps a writer in HTTP/1.1 chunked transfer encoding.
pub struct ChunkedWriter<W: Write> {
    inner: W,
}

impl<W: Write> ChunkedWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Write the terminating zero-length chunk and hand back the writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.inner.write_all(b"0\r\n\r\n")?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for ChunkedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        write!(self.inner, "{:x}\r\n", buf.len())?;
        self.inner.write_all(buf)?;
        self.inner.write_all(b"\r\n")?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

type Sink = Box<dyn Write + Send>;

pub struct Response {
    status: StatusCode,
    headers: HeaderVec,
    cookies: Vec<(String, String)>,
    content: Option<Vec<u8>>,
    correlation_id: Option<String>,
    sink: Option<Sink>,
    sent: bool,
    modified: bool,
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("cookies", &self.cookies)
            .field("content_len", &self.content.as_ref().map(Vec::len))
            .field("sent", &self.sent)
            .field("modified", &self.modified)
            .finish()
    }
}

impl Response {
    /// Response that writes to `sink` on `send()`.
    pub fn new(sink: Box<dyn Write + Send>) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderVec::new(),
            cookies: Vec::new(),
            content: None,
            correlation_id: None,
            sink: Some(sink),
            sent: false,
            modified: false,
        }
    }

    /// Response whose bytes are discarded.
    pub fn detached() -> Self {
        Self::new(Box::new(io::sink()))
    }

    fn frozen(&self, op: &'static str) -> bool {
        if self.sent {
            warn!(op, "Response already sent, mutation ignored");
        }
        self.sent
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Codes outside 100..=999 are replaced by 500.
    pub fn set_status(&mut self, status: u16) -> &mut Self {
        if self.frozen("set_status") {
            return self;
        }
        self.status = StatusCode::from_u16(status).unwrap_or_else(|_| {
            warn!(status, "Invalid status code, using 500");
            StatusCode::INTERNAL_SERVER_ERROR
        });
        self.modified = true;
        self
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &HeaderVec {
        &self.headers
    }

    /// Replace any existing value for `name`.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        if self.frozen("set_header") {
            return self;
        }
        if self.put_header(header_pair(name, value)) {
            self.modified = true;
        }
        self
    }

    pub fn set_headers(&mut self, headers: impl IntoHeaders) -> &mut Self {
        if self.frozen("set_headers") {
            return self;
        }
        for pair in headers.into_headers() {
            if self.put_header(pair) {
                self.modified = true;
            }
        }
        self
    }

    pub fn remove_header(&mut self, name: &str) -> &mut Self {
        if self.frozen("remove_header") {
            return self;
        }
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.modified = true;
        self
    }

    /// Store a header unless it could not be written as one head line.
    fn put_header(&mut self, (name, value): (Arc<str>, String)) -> bool {
        if HeaderName::from_bytes(name.as_bytes()).is_err()
            || HeaderValue::from_bytes(value.as_bytes()).is_err()
        {
            warn!(header = %name, "Dropping header with invalid name or value");
            return false;
        }
        if let Some(slot) = self.headers.iter_mut().find(|(k, _)| *k == name) {
            slot.1 = value;
        } else {
            self.headers.push((name, value));
        }
        true
    }

    /// Queue a bare `name=value` cookie. A later call with the same name wins.
    pub fn set_cookie(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        if self.frozen("set_cookie") {
            return self;
        }
        let value = value.into();
        if !valid_cookie(name, &value) {
            warn!(cookie = name, "Dropping cookie with invalid name or value");
            return self;
        }
        match self.cookies.iter_mut().find(|(k, _)| k == name) {
            Some(slot) => slot.1 = value,
            None => self.cookies.push((name.to_string(), value)),
        }
        self.modified = true;
        self
    }

    pub fn cookies(&self) -> &[(String, String)] {
        &self.cookies
    }

    /// Raw body; sent as `text/plain` unless a content type was set.
    pub fn set_content(&mut self, content: impl Into<Vec<u8>>) -> &mut Self {
        if self.frozen("set_content") {
            return self;
        }
        self.content = Some(content.into());
        self.modified = true;
        self
    }

    pub fn content(&self) -> Option<&[u8]> {
        self.content.as_deref()
    }

    pub fn json<T: Serialize + ?Sized>(&mut self, payload: &T) -> Result<&mut Self, ResponseError> {
        let body = serde_json::to_vec(payload)?;
        self.set_header("content-type", CONTENT_TYPE_JSON);
        Ok(self.set_content(body))
    }

    pub fn text(&mut self, payload: impl Into<String>) -> &mut Self {
        self.set_header("content-type", CONTENT_TYPE_TEXT);
        self.set_content(payload.into())
    }

    /// Apply a status, a payload or a full [`Reply`].
    ///
    /// ```rust,ignore
    /// res.reply_with(204)?;
    /// res.reply_with(Reply::new().status(201).payload(json!({ "id": 7 })))?;
    /// ```
    pub fn reply_with(&mut self, reply: impl Into<Reply>) -> Result<&mut Self, ResponseError> {
        if self.frozen("reply_with") {
            return Ok(self);
        }
        let reply = reply.into();
        if let Some(status) = reply.status {
            self.set_status(status);
        }
        if !reply.headers.is_empty() {
            self.set_headers(reply.headers);
        }
        match reply.payload {
            Some(payload) => {
                let content_type = reply
                    .content_type
                    .unwrap_or_else(|| payload.content_type().to_string());
                let body = payload.into_bytes()?;
                self.set_header("content-type", content_type);
                self.set_content(body);
            }
            None => {
                if let Some(content_type) = reply.content_type {
                    self.set_header("content-type", content_type);
                }
            }
        }
        self.modified = true;
        Ok(self)
    }

    pub fn is_sent(&self) -> bool {
        self.sent
    }

    /// Whether anything was written since creation or the last reset.
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub(crate) fn reset_modified(&mut self) {
        self.modified = false;
    }

    pub(crate) fn set_correlation_id(&mut self, id: impl Into<String>) {
        self.correlation_id = Some(id.into());
    }

    /// Serialize and write the response, then release the sink.
    ///
    /// # Errors
    ///
    /// [`ResponseError::AlreadySent`] on a second call, [`ResponseError::Io`]
    /// when the peer is gone.
    pub fn send(&mut self) -> Result<(), ResponseError> {
        if self.sent {
            return Err(ResponseError::AlreadySent);
        }
        self.sent = true;
        let Some(mut sink) = self.sink.take() else {
            return Err(ResponseError::AlreadySent);
        };

        let body = self.content.as_deref().filter(|b| !b.is_empty());
        let mut head = self
            .render_head(body.is_some())
            .map_err(|_| io::Error::other("failed to format response head"))?;
        match body {
            Some(body) => {
                head.push_str("content-encoding: gzip\r\ntransfer-encoding: chunked\r\nconnection: close\r\n\r\n");
                sink.write_all(head.as_bytes())?;
                let mut encoder = GzEncoder::new(ChunkedWriter::new(&mut sink), Compression::default());
                encoder.write_all(body)?;
                encoder.finish()?.finish()?;
            }
            None => {
                head.push_str("content-length: 0\r\nconnection: close\r\n\r\n");
                sink.write_all(head.as_bytes())?;
            }
        }
        sink.flush()?;

        debug!(
            status = self.status.as_u16(),
            body_len = body.map_or(0, <[u8]>::len),
            cookies = self.cookies.len(),
            "Response sent"
        );
        Ok(())
    }

    /// Status line, caller headers, cookies and the request id.
    fn render_head(&self, has_body: bool) -> Result<String, fmt::Error> {
        let mut head = String::with_capacity(256);
        write!(
            head,
            "HTTP/1.1 {} {}\r\n",
            self.status.as_str(),
            self.status.canonical_reason().unwrap_or("")
        )?;
        for (name, value) in &self.headers {
            if MANAGED_HEADERS.contains(&name.as_ref()) || name.as_ref() == REQUEST_ID_HEADER {
                continue;
            }
            write!(head, "{name}: {value}\r\n")?;
        }
        for (name, value) in &self.cookies {
            write!(head, "set-cookie: {name}={value}\r\n")?;
        }
        if let Some(id) = &self.correlation_id {
            write!(head, "{REQUEST_ID_HEADER}: {id}\r\n")?;
        }
        if has_body && self.header("content-type").is_none() {
            write!(head, "content-type: {CONTENT_TYPE_TEXT}\r\n")?;
        }
        Ok(head)
    }
}

/// Cookie names may not carry `=`, `;`, `,` or whitespace; values may not carry `;`.
fn valid_cookie(name: &str, value: &str) -> bool {
    !name.is_empty()
        && !name
            .bytes()
            .any(|b| matches!(b, b'=' | b';' | b',') || b.is_ascii_whitespace())
        && !value.contains(';')
        && HeaderValue::from_bytes(name.as_bytes()).is_ok()
        && HeaderValue::from_bytes(value.as_bytes()).is_ok()
}
