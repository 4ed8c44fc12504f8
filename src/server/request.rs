//! Inbound request facade.
//!
//! [`Request::read_from`] parses an HTTP/1.x request head from any buffered
//! reader and keeps the reader as the body source. The body is drained lazily:
//! the first call to [`Request::raw_body`] reads it to completion (bounded by
//! `max_body_bytes`) and every later call returns the cached buffer.

use crate::error::ParseError;
use crate::router::ParamVec;
use http::{Method, Version};
use std::borrow::Cow;
use std::collections::HashMap;
use std::io::{BufRead, Cursor, Read};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default upper bound for the request line plus headers.
pub const DEFAULT_MAX_HEADER_BYTES: usize = 16 * 1024;
/// Default upper bound for a request body.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Maximum boundary length allowed by RFC 2046.
const MAX_BOUNDARY_LEN: usize = 70;

/// Upper bound for one chunk-size line (size plus extensions).
const MAX_CHUNK_LINE_BYTES: usize = 4 * 1024;
/// Upper bound for the whole trailer section of a chunked body.
const MAX_TRAILER_BYTES: usize = 8 * 1024;

/// Size limits applied while reading a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestLimits {
    pub max_header_bytes: usize,
    pub max_body_bytes: usize,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// A header as received: a single occurrence or all occurrences in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue<'a> {
    Single(&'a str),
    Multi(Vec<&'a str>),
}

impl<'a> HeaderValue<'a> {
    /// First received value.
    pub fn first(&self) -> &'a str {
        match self {
            HeaderValue::Single(v) => v,
            HeaderValue::Multi(values) => values.first().copied().unwrap_or(""),
        }
    }

    /// All values joined with `", "`, the list form of RFC 9110.
    pub fn joined(&self) -> String {
        match self {
            HeaderValue::Single(v) => (*v).to_string(),
            HeaderValue::Multi(values) => values.join(", "),
        }
    }
}

/// Parsed `Content-Type` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Lowercased media type, e.g. `multipart/form-data`
    pub mime: String,
    pub charset: Option<String>,
    /// Multipart boundary; `None` when absent or malformed
    pub boundary: Option<String>,
}

impl ContentType {
    pub fn parse(value: &str) -> Self {
        let mut parts = value.split(';');
        let mime = parts.next().unwrap_or("").trim().to_ascii_lowercase();
        let mut charset = None;
        let mut boundary = None;

        for param in parts {
            let Some((key, raw)) = param.split_once('=') else {
                continue;
            };
            let val = raw.trim().trim_matches('"');
            match key.trim().to_ascii_lowercase().as_str() {
                "charset" => charset = Some(val.to_ascii_lowercase()),
                "boundary" => {
                    if is_valid_boundary(val) {
                        boundary = Some(val.to_string());
                    } else {
                        warn!(
                            content_type = %value,
                            boundary = %val,
                            "Malformed multipart boundary, ignoring"
                        );
                    }
                }
                _ => {}
            }
        }

        Self {
            mime,
            charset,
            boundary,
        }
    }

    pub fn is_json(&self) -> bool {
        self.mime == "application/json" || self.mime.ends_with("+json")
    }

    pub fn is_multipart(&self) -> bool {
        self.mime.starts_with("multipart/")
    }
}

fn is_valid_boundary(b: &str) -> bool {
    const SPECIALS: &str = "'()+_,-./:=? ";
    !b.is_empty()
        && b.len() <= MAX_BOUNDARY_LEN
        && !b.ends_with(' ')
        && b.chars()
            .all(|c| c.is_ascii_alphanumeric() || SPECIALS.contains(c))
}

/// Query string parameters in received order.
///
/// Uses "last write wins" semantics for [`QueryParams::get`], matching how
/// repeated keys (`?limit=10&limit=20`) are usually interpreted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    /// Parse a raw query string (without the leading `?`), URL-decoding names and values.
    pub fn parse(raw: &str) -> Self {
        Self(
            url::form_urlencoded::parse(raw.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
        )
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .rfind(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Replace every value of `name` with a single value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.0.retain(|(k, _)| *k != name);
        self.0.push((name, value.into()));
    }

    pub fn remove(&mut self, name: &str) {
        self.0.retain(|(k, _)| k != name);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Parse cookies from every `Cookie` header value.
pub fn parse_cookies<'a>(values: impl IntoIterator<Item = &'a str>) -> HashMap<String, String> {
    values
        .into_iter()
        .flat_map(|c| c.split(';'))
        .filter_map(|pair| {
            let mut parts = pair.trim().splitn(2, '=');
            let name = parts.next()?.trim();
            if name.is_empty() {
                return None;
            }
            let value = parts.next().unwrap_or("").trim();
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyFraming {
    Empty,
    Length(usize),
    Chunked,
}

enum BodyState {
    Pending {
        source: Option<Box<dyn BufRead + Send>>,
        framing: BodyFraming,
    },
    Ready(Arc<[u8]>),
    Failed(ParseError),
}

/// Inbound HTTP request.
pub struct Request {
    method: Method,
    version: Version,
    target: String,
    path: String,
    headers: Vec<(String, String)>,
    cookies: HashMap<String, String>,
    query: QueryParams,
    content_type: Option<ContentType>,
    path_params: ParamVec,
    body: BodyState,
    max_body_bytes: usize,
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("target", &self.target)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl Request {
    /// Build a request without a connection. Mostly useful for tests and
    /// in-process dispatch.
    pub fn new(method: Method, target: &str) -> Self {
        let mut req = Self {
            method,
            version: Version::HTTP_11,
            target: target.to_string(),
            path: String::new(),
            headers: Vec::new(),
            cookies: HashMap::new(),
            query: QueryParams::default(),
            content_type: None,
            path_params: ParamVec::new(),
            body: BodyState::Pending {
                source: None,
                framing: BodyFraming::Empty,
            },
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        };
        let (path, query) = split_target(target);
        req.path = path;
        req.query = QueryParams::parse(&query);
        req
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .push((name.to_ascii_lowercase(), value.to_string()));
        self.refresh_derived();
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        let len = body.len();
        self.body = BodyState::Pending {
            source: Some(Box::new(Cursor::new(body))),
            framing: BodyFraming::Length(len),
        };
        self
    }

    /// Parse a request head from `reader`, keeping the reader as the body source.
    pub fn read_from<R>(mut reader: R, limits: RequestLimits) -> Result<Self, ParseError>
    where
        R: BufRead + Send + 'static,
    {
        let mut budget = limits.max_header_bytes;
        let mut line = Vec::with_capacity(256);

        // RFC 9112 §2.2: ignore at least one empty line before the request line.
        let request_line = loop {
            read_head_line(&mut reader, &mut line, &mut budget, limits.max_header_bytes)?;
            if line.is_empty() {
                return Err(ParseError::ConnectionClosed);
            }
            let text = trim_eol(&line);
            if !text.is_empty() {
                break text.to_string();
            }
        };

        let mut parts = request_line.split_whitespace();
        let (Some(method), Some(target), Some(version), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ParseError::Malformed(format!(
                "invalid request line '{request_line}'"
            )));
        };
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|_| ParseError::Malformed(format!("invalid method '{method}'")))?;
        let version = match version {
            "HTTP/1.1" => Version::HTTP_11,
            "HTTP/1.0" => Version::HTTP_10,
            other => return Err(ParseError::UnsupportedVersion(other.to_string())),
        };

        let mut headers = Vec::new();
        loop {
            read_head_line(&mut reader, &mut line, &mut budget, limits.max_header_bytes)?;
            if line.is_empty() {
                return Err(ParseError::Malformed("unexpected end of request head".into()));
            }
            let text = trim_eol(&line);
            if text.is_empty() {
                break;
            }
            let Some((name, value)) = text.split_once(':') else {
                return Err(ParseError::Malformed(format!("invalid header line '{text}'")));
            };
            if name.is_empty() || name.contains(char::is_whitespace) {
                return Err(ParseError::Malformed(format!("invalid header name '{name}'")));
            }
            headers.push((name.to_ascii_lowercase(), value.trim().to_string()));
        }

        let framing = body_framing(&headers)?;
        debug!(
            header_count = headers.len(),
            header_names = ?headers.iter().take(20).map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
            framing = ?framing,
            "Headers extracted"
        );

        let mut req = Self::new(method, target);
        req.version = version;
        req.headers = headers;
        req.max_body_bytes = limits.max_body_bytes;
        req.body = BodyState::Pending {
            source: Some(Box::new(reader)),
            framing,
        };
        req.refresh_derived();

        info!(
            method = %req.method,
            path = %req.path,
            http_version = ?req.version,
            headers_count = req.headers.len(),
            "HTTP request parsed"
        );
        Ok(req)
    }

    fn refresh_derived(&mut self) {
        self.cookies = parse_cookies(
            self.headers
                .iter()
                .filter(|(k, _)| k == "cookie")
                .map(|(_, v)| v.as_str()),
        );
        self.content_type = self
            .headers
            .iter()
            .find(|(k, _)| k == "content-type")
            .map(|(_, v)| ContentType::parse(v));
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Raw request target including any query string.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Non-empty `/`-separated path segments.
    pub fn path_fragments(&self) -> Vec<&str> {
        self.path.split('/').filter(|s| !s.is_empty()).collect()
    }

    pub fn query(&self) -> &QueryParams {
        &self.query
    }

    pub fn query_mut(&mut self) -> &mut QueryParams {
        &mut self.query
    }

    pub fn set_query(&mut self, query: QueryParams) {
        self.query = query;
    }

    /// Case-insensitive header lookup. Never fails; absent headers are `None`.
    pub fn header(&self, name: &str) -> Option<HeaderValue<'_>> {
        let mut values: Vec<&str> = self
            .headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect();
        match values.len() {
            0 => None,
            1 => values.pop().map(HeaderValue::Single),
            _ => Some(HeaderValue::Multi(values)),
        }
    }

    /// All headers as `(lowercase-name, value)` pairs in received order.
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn cookies(&self) -> &HashMap<String, String> {
        &self.cookies
    }

    pub fn content_type(&self) -> Option<&ContentType> {
        self.content_type.as_ref()
    }

    /// Named capture from the matched route pattern.
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn path_params(&self) -> &ParamVec {
        &self.path_params
    }

    pub(crate) fn set_path_params(&mut self, params: ParamVec) {
        self.path_params = params;
    }

    /// Whether the body has already been drained into memory.
    pub fn body_is_read(&self) -> bool {
        !matches!(self.body, BodyState::Pending { .. })
    }

    /// Read the whole body once; later calls return the cached buffer.
    pub fn raw_body(&mut self) -> Result<&[u8], ParseError> {
        if let BodyState::Pending { source, framing } = &mut self.body {
            let framing = *framing;
            let loaded = match source.take() {
                None => Ok(Vec::new()),
                Some(mut src) => read_body(&mut src, framing, self.max_body_bytes),
            };
            self.body = match loaded {
                Ok(bytes) => {
                    debug!(body_size_bytes = bytes.len(), "Request body read");
                    BodyState::Ready(Arc::from(bytes))
                }
                Err(err) => {
                    warn!(error = %err, "Request body read failed");
                    BodyState::Failed(err)
                }
            };
        }
        match &self.body {
            BodyState::Ready(bytes) => Ok(bytes),
            BodyState::Failed(err) => Err(replay_failure(err)),
            BodyState::Pending { .. } => Ok(&[]),
        }
    }

    pub fn body_as_string(&mut self) -> Result<String, ParseError> {
        let bytes = self.raw_body()?;
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|_| ParseError::NotUtf8)
    }

    /// Parse the body as a JSON object.
    pub fn body_as_json(&mut self) -> Result<serde_json::Map<String, serde_json::Value>, ParseError> {
        let bytes = self.raw_body()?;
        match serde_json::from_slice(bytes)? {
            serde_json::Value::Object(map) => Ok(map),
            _ => Err(ParseError::NotAnObject),
        }
    }
}

fn split_target(target: &str) -> (String, String) {
    // absolute-form: http://host:port/path?query
    let origin = match target.find("://") {
        Some(idx) => {
            let rest = &target[idx + 3..];
            rest.find('/').map_or("/", |slash| &rest[slash..])
        }
        None => target,
    };
    let origin = origin.split('#').next().unwrap_or("");
    let (path, query) = origin.split_once('?').unwrap_or((origin, ""));
    let path = if path.is_empty() { "/" } else { path };
    (path.to_string(), query.to_string())
}

fn read_head_line<R: BufRead>(
    reader: &mut R,
    line: &mut Vec<u8>,
    budget: &mut usize,
    limit: usize,
) -> Result<(), ParseError> {
    line.clear();
    let read = reader
        .by_ref()
        .take(*budget as u64 + 1)
        .read_until(b'\n', line)
        .map_err(|e| ParseError::Malformed(e.to_string()))?;
    if read > *budget {
        return Err(ParseError::HeadersTooLarge { limit });
    }
    *budget -= read;
    Ok(())
}

/// Strip the line ending. Bytes that are not UTF-8 (obs-text) decode as Latin-1.
fn trim_eol(line: &[u8]) -> Cow<'_, str> {
    let mut end = line.len();
    while end > 0 && matches!(line[end - 1], b'\r' | b'\n') {
        end -= 1;
    }
    let line = &line[..end];
    match std::str::from_utf8(line) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => Cow::Owned(line.iter().map(|&b| char::from(b)).collect()),
    }
}

/// One chunk-size or trailer line of at most `max` bytes.
fn read_chunk_line(
    src: &mut Box<dyn BufRead + Send>,
    line: &mut Vec<u8>,
    max: usize,
) -> Result<usize, ParseError> {
    line.clear();
    let read = src
        .by_ref()
        .take(max as u64 + 1)
        .read_until(b'\n', line)
        .map_err(|e| ParseError::BodyRead(e.to_string()))?;
    if read > max {
        return Err(ParseError::Malformed(format!(
            "chunked body line exceeds {max} bytes"
        )));
    }
    Ok(read)
}

fn body_framing(headers: &[(String, String)]) -> Result<BodyFraming, ParseError> {
    let chunked = headers
        .iter()
        .filter(|(k, _)| k == "transfer-encoding")
        .any(|(_, v)| v.to_ascii_lowercase().contains("chunked"));
    if chunked {
        return Ok(BodyFraming::Chunked);
    }

    let mut length: Option<usize> = None;
    for (_, v) in headers.iter().filter(|(k, _)| k == "content-length") {
        let parsed = v
            .trim()
            .parse::<usize>()
            .map_err(|_| ParseError::Malformed(format!("invalid content-length '{v}'")))?;
        if length.is_some_and(|prev| prev != parsed) {
            return Err(ParseError::Malformed("conflicting content-length headers".into()));
        }
        length = Some(parsed);
    }
    Ok(match length {
        Some(0) | None => BodyFraming::Empty,
        Some(n) => BodyFraming::Length(n),
    })
}

fn read_body(
    src: &mut Box<dyn BufRead + Send>,
    framing: BodyFraming,
    limit: usize,
) -> Result<Vec<u8>, ParseError> {
    match framing {
        BodyFraming::Empty => Ok(Vec::new()),
        BodyFraming::Length(size) => {
            if size > limit {
                return Err(ParseError::BodyTooLarge { size, limit });
            }
            let mut buf = vec![0u8; size];
            src.read_exact(&mut buf)
                .map_err(|e| ParseError::BodyRead(e.to_string()))?;
            Ok(buf)
        }
        BodyFraming::Chunked => read_chunked(src, limit),
    }
}

fn read_chunked(src: &mut Box<dyn BufRead + Send>, limit: usize) -> Result<Vec<u8>, ParseError> {
    let mut body = Vec::new();
    let mut line = Vec::new();
    loop {
        if read_chunk_line(src, &mut line, MAX_CHUNK_LINE_BYTES)? == 0 {
            return Err(ParseError::BodyRead("connection closed inside chunked body".into()));
        }
        let text = trim_eol(&line);
        let size_field = text.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_field, 16)
            .map_err(|_| ParseError::Malformed(format!("invalid chunk size '{size_field}'")))?;

        if size == 0 {
            // Trailer section ends with an empty line.
            let mut trailer_budget = MAX_TRAILER_BYTES;
            loop {
                let n = read_chunk_line(src, &mut line, trailer_budget)?;
                if n == 0 || trim_eol(&line).is_empty() {
                    return Ok(body);
                }
                trailer_budget -= n;
            }
        }

        let total = body
            .len()
            .checked_add(size)
            .filter(|&total| total <= limit)
            .ok_or(ParseError::BodyTooLarge {
                size: body.len().saturating_add(size),
                limit,
            })?;
        let start = body.len();
        body.resize(total, 0);
        src.read_exact(&mut body[start..])
            .map_err(|e| ParseError::BodyRead(e.to_string()))?;
        let mut crlf = [0u8; 2];
        src.read_exact(&mut crlf)
            .map_err(|e| ParseError::BodyRead(e.to_string()))?;
    }
}

fn replay_failure(err: &ParseError) -> ParseError {
    match err {
        ParseError::BodyTooLarge { size, limit } => ParseError::BodyTooLarge {
            size: *size,
            limit: *limit,
        },
        other => ParseError::BodyRead(other.to_string()),
    }
}
