//! Helpers for exercising the pipeline without a socket.
//!
//! [`MemorySink`] captures everything a [`Response`](crate::server::Response)
//! writes; [`RawResponse`] parses those bytes back, undoing chunked framing
//! and gzip.

use std::io::{self, Read, Write};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context as _};
use flate2::read::GzDecoder;
use http::Method;
use parking_lot::Mutex;

use crate::context::RequestContext;
use crate::server::{Request, Response};

/// Cloneable in-memory writer; clones share the buffer.
#[derive(Clone, Default)]
pub struct MemorySink {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.buf.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.lock().is_empty()
    }
}

impl Write for MemorySink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.lock().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A context around `request` whose response lands in the returned sink.
pub fn context_for(request: Request) -> (RequestContext, MemorySink) {
    let sink = MemorySink::new();
    let ctx = RequestContext::new(request, Response::new(Box::new(sink.clone())));
    (ctx, sink)
}

/// Shorthand for a bodiless request context.
pub fn get(path: &str) -> (RequestContext, MemorySink) {
    context_for(Request::new(Method::GET, path))
}

/// A response as seen by the client, with the body decoded.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    /// Lowercased names, in wire order
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn parse(bytes: &[u8]) -> anyhow::Result<Self> {
        let split = bytes
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .ok_or_else(|| anyhow!("response head is not terminated"))?;
        let head = std::str::from_utf8(&bytes[..split]).context("response head is not UTF-8")?;
        let mut lines = head.split("\r\n");
        let status_line = lines.next().unwrap_or_default();
        let status = status_line
            .split(' ')
            .nth(1)
            .ok_or_else(|| anyhow!("bad status line: {status_line}"))?
            .parse::<u16>()?;
        let headers = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
            .collect::<Vec<_>>();

        let mut raw = Self {
            status,
            headers,
            body: Vec::new(),
        };
        let payload = &bytes[split + 4..];
        let framed = if raw.header("transfer-encoding") == Some("chunked") {
            dechunk(payload)?
        } else {
            payload.to_vec()
        };
        raw.body = if raw.header("content-encoding") == Some("gzip") {
            let mut out = Vec::new();
            GzDecoder::new(framed.as_slice()).read_to_end(&mut out)?;
            out
        } else {
            framed
        };
        Ok(raw)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn header_all(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn body_json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

fn dechunk(mut data: &[u8]) -> anyhow::Result<Vec<u8>> {
    let mut out = Vec::new();
    loop {
        let line_end = data
            .windows(2)
            .position(|w| w == b"\r\n")
            .ok_or_else(|| anyhow!("chunk size line is not terminated"))?;
        let size_str = std::str::from_utf8(&data[..line_end])?;
        let size = usize::from_str_radix(size_str.trim(), 16)?;
        data = &data[line_end + 2..];
        if size == 0 {
            return Ok(out);
        }
        if data.len() < size + 2 {
            bail!("chunk of {size} bytes is truncated");
        }
        out.extend_from_slice(&data[..size]);
        data = &data[size + 2..];
    }
}
