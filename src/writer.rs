//! Response writer wrapper.
//!
//! Sits between the [`Context`](crate::Context) and the outgoing
//! `http::Response`. The status line is flushed at most once per request:
//! the first `write_header` (explicit, or implied by the first non-empty
//! `write`) wins and every later call is ignored. That is what lets the
//! dispatcher's fallback envelope and a handler's own output coexist without
//! a request-level lock.

use std::io;
use std::mem;

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, StatusCode};

/// Buffers one response and records whether, with which status and how
/// many bytes it was written.
pub struct ResponseWriter {
    status: StatusCode,
    headers: HeaderMap,
    body: BytesMut,
    size: u64,
    wrote: bool,
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: BytesMut::new(),
            size: 0,
            wrote: false,
        }
    }

    /// Flushes the status. Only the first call has an effect.
    pub fn write_header(&mut self, status: StatusCode) {
        if !self.wrote {
            self.wrote = true;
            self.status = status;
        }
    }

    /// Appends `buf` to the body, flushing `200 OK` first if nothing was
    /// flushed yet. Empty writes are no-ops and do not flush.
    pub fn write(&mut self, buf: &[u8]) -> usize {
        if buf.is_empty() {
            return 0;
        }

        self.write_header(StatusCode::OK);
        self.body.extend_from_slice(buf);
        self.size += buf.len() as u64;
        buf.len()
    }

    pub fn write_str(&mut self, s: &str) -> usize {
        self.write(s.as_bytes())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// The status that was flushed, or `200 OK` if none was.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Cumulative body bytes written.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn wrote(&self) -> bool {
        self.wrote
    }

    /// Hands the accumulated response to the transport and leaves the
    /// writer ready for [`reset`](Self::reset).
    pub(crate) fn take_response(&mut self) -> http::Response<Bytes> {
        let mut response = http::Response::new(self.body.split().freeze());
        *response.status_mut() = self.status;
        *response.headers_mut() = mem::take(&mut self.headers);
        response
    }

    pub(crate) fn reset(&mut self) {
        self.status = StatusCode::OK;
        self.headers.clear();
        self.body.clear();
        self.size = 0;
        self.wrote = false;
    }
}

impl Default for ResponseWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl io::Write for ResponseWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(ResponseWriter::write(self, buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
