//! The per-request context.
//!
//! A [`Context`] carries the inbound request, the [`ResponseWriter`], the
//! action metadata resolved by the dispatcher, and a set of hooks that tune
//! binding and rendering. Contexts are pooled by the [`Service`]: one is
//! drawn per request, reset afterwards and reused. Handlers only ever see a
//! `&mut Context` for the duration of one call.
//!
//! [`Service`]: crate::Service

use std::any::Any;
use std::fmt;
use std::io;
use std::mem;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use http::header::{CONNECTION, CONTENT_TYPE, HeaderName, HeaderValue, UPGRADE};
use http::{HeaderMap, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::binder::{self, Binder, JsonBinder, QueryBinder};
use crate::error::{Error, HandlerError};
use crate::pool::{BufferPool, DEFAULT_BUFFER_CAPACITY};
use crate::response::{ContentType, Response, set_content_type};
use crate::writer::ResponseWriter;

/// A hook run on a freshly bound payload (default-filling or validation).
///
/// The payload arrives as `&mut dyn Any`; downcast it to the types you care
/// about and leave the rest alone.
pub type Hook = Arc<dyn Fn(&mut dyn Any) -> Result<(), HandlerError> + Send + Sync>;

/// Replaces the default JSON rendering of the response envelope.
pub type Renderer = Arc<dyn Fn(&mut Context, Response) -> Result<(), HandlerError> + Send + Sync>;

pub struct Context {
    /// Name of the requested action.
    pub action: String,
    /// Requested API version.
    pub version: String,
    /// Id of the request, echoed into the envelope.
    pub request_id: String,

    /// Free slot for request-scoped user data.
    ///
    /// Not touched by the dispatcher: whatever is stored here survives the
    /// context being recycled until the application clears it.
    pub data: Option<Box<dyn Any + Send>>,

    /// Overrides the method-based binding strategy of [`bind`](Self::bind).
    ///
    /// Default: `GET`/`HEAD` bind the query string, `POST`/`PUT`/`PATCH`
    /// bind a JSON body.
    pub binder: Option<Arc<dyn Binder>>,
    /// Fills zero-valued fields after a successful bind.
    pub set_default: Option<Hook>,
    /// Validates the payload after default-filling.
    pub validate: Option<Hook>,
    /// Renders the envelope instead of the built-in JSON writer.
    pub render: Option<Renderer>,

    req: http::Request<Bytes>,
    res: ResponseWriter,
    query: Option<Vec<(String, String)>>,
    buffers: Option<Arc<BufferPool>>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            action: String::new(),
            version: String::new(),
            request_id: String::new(),
            data: None,
            binder: None,
            set_default: None,
            validate: None,
            render: None,
            req: http::Request::default(),
            res: ResponseWriter::new(),
            query: None,
            buffers: None,
        }
    }

    pub(crate) fn set_buffer_pool(&mut self, buffers: Arc<BufferPool>) {
        self.buffers = Some(buffers);
    }

    /// Detaches the request and clears everything that belongs to it.
    /// Hooks and `data` are kept.
    pub(crate) fn reset(&mut self) {
        self.action.clear();
        self.version.clear();
        self.request_id.clear();
        self.req = http::Request::default();
        self.query = None;
        self.res.reset();
    }

    /// Takes the finished response out of the writer.
    pub(crate) fn take_response(&mut self) -> http::Response<Bytes> {
        self.res.take_response()
    }

    // ── Request ──────────────────────────────────────────────────────────────

    pub fn request(&self) -> &http::Request<Bytes> {
        &self.req
    }

    /// Swaps in a new request and returns the previous one. Cached query
    /// values are dropped.
    pub fn set_request(&mut self, req: http::Request<Bytes>) -> http::Request<Bytes> {
        self.query = None;
        mem::replace(&mut self.req, req)
    }

    /// The parsed query string, cached for the rest of the request.
    pub fn query(&mut self) -> &[(String, String)] {
        let req = &self.req;
        self.query.get_or_insert_with(|| {
            serde_urlencoded::from_str(req.uri().query().unwrap_or("")).unwrap_or_default()
        })
    }

    /// First value of the query parameter `key`, or `""`.
    pub fn get_query(&mut self, key: &str) -> &str {
        self.query()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .unwrap_or("")
    }

    /// Value of the request header `key`, or `""`.
    pub fn get_req_header(&self, key: &str) -> &str {
        self.req.headers().get(key).and_then(|v| v.to_str().ok()).unwrap_or("")
    }

    pub fn content_length(&self) -> u64 {
        binder::content_length(&self.req)
    }

    /// The request `Content-Type` without parameters such as the charset.
    pub fn content_type(&self) -> &str {
        let ct = self.get_req_header(CONTENT_TYPE.as_str());
        match ct.find(';') {
            Some(i) if i > 0 => ct[..i].trim(),
            _ => ct,
        }
    }

    pub fn is_websocket(&self) -> bool {
        *self.req.method() == Method::GET
            && self.get_req_header(CONNECTION.as_str()) == "Upgrade"
            && self.get_req_header(UPGRADE.as_str()) == "websocket"
    }

    // ── Binding ──────────────────────────────────────────────────────────────

    /// Binds the request into `target`, then runs the `set_default` and
    /// `validate` hooks.
    ///
    /// Errors that are not already an [`Error`] come back as
    /// `InvalidParameter` carrying the original message; a request method
    /// with no binding strategy yields `UnsupportedProtocol`.
    ///
    /// With the default binders, a `POST` with an empty body leaves `target`
    /// as it was. Otherwise `target` is replaced by the decoded payload, so
    /// fields the `set_default` hook is meant to fill must be
    /// `#[serde(default)]`; a missing field without it fails the bind before
    /// any hook runs. A repeated query key binds its first value.
    pub fn bind<T>(&self, target: &mut T) -> Result<(), Error>
    where
        T: DeserializeOwned + 'static,
    {
        self.bind_payload(target)
            .and_then(|()| self.run_hooks(target))
            .map_err(|err| err.typed().unwrap_or_else(|| Error::INVALID_PARAMETER.with_message(err.to_string())))
    }

    fn bind_payload<T: DeserializeOwned>(&self, target: &mut T) -> Result<(), HandlerError> {
        let payload = match &self.binder {
            Some(binder) => binder.bind(&self.req)?,
            None => match *self.req.method() {
                Method::GET | Method::HEAD => QueryBinder.bind(&self.req)?,
                Method::POST | Method::PUT | Method::PATCH => JsonBinder.bind(&self.req)?,
                ref method => {
                    return Err(Error::UNSUPPORTED_PROTOCOL
                        .with_message(format!("unsupported method '{method}'"))
                        .into());
                }
            },
        };
        payload.decode(target)
    }

    fn run_hooks(&self, target: &mut dyn Any) -> Result<(), HandlerError> {
        if let Some(set_default) = &self.set_default {
            set_default(&mut *target)?;
        }
        if let Some(validate) = &self.validate {
            validate(target)?;
        }
        Ok(())
    }

    // ── Responding ───────────────────────────────────────────────────────────

    /// Renders the response envelope.
    ///
    /// `err` is classified into the envelope's error descriptor (see
    /// [`HandlerError::to_error`]). With a `render` hook installed the
    /// envelope is handed to it; otherwise it is written as JSON with status
    /// `200 OK`. Once anything has been written to the response, further
    /// calls do nothing.
    pub fn respond<T>(&mut self, data: Option<&T>, err: Option<&HandlerError>) -> Result<(), HandlerError>
    where
        T: Serialize + ?Sized,
    {
        if self.res.wrote() {
            debug!(action = %self.action, "response already written, skipping envelope");
            return Ok(());
        }

        let error = err.map(HandlerError::to_error).unwrap_or_default();

        if let Some(render) = self.render.clone() {
            let data = data.map(serde_json::to_value).transpose()?;
            let response = Response { request_id: self.request_id.clone(), error, data };
            return render(self, response);
        }

        let response = Response { request_id: mem::take(&mut self.request_id), error, data };
        let result = self.json(&response);
        self.request_id = response.request_id;
        result
    }

    /// `respond(Some(data), None)`.
    pub fn success<T: Serialize + ?Sized>(&mut self, data: &T) -> Result<(), HandlerError> {
        self.respond(Some(data), None)
    }

    /// `respond(None, Some(err))`.
    pub fn failure(&mut self, err: impl Into<HandlerError>) -> Result<(), HandlerError> {
        let err = err.into();
        self.respond::<()>(None, Some(&err))
    }

    /// Serializes `data` as JSON through a pooled buffer and writes it with
    /// status `200 OK`.
    pub fn json<T: Serialize + ?Sized>(&mut self, data: &T) -> Result<(), HandlerError> {
        let mut buf = self.acquire_buffer();
        let result = match serde_json::to_writer((&mut buf).writer(), data) {
            Ok(()) => {
                self.blob(StatusCode::OK, ContentType::JsonUtf8.as_str(), &buf);
                Ok(())
            }
            Err(e) => Err(e.into()),
        };
        self.release_buffer(buf);
        result
    }

    /// Writes `data` with the given status and content type.
    pub fn blob(&mut self, status: StatusCode, content_type: &str, data: &[u8]) {
        set_content_type(self.res.headers_mut(), content_type);
        self.res.write_header(status);
        self.res.write(data);
    }

    /// Writes `data` with the given status and content type.
    pub fn text(&mut self, status: StatusCode, content_type: &str, data: &str) {
        self.blob(status, content_type, data.as_bytes());
    }

    /// Copies everything `reader` yields into the response.
    pub fn stream<R: io::Read>(
        &mut self,
        status: StatusCode,
        content_type: &str,
        mut reader: R,
    ) -> Result<u64, HandlerError> {
        set_content_type(self.res.headers_mut(), content_type);
        self.res.write_header(status);
        Ok(io::copy(&mut reader, &mut self.res)?)
    }

    // ── Response writer ──────────────────────────────────────────────────────

    /// The status sent so far, `200 OK` if nothing was sent.
    pub fn status_code(&self) -> StatusCode {
        self.res.status()
    }

    /// Whether anything was written to the response yet.
    pub fn is_responded(&self) -> bool {
        self.res.wrote()
    }

    pub fn writer(&self) -> &ResponseWriter {
        &self.res
    }

    pub fn writer_mut(&mut self) -> &mut ResponseWriter {
        &mut self.res
    }

    pub fn header_mut(&mut self) -> &mut HeaderMap {
        self.res.headers_mut()
    }

    pub fn write_header(&mut self, status: StatusCode) {
        self.res.write_header(status);
    }

    pub fn write_str(&mut self, s: &str) -> usize {
        self.res.write_str(s)
    }

    /// Sets a response header. `Content-Type` goes through the same table as
    /// [`set_content_type`](Self::set_content_type).
    pub fn set_resp_header(&mut self, key: &str, value: &str) {
        if key.eq_ignore_ascii_case(CONTENT_TYPE.as_str()) {
            set_content_type(self.res.headers_mut(), value);
            return;
        }

        match (HeaderName::try_from(key), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.res.headers_mut().insert(name, value);
            }
            _ => warn!(header = key, "ignoring invalid response header"),
        }
    }

    /// Sets the response `Content-Type`; does nothing if `ct` is empty.
    pub fn set_content_type(&mut self, ct: &str) {
        set_content_type(self.res.headers_mut(), ct);
    }

    /// Asks the transport to close the connection after this response.
    pub fn set_connection_close(&mut self) {
        self.res.headers_mut().insert(CONNECTION, HeaderValue::from_static("close"));
    }

    // ── Buffers ──────────────────────────────────────────────────────────────

    /// Borrows a scratch buffer from the service's pool. A context built
    /// outside a [`Service`] has no pool and gets a fresh buffer.
    pub fn acquire_buffer(&self) -> BytesMut {
        match &self.buffers {
            Some(pool) => pool.acquire(),
            None => BytesMut::with_capacity(DEFAULT_BUFFER_CAPACITY),
        }
    }

    /// Gives a buffer back; it is cleared before reuse. Without a pool the
    /// buffer is dropped.
    pub fn release_buffer(&self, buf: BytesMut) {
        if let Some(pool) = &self.buffers {
            pool.release(buf);
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("action", &self.action)
            .field("version", &self.version)
            .field("request_id", &self.request_id)
            .field("method", self.req.method())
            .field("uri", self.req.uri())
            .field("responded", &self.res.wrote())
            .finish_non_exhaustive()
    }
}

impl io::Write for Context {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.res.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
