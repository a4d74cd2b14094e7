//! Binding strategies: from raw request data to a typed payload.
//!
//! A [`Binder`] inspects the request and says *where* the payload lives by
//! returning a [`Payload`]. Decoding into the caller's type happens in
//! [`Payload::decode`], driven by the target's `serde::Deserialize` impl, so a
//! binder never needs to know the target type. Field names (or
//! `#[serde(rename = "...")]`) are the keys looked up in the query string or
//! body.

use std::collections::HashSet;

use bytes::Bytes;
use http::header::CONTENT_LENGTH;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::HandlerError;

/// Where a payload is read from.
#[derive(Debug)]
pub enum Payload<'r> {
    /// Nothing to decode; the target is left untouched.
    Empty,
    /// `application/x-www-form-urlencoded` data (query string or form body).
    Query(&'r str),
    /// A JSON document.
    Json(&'r [u8]),
    /// An already-parsed JSON value.
    Value(Value),
}

impl Payload<'_> {
    /// Decodes the payload into `target`, replacing its contents.
    ///
    /// Fields the payload does not carry must be `#[serde(default)]`,
    /// otherwise decoding fails with "missing field". A repeated query key
    /// binds its first value.
    pub fn decode<T: DeserializeOwned>(self, target: &mut T) -> Result<(), HandlerError> {
        match self {
            Self::Empty => {}
            Self::Query(q) => *target = serde_urlencoded::from_str(&first_values(q)?).map_err(HandlerError::other)?,
            Self::Json(body) => *target = serde_json::from_slice(body)?,
            Self::Value(v) => *target = serde_json::from_value(v)?,
        }
        Ok(())
    }
}

/// Re-encodes `query` keeping only the first value of every key.
fn first_values(query: &str) -> Result<String, HandlerError> {
    let mut pairs: Vec<(String, String)> = serde_urlencoded::from_str(query).map_err(HandlerError::other)?;
    let mut seen = HashSet::new();
    pairs.retain(|(k, _)| seen.insert(k.clone()));
    serde_urlencoded::to_string(&pairs).map_err(HandlerError::other)
}

/// A strategy locating the payload of a request.
///
/// Install one on a [`Context`](crate::Context) to override the default
/// method-based choice. Errors are wrapped into `InvalidParameter` by
/// [`Context::bind`](crate::Context::bind) unless they are already typed.
pub trait Binder: Send + Sync {
    fn bind<'r>(&self, req: &'r http::Request<Bytes>) -> Result<Payload<'r>, HandlerError>;
}

/// Binds the URL query string.
#[derive(Clone, Copy, Debug, Default)]
pub struct QueryBinder;

impl Binder for QueryBinder {
    fn bind<'r>(&self, req: &'r http::Request<Bytes>) -> Result<Payload<'r>, HandlerError> {
        Ok(Payload::Query(req.uri().query().unwrap_or("")))
    }
}

/// Binds a JSON body. A zero-length body binds nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonBinder;

impl Binder for JsonBinder {
    fn bind<'r>(&self, req: &'r http::Request<Bytes>) -> Result<Payload<'r>, HandlerError> {
        if content_length(req) > 0 {
            Ok(Payload::Json(req.body()))
        } else {
            Ok(Payload::Empty)
        }
    }
}

/// Binds a urlencoded form body. A zero-length body binds nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct FormBinder;

impl Binder for FormBinder {
    fn bind<'r>(&self, req: &'r http::Request<Bytes>) -> Result<Payload<'r>, HandlerError> {
        if content_length(req) == 0 {
            return Ok(Payload::Empty);
        }
        let form = std::str::from_utf8(req.body()).map_err(HandlerError::other)?;
        Ok(Payload::Query(form))
    }
}

/// Adapts a closure producing a JSON value into a [`Binder`].
///
/// ```rust
/// use action_svc::HandlerError;
/// use action_svc::binder::{Binder, FnBinder};
/// use serde_json::json;
///
/// // Read the payload from a header instead of the body.
/// let binder = FnBinder(|req: &http::Request<bytes::Bytes>| -> Result<_, HandlerError> {
///     let name = req.headers().get("x-name").and_then(|v| v.to_str().ok()).unwrap_or("");
///     Ok(json!({ "Name": name }))
/// });
/// # let _: &dyn Binder = &binder;
/// ```
pub struct FnBinder<F>(pub F);

impl<F> Binder for FnBinder<F>
where
    F: Fn(&http::Request<Bytes>) -> Result<Value, HandlerError> + Send + Sync,
{
    fn bind<'r>(&self, req: &'r http::Request<Bytes>) -> Result<Payload<'r>, HandlerError> {
        (self.0)(req).map(Payload::Value)
    }
}

/// The declared `Content-Length`, falling back to the collected body size.
pub(crate) fn content_length(req: &http::Request<Bytes>) -> u64 {
    req.headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(req.body().len() as u64)
}
