//! Handlers, middleware, and how they compose.
//!
//! A [`Handler`] borrows the per-request [`Context`] for one call and reports
//! success or a [`HandlerError`]. A [`Middleware`] turns one handler into
//! another. Both are reference-counted trait objects: the registry and the
//! dispatcher clone the `Arc` out from under their locks and call it
//! lock-free.
//!
//! ```text
//! compose([m0, m1], h)  ==  m0(m1(h))
//!
//!   in:  m0 → m1 → h
//!   out: h → m1 → m0
//! ```

use std::sync::Arc;

use crate::context::Context;
use crate::error::HandlerError;

/// A fully wrapped action handler.
pub type Handler = Arc<dyn Fn(&mut Context) -> Result<(), HandlerError> + Send + Sync + 'static>;

/// A transformation applied around a [`Handler`].
pub type Middleware = Arc<dyn Fn(Handler) -> Handler + Send + Sync + 'static>;

/// Boxes a closure as a [`Handler`].
///
/// Exists mostly for type inference: the bound pins the closure's argument
/// to `&mut Context` so it needs no annotation.
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&mut Context) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Boxes a closure as a [`Middleware`].
///
/// ```rust
/// use action_svc::{handler, middleware, Handler, Middleware};
///
/// fn require_version(version: &'static str) -> Middleware {
///     middleware(move |next: Handler| {
///         handler(move |c| {
///             if c.version != version {
///                 return c.failure(action_svc::Error::INVALID_PARAMETER.with_message("bad version"));
///             }
///             next(c)
///         })
///     })
/// }
/// # let _ = require_version("v1");
/// ```
pub fn middleware<F>(f: F) -> Middleware
where
    F: Fn(Handler) -> Handler + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wraps `handler` so that `middlewares[0]` runs first on the way in.
pub fn compose(middlewares: &[Middleware], handler: Handler) -> Handler {
    middlewares.iter().rev().fold(handler, |next, mw| mw(next))
}
