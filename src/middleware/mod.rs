//! Built-in middleware.
//!
//! Middleware wraps a [`Handler`](crate::Handler) and is the place for
//! cross-cutting concerns: tracing, authentication-header inspection,
//! version gating. Install globally with
//! [`Service::use_middleware`](crate::Service::use_middleware) or per action
//! with [`Service::register_with`](crate::Service::register_with).
//!
//! - [`trace`] opens a per-request span with action, version and request id,
//!   and logs status and latency on the way out.

mod trace;

pub use trace::trace;
