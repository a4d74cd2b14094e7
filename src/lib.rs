//! # action-svc
//!
//! An action-based HTTP service dispatcher.
//!
//! Every request names an *action*, via the `X-Action` header or the
//! `Action` query parameter. The action is looked up in a registry, run
//! through a middleware chain, and answered with a uniform JSON envelope:
//!
//! ```json
//! {"RequestId":"…","Error":{"Code":"InvalidAction","Message":"…"},"Data":…}
//! ```
//!
//! Empty fields are omitted. Errors are reported in-band with status
//! `200 OK`.
//!
//! - Actions, aliases and per-action middleware: [`Registry`], [`Service::register_with`]
//! - Global onion-ordered middleware: [`Service::use_middleware`], [`compose`]
//! - Method-aware binding with default-fill and validate hooks: [`Context::bind`]
//! - Pooled contexts and serialization buffers: [`pool`]
//! - HTTP/1 and HTTP/2 transport with graceful shutdown: [`Server`]
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use action_svc::{Context, HandlerError, Server, Service, middleware};
//! use serde::Deserialize;
//!
//! #[derive(Default, Deserialize)]
//! #[serde(rename_all = "PascalCase")]
//! struct Greet {
//!     #[serde(default)]
//!     name: String,
//! }
//!
//! fn greet(c: &mut Context) -> Result<(), HandlerError> {
//!     let mut args = Greet::default();
//!     c.bind(&mut args)?;
//!     c.success(&format!("hello, {}", args.name))
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let svc = Arc::new(Service::new());
//!     svc.use_middleware(&[middleware::trace()]);
//!     svc.register("Greet", greet);
//!     svc.mapping("SayHello", "Greet");
//!
//!     if let Err(e) = Server::bind("0.0.0.0:3000").unwrap().serve(svc).await {
//!         eprintln!("{e}");
//!     }
//! }
//! ```

mod context;
mod error;
mod handler;
mod registry;
mod response;
mod server;
mod service;
mod writer;

pub mod binder;
pub mod middleware;
pub mod pool;

pub use context::{Context, Hook, Renderer};
pub use error::{BoxError, CodeError, Error, HandlerError, ServeError};
pub use handler::{Handler, Middleware, compose, handler, middleware};
pub use registry::Registry;
pub use response::{ContentType, Response};
pub use server::Server;
pub use service::{
    ContextFactory, Extractor, HEADER_ACTION, HEADER_REQUEST_ID, HEADER_VERSION, QUERY_ACTION,
    Service, ServiceBuilder,
};
pub use writer::ResponseWriter;
