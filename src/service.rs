//! The dispatcher.
//!
//! [`Service`] owns the action [`Registry`], the global middleware chain and
//! the context and buffer pools. Every request goes through the same five
//! steps:
//!
//! 1. **acquire** a pooled [`Context`] and attach the request;
//! 2. **populate** action, version and request id from the request;
//! 3. **run** the middleware-wrapped dispatch handler;
//! 4. **ensure** an envelope was written, rendering the handler's result if
//!    nothing was;
//! 5. **release** the context back to the pool after resetting it.
//!
//! The core is synchronous. The transport (see [`Server`](crate::Server))
//! collects the body before calling [`Service::handle`].

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::{debug, error};

use crate::context::Context;
use crate::error::{Error, HandlerError};
use crate::handler::{Handler, Middleware, compose, handler};
use crate::pool::{BufferPool, DEFAULT_BUFFER_CAPACITY, Pool};
use crate::registry::Registry;

/// Header carrying the action name.
pub const HEADER_ACTION: &str = "X-Action";
/// Query parameter carrying the action name when the header is absent.
pub const QUERY_ACTION: &str = "Action";
/// Header carrying the API version.
pub const HEADER_VERSION: &str = "X-Version";
/// Header carrying the request id.
pub const HEADER_REQUEST_ID: &str = "X-Request-Id";

/// Pulls one piece of metadata out of a request. Absence is `""`.
pub type Extractor = Arc<dyn Fn(&http::Request<Bytes>) -> String + Send + Sync>;

/// Builds the contexts the pool hands out; the place to install hooks.
pub type ContextFactory = Arc<dyn Fn() -> Context + Send + Sync>;

struct Chain {
    middlewares: Vec<Middleware>,
    handler: Handler,
}

/// An action-based HTTP service.
///
/// ```rust
/// use action_svc::{Service, middleware};
///
/// let svc = Service::new();
/// svc.use_middleware(&[middleware::trace()]);
/// svc.mapping("old_hello", "hello");
/// svc.register("hello", |c| c.success("hello"));
///
/// let req = http::Request::builder()
///     .uri("/?Action=old_hello")
///     .body(bytes::Bytes::new())
///     .unwrap();
/// let resp = svc.handle(req);
/// assert_eq!(resp.body().as_ref(), br#"{"Data":"hello"}"#);
/// ```
pub struct Service {
    registry: Arc<Registry>,
    base: Handler,
    chain: RwLock<Chain>,
    contexts: Pool<Box<Context>>,
    get_action: Option<Extractor>,
    get_version: Option<Extractor>,
    get_request_id: Option<Extractor>,
}

impl Service {
    /// A service with default extractors and pool sizes.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ServiceBuilder {
        ServiceBuilder::default()
    }

    // ── Middleware ───────────────────────────────────────────────────────────

    /// Appends global middlewares and recomposes the chain from scratch.
    /// `middlewares[0]` of the first call is the outermost layer.
    pub fn use_middleware(&self, middlewares: &[Middleware]) {
        let mut chain = self.chain.write();
        chain.middlewares.extend_from_slice(middlewares);
        chain.handler = compose(&chain.middlewares, Arc::clone(&self.base));
    }

    // ── Registry ─────────────────────────────────────────────────────────────

    /// Registers an action handler.
    ///
    /// # Panics
    ///
    /// Panics if `name` is empty.
    pub fn register<F>(&self, name: &str, f: F)
    where
        F: Fn(&mut Context) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.registry.register(name, handler(f), &[]);
    }

    /// Registers an action handler wrapped by per-action middlewares, which
    /// run inside the global chain.
    ///
    /// # Panics
    ///
    /// Panics if `name` is empty.
    pub fn register_with<F>(&self, name: &str, f: F, middlewares: &[Middleware])
    where
        F: Fn(&mut Context) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.registry.register(name, handler(f), middlewares);
    }

    /// Removes an action. See [`Registry::unregister`].
    pub fn unregister(&self, name: &str) {
        self.registry.unregister(name);
    }

    /// Forwards calls of `from` to the action `to`. See [`Registry::mapping`].
    pub fn mapping(&self, from: &str, to: &str) {
        self.registry.mapping(from, to);
    }

    /// Names of the registered actions.
    pub fn services(&self) -> Vec<String> {
        self.registry.services()
    }

    /// A copy of the alias table.
    pub fn mappings(&self) -> std::collections::HashMap<String, String> {
        self.registry.mappings()
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    // ── Dispatch ─────────────────────────────────────────────────────────────

    /// Handles one request and returns exactly one response.
    pub fn handle(&self, req: http::Request<Bytes>) -> http::Response<Bytes> {
        let mut ctx = self.contexts.acquire();
        ctx.set_request(req);
        self.populate(&mut ctx);

        let handler = Arc::clone(&self.chain.read().handler);
        let result = handler(&mut *ctx);

        if !ctx.is_responded() {
            if let Err(e) = ctx.respond::<()>(None, result.as_ref().err()) {
                error!(action = %ctx.action, request_id = %ctx.request_id, "failed to render response: {e}");
            }
        }

        let response = ctx.take_response();
        ctx.reset();
        self.contexts.release(ctx);
        response
    }

    fn populate(&self, ctx: &mut Context) {
        ctx.action = match &self.get_action {
            Some(get) => get(ctx.request()),
            None => {
                let action = ctx.get_req_header(HEADER_ACTION);
                if action.is_empty() {
                    ctx.get_query(QUERY_ACTION).to_owned()
                } else {
                    action.to_owned()
                }
            }
        };

        ctx.version = match &self.get_version {
            Some(get) => get(ctx.request()),
            None => ctx.get_req_header(HEADER_VERSION).to_owned(),
        };

        ctx.request_id = match &self.get_request_id {
            Some(get) => get(ctx.request()),
            None => ctx.get_req_header(HEADER_REQUEST_ID).to_owned(),
        };
    }

    /// Number of idle contexts waiting in the pool.
    pub fn idle_contexts(&self) -> usize {
        self.contexts.idle()
    }
}

impl Default for Service {
    fn default() -> Self {
        Self::new()
    }
}

/// The innermost handler: resolves the action and calls it.
fn dispatch(registry: Arc<Registry>) -> Handler {
    handler(move |ctx| {
        if ctx.action.is_empty() {
            return Err(Error::INVALID_ACTION.with_message("no action").into());
        }

        match registry.resolve(&ctx.action) {
            Some(action) => action(ctx),
            None => {
                debug!(action = %ctx.action, "no handler for action");
                Err(Error::INVALID_ACTION.with_message(format!("invalid action '{}'", ctx.action)).into())
            }
        }
    })
}

// ── ServiceBuilder ────────────────────────────────────────────────────────────

/// Fluent builder for [`Service`].
///
/// ```rust
/// use std::sync::Arc;
/// use action_svc::{Context, HandlerError, Service};
///
/// let svc = Service::builder()
///     .action_extractor(|req| req.uri().path().trim_start_matches('/').to_owned())
///     .context_factory(|| {
///         let mut ctx = Context::new();
///         ctx.validate = Some(Arc::new(|_: &mut dyn std::any::Any| -> Result<(), HandlerError> { Ok(()) }));
///         ctx
///     })
///     .buffer_capacity(4096)
///     .build();
/// # let _ = svc;
/// ```
pub struct ServiceBuilder {
    new_context: Option<ContextFactory>,
    get_action: Option<Extractor>,
    get_version: Option<Extractor>,
    get_request_id: Option<Extractor>,
    buffer_capacity: usize,
    max_idle_contexts: usize,
    max_idle_buffers: usize,
}

impl Default for ServiceBuilder {
    fn default() -> Self {
        Self {
            new_context: None,
            get_action: None,
            get_version: None,
            get_request_id: None,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            max_idle_contexts: 1024,
            max_idle_buffers: 1024,
        }
    }
}

impl ServiceBuilder {
    /// Builds every pooled context. Default: [`Context::new`].
    pub fn context_factory(mut self, f: impl Fn() -> Context + Send + Sync + 'static) -> Self {
        self.new_context = Some(Arc::new(f));
        self
    }

    /// Default: the `X-Action` header, else the `Action` query parameter.
    pub fn action_extractor(
        mut self,
        f: impl Fn(&http::Request<Bytes>) -> String + Send + Sync + 'static,
    ) -> Self {
        self.get_action = Some(Arc::new(f));
        self
    }

    /// Default: the `X-Version` header.
    pub fn version_extractor(
        mut self,
        f: impl Fn(&http::Request<Bytes>) -> String + Send + Sync + 'static,
    ) -> Self {
        self.get_version = Some(Arc::new(f));
        self
    }

    /// Default: the `X-Request-Id` header.
    pub fn request_id_extractor(
        mut self,
        f: impl Fn(&http::Request<Bytes>) -> String + Send + Sync + 'static,
    ) -> Self {
        self.get_request_id = Some(Arc::new(f));
        self
    }

    /// Initial capacity of pooled serialization buffers.
    pub fn buffer_capacity(mut self, bytes: usize) -> Self {
        self.buffer_capacity = bytes;
        self
    }

    pub fn max_idle_contexts(mut self, n: usize) -> Self {
        self.max_idle_contexts = n;
        self
    }

    pub fn max_idle_buffers(mut self, n: usize) -> Self {
        self.max_idle_buffers = n;
        self
    }

    pub fn build(self) -> Service {
        let registry = Arc::new(Registry::new());
        let base = dispatch(Arc::clone(&registry));
        let buffers = Arc::new(BufferPool::new(self.buffer_capacity, self.max_idle_buffers));

        let new_context = self.new_context;
        let contexts = Pool::new(self.max_idle_contexts, move || {
            let mut ctx = match &new_context {
                Some(f) => f(),
                None => Context::new(),
            };
            ctx.set_buffer_pool(Arc::clone(&buffers));
            Box::new(ctx)
        });

        Service {
            registry,
            chain: RwLock::new(Chain { middlewares: Vec::new(), handler: Arc::clone(&base) }),
            base,
            contexts,
            get_action: self.get_action,
            get_version: self.get_version,
            get_request_id: self.get_request_id,
        }
    }
}
