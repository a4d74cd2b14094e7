use std::time::Instant;

use tracing::{info, info_span, warn};

use crate::handler::{Handler, Middleware, handler, middleware};

/// Per-request span carrying `action`, `version` and `request_id`.
///
/// Logs one `info!` event per call with the response status and latency in
/// microseconds. A handler error is logged at `warn!` with its descriptor and
/// passed on unchanged.
pub fn trace() -> Middleware {
    middleware(|next: Handler| {
        handler(move |c| {
            let span = info_span!(
                "action",
                action = %c.action,
                version = %c.version,
                request_id = %c.request_id,
            );
            let _enter = span.enter();

            let start = Instant::now();
            let result = next(c);
            let latency_us = start.elapsed().as_micros() as u64;

            if let Err(e) = &result {
                let err = e.to_error();
                warn!(code = %err.code, "handler failed: {}", err.message);
            }
            info!(status = c.status_code().as_u16(), responded = c.is_responded(), latency_us, "handled");

            result
        })
    })
}
