use std::backtrace::Backtrace;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use http::StatusCode;

use crate::ctx::RequestCtx;
use crate::handler::{DynHandler, Handler};

/// A fault barrier: catches panics from the wrapped chain, logs the panic
/// with a backtrace, and answers `500 Internal Server Error`.
///
/// Everything downstream of the recoverer is protected; middlewares
/// upstream of it run to completion against a response context rebuilt
/// from the request (route captures and extensions do not survive the
/// panic).
pub fn recoverer() -> impl Fn(DynHandler) -> DynHandler + Send + Sync + 'static {
    |next: DynHandler| -> DynHandler { Arc::new(Recoverer { next }) }
}

struct Recoverer {
    next: DynHandler,
}

impl Handler for Recoverer {
    fn call(&self, ctx: RequestCtx) -> BoxFuture<'static, RequestCtx> {
        let next = self.next.clone();
        Box::pin(async move {
            let snapshot = ctx.snapshot();
            match AssertUnwindSafe(next.call(ctx)).catch_unwind().await {
                Ok(ctx) => ctx,
                Err(panic) => {
                    tracing::error!(
                        panic = panic_message(&panic),
                        backtrace = %Backtrace::force_capture(),
                        "handler panicked"
                    );
                    let mut ctx = snapshot.resume();
                    ctx.error("Internal Server Error", StatusCode::INTERNAL_SERVER_ERROR);
                    ctx
                }
            }
        })
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
