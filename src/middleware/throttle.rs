use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use http::StatusCode;
use tokio::sync::Semaphore;

use crate::ctx::RequestCtx;
use crate::handler::{DynHandler, Handler};

const CAPACITY_EXCEEDED: &str = "Server capacity exceeded.";
const TIMED_OUT: &str = "Timed out while waiting for a pending request to complete.";
const CANCELED: &str = "Context was canceled.";

const DEFAULT_BACKLOG_TIMEOUT: Duration = Duration::from_secs(60);

/// Limits the number of concurrently processed requests to `limit`, with
/// no backlog: a request arriving while all slots are taken is answered
/// `503` immediately.
pub fn throttle(limit: usize) -> impl Fn(DynHandler) -> DynHandler + Send + Sync + 'static {
    throttle_backlog(limit, 0, DEFAULT_BACKLOG_TIMEOUT)
}

/// Limits the number of concurrently processed requests to `limit` and
/// additionally queues up to `backlog` pending requests for at most
/// `backlog_timeout` each.
///
/// Admission is two-staged. A request first takes a backlog token without
/// blocking; if none is free the server is over capacity and the request
/// is answered `503` on the spot. It then waits for an active token, for
/// at most `backlog_timeout`, giving up early if the request is cancelled
/// or its deadline passes; either way the outcome is a `503` with the
/// reason in the body. Both tokens are returned when the wrapped handler
/// finishes, in reverse order of acquisition.
///
/// All state lives in the two semaphores; every clone of the returned
/// middleware shares them.
///
/// # Panics
///
/// Panics when `limit` is zero.
pub fn throttle_backlog(
    limit: usize,
    backlog: usize,
    backlog_timeout: Duration,
) -> impl Fn(DynHandler) -> DynHandler + Send + Sync + 'static {
    assert!(limit > 0, "throttle expects limit > 0");

    let active = Arc::new(Semaphore::new(limit));
    let queue = Arc::new(Semaphore::new(limit + backlog));

    move |next: DynHandler| -> DynHandler {
        Arc::new(Throttler {
            next,
            active: active.clone(),
            queue: queue.clone(),
            backlog_timeout,
        })
    }
}

struct Throttler {
    next: DynHandler,
    active: Arc<Semaphore>,
    queue: Arc<Semaphore>,
    backlog_timeout: Duration,
}

impl Handler for Throttler {
    fn call(&self, mut ctx: RequestCtx) -> BoxFuture<'static, RequestCtx> {
        let next = self.next.clone();
        let active = self.active.clone();
        let queue = self.queue.clone();
        let backlog_timeout = self.backlog_timeout;

        Box::pin(async move {
            let queue_permit = match queue.try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    ctx.error(CAPACITY_EXCEEDED, StatusCode::SERVICE_UNAVAILABLE);
                    return ctx;
                }
            };

            let cancelled = ctx.cancellation();
            let active_permit = tokio::select! {
                _ = cancelled => {
                    ctx.error(CANCELED, StatusCode::SERVICE_UNAVAILABLE);
                    return ctx;
                }
                _ = tokio::time::sleep(backlog_timeout) => {
                    ctx.error(TIMED_OUT, StatusCode::SERVICE_UNAVAILABLE);
                    return ctx;
                }
                permit = active.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    // the semaphore is never closed; treat it like a cancel
                    Err(_) => {
                        ctx.error(CANCELED, StatusCode::SERVICE_UNAVAILABLE);
                        return ctx;
                    }
                },
            };

            let ctx = next.call(ctx).await;

            drop(active_permit);
            drop(queue_permit);
            ctx
        })
    }
}
