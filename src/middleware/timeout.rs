use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use tokio::time::Instant;

use crate::ctx::RequestCtx;
use crate::handler::DynHandler;

/// Arms a deadline of `now + duration` on the request for the duration of
/// the wrapped handler, answering `504` if it fired.
///
/// The deadline is installed as a child cancellation scope: waiters inside
/// the wrapped chain observe it through
/// [`RequestCtx::cancelled`], and an already tighter parent deadline is
/// kept. Cancellation is cooperative — the wrapped handler is never
/// interrupted; the deadline is checked once it returns.
pub fn timeout(duration: Duration) -> impl Fn(DynHandler) -> DynHandler + Send + Sync + 'static {
    move |next: DynHandler| -> DynHandler {
        Arc::new(move |mut ctx: RequestCtx| {
            let next = next.clone();
            async move {
                let scope = ctx.push_cancel_scope(Instant::now() + duration);
                let mut ctx = next.call(ctx).await;
                let fired = ctx.deadline_exceeded();
                ctx.pop_cancel_scope(scope);
                if fired {
                    ctx.set_status(StatusCode::GATEWAY_TIMEOUT);
                }
                ctx
            }
        })
    }
}
