//! The canonical handler shape and the machinery that turns user code into
//! the composed handler stored at a trie leaf:
//! 1. Anything async that takes a [`RequestCtx`] and gives it back is a
//!    [`Handler`].
//! 2. A registration site accepts either a bare handler or a tuple of
//!    inline middlewares followed by the handler ([`IntoEndpoint`]).
//! 3. [`chain`] folds the mux middleware stack and the inline middlewares
//!    around the terminal handler, right to left, once at registration
//!    time.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::ctx::RequestCtx;

/// An asynchronous request handler.
///
/// The context is moved in and handed back, so a wrapping middleware can
/// look at the outcome (status, deadline, captures) after the inner call
/// returns. Plain `async fn`s implement this out of the box:
///
/// ```
/// use shunt::RequestCtx;
///
/// async fn hello(mut ctx: RequestCtx) -> RequestCtx {
///     ctx.write("hello");
///     ctx
/// }
/// ```
pub trait Handler: Send + Sync + 'static {
    fn call(&self, ctx: RequestCtx) -> BoxFuture<'static, RequestCtx>;
}

impl<F, Fut> Handler for F
where
    F: Fn(RequestCtx) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RequestCtx> + Send + 'static,
{
    fn call(&self, ctx: RequestCtx) -> BoxFuture<'static, RequestCtx> {
        Box::pin(self(ctx))
    }
}

/// A shared, type-erased handler: what the routing trie stores and what
/// middlewares wrap.
pub type DynHandler = Arc<dyn Handler>;

/// A middleware factory: maps a handler to a wrapped handler. Factories
/// run once per registered route, at registration time; the wrapper they
/// return runs per request.
pub type Middleware = Arc<dyn Fn(DynHandler) -> DynHandler + Send + Sync>;

/// Builds the composed handler for one route. With a stack `M1..Mn`,
/// inline middlewares `I1..Ik` and terminal handler `H`, the result is
/// `M1(M2(…Mn(I1(…Ik(H)))))`: composition is right-to-left, so the first
/// middleware added executes first per request.
pub(crate) fn chain(stack: &[Middleware], inline: &[Middleware], handler: DynHandler) -> DynHandler {
    stack
        .iter()
        .chain(inline.iter())
        .rev()
        .fold(handler, |handler, middleware| middleware(handler))
}

/// Zero or more inline middlewares plus the terminal handler of one
/// registration. A terminal handler is required by construction; there is
/// no empty endpoint.
pub struct Endpoint {
    pub(crate) middlewares: Vec<Middleware>,
    pub(crate) handler: DynHandler,
}

/// Conversion into an [`Endpoint`], implemented for a bare [`Handler`] and
/// for tuples `(mw, …, handler)` of up to six inline middlewares. The `M`
/// parameter is an inference marker only, like the extractor markers of
/// the larger web frameworks.
///
/// ```
/// use shunt::{DynHandler, Mux, RequestCtx};
///
/// async fn ping(mut ctx: RequestCtx) -> RequestCtx {
///     ctx.write(".");
///     ctx
/// }
///
/// fn noop(next: DynHandler) -> DynHandler {
///     next
/// }
///
/// let mut mux = Mux::new();
/// mux.get("/ping", ping);
/// mux.get("/ping/traced", (noop, ping));
/// ```
pub trait IntoEndpoint<M> {
    fn into_endpoint(self) -> Endpoint;
}

impl<H: Handler> IntoEndpoint<()> for H {
    fn into_endpoint(self) -> Endpoint {
        Endpoint {
            middlewares: Vec::new(),
            handler: Arc::new(self),
        }
    }
}

macro_rules! endpoint_tuple {
    ($($M:ident),+) => {
        #[allow(non_snake_case)]
        impl<$($M,)+ H> IntoEndpoint<($($M,)+)> for ($($M,)+ H)
        where
            $($M: Fn(DynHandler) -> DynHandler + Send + Sync + 'static,)+
            H: Handler,
        {
            fn into_endpoint(self) -> Endpoint {
                let ($($M,)+ handler) = self;
                let middlewares: Vec<Middleware> = vec![$(Arc::new($M),)+];
                Endpoint {
                    middlewares,
                    handler: Arc::new(handler),
                }
            }
        }
    };
}

#[rustfmt::skip]
mod tuples {
    use super::*;

    endpoint_tuple!(M1);
    endpoint_tuple!(M1, M2);
    endpoint_tuple!(M1, M2, M3);
    endpoint_tuple!(M1, M2, M3, M4);
    endpoint_tuple!(M1, M2, M3, M4, M5);
    endpoint_tuple!(M1, M2, M3, M4, M5, M6);
}
