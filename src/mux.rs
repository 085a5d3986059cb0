//! The mux: per-method routing tries, a middleware stack, and the dispatch
//! loop that ties them together.
//!
//! A [`Mux`] owns one [`Tree`] per natively routed HTTP method. Routes are
//! registered against one method (`get`, `post`, …) or all of them
//! ([`handle`](Mux::handle)); each registration composes the mux's
//! middleware stack and any inline middlewares around the terminal handler
//! right away, so dispatch is a trie lookup followed by one call.
//!
//! Larger applications compose muxes: [`group`](Mux::group) shares the
//! routing tries but gets an independent middleware stack, while
//! [`route`](Mux::route) and [`mount`](Mux::mount) attach a wholly
//! independent sub-mux under a path prefix, with its own middlewares and
//! not-found handler. A sub-mux that cannot resolve a request and has no
//! not-found handler of its own defers to the nearest enclosing mux that
//! has one.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use http::{header, HeaderValue, Method, StatusCode};

use crate::ctx::RequestCtx;
use crate::handler::{chain, DynHandler, Handler, IntoEndpoint, Middleware};
use crate::tree::Tree;

/// The nine natively routed methods. Requests carrying any other verb are
/// answered `405` with an `Allow` header listing these.
static METHODS: [Method; 9] = [
    Method::CONNECT,
    Method::DELETE,
    Method::GET,
    Method::HEAD,
    Method::OPTIONS,
    Method::PATCH,
    Method::POST,
    Method::PUT,
    Method::TRACE,
];

/// A routing node: per-method tries, a middleware stack, and an optional
/// not-found handler.
///
/// All registration happens through `&mut self` during application
/// wire-up; serving takes `&self`. The borrow checker therefore enforces
/// the freeze-before-serve lifecycle and the tries need no locking.
pub struct Mux {
    middlewares: Vec<Middleware>,
    routes: HashMap<Method, Tree<DynHandler>>,
    not_found: Option<DynHandler>,
}

impl Mux {
    pub fn new() -> Mux {
        let mut routes = HashMap::with_capacity(METHODS.len());
        for method in &METHODS {
            routes.insert(method.clone(), Tree::new());
        }
        Mux {
            middlewares: Vec::new(),
            routes,
            not_found: None,
        }
    }

    /// Appends a middleware to this mux's stack. Middlewares wrap every
    /// route registered *after* this call, outermost first: the first
    /// middleware appended is the first to see a request.
    pub fn wrap<F>(&mut self, middleware: F)
    where
        F: Fn(DynHandler) -> DynHandler + Send + Sync + 'static,
    {
        self.middlewares.push(Arc::new(middleware));
    }

    /// Sets the handler invoked when no route matches. Without one, the
    /// miss is deferred to the enclosing mux (when mounted) or answered
    /// with the default `404` body by [`serve`](Mux::serve).
    pub fn not_found(&mut self, handler: impl Handler) {
        self.not_found = Some(Arc::new(handler));
    }

    /// Registers the endpoint under `pattern` for all nine methods.
    pub fn handle<M>(&mut self, pattern: &str, endpoint: impl IntoEndpoint<M>) {
        let endpoint = endpoint.into_endpoint();
        let handler = chain(&self.middlewares, &endpoint.middlewares, endpoint.handler);
        for method in &METHODS {
            self.insert(method, pattern, handler.clone());
        }
    }

    pub fn connect<M>(&mut self, pattern: &str, endpoint: impl IntoEndpoint<M>) {
        self.register(Method::CONNECT, pattern, endpoint);
    }

    pub fn delete<M>(&mut self, pattern: &str, endpoint: impl IntoEndpoint<M>) {
        self.register(Method::DELETE, pattern, endpoint);
    }

    pub fn get<M>(&mut self, pattern: &str, endpoint: impl IntoEndpoint<M>) {
        self.register(Method::GET, pattern, endpoint);
    }

    pub fn head<M>(&mut self, pattern: &str, endpoint: impl IntoEndpoint<M>) {
        self.register(Method::HEAD, pattern, endpoint);
    }

    pub fn options<M>(&mut self, pattern: &str, endpoint: impl IntoEndpoint<M>) {
        self.register(Method::OPTIONS, pattern, endpoint);
    }

    pub fn patch<M>(&mut self, pattern: &str, endpoint: impl IntoEndpoint<M>) {
        self.register(Method::PATCH, pattern, endpoint);
    }

    pub fn post<M>(&mut self, pattern: &str, endpoint: impl IntoEndpoint<M>) {
        self.register(Method::POST, pattern, endpoint);
    }

    pub fn put<M>(&mut self, pattern: &str, endpoint: impl IntoEndpoint<M>) {
        self.register(Method::PUT, pattern, endpoint);
    }

    pub fn trace<M>(&mut self, pattern: &str, endpoint: impl IntoEndpoint<M>) {
        self.register(Method::TRACE, pattern, endpoint);
    }

    /// Runs `register` against a child mux that shares this mux's routing
    /// tries but carries a copy of the middleware stack. Middlewares added
    /// inside the group apply only to routes registered there.
    ///
    /// A not-found handler set inside the group is discarded; set it on
    /// the mux that dispatches.
    pub fn group(&mut self, register: impl FnOnce(&mut Mux)) {
        let mut child = Mux {
            middlewares: self.middlewares.clone(),
            routes: std::mem::take(&mut self.routes),
            not_found: None,
        };
        register(&mut child);
        self.routes = child.routes;
    }

    /// Creates an independent sub-mux, lets `register` populate it, and
    /// mounts it at `pattern`.
    pub fn route(&mut self, pattern: &str, register: impl FnOnce(&mut Mux)) {
        let mut sub = Mux::new();
        register(&mut sub);
        self.mount(pattern, sub);
    }

    /// Attaches `handler` (usually a sub-mux) under `pattern`: at the
    /// prefix itself, the prefix with a trailing slash, and everything
    /// below it. The mountee sees the residual path with the prefix
    /// stripped, so its own routes are written as if it were the root.
    ///
    /// The mountee is consumed; registering into it afterwards is
    /// impossible, as is mounting a mux into itself.
    pub fn mount(&mut self, pattern: &str, handler: impl Handler) {
        let wrapper: DynHandler = Arc::new(MountWrapper {
            inner: Arc::new(handler),
        });
        let handler = chain(&self.middlewares, &[], wrapper);
        let prefix = if pattern == "/" { "" } else { pattern };
        for method in &METHODS {
            if !prefix.is_empty() {
                self.insert(method, prefix, handler.clone());
            }
            self.insert(method, &format!("{prefix}/"), handler.clone());
            self.insert(method, &format!("{prefix}/*"), handler.clone());
        }
    }

    /// Dispatches a request and applies the default not-found response if
    /// the whole mux chain left it unresolved. This is the host runtime's
    /// entry point; nested muxes are reached through their mount wrappers
    /// instead.
    pub async fn serve(&self, ctx: RequestCtx) -> RequestCtx {
        let mut ctx = self.call(ctx).await;
        if ctx.route.unresolved {
            ctx.route.unresolved = false;
            ctx.error("404 page not found", StatusCode::NOT_FOUND);
        }
        ctx
    }

    fn register<M>(&mut self, method: Method, pattern: &str, endpoint: impl IntoEndpoint<M>) {
        let endpoint = endpoint.into_endpoint();
        let handler = chain(&self.middlewares, &endpoint.middlewares, endpoint.handler);
        self.insert(&method, pattern, handler);
    }

    /// Route patterns are fixed at wire-up time, so a malformed or
    /// conflicting pattern is a programming error and panics.
    fn insert(&mut self, method: &Method, pattern: &str, handler: DynHandler) {
        tracing::trace!(%method, pattern, "route registered");
        let tree = self.routes.entry(method.clone()).or_insert_with(Tree::new);
        if let Err(err) = tree.insert(pattern, handler) {
            panic!("invalid route pattern {:?}: {}", pattern, err);
        }
    }
}

impl Default for Mux {
    fn default() -> Mux {
        Mux::new()
    }
}

/// Dispatch: pick the method trie (`405` for foreign verbs), look up the
/// request path — or the residual a mount wrapper left on the route
/// context — and invoke the composed handler at the matched leaf. A miss
/// runs this mux's not-found handler, or marks the request unresolved for
/// the enclosing mux to answer.
impl Handler for Mux {
    fn call(&self, mut ctx: RequestCtx) -> BoxFuture<'static, RequestCtx> {
        let Some(tree) = self.routes.get(ctx.method()) else {
            return Box::pin(method_not_allowed(ctx));
        };

        let found = match ctx.take_route_path() {
            Some(path) => tree.find(&path, &mut ctx.route.params).cloned(),
            None => {
                let head = ctx.head();
                tree.find(head.uri.path(), &mut ctx.route.params).cloned()
            }
        };

        match found {
            Some(handler) => {
                let not_found = self.not_found.clone();
                Box::pin(async move {
                    let mut ctx = handler.call(ctx).await;
                    if ctx.route.unresolved {
                        if let Some(not_found) = not_found {
                            ctx.route.unresolved = false;
                            ctx = not_found.call(ctx).await;
                        }
                    }
                    ctx
                })
            }
            None => {
                tracing::debug!(method = %ctx.method(), path = ctx.path(), "no route matched");
                match self.not_found.clone() {
                    Some(not_found) => not_found.call(ctx),
                    None => {
                        ctx.route.unresolved = true;
                        Box::pin(async move { ctx })
                    }
                }
            }
        }
    }
}

/// Registered by [`Mux::mount`] at the mount point. Reads the residual
/// below the prefix from the `*` capture, stashes it on the route context
/// as the next lookup path, and delegates to the mountee.
struct MountWrapper {
    inner: DynHandler,
}

impl Handler for MountWrapper {
    fn call(&self, mut ctx: RequestCtx) -> BoxFuture<'static, RequestCtx> {
        let route_path = format!("/{}", ctx.route.params.get("*").unwrap_or(""));
        ctx.route.route_path = Some(route_path);
        self.inner.call(ctx)
    }
}

fn method_not_allowed(mut ctx: RequestCtx) -> impl std::future::Future<Output = RequestCtx> {
    let allow = METHODS
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if let Ok(value) = HeaderValue::from_str(&allow) {
        ctx.set_header(header::ALLOW, value);
    }
    ctx.error("Method Not Allowed", StatusCode::METHOD_NOT_ALLOWED);
    async move { ctx }
}
