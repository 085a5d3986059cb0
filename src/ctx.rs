use std::sync::Arc;

use bytes::Bytes;
use http::header::{self, IntoHeaderName};
use http::{Extensions, HeaderMap, HeaderValue, Method, Response, StatusCode, Uri};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::params::Params;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Routing state that accompanies one request across nested muxes: the
/// parameters captured so far and, below a mount, the residual path the
/// child mux should look up instead of the request path.
#[derive(Debug, Clone, Default)]
pub struct RouteCtx {
    pub(crate) params: Params,
    pub(crate) route_path: Option<String>,
    pub(crate) unresolved: bool,
}

impl RouteCtx {
    /// The parameters captured so far, in capture order.
    pub fn params(&self) -> &Params {
        &self.params
    }
}

pub(crate) struct RequestHead {
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
}

/// The per-request context handed to handlers and middlewares.
///
/// The host runtime builds one from its parsed request, passes it to
/// [`Mux::serve`](crate::Mux::serve), and turns the returned context into
/// a wire response with [`into_response`](RequestCtx::into_response).
/// Handlers take the context by value and hand it back, so a middleware
/// can inspect it after the wrapped handler returns.
///
/// The request half is immutable and shared; the response half starts as
/// `200 OK` with an empty body. The context also carries the routing state
/// (see [`RouteCtx`]), an [`Extensions`] store for values middlewares want
/// to hand to handlers, and the cooperative cancellation signal: a
/// parent-chained token plus an optional deadline. Anything that blocks on
/// behalf of a request must select on [`cancelled`](RequestCtx::cancelled).
pub struct RequestCtx {
    head: Arc<RequestHead>,
    pub(crate) route: RouteCtx,
    extensions: Extensions,
    cancel: CancellationToken,
    deadline: Option<Instant>,
    status: StatusCode,
    response_headers: HeaderMap,
    response_body: Vec<u8>,
}

impl RequestCtx {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> RequestCtx {
        RequestCtx {
            head: Arc::new(RequestHead {
                method,
                uri,
                headers,
                body,
            }),
            route: RouteCtx::default(),
            extensions: Extensions::new(),
            cancel: CancellationToken::new(),
            deadline: None,
            status: StatusCode::OK,
            response_headers: HeaderMap::new(),
            response_body: Vec::new(),
        }
    }

    /// Chains this request's cancellation off `parent`, typically the host
    /// runtime's shutdown token.
    pub fn with_cancellation(mut self, parent: &CancellationToken) -> RequestCtx {
        self.cancel = parent.child_token();
        self
    }

    pub fn method(&self) -> &Method {
        &self.head.method
    }

    pub fn path(&self) -> &str {
        self.head.uri.path()
    }

    /// Returns the raw (undecoded) value of the first query parameter with
    /// the given name. A key without `=` maps to the empty string.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.head.uri.query()?.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (key == name).then_some(value)
        })
    }

    pub fn header<K: header::AsHeaderName>(&self, name: K) -> Option<&[u8]> {
        self.head.headers.get(name).map(|value| value.as_bytes())
    }

    pub fn post_body(&self) -> &[u8] {
        &self.head.body
    }

    /// Returns the URL parameter captured under `name` by the route that
    /// matched this request.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.route.params.get(name)
    }

    pub fn route(&self) -> &RouteCtx {
        &self.route
    }

    /// Per-request values attached by middlewares for handlers to read.
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn set_header<K: IntoHeaderName>(&mut self, name: K, value: HeaderValue) {
        self.response_headers.insert(name, value);
    }

    pub fn response_headers(&self) -> &HeaderMap {
        &self.response_headers
    }

    /// Appends to the response body.
    pub fn write(&mut self, chunk: impl AsRef<[u8]>) {
        self.response_body.extend_from_slice(chunk.as_ref());
    }

    pub fn body(&self) -> &[u8] {
        &self.response_body
    }

    /// Replaces the response with a plain-text error message and the given
    /// status.
    pub fn error(&mut self, message: &str, status: StatusCode) {
        self.status = status;
        self.response_headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN));
        self.response_body.clear();
        self.response_body.extend_from_slice(message.as_bytes());
    }

    /// Consumes the context into the response the host runtime writes out.
    pub fn into_response(self) -> Response<Bytes> {
        let mut response = Response::new(Bytes::from(self.response_body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.response_headers;
        response
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline_exceeded()
    }

    pub fn deadline_exceeded(&self) -> bool {
        matches!(self.deadline, Some(deadline) if Instant::now() >= deadline)
    }

    /// Resolves when the request is cancelled or its deadline passes.
    /// Never resolves for a request with neither signal armed.
    pub async fn cancelled(&self) {
        self.cancellation().await
    }

    /// Owned version of [`cancelled`](RequestCtx::cancelled), for waiting
    /// on the signal while also mutating the context (e.g. inside a
    /// `select!`).
    pub fn cancellation(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let token = self.cancel.clone();
        let deadline = self.deadline;
        async move {
            match deadline {
                Some(deadline) => tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                },
                None => token.cancelled().await,
            }
        }
    }

    pub(crate) fn head(&self) -> Arc<RequestHead> {
        self.head.clone()
    }

    /// Takes the mount residual, clearing the `*` capture alongside it so
    /// the residual's own lookup starts clean.
    pub(crate) fn take_route_path(&mut self) -> Option<String> {
        let route_path = self.route.route_path.take();
        if route_path.is_some() {
            self.route.params.remove("*");
        }
        route_path
    }

    /// Installs a child cancellation scope whose deadline is the tighter of
    /// the parent's and the given one. Returns the parent scope for
    /// [`pop_cancel_scope`](RequestCtx::pop_cancel_scope).
    pub(crate) fn push_cancel_scope(
        &mut self,
        deadline: Instant,
    ) -> (CancellationToken, Option<Instant>) {
        let child = self.cancel.child_token();
        let parent_token = std::mem::replace(&mut self.cancel, child);
        let parent_deadline = self.deadline;
        self.deadline = Some(match parent_deadline {
            Some(parent) if parent < deadline => parent,
            _ => deadline,
        });
        (parent_token, parent_deadline)
    }

    pub(crate) fn pop_cancel_scope(&mut self, scope: (CancellationToken, Option<Instant>)) {
        let (token, deadline) = scope;
        self.cancel = token;
        self.deadline = deadline;
    }

    /// A cheap copy of everything needed to answer a request whose context
    /// was lost to a panic: the shared request head and the cancellation
    /// state. Route captures and extensions do not survive.
    pub(crate) fn snapshot(&self) -> Snapshot {
        Snapshot {
            head: self.head.clone(),
            cancel: self.cancel.clone(),
            deadline: self.deadline,
        }
    }
}

pub(crate) struct Snapshot {
    head: Arc<RequestHead>,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl Snapshot {
    pub(crate) fn resume(self) -> RequestCtx {
        RequestCtx {
            head: self.head,
            route: RouteCtx::default(),
            extensions: Extensions::new(),
            cancel: self.cancel,
            deadline: self.deadline,
            status: StatusCode::OK,
            response_headers: HeaderMap::new(),
            response_body: Vec::new(),
        }
    }
}
