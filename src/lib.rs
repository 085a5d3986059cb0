#![deny(rust_2018_idioms)]

//! A composable HTTP request router: an exact-match pattern trie per HTTP
//! method, middleware chains composed at registration time, and nested
//! sub-routers with their own middleware stacks and not-found handlers.
//!
//! The router is a library, not a server: the host runtime parses HTTP,
//! builds a [`RequestCtx`] per request, calls [`Mux::serve`], and writes
//! out the [`http::Response`] the returned context converts into. The mux
//! never spawns tasks and is purely synchronous with respect to its
//! caller; the only suspension points are middlewares that deliberately
//! wait (throttling, deadlines).
//!
//! ```
//! use bytes::Bytes;
//! use http::{HeaderMap, Method, StatusCode};
//! use shunt::{Mux, RequestCtx};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut mux = Mux::new();
//! mux.wrap(shunt::middleware::recoverer());
//! mux.get("/hello/:name", |mut ctx: RequestCtx| async move {
//!     let greeting = format!("hello, {}", ctx.param("name").unwrap_or("world"));
//!     ctx.write(greeting);
//!     ctx
//! });
//!
//! let request = RequestCtx::new(
//!     Method::GET,
//!     "/hello/ferris".parse().unwrap(),
//!     HeaderMap::new(),
//!     Bytes::new(),
//! );
//! let response = mux.serve(request).await;
//! assert_eq!(response.status(), StatusCode::OK);
//! assert_eq!(response.body(), b"hello, ferris");
//! # }
//! ```
//!
//! ### Patterns
//!
//! A registered pattern begins with `/` and is matched segment by segment:
//!
//! ```text
//! Syntax    Type
//! static    matches the literal segment
//! :name     parameter: matches any single non-empty segment
//! *name     catch-all: matches the remainder of the path (may be bare *)
//! ```
//!
//! Parameters capture the matched segment under their name; a catch-all
//! captures the remainder without its leading slash and must be the last
//! segment. At any position a static segment beats a parameter, which
//! beats a catch-all, no matter the registration order. The trailing
//! slash is significant: `/x` and `/x/` are distinct routes, and `//` is
//! not collapsed.
//!
//! ```text
//! Pattern: /users/:id/files/*path
//!
//!  /users/7/files/a/b.txt    match: id="7", path="a/b.txt"
//!  /users/7/files/           match: id="7", path=""
//!  /users//files/x           no match (parameter needs a non-empty segment)
//! ```
//!
//! ### Middleware
//!
//! A middleware is a factory `Fn(DynHandler) -> DynHandler`. The stack is
//! composed around each handler when the route is registered — right to
//! left, so the middleware added first sees the request first — and the
//! composed handler is what the trie stores; dispatch does no per-request
//! assembly. See [`middleware`] for throttling, deadlines and panic
//! recovery, and [`render`] for content negotiation and body writers.
//!
//! ### Composition
//!
//! [`Mux::group`] adds routes through a child that shares the routing
//! tries but owns a copy of the middleware stack. [`Mux::route`] and
//! [`Mux::mount`] attach an independent sub-mux under a prefix; the
//! sub-mux sees paths with the prefix stripped, and a miss inside it
//! falls back to the nearest enclosing not-found handler.

mod ctx;
mod error;
mod handler;
mod mux;
mod params;
mod tree;

pub mod middleware;
pub mod render;

pub use ctx::{RequestCtx, RouteCtx};
pub use error::InsertError;
pub use handler::{DynHandler, Endpoint, Handler, IntoEndpoint, Middleware};
pub use mux::Mux;
pub use params::{Param, Params};
pub use tree::Tree;

#[doc(no_inline)]
pub use tokio_util::sync::CancellationToken;
