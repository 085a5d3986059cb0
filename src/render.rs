//! Content-type negotiation and response body writers, the counterpart of
//! the router for the response side of a request.

use std::sync::Arc;

use http::header::{self, HeaderValue};
use http::StatusCode;
use serde::Serialize;

use crate::ctx::RequestCtx;
use crate::handler::DynHandler;

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

/// An enumeration of the content types a response can be negotiated into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentType {
    PlainText,
    Html,
    Json,
    EventStream,
    Xml,
}

/// Middleware that derives the response content type from the request and
/// attaches it to the context extensions, for handlers to read back via
/// [`negotiated`].
///
/// The first comma-separated field of the `Accept` header is matched,
/// case-sensitively after trimming, against a fixed table; anything
/// unrecognised maps to JSON. A `stream` query parameter, with any value,
/// forces [`ContentType::EventStream`].
pub fn parse_content_type() -> impl Fn(DynHandler) -> DynHandler + Send + Sync + 'static {
    |next: DynHandler| -> DynHandler {
        Arc::new(move |mut ctx: RequestCtx| {
            let next = next.clone();
            async move {
                let negotiated = negotiate(&ctx);
                ctx.extensions_mut().insert(negotiated);
                next.call(ctx).await
            }
        })
    }
}

/// The content type negotiated for this request; JSON when the negotiator
/// did not run.
pub fn negotiated(ctx: &RequestCtx) -> ContentType {
    ctx.extensions()
        .get::<ContentType>()
        .copied()
        .unwrap_or(ContentType::Json)
}

fn negotiate(ctx: &RequestCtx) -> ContentType {
    if ctx.query_param("stream").is_some() {
        return ContentType::EventStream;
    }
    match accept_field(ctx) {
        Some("text/plain") => ContentType::PlainText,
        Some("text/html") | Some("application/xhtml+xml") => ContentType::Html,
        Some("application/json") | Some("text/javascript") => ContentType::Json,
        Some("text/event-stream") => ContentType::EventStream,
        Some("text/xml") => ContentType::Xml,
        _ => ContentType::Json,
    }
}

fn accept_field(ctx: &RequestCtx) -> Option<&str> {
    std::str::from_utf8(ctx.header(header::ACCEPT)?)
        .ok()?
        .split(',')
        .next()
        .map(str::trim)
}

/// Writes `v` literally as `text/plain; charset=utf-8`.
pub fn string(ctx: &mut RequestCtx, status: StatusCode, v: &str) {
    ctx.set_header(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    ctx.set_status(status);
    ctx.write(v);
}

/// Writes `v` literally as `text/html; charset=utf-8`.
pub fn html(ctx: &mut RequestCtx, status: StatusCode, v: &str) {
    ctx.set_header(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    ctx.set_status(status);
    ctx.write(v);
}

/// Serialises `v` as JSON. Serialisation failure degrades to a plain-text
/// `500` carrying the serialiser's message.
pub fn json<T: Serialize + ?Sized>(ctx: &mut RequestCtx, status: StatusCode, v: &T) {
    let body = match serde_json::to_vec(v) {
        Ok(body) => unescape_markup(body),
        Err(err) => {
            ctx.error(&err.to_string(), StatusCode::INTERNAL_SERVER_ERROR);
            return;
        }
    };
    ctx.set_header(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json; charset=utf-8"),
    );
    ctx.set_status(status);
    ctx.write(body);
}

/// Serialises `v` as XML, prepending an XML declaration unless the first
/// 100 bytes of the serialised document already contain one.
pub fn xml<T: Serialize>(ctx: &mut RequestCtx, status: StatusCode, v: &T) {
    let body = match quick_xml::se::to_string(v) {
        Ok(body) => body,
        Err(err) => {
            ctx.error(&err.to_string(), StatusCode::INTERNAL_SERVER_ERROR);
            return;
        }
    };
    ctx.set_header(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/xml; charset=utf-8"),
    );
    ctx.set_status(status);

    // Probe only the head of the document; it may open with comments.
    let probe = &body.as_bytes()[..body.len().min(100)];
    if !probe.windows(5).any(|window| window == b"<?xml") {
        ctx.write(XML_DECLARATION);
    }
    ctx.write(body);
}

/// Writes `v` as JSON, forcing `[]` for values that serialise to `null` so
/// collection endpoints never answer `null`.
pub fn respond<T: Serialize>(ctx: &mut RequestCtx, status: StatusCode, v: &T) {
    match serde_json::to_value(v) {
        Ok(serde_json::Value::Null) => json(ctx, status, &serde_json::Value::Array(Vec::new())),
        Ok(value) => json(ctx, status, &value),
        Err(err) => ctx.error(&err.to_string(), StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// Writes `{"error": <message>}` as JSON with the given status.
pub fn respond_error<E: std::fmt::Display>(ctx: &mut RequestCtx, status: StatusCode, err: &E) {
    json(ctx, status, &serde_json::json!({ "error": err.to_string() }));
}

/// Generic JSON encoders emit `<`, `>` and `&` as `\u003c`-style escape
/// sequences. They are just as valid un-escaped inside JSON, and the
/// literal form keeps payloads compact and readable.
fn unescape_markup(body: Vec<u8>) -> Vec<u8> {
    let body = replace(&body, b"\\u003c", b"<");
    let body = replace(&body, b"\\u003e", b">");
    replace(&body, b"\\u0026", b"&")
}

fn replace(haystack: &[u8], needle: &[u8], with: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(haystack.len());
    let mut i = 0;
    while i < haystack.len() {
        if haystack[i..].starts_with(needle) {
            out.extend_from_slice(with);
            i += needle.len();
        } else {
            out.push(haystack[i]);
            i += 1;
        }
    }
    out
}
