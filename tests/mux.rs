use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use shunt::{DynHandler, Mux, RequestCtx};

fn request(method: Method, path: &str) -> RequestCtx {
    RequestCtx::new(method, path.parse().unwrap(), HeaderMap::new(), Bytes::new())
}

async fn get(mux: &Mux, path: &str) -> (StatusCode, String) {
    let ctx = mux.serve(request(Method::GET, path)).await;
    let body = String::from_utf8(ctx.body().to_vec()).unwrap();
    (ctx.status(), body)
}

async fn body(mux: &Mux, method: Method, path: &str) -> String {
    let ctx = mux.serve(request(method, path)).await;
    String::from_utf8(ctx.body().to_vec()).unwrap()
}

#[tokio::test]
async fn serves_routes_and_custom_not_found() {
    let mut r = Mux::new();
    r.get("/hi", |mut ctx: RequestCtx| async move {
        ctx.write("bye");
        ctx
    });
    r.not_found(|mut ctx: RequestCtx| async move {
        ctx.set_status(StatusCode::NOT_FOUND);
        ctx.write("nothing here");
        ctx
    });

    assert_eq!(get(&r, "/hi").await, (StatusCode::OK, "bye".to_string()));
    assert_eq!(
        get(&r, "/hello").await,
        (StatusCode::NOT_FOUND, "nothing here".to_string())
    );
}

#[tokio::test]
async fn default_not_found_body() {
    let mut r = Mux::new();
    r.get("/hi", |mut ctx: RequestCtx| async move {
        ctx.write("bye");
        ctx
    });

    assert_eq!(
        get(&r, "/nothing-here").await,
        (StatusCode::NOT_FOUND, "404 page not found".to_string())
    );
}

#[tokio::test]
async fn url_params_reach_the_handler() {
    let mut r = Mux::new();
    r.get("/ping", |mut ctx: RequestCtx| async move {
        ctx.write(".");
        ctx
    });
    r.get("/ping/:id", |mut ctx: RequestCtx| async move {
        let body = format!("ping one id: {}", ctx.param("id").unwrap_or(""));
        ctx.write(body);
        ctx
    });
    // same pattern again: replaces, does not conflict
    r.get("/ping/:id/woop", |mut ctx: RequestCtx| async move {
        ctx.write("woop.");
        ctx
    });
    r.handle("/admin/*", |mut ctx: RequestCtx| async move {
        ctx.write("catchall");
        ctx
    });

    assert_eq!(get(&r, "/ping").await.1, ".");
    assert_eq!(get(&r, "/ping/123").await.1, "ping one id: 123");
    assert_eq!(get(&r, "/ping/allan").await.1, "ping one id: allan");
    assert_eq!(get(&r, "/ping/1/woop").await.1, "woop.");
    assert_eq!(get(&r, "/admin/catch-thazzzzz").await.1, "catchall");
    assert_eq!(body(&r, Method::POST, "/admin/catch-this").await, "catchall");
}

#[tokio::test]
async fn middleware_stack_inits_once_and_runs_per_request() {
    #[derive(Clone)]
    struct CtxCount(u64);
    #[derive(Clone)]
    struct User(&'static str);

    let ctx_inits = Arc::new(AtomicU64::new(0));
    let handler_runs = Arc::new(AtomicU64::new(0));

    let mut r = Mux::new();

    // counts factory invocations and per-request passes, and publishes the
    // request count into the context
    let inits = ctx_inits.clone();
    r.wrap(move |next: DynHandler| -> DynHandler {
        inits.fetch_add(1, Ordering::SeqCst);
        let passes = Arc::new(AtomicU64::new(0));
        Arc::new(move |mut ctx: RequestCtx| {
            let next = next.clone();
            let pass = passes.fetch_add(1, Ordering::SeqCst) + 1;
            ctx.extensions_mut().insert(CtxCount(pass));
            async move { next.call(ctx).await }
        })
    });

    r.wrap(|next: DynHandler| -> DynHandler {
        Arc::new(move |mut ctx: RequestCtx| {
            let next = next.clone();
            ctx.extensions_mut().insert(User("peter"));
            async move { next.call(ctx).await }
        })
    });

    fn inline_noop(next: DynHandler) -> DynHandler {
        next
    }

    let runs = handler_runs.clone();
    let inits_seen = ctx_inits.clone();
    r.get(
        "/",
        (inline_noop, move |mut ctx: RequestCtx| {
            let reqs = runs.fetch_add(1, Ordering::SeqCst) + 1;
            let inits = inits_seen.load(Ordering::SeqCst);
            let ctx_value = ctx.extensions().get::<CtxCount>().map(|c| c.0).unwrap_or(0);
            let user = ctx.extensions().get::<User>().map(|u| u.0).unwrap_or("?");
            assert_eq!(user, "peter");
            ctx.write(format!("inits:{inits} reqs:{reqs} ctxValue:{ctx_value}"));
            async move { ctx }
        }),
    );

    get(&r, "/").await;
    get(&r, "/").await;
    let (_, third) = get(&r, "/").await;
    assert_eq!(third, "inits:1 reqs:3 ctxValue:3");
}

#[tokio::test]
async fn middleware_can_short_circuit() {
    let mut r = Mux::new();
    r.wrap(|next: DynHandler| -> DynHandler {
        Arc::new(move |mut ctx: RequestCtx| {
            let next = next.clone();
            async move {
                if ctx.path() == "/ping" {
                    ctx.write("pong");
                    return ctx;
                }
                next.call(ctx).await
            }
        })
    });
    r.get("/ping", |mut ctx: RequestCtx| async move {
        ctx.write("wooot");
        ctx
    });
    r.get("/hi", |mut ctx: RequestCtx| async move {
        ctx.write("wooot");
        ctx
    });

    assert_eq!(get(&r, "/ping").await.1, "pong");
    assert_eq!(get(&r, "/hi").await.1, "wooot");
}

#[tokio::test]
async fn nested_not_found_bubbles_to_root() {
    let mut r = Mux::new();
    r.get("/hi", |mut ctx: RequestCtx| async move {
        ctx.write("bye");
        ctx
    });
    r.not_found(|mut ctx: RequestCtx| async move {
        ctx.set_status(StatusCode::NOT_FOUND);
        ctx.write("root 404");
        ctx
    });

    r.route("/admin1", |sr| {
        sr.get("/sub", |mut ctx: RequestCtx| async move {
            ctx.write("sub");
            ctx
        });
        sr.not_found(|mut ctx: RequestCtx| async move {
            ctx.set_status(StatusCode::NOT_FOUND);
            ctx.write("sub 404");
            ctx
        });
    });

    r.route("/admin2", |sr| {
        sr.get("/sub", |mut ctx: RequestCtx| async move {
            ctx.write("sub2");
            ctx
        });
    });

    assert_eq!(get(&r, "/hi").await.1, "bye");
    assert_eq!(get(&r, "/nothing-here").await.1, "root 404");
    assert_eq!(get(&r, "/admin1/sub").await.1, "sub");
    assert_eq!(get(&r, "/admin1/nope").await.1, "sub 404");
    assert_eq!(get(&r, "/admin2/sub").await.1, "sub2");
    // no not-found handler on admin2: the miss falls through to the root
    assert_eq!(
        get(&r, "/admin2/nope").await,
        (StatusCode::NOT_FOUND, "root 404".to_string())
    );
}

#[tokio::test]
async fn subroutes_see_residual_paths_and_outer_params() {
    let mut r = Mux::new();
    r.get("/hubs/:hub_id/view", |mut ctx: RequestCtx| async move {
        ctx.write("hub1");
        ctx
    });
    r.get("/hubs/:hub_id/view/*", |mut ctx: RequestCtx| async move {
        ctx.write("hub2");
        ctx
    });

    let mut users = Mux::new();
    users.get("/", |mut ctx: RequestCtx| async move {
        ctx.write("hub3");
        ctx
    });
    r.mount("/hubs/:hub_id/users", users);

    let mut accounts = Mux::new();
    accounts.get("/", |mut ctx: RequestCtx| async move {
        ctx.write("account1");
        ctx
    });
    accounts.get("/hi", |mut ctx: RequestCtx| async move {
        // params captured by the outer mux stay visible, the mount
        // residual capture does not
        let account_id = ctx.param("account_id").unwrap_or("?").to_string();
        let residual = ctx.param("*").map(str::to_string);
        ctx.write(format!("account2 {account_id} {residual:?}"));
        ctx
    });

    r.route("/accounts/:account_id", move |sr| {
        sr.mount("/", accounts);
    });

    assert_eq!(get(&r, "/hubs/123/view").await.1, "hub1");
    assert_eq!(get(&r, "/hubs/123/view/index.html").await.1, "hub2");
    assert_eq!(get(&r, "/hubs/123/users").await.1, "hub3");
    assert_eq!(get(&r, "/accounts/44").await.1, "account1");
    assert_eq!(get(&r, "/accounts/44/hi").await.1, "account2 44 None");
}

#[tokio::test]
async fn group_copies_the_middleware_stack() {
    let inits = Arc::new(AtomicU64::new(0));
    let passes = Arc::new(AtomicU64::new(0));

    let mut r = Mux::new();
    {
        let inits = inits.clone();
        let passes = passes.clone();
        r.group(move |g| {
            g.wrap(move |next: DynHandler| -> DynHandler {
                inits.fetch_add(1, Ordering::SeqCst);
                let passes = passes.clone();
                Arc::new(move |ctx: RequestCtx| {
                    let next = next.clone();
                    passes.fetch_add(1, Ordering::SeqCst);
                    async move { next.call(ctx).await }
                })
            });
            g.get("/group", |mut ctx: RequestCtx| async move {
                ctx.write("root group");
                ctx
            });
        });
    }
    // registered on the parent after the group: the group's middleware
    // must not apply
    r.get("/outside", |mut ctx: RequestCtx| async move {
        ctx.write("outside");
        ctx
    });

    assert_eq!(get(&r, "/group").await.1, "root group");
    assert_eq!(inits.load(Ordering::SeqCst), 1);
    assert_eq!(passes.load(Ordering::SeqCst), 1);

    assert_eq!(get(&r, "/outside").await.1, "outside");
    assert_eq!(passes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_method_gets_405_with_allow_set() {
    let mut r = Mux::new();
    r.get("/ping/:id/woop", |mut ctx: RequestCtx| async move {
        ctx.write("woop.");
        ctx
    });

    let method = Method::from_bytes(b"DIE").unwrap();
    let ctx = r.serve(request(method, "/ping/1/woop")).await;

    assert_eq!(ctx.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(ctx.body(), b"Method Not Allowed");

    let allow = ctx
        .response_headers()
        .get(header::ALLOW)
        .and_then(|value| value.to_str().ok())
        .unwrap();
    let allowed: HashSet<&str> = allow.split(", ").collect();
    let expected: HashSet<&str> = [
        "CONNECT", "DELETE", "GET", "HEAD", "OPTIONS", "PATCH", "POST", "PUT", "TRACE",
    ]
    .into_iter()
    .collect();
    assert_eq!(allowed, expected);
}

#[tokio::test]
async fn head_does_not_fall_back_to_get() {
    let mut r = Mux::new();
    r.get("/ping", |mut ctx: RequestCtx| async move {
        ctx.write(".");
        ctx
    });
    r.head("/ping", |mut ctx: RequestCtx| async move {
        ctx.set_header("x-ping", HeaderValue::from_static("1"));
        ctx
    });
    r.get("/only-get", |mut ctx: RequestCtx| async move {
        ctx.write("get");
        ctx
    });

    let ctx = r.serve(request(Method::HEAD, "/ping")).await;
    assert_eq!(ctx.status(), StatusCode::OK);
    assert_eq!(ctx.response_headers().get("x-ping").unwrap(), "1");

    let ctx = r.serve(request(Method::HEAD, "/only-get")).await;
    assert_eq!(ctx.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn handle_registers_every_method() {
    let mut r = Mux::new();
    r.handle("/any", |mut ctx: RequestCtx| async move {
        ctx.write("any");
        ctx
    });

    for method in [
        Method::CONNECT,
        Method::DELETE,
        Method::GET,
        Method::HEAD,
        Method::OPTIONS,
        Method::PATCH,
        Method::POST,
        Method::PUT,
        Method::TRACE,
    ] {
        assert_eq!(body(&r, method.clone(), "/any").await, "any", "{method}");
    }
}

#[tokio::test]
async fn trailing_slash_is_significant() {
    let mut r = Mux::new();
    r.get("/folders/", |mut ctx: RequestCtx| async move {
        ctx.write("folders index");
        ctx
    });
    r.get("/x", |mut ctx: RequestCtx| async move {
        ctx.write("x");
        ctx
    });

    assert_eq!(get(&r, "/folders/").await.1, "folders index");
    assert_eq!(get(&r, "/folders").await.0, StatusCode::NOT_FOUND);
    assert_eq!(get(&r, "/x").await.1, "x");
    assert_eq!(get(&r, "/x/").await.0, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn mount_at_root_covers_everything() {
    let mut sub = Mux::new();
    sub.get("/", |mut ctx: RequestCtx| async move {
        ctx.write("index");
        ctx
    });
    sub.get("/deep/:id", |mut ctx: RequestCtx| async move {
        let body = format!("deep {}", ctx.param("id").unwrap_or(""));
        ctx.write(body);
        ctx
    });

    let mut r = Mux::new();
    r.mount("/", sub);

    assert_eq!(get(&r, "/").await.1, "index");
    assert_eq!(get(&r, "/deep/9").await.1, "deep 9");
}

#[tokio::test]
async fn mount_index_and_subtree_reach_the_mountee() {
    let mut sub = Mux::new();
    sub.get("/", |mut ctx: RequestCtx| async move {
        ctx.write("sub index");
        ctx
    });

    let mut r = Mux::new();
    r.mount("/svc", sub);

    // the prefix itself, with and without the trailing slash
    assert_eq!(get(&r, "/svc").await.1, "sub index");
    assert_eq!(get(&r, "/svc/").await.1, "sub index");
    // an unknown page below the prefix is the mountee's miss
    assert_eq!(get(&r, "/svc/zzz").await.0, StatusCode::NOT_FOUND);
}
