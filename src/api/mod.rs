use crate::iplogin::{
    cache::{IpLoginCachePolicy, RequestPolicy},
    cookies::cookie_policy,
    middleware::{early_stage, late_stage, mark_non_interactive},
    service::IpLogin,
    IpLoginConfig,
};
use anyhow::Result;
use axum::{
    body::Body,
    extract::{MatchedPath, Request},
    http::{HeaderName, HeaderValue},
    middleware::{from_fn, from_fn_with_state, Next},
    response::Response,
    routing::get,
    Extension, Router,
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;

pub mod handlers;
mod openapi;
pub mod page_cache;
pub mod session;
pub mod storage;

pub use openapi::openapi;
pub use storage::Storage;

use self::handlers::{front, health, login, logout};
use self::page_cache::{NoSessionOpenPolicy, NonInteractivePolicy, PageCache, UnsafeMethodPolicy};

/// Assemble the application router.
///
/// Layers run outermost first: request id and tracing, probe marking, cookie
/// policy, early stage, page cache, session initialization, late stage. The
/// two stages and the cache policy exist only with automatic login enabled.
#[must_use]
pub fn app(storage: &Storage, config: IpLoginConfig, page_cache_ttl: Duration) -> Router {
    let service = Arc::new(IpLogin::new(
        storage.directory(),
        storage.sessions(),
        storage.permissions(),
        config,
    ));
    let auto_login = service.config().auto_login();

    let mut policies: Vec<Box<dyn RequestPolicy>> = vec![
        Box::new(UnsafeMethodPolicy),
        Box::new(NonInteractivePolicy),
        Box::new(NoSessionOpenPolicy),
    ];
    if auto_login {
        policies.push(Box::new(IpLoginCachePolicy));
    }
    let cache = Arc::new(PageCache::new(policies, page_cache_ttl));

    let mut router = Router::new()
        .route("/", get(front::front))
        .route("/health", get(health::health))
        .route("/user/logout", get(logout::logout).post(logout::logout));
    if service.config().form_login() {
        router = router.route("/user/login/ip", get(login::login));
    }

    let mut app = router
        .layer(Extension(service.clone()))
        .layer(Extension(storage.clone()));

    if auto_login {
        app = app.layer(from_fn_with_state(service.clone(), late_stage));
    }
    app = app
        .layer(from_fn_with_state(service.clone(), session::initialize))
        .layer(from_fn_with_state(cache, page_cache::page_cache));
    if auto_login {
        app = app.layer(from_fn_with_state(service, early_stage));
    }

    app.layer(from_fn(cookie_policy))
        .layer(from_fn(mark_probes))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span)),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(
    port: u16,
    storage: Storage,
    config: IpLoginConfig,
    page_cache_ttl: Duration,
) -> Result<()> {
    let app = app(&storage, config, page_cache_ttl);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {err}");
        }
        info!("Gracefully shutdown");
    })
    .await?;

    Ok(())
}

/// Health probes are not browsers.
async fn mark_probes(mut request: Request, next: Next) -> Response {
    if request.uri().path() == "/health" {
        mark_non_interactive(&mut request);
    }
    next.run(request).await
}

fn make_span(request: &axum::http::Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
