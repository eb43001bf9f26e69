//! Anonymous page cache.
//!
//! Whole responses are kept in memory keyed by method and URI. Whether a
//! request may use the cache is decided by the request policy chain.

use axum::{
    body::{to_bytes, Body, Bytes, HttpBody},
    extract::{Request, State},
    http::{header::SET_COOKIE, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::iplogin::{
    cache::{evaluate_policies, PolicyDecision, RequestPolicy},
    middleware::NonInteractive,
    session::session_token,
};

pub const PAGE_CACHE_HEADER: &str = "x-page-cache";

const MAX_CACHED_BODY: usize = 2 * 1024 * 1024;
const DEFAULT_MAX_ENTRIES: usize = 1024;

/// Only `GET` and `HEAD` responses are cacheable.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnsafeMethodPolicy;

impl RequestPolicy for UnsafeMethodPolicy {
    fn check(&self, request: &Request) -> Option<PolicyDecision> {
        match *request.method() {
            Method::GET | Method::HEAD => None,
            _ => Some(PolicyDecision::Deny),
        }
    }
}

/// Probes and internal sub-requests always see a fresh response.
#[derive(Clone, Copy, Debug, Default)]
pub struct NonInteractivePolicy;

impl RequestPolicy for NonInteractivePolicy {
    fn check(&self, request: &Request) -> Option<PolicyDecision> {
        request
            .extensions()
            .get::<NonInteractive>()
            .map(|_| PolicyDecision::Deny)
    }
}

/// Requests without a session are anonymous and may be cached.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoSessionOpenPolicy;

impl RequestPolicy for NoSessionOpenPolicy {
    fn check(&self, request: &Request) -> Option<PolicyDecision> {
        session_token(request.headers())
            .is_none()
            .then_some(PolicyDecision::Allow)
    }
}

struct CachedPage {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    stored_at: Instant,
}

pub struct PageCache {
    policies: Vec<Box<dyn RequestPolicy>>,
    ttl: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<String, CachedPage>>,
}

impl PageCache {
    #[must_use]
    pub fn new(policies: Vec<Box<dyn RequestPolicy>>, ttl: Duration) -> Self {
        Self {
            policies,
            ttl,
            max_entries: DEFAULT_MAX_ENTRIES,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Upper bound on stored pages; the oldest page is evicted to make room.
    #[must_use]
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    pub async fn entries(&self) -> usize {
        self.entries.lock().await.len()
    }

    async fn get(&self, key: &str) -> Option<Response> {
        let mut entries = self.entries.lock().await;
        let fresh = entries
            .get(key)
            .is_some_and(|page| page.stored_at.elapsed() < self.ttl);
        if !fresh {
            entries.remove(key);
            return None;
        }
        entries.get(key).map(|page| {
            let mut response = Response::new(Body::from(page.body.clone()));
            *response.status_mut() = page.status;
            *response.headers_mut() = page.headers.clone();
            response
        })
    }

    async fn put(&self, key: String, status: StatusCode, headers: HeaderMap, body: Bytes) {
        let mut entries = self.entries.lock().await;
        // Every distinct query string is its own key; expired pages must not
        // linger until the same key is asked for again.
        entries.retain(|_, page| page.stored_at.elapsed() < self.ttl);

        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, page)| page.stored_at)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                debug!(key = oldest, "page cache full, evicting oldest entry");
                entries.remove(&oldest);
            }
        }

        entries.insert(
            key,
            CachedPage {
                status,
                headers,
                body,
                stored_at: Instant::now(),
            },
        );
    }
}

impl std::fmt::Debug for PageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageCache")
            .field("policies", &self.policies.len())
            .field("ttl", &self.ttl)
            .field("max_entries", &self.max_entries)
            .finish_non_exhaustive()
    }
}

fn with_status_header(mut response: Response, status: &'static str) -> Response {
    response
        .headers_mut()
        .insert(PAGE_CACHE_HEADER, HeaderValue::from_static(status));
    response
}

pub async fn page_cache(
    State(cache): State<Arc<PageCache>>,
    request: Request,
    next: Next,
) -> Response {
    if evaluate_policies(&cache.policies, &request) != Some(PolicyDecision::Allow) {
        return with_status_header(next.run(request).await, "BYPASS");
    }

    let key = format!("{} {}", request.method(), request.uri());
    if let Some(response) = cache.get(&key).await {
        debug!(key, "page cache hit");
        return with_status_header(response, "HIT");
    }

    let response = next.run(request).await;
    if response.status() != StatusCode::OK || response.headers().contains_key(SET_COOKIE) {
        return with_status_header(response, "MISS");
    }

    let (parts, body) = response.into_parts();
    let cacheable_size = body
        .size_hint()
        .exact()
        .is_some_and(|len| len <= MAX_CACHED_BODY as u64);
    if !cacheable_size {
        return with_status_header(Response::from_parts(parts, body), "MISS");
    }

    let body = match to_bytes(body, MAX_CACHED_BODY).await {
        Ok(body) => body,
        Err(err) => {
            error!("Failed to buffer response for the page cache: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    cache
        .put(key, parts.status, parts.headers.clone(), body.clone())
        .await;

    with_status_header(Response::from_parts(parts, Body::from(body)), "MISS")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{middleware::from_fn_with_state, routing::get, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    fn app(ttl: Duration) -> (Router, Arc<AtomicUsize>, Arc<PageCache>) {
        bounded_app(ttl, DEFAULT_MAX_ENTRIES)
    }

    fn bounded_app(ttl: Duration, max_entries: usize) -> (Router, Arc<AtomicUsize>, Arc<PageCache>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let cache = Arc::new(
            PageCache::new(
                vec![
                    Box::new(UnsafeMethodPolicy),
                    Box::new(NonInteractivePolicy),
                    Box::new(NoSessionOpenPolicy),
                ],
                ttl,
            )
            .with_max_entries(max_entries),
        );
        let router = Router::new()
            .route(
                "/",
                get(move || {
                    let counter = counter.clone();
                    async move { format!("render {}", counter.fetch_add(1, Ordering::SeqCst)) }
                })
                .post(|| async { "posted" }),
            )
            .layer(from_fn_with_state(cache.clone(), page_cache));
        (router, hits, cache)
    }

    fn status_of(response: &Response) -> &str {
        response
            .headers()
            .get(PAGE_CACHE_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
    }

    fn get_request(cookie: Option<&'static str>) -> Request {
        get_uri("/", cookie)
    }

    fn get_uri(uri: &str, cookie: Option<&'static str>) -> Request {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header("cookie", cookie);
        }
        builder
            .body(Body::empty())
            .unwrap_or_else(|err| panic!("{err}"))
    }

    #[tokio::test]
    async fn anonymous_get_is_cached() {
        let (router, hits, cache) = app(Duration::from_secs(60));

        let first = router
            .clone()
            .oneshot(get_request(None))
            .await
            .unwrap_or_else(|err| match err {});
        assert_eq!(status_of(&first), "MISS");

        let second = router
            .oneshot(get_request(None))
            .await
            .unwrap_or_else(|err| match err {});
        assert_eq!(status_of(&second), "HIT");
        let body = to_bytes(second.into_body(), usize::MAX)
            .await
            .unwrap_or_default();
        assert_eq!(&body[..], b"render 0");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(cache.entries().await, 1);
    }

    #[tokio::test]
    async fn session_holders_bypass() {
        let (router, hits, cache) = app(Duration::from_secs(60));
        for _ in 0..2 {
            let response = router
                .clone()
                .oneshot(get_request(Some("iplogin_session=abc")))
                .await
                .unwrap_or_else(|err| match err {});
            assert_eq!(status_of(&response), "BYPASS");
        }
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(cache.entries().await, 0);
    }

    #[tokio::test]
    async fn unsafe_methods_bypass() {
        let (router, _, cache) = app(Duration::from_secs(60));
        let request = Request::builder()
            .method(Method::POST)
            .uri("/")
            .body(Body::empty())
            .unwrap_or_else(|err| panic!("{err}"));
        let response = router
            .oneshot(request)
            .await
            .unwrap_or_else(|err| match err {});
        assert_eq!(status_of(&response), "BYPASS");
        assert_eq!(cache.entries().await, 0);
    }

    #[tokio::test]
    async fn expired_entries_are_refreshed() {
        let (router, hits, _) = app(Duration::ZERO);
        for _ in 0..2 {
            let response = router
                .clone()
                .oneshot(get_request(None))
                .await
                .unwrap_or_else(|err| match err {});
            assert_eq!(status_of(&response), "MISS");
        }
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn expired_pages_are_purged_when_storing() {
        let (router, _, cache) = app(Duration::from_millis(250));
        for i in 0..100 {
            let response = router
                .clone()
                .oneshot(get_uri(&format!("/?q={i}"), None))
                .await
                .unwrap_or_else(|err| match err {});
            assert_eq!(status_of(&response), "MISS");
        }
        assert_eq!(cache.entries().await, 100);

        tokio::time::sleep(Duration::from_millis(300)).await;

        let response = router
            .oneshot(get_uri("/?q=fresh", None))
            .await
            .unwrap_or_else(|err| match err {});
        assert_eq!(status_of(&response), "MISS");
        assert_eq!(cache.entries().await, 1);
    }

    #[tokio::test]
    async fn full_cache_evicts_oldest_page() {
        let (router, hits, cache) = bounded_app(Duration::from_secs(60), 3);
        for i in 0..5 {
            router
                .clone()
                .oneshot(get_uri(&format!("/?q={i}"), None))
                .await
                .unwrap_or_else(|err| match err {});
        }
        assert_eq!(cache.entries().await, 3);
        assert_eq!(hits.load(Ordering::SeqCst), 5);

        let newest = router
            .clone()
            .oneshot(get_uri("/?q=4", None))
            .await
            .unwrap_or_else(|err| match err {});
        assert_eq!(status_of(&newest), "HIT");

        let oldest = router
            .oneshot(get_uri("/?q=0", None))
            .await
            .unwrap_or_else(|err| match err {});
        assert_eq!(status_of(&oldest), "MISS");
        assert_eq!(cache.entries().await, 3);
    }
}
