use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    extract::ConnectInfo,
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use iplogin::{
    api::{self, Storage},
    iplogin::{
        address::AddressKey,
        directory::{RangeDirectory, UserId},
        session::MemorySessionStore,
        Error, IpLoginConfig,
    },
};
use serde_json::json;
use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tower::ServiceExt;

const MATCHING: &str = "203.0.113.5";
const UNMATCHED: &str = "198.51.100.7";
const SWITCHER: &str = "192.0.2.3";

fn seeded() -> Result<Storage> {
    let seed = json!({
        "users": [
            {"uid": 42, "ip_start": "203.0.113.0", "ip_end": "203.0.113.255"},
            {"uid": 43, "ip_start": "192.0.2.0", "ip_end": "192.0.2.15",
             "permissions": ["can log in as another user"]},
            {"uid": 5, "ip_start": "10.9.0.0", "ip_end": "10.9.255.255"},
            {"uid": 9, "ip_start": "10.9.1.0", "ip_end": "10.9.1.255"},
            {"uid": 50, "active": false, "ip_start": "172.16.0.0", "ip_end": "172.16.0.255"}
        ]
    });
    Storage::from_seed(serde_json::from_value(seed)?)
}

fn router(storage: &Storage, config: IpLoginConfig) -> Router {
    api::app(storage, config, Duration::from_secs(60))
}

fn request(method: Method, uri: &str, ip: &str, cookie: Option<&str>) -> Result<Request<Body>> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    let mut request = builder.body(Body::empty())?;
    let peer: SocketAddr = format!("{ip}:41000").parse()?;
    request.extensions_mut().insert(ConnectInfo(peer));
    Ok(request)
}

async fn send(app: &Router, request: Request<Body>) -> Result<Response> {
    Ok(app.clone().oneshot(request).await?)
}

fn set_cookies(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok().map(str::to_string))
        .collect()
}

fn session_pair(response: &Response) -> Result<String> {
    set_cookies(response)
        .into_iter()
        .find(|cookie| cookie.starts_with("iplogin_session=") && !cookie.contains("Max-Age=0"))
        .and_then(|cookie| cookie.split(';').next().map(str::to_string))
        .ok_or_else(|| anyhow!("no session cookie issued"))
}

fn cache_status(response: &Response) -> &str {
    response
        .headers()
        .get(api::page_cache::PAGE_CACHE_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

async fn body(response: Response) -> Result<String> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(String::from_utf8(bytes.to_vec())?)
}

#[tokio::test]
async fn first_visit_from_matching_address_logs_in() -> Result<()> {
    let app = router(&seeded()?, IpLoginConfig::new());

    let response = send(&app, request(Method::GET, "/", MATCHING, None)?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(cache_status(&response), "BYPASS");

    let cookies = set_cookies(&response);
    assert!(cookies.iter().any(|c| c.starts_with("iplogin_session=")));
    assert!(cookies
        .iter()
        .any(|c| c.starts_with("ipLoginAttempted=;") && c.contains("Max-Age=0")));
    assert!(cookies
        .iter()
        .any(|c| c.starts_with("ipLoginAsDifferentUser=;") && c.contains("Max-Age=0")));
    assert!(!cookies.iter().any(|c| c.starts_with("ipLoginAttempted=1")));

    let page = body(response).await?;
    assert!(page.contains("Hello, user 42."));
    assert!(page.contains("You have been logged in automatically using IP login."));
    Ok(())
}

#[tokio::test]
async fn session_is_used_on_the_next_request() -> Result<()> {
    let app = router(&seeded()?, IpLoginConfig::new());

    let first = send(&app, request(Method::GET, "/", MATCHING, None)?).await?;
    let session = session_pair(&first)?;

    let second = send(&app, request(Method::GET, "/", MATCHING, Some(&session))?).await?;
    assert!(set_cookies(&second).is_empty());
    assert_eq!(cache_status(&second), "BYPASS");
    let page = body(second).await?;
    assert!(page.contains("Hello, user 42."));
    assert!(!page.contains("logged in automatically"));
    Ok(())
}

#[tokio::test]
async fn unmatched_address_is_remembered_for_the_browser_session() -> Result<()> {
    let app = router(&seeded()?, IpLoginConfig::new());

    let first = send(&app, request(Method::GET, "/", UNMATCHED, None)?).await?;
    assert_eq!(cache_status(&first), "MISS");
    let cookies = set_cookies(&first);
    assert_eq!(cookies.len(), 1);
    assert!(cookies[0].starts_with("ipLoginAttempted=1"));
    assert!(!cookies[0].contains("Max-Age"));
    assert!(body(first).await?.contains("Hello, anonymous visitor."));

    let second = send(
        &app,
        request(Method::GET, "/", UNMATCHED, Some("ipLoginAttempted=1"))?,
    )
    .await?;
    assert_eq!(cache_status(&second), "HIT");
    assert!(set_cookies(&second).is_empty());
    Ok(())
}

struct CountingDirectory {
    inner: Arc<dyn RangeDirectory>,
    calls: AtomicUsize,
}

#[async_trait]
impl RangeDirectory for CountingDirectory {
    async fn lookup(&self, address: AddressKey) -> iplogin::iplogin::Result<Option<UserId>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.lookup(address).await
    }
}

#[tokio::test]
async fn attempted_cookie_skips_the_directory() -> Result<()> {
    let seeded = seeded()?;
    let directory = Arc::new(CountingDirectory {
        inner: seeded.directory(),
        calls: AtomicUsize::new(0),
    });
    let storage = Storage::new(directory.clone(), seeded.sessions(), seeded.permissions());
    let app = router(&storage, IpLoginConfig::new());

    for _ in 0..3 {
        let response = send(
            &app,
            request(Method::GET, "/", MATCHING, Some("ipLoginAttempted=1"))?,
        )
        .await?;
        assert!(set_cookies(&response).is_empty());
        assert!(body(response).await?.contains("Hello, anonymous visitor."));
    }
    assert_eq!(directory.calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn allowed_different_user_waits_for_the_visitor() -> Result<()> {
    let app = router(&seeded()?, IpLoginConfig::new());

    let response = send(
        &app,
        request(Method::GET, "/", MATCHING, Some("ipLoginAsDifferentUser=1"))?,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(cache_status(&response), "MISS");
    assert!(set_cookies(&response).is_empty());
    assert!(body(response).await?.contains("Hello, anonymous visitor."));
    Ok(())
}

#[tokio::test]
async fn denied_different_user_is_logged_in_again() -> Result<()> {
    let app = router(&seeded()?, IpLoginConfig::new());

    let response = send(
        &app,
        request(Method::GET, "/", MATCHING, Some("ipLoginAsDifferentUser=0"))?,
    )
    .await?;
    assert!(session_pair(&response).is_ok());
    assert!(set_cookies(&response)
        .iter()
        .any(|c| c.starts_with("ipLoginAsDifferentUser=;")));
    assert!(body(response).await?.contains("Hello, user 42."));
    Ok(())
}

#[tokio::test]
async fn cached_page_is_never_served_to_a_pending_login() -> Result<()> {
    let app = router(&seeded()?, IpLoginConfig::new());

    let anonymous = send(&app, request(Method::GET, "/", UNMATCHED, None)?).await?;
    assert_eq!(cache_status(&anonymous), "MISS");

    let pending = send(&app, request(Method::GET, "/", MATCHING, None)?).await?;
    assert_eq!(cache_status(&pending), "BYPASS");
    assert!(body(pending).await?.contains("Hello, user 42."));
    Ok(())
}

#[tokio::test]
async fn overlapping_ranges_prefer_the_largest_user_id() -> Result<()> {
    let app = router(&seeded()?, IpLoginConfig::new());

    let inner = send(&app, request(Method::GET, "/", "10.9.1.1", None)?).await?;
    assert!(body(inner).await?.contains("Hello, user 9."));

    let outer = send(&app, request(Method::GET, "/", "10.9.2.1", None)?).await?;
    assert!(body(outer).await?.contains("Hello, user 5."));
    Ok(())
}

#[tokio::test]
async fn blocked_accounts_are_not_matched() -> Result<()> {
    let app = router(&seeded()?, IpLoginConfig::new());

    let response = send(&app, request(Method::GET, "/", "172.16.0.9", None)?).await?;
    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 1);
    assert!(cookies[0].starts_with("ipLoginAttempted=1"));
    Ok(())
}

#[tokio::test]
async fn forwarded_address_needs_explicit_trust() -> Result<()> {
    let storage = seeded()?;
    let mut forwarded = request(Method::GET, "/", "10.0.0.1", None)?;
    forwarded
        .headers_mut()
        .insert("x-forwarded-for", MATCHING.parse()?);

    let trusting = router(&storage, IpLoginConfig::new().with_trust_forwarded_headers(true));
    let response = send(&trusting, forwarded).await?;
    assert!(body(response).await?.contains("Hello, user 42."));

    let mut forwarded = request(Method::GET, "/", "10.0.0.1", None)?;
    forwarded
        .headers_mut()
        .insert("x-forwarded-for", MATCHING.parse()?);
    let untrusting = router(&storage, IpLoginConfig::new());
    let response = send(&untrusting, forwarded).await?;
    assert!(body(response).await?.contains("Hello, anonymous visitor."));
    Ok(())
}

#[tokio::test]
async fn disabled_auto_login_is_inert() -> Result<()> {
    let app = router(&seeded()?, IpLoginConfig::new().with_auto_login(false));

    let response = send(&app, request(Method::GET, "/", MATCHING, None)?).await?;
    assert!(set_cookies(&response).is_empty());
    assert_eq!(cache_status(&response), "MISS");
    assert!(body(response).await?.contains("Hello, anonymous visitor."));
    Ok(())
}

struct FailingDirectory;

#[async_trait]
impl RangeDirectory for FailingDirectory {
    async fn lookup(&self, _address: AddressKey) -> iplogin::iplogin::Result<Option<UserId>> {
        Err(Error::Directory(anyhow!("connection refused")))
    }
}

#[tokio::test]
async fn directory_outage_is_not_an_anonymous_visit() -> Result<()> {
    let seeded = seeded()?;
    let storage = Storage::new(
        Arc::new(FailingDirectory),
        seeded.sessions(),
        seeded.permissions(),
    );
    let app = router(&storage, IpLoginConfig::new());

    let response = send(&app, request(Method::GET, "/", UNMATCHED, None)?).await?;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(!set_cookies(&response)
        .iter()
        .any(|c| c.starts_with("ipLoginAttempted=1")));
    Ok(())
}

#[tokio::test]
async fn health_probes_are_left_alone() -> Result<()> {
    let app = router(&seeded()?, IpLoginConfig::new());

    let response = send(&app, request(Method::GET, "/health", MATCHING, None)?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookies(&response).is_empty());
    assert_eq!(cache_status(&response), "BYPASS");
    let health: serde_json::Value = serde_json::from_str(&body(response).await?)?;
    assert_eq!(health["storage"], "memory");
    assert_eq!(health["name"], env!("CARGO_PKG_NAME"));
    Ok(())
}

#[tokio::test]
async fn login_link_is_mounted_only_with_form_login() -> Result<()> {
    let storage = seeded()?;

    let without = router(&storage, IpLoginConfig::new());
    let response = send(
        &without,
        request(Method::GET, "/user/login/ip", MATCHING, None)?,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let with = router(
        &storage,
        IpLoginConfig::new()
            .with_auto_login(false)
            .with_form_login(true),
    );

    let response = send(
        &with,
        request(
            Method::GET,
            "/user/login/ip?destination=/reports",
            MATCHING,
            None,
        )?,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok()),
        Some("/reports")
    );
    assert!(session_pair(&response).is_ok());
    assert!(set_cookies(&response)
        .iter()
        .any(|c| c.starts_with("ipLoginAttempted=;")));

    let response = send(
        &with,
        request(
            Method::GET,
            "/user/login/ip?destination=https://elsewhere.example",
            UNMATCHED,
            None,
        )?,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok()),
        Some("/")
    );
    assert!(set_cookies(&response).is_empty());
    Ok(())
}

#[tokio::test]
async fn login_link_with_auto_login_starts_one_session() -> Result<()> {
    let seeded = seeded()?;
    let sessions = Arc::new(MemorySessionStore::new([UserId::new(42)]));
    let storage = Storage::new(seeded.directory(), sessions.clone(), seeded.permissions());
    let app = router(&storage, IpLoginConfig::new().with_form_login(true));

    let response = send(
        &app,
        request(Method::GET, "/user/login/ip?destination=/reports", MATCHING, None)?,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let issued = set_cookies(&response)
        .into_iter()
        .filter(|c| c.starts_with("iplogin_session=") && !c.contains("Max-Age=0"))
        .count();
    assert_eq!(issued, 1);
    assert_eq!(sessions.live_sessions().await, 1);

    let session = session_pair(&response)?;
    let again = send(
        &app,
        request(Method::GET, "/user/login/ip", MATCHING, Some(&session))?,
    )
    .await?;
    assert_eq!(again.status(), StatusCode::SEE_OTHER);
    assert!(set_cookies(&again).is_empty());
    assert_eq!(sessions.live_sessions().await, 1);
    Ok(())
}

#[tokio::test]
async fn logout_without_switch_permission_logs_back_in() -> Result<()> {
    let app = router(&seeded()?, IpLoginConfig::new());

    let login = send(&app, request(Method::GET, "/", MATCHING, None)?).await?;
    let session = session_pair(&login)?;

    let logout = send(
        &app,
        request(Method::POST, "/user/logout", MATCHING, Some(&session))?,
    )
    .await?;
    assert_eq!(logout.status(), StatusCode::SEE_OTHER);
    let cookies = set_cookies(&logout);
    assert!(cookies
        .iter()
        .any(|c| c.starts_with("iplogin_session=;") && c.contains("Max-Age=0")));
    assert!(cookies
        .iter()
        .any(|c| c.starts_with("ipLoginAsDifferentUser=0")));

    let again = send(
        &app,
        request(Method::GET, "/", MATCHING, Some("ipLoginAsDifferentUser=0"))?,
    )
    .await?;
    assert!(body(again).await?.contains("Hello, user 42."));
    Ok(())
}

#[tokio::test]
async fn logout_with_switch_permission_stays_logged_out() -> Result<()> {
    let app = router(&seeded()?, IpLoginConfig::new());

    let login = send(&app, request(Method::GET, "/", SWITCHER, None)?).await?;
    let session = session_pair(&login)?;
    assert!(body(login).await?.contains("Hello, user 43."));

    let logout = send(
        &app,
        request(Method::GET, "/user/logout", SWITCHER, Some(&session))?,
    )
    .await?;
    assert!(set_cookies(&logout)
        .iter()
        .any(|c| c.starts_with("ipLoginAsDifferentUser=1")));

    let after = send(
        &app,
        request(Method::GET, "/", SWITCHER, Some("ipLoginAsDifferentUser=1"))?,
    )
    .await?;
    assert!(set_cookies(&after).is_empty());
    assert!(body(after).await?.contains("Hello, anonymous visitor."));
    Ok(())
}
