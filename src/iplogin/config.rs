//! IP login configuration, fixed at process start.

const DEFAULT_SESSION_TTL_SECONDS: i64 = 12 * 60 * 60;

#[derive(Clone, Debug)]
pub struct IpLoginConfig {
    auto_login: bool,
    form_login: bool,
    session_ttl_seconds: i64,
    session_cookie_secure: bool,
    trust_forwarded_headers: bool,
}

impl Default for IpLoginConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl IpLoginConfig {
    /// Automatic login on, login-form link off.
    #[must_use]
    pub fn new() -> Self {
        Self {
            auto_login: true,
            form_login: false,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            session_cookie_secure: false,
            trust_forwarded_headers: false,
        }
    }

    #[must_use]
    pub fn with_auto_login(mut self, enabled: bool) -> Self {
        self.auto_login = enabled;
        self
    }

    #[must_use]
    pub fn with_form_login(mut self, enabled: bool) -> Self {
        self.form_login = enabled;
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_session_cookie_secure(mut self, secure: bool) -> Self {
        self.session_cookie_secure = secure;
        self
    }

    #[must_use]
    pub fn with_trust_forwarded_headers(mut self, trust: bool) -> Self {
        self.trust_forwarded_headers = trust;
        self
    }

    /// Run the request-time pipeline (both stages and the cache policy).
    #[must_use]
    pub fn auto_login(&self) -> bool {
        self.auto_login
    }

    /// Offer the explicit "log in with my address" route.
    #[must_use]
    pub fn form_login(&self) -> bool {
        self.form_login
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub fn session_cookie_secure(&self) -> bool {
        self.session_cookie_secure
    }

    #[must_use]
    pub fn trust_forwarded_headers(&self) -> bool {
        self.trust_forwarded_headers
    }
}
