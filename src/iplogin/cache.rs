//! Page cache request policies.
//!
//! A page cache asks each policy about a request. Any [`PolicyDecision::Deny`]
//! wins; otherwise one [`PolicyDecision::Allow`] is enough to cache; a request
//! nobody allows is not cached.

use axum::{extract::Request, http::Request as HttpRequest};

use super::middleware::PendingLogin;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    Deny,
}

pub trait RequestPolicy: Send + Sync {
    /// `None` means no opinion.
    fn check(&self, request: &Request) -> Option<PolicyDecision>;
}

/// Combine the answers of every policy.
#[must_use]
pub fn evaluate_policies(
    policies: &[Box<dyn RequestPolicy>],
    request: &Request,
) -> Option<PolicyDecision> {
    let mut decision = None;
    for policy in policies {
        match policy.check(request) {
            Some(PolicyDecision::Deny) => return Some(PolicyDecision::Deny),
            Some(PolicyDecision::Allow) => decision = Some(PolicyDecision::Allow),
            None => {}
        }
    }
    decision
}

/// A request that is about to log somebody in must neither be answered from
/// the cache nor be stored in it.
#[must_use]
pub fn should_bypass_cache<B>(request: &HttpRequest<B>) -> bool {
    request.extensions().get::<PendingLogin>().is_some()
}

#[derive(Clone, Copy, Debug, Default)]
pub struct IpLoginCachePolicy;

impl RequestPolicy for IpLoginCachePolicy {
    fn check(&self, request: &Request) -> Option<PolicyDecision> {
        should_bypass_cache(request).then_some(PolicyDecision::Deny)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iplogin::directory::UserId;
    use axum::body::Body;

    struct Always(PolicyDecision);

    impl RequestPolicy for Always {
        fn check(&self, _request: &Request) -> Option<PolicyDecision> {
            Some(self.0)
        }
    }

    struct Silent;

    impl RequestPolicy for Silent {
        fn check(&self, _request: &Request) -> Option<PolicyDecision> {
            None
        }
    }

    fn pending_request() -> Request {
        let mut request = Request::new(Body::empty());
        request.extensions_mut().insert(PendingLogin(UserId::new(42)));
        request
    }

    #[test]
    fn pending_login_bypasses_cache() {
        assert!(should_bypass_cache(&pending_request()));
        assert!(!should_bypass_cache(&HttpRequest::new(())));
    }

    #[test]
    fn policy_denies_only_pending_requests() {
        assert_eq!(
            IpLoginCachePolicy.check(&pending_request()),
            Some(PolicyDecision::Deny)
        );
        assert_eq!(IpLoginCachePolicy.check(&Request::new(Body::empty())), None);
    }

    #[test]
    fn deny_wins_over_allow() {
        let policies: Vec<Box<dyn RequestPolicy>> = vec![
            Box::new(Always(PolicyDecision::Allow)),
            Box::new(IpLoginCachePolicy),
        ];
        assert_eq!(
            evaluate_policies(&policies, &pending_request()),
            Some(PolicyDecision::Deny)
        );
        assert_eq!(
            evaluate_policies(&policies, &Request::new(Body::empty())),
            Some(PolicyDecision::Allow)
        );
    }

    #[test]
    fn silence_is_not_permission() {
        let policies: Vec<Box<dyn RequestPolicy>> = vec![Box::new(Silent)];
        assert_eq!(
            evaluate_policies(&policies, &Request::new(Body::empty())),
            None
        );
    }
}
