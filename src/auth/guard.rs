use super::Principal;

pub const LOGIN_PATH: &str = "/login";
pub const HOME_PATH: &str = "/";

/// Access policy attached to a group of routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Policy {
    RequireAuthenticated,
    RequireAnonymous,
}

/// What the route guard does with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// Continue to the handler.
    Proceed,
    /// Continue, and mark the response as not cacheable.
    ProceedPrivate,
    /// Remember the requested path in the session, then `303` to the login page.
    RedirectToLogin,
    /// `303` to the home page.
    RedirectHome,
}

impl Policy {
    #[must_use]
    pub const fn evaluate(self, principal: &Principal) -> GuardDecision {
        match (self, principal.is_authenticated()) {
            (Self::RequireAuthenticated, true) => GuardDecision::ProceedPrivate,
            (Self::RequireAuthenticated, false) => GuardDecision::RedirectToLogin,
            (Self::RequireAnonymous, true) => GuardDecision::RedirectHome,
            (Self::RequireAnonymous, false) => GuardDecision::Proceed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Identity;
    use chrono::Utc;

    fn someone() -> Principal {
        Principal::Authenticated(Identity {
            id: 1,
            email: "a@example.com".to_string(),
            created: Utc::now(),
            hashed_password: String::new(),
        })
    }

    #[test]
    fn authenticated_routes() {
        assert_eq!(
            Policy::RequireAuthenticated.evaluate(&Principal::Anonymous),
            GuardDecision::RedirectToLogin
        );
        assert_eq!(
            Policy::RequireAuthenticated.evaluate(&someone()),
            GuardDecision::ProceedPrivate
        );
    }

    #[test]
    fn anonymous_routes() {
        assert_eq!(
            Policy::RequireAnonymous.evaluate(&Principal::Anonymous),
            GuardDecision::Proceed
        );
        assert_eq!(
            Policy::RequireAnonymous.evaluate(&someone()),
            GuardDecision::RedirectHome
        );
    }
}
