use crate::models::{AuthTokens, UserProfile};

/// Token handed out by mock sign-in
pub const MOCK_TOKEN: &str = "mock-jwt-token";

const MOCK_USER_ID: &str = "1";
const MOCK_USER_NAME: &str = "Demo User";

/// Stand-in credential exchange for development without an auth backend.
/// Accepts any email and hands back a fixed token.
pub struct MockAuthenticator;

impl MockAuthenticator {
    pub fn sign_in(&self, email: &str) -> (AuthTokens, UserProfile) {
        let user = UserProfile::new(MOCK_USER_ID, email).with_name(MOCK_USER_NAME);
        (AuthTokens::new(MOCK_TOKEN), user)
    }

    pub fn register(&self, name: &str, email: &str) -> (AuthTokens, UserProfile) {
        let user = UserProfile::new(MOCK_USER_ID, email).with_name(name);
        (AuthTokens::new(MOCK_TOKEN), user)
    }
}
