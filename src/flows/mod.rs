//! OAuth2 Flows
//!
//! Provider round trips used by the credential lifecycle:
//!
//! - **Authorization Code** (RFC 6749 Section 4.1): initial credentials
//! - **Refresh** (RFC 6749 Section 6): renewed credentials
//! - **User Info**: profile of the authorized principal

pub mod authorization_code;
pub mod refresh;
pub(crate) mod token_endpoint;
pub mod user_info;

pub use authorization_code::{
    AuthorizationCodeExchanger, DefaultAuthorizationCodeExchanger, MockAuthorizationCodeExchanger,
};
pub use refresh::{DefaultTokenRefresher, MockTokenRefresher, TokenRefresher};
pub use user_info::{DefaultUserInfoClient, UserInfoClient};
