//! Token Management
//!
//! Credential lifecycle per principal.
//!
//! - **Credential Store**: cache with an optional persistence hook
//! - **Token Manager**: usable credentials with single-flight refresh
//! - **Token Revocation**: RFC 7009 token revocation

pub mod manager;
pub mod revocation;
pub mod storage;

pub use manager::{DefaultTokenManager, TokenManager, TokenManagerConfig};
pub use revocation::{DefaultTokenRevoker, MockTokenRevoker, TokenRevoker, TokenTypeHint};
pub use storage::{
    CredentialStore, InMemoryTokenPersistence, MockTokenPersistence, StoreEntry, TokenPersistence,
};
