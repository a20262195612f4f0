//! Google account sign-in for Drive storage.
//!
//! - `common`: PKCE, the loopback redirect listener, secure credential writes
//! - `google`: authorization URL, code exchange, revoke, sign-in/sign-out
//! - `token_store`: the persisted access token and its expiry

pub mod common;
pub mod google;
pub mod token_store;

pub use google::{GoogleOAuth, RedirectCapture};
pub use token_store::{StoredToken, TokenStore};
