//! Credential verification, token issuance and session lifecycle.

mod error;
pub mod password;
mod session;
mod store;
mod tokens;

pub use error::{AuthError, TokenRejection};
pub use password::{CredentialVerifier, PasswordError, verifier_for};
pub use session::SessionManager;
pub use store::{TokenStore, hash_refresh_token};
pub use tokens::{AccessClaims, TokenIssuer, TokenPair, generate_refresh_token};
