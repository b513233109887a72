//! Password digests.
//!
//! Two schemes are supported. Argon2id (the default) salts every digest and
//! is keyed with the configured password secret. HMAC-SHA256 is
//! deterministic: equal passwords produce equal digests, which keeps digests
//! written by older deployments verifiable.

use std::sync::Arc;

use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::{self, SaltString},
};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::config::PasswordScheme;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("password hasher could not be initialised: {0}")]
    Setup(String),
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("stored password digest is malformed")]
    MalformedDigest,
}

/// Hashes new passwords and checks attempts against stored digests.
pub trait CredentialVerifier: Send + Sync {
    fn hash(&self, plaintext: &str) -> Result<String, PasswordError>;

    /// `Ok(false)` means a well-formed digest that does not match.
    fn verify(&self, plaintext: &str, digest: &str) -> Result<bool, PasswordError>;
}

/// Build the verifier selected by configuration.
pub fn verifier_for(scheme: PasswordScheme, secret: &str) -> Arc<dyn CredentialVerifier> {
    match scheme {
        PasswordScheme::Argon2 => Arc::new(Argon2Verifier::new(secret)),
        PasswordScheme::HmacSha256 => Arc::new(HmacSha256Verifier::new(secret)),
    }
}

pub struct Argon2Verifier {
    pepper: Vec<u8>,
    params: Params,
}

impl Argon2Verifier {
    pub fn new(pepper: &str) -> Self {
        Self::with_params(pepper, Params::default())
    }

    pub fn with_params(pepper: &str, params: Params) -> Self {
        Self {
            pepper: pepper.as_bytes().to_vec(),
            params,
        }
    }

    fn hasher(&self) -> Result<Argon2<'_>, PasswordError> {
        Argon2::new_with_secret(
            &self.pepper,
            Algorithm::Argon2id,
            Version::V0x13,
            self.params.clone(),
        )
        .map_err(|err| PasswordError::Setup(err.to_string()))
    }
}

impl CredentialVerifier for Argon2Verifier {
    fn hash(&self, plaintext: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        let digest = self
            .hasher()?
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|err| PasswordError::Hash(err.to_string()))?;
        Ok(digest.to_string())
    }

    fn verify(&self, plaintext: &str, digest: &str) -> Result<bool, PasswordError> {
        let parsed = PasswordHash::new(digest).map_err(|_| PasswordError::MalformedDigest)?;
        match self.hasher()?.verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(err) => Err(PasswordError::Hash(err.to_string())),
        }
    }
}

pub struct HmacSha256Verifier {
    secret: Vec<u8>,
}

impl HmacSha256Verifier {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }
}

impl CredentialVerifier for HmacSha256Verifier {
    fn hash(&self, plaintext: &str) -> Result<String, PasswordError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|err| PasswordError::Setup(err.to_string()))?;
        mac.update(plaintext.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn verify(&self, plaintext: &str, digest: &str) -> Result<bool, PasswordError> {
        let expected = self.hash(plaintext)?;
        Ok(expected.as_bytes().ct_eq(digest.as_bytes()).into())
    }
}
