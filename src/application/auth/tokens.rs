use std::time::Duration;

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    errors::{Error as JwtError, ErrorKind as JwtErrorKind},
};
use rand::{RngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::error::{AuthError, TokenRejection};
use super::store::TokenStore;

const REFRESH_TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Freshly issued credentials. The refresh token is already persisted.
#[derive(Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub refresh_expires_at: OffsetDateTime,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("refresh_expires_at", &self.refresh_expires_at)
            .finish()
    }
}

/// Mints HS256 access tokens and opaque refresh tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
    store: TokenStore,
}

impl TokenIssuer {
    pub fn new(
        secret: &str,
        access_ttl: Duration,
        refresh_ttl: Duration,
        store: TokenStore,
    ) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl,
            refresh_ttl,
            store,
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Sign an access token and persist a new refresh token for `user_id`.
    ///
    /// Nothing is returned unless the refresh token was stored.
    pub async fn issue_pair(&self, user_id: i64) -> Result<TokenPair, AuthError> {
        let now = OffsetDateTime::now_utc();
        let access_token = self.sign_access_token(user_id, now)?;
        let refresh_token = generate_refresh_token();
        let refresh_expires_at = now + self.refresh_ttl;

        self.store
            .save(user_id, &refresh_token, refresh_expires_at)
            .await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            refresh_expires_at,
        })
    }

    pub fn sign_access_token(
        &self,
        user_id: i64,
        issued_at: OffsetDateTime,
    ) -> Result<String, AuthError> {
        let claims = AccessClaims {
            sub: user_id.to_string(),
            iat: issued_at.unix_timestamp(),
            exp: (issued_at + self.access_ttl).unix_timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|err| AuthError::Signing(err.to_string()))
    }

    /// Verify `token` and return the user id in its subject.
    pub fn parse_access_token(&self, token: &str) -> Result<i64, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<AccessClaims>(token, &self.decoding, &validation)
            .map_err(|err| AuthError::InvalidToken(rejection_for(&err)))?;

        data.claims
            .sub
            .parse::<i64>()
            .map_err(|_| AuthError::InvalidToken(TokenRejection::Subject))
    }
}

/// 32 bytes from the operating system CSPRNG, hex-encoded.
pub fn generate_refresh_token() -> String {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn rejection_for(err: &JwtError) -> TokenRejection {
    match err.kind() {
        JwtErrorKind::ExpiredSignature => TokenRejection::Expired,
        JwtErrorKind::InvalidSignature => TokenRejection::Signature,
        JwtErrorKind::InvalidAlgorithm
        | JwtErrorKind::InvalidAlgorithmName
        | JwtErrorKind::MissingAlgorithm => TokenRejection::Algorithm,
        JwtErrorKind::InvalidSubject => TokenRejection::Subject,
        _ => TokenRejection::Malformed,
    }
}
