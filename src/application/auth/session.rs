use std::sync::{Arc, OnceLock};

use metrics::counter;
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::application::audit::AuditService;
use crate::application::repos::{CreateUserParams, RepoError, UsersRepo};
use crate::domain::entities::UserRecord;
use crate::domain::error::DomainError;
use crate::domain::types::{AuditAction, AuditEntity};
use crate::domain::users::{NewAccount, normalize_email, validate_password};

use super::error::AuthError;
use super::password::{CredentialVerifier, PasswordError};
use super::store::TokenStore;
use super::tokens::{TokenIssuer, TokenPair};

const SIGN_IN_METRIC: &str = "quaderno_auth_sign_in_total";
const REFRESH_METRIC: &str = "quaderno_auth_refresh_total";

/// Verified in place of a stored digest when the email is unknown, so both
/// sign-in failures cost one password verification.
const UNKNOWN_ACCOUNT_PASSWORD: &str = "quaderno-unknown-account";

/// Sign-up, sign-in, refresh rotation and token lookups.
#[derive(Clone)]
pub struct SessionManager {
    users: Arc<dyn UsersRepo>,
    verifier: Arc<dyn CredentialVerifier>,
    issuer: TokenIssuer,
    store: TokenStore,
    audit: AuditService,
    unknown_account_digest: Arc<OnceLock<String>>,
}

impl SessionManager {
    pub fn new(
        users: Arc<dyn UsersRepo>,
        verifier: Arc<dyn CredentialVerifier>,
        issuer: TokenIssuer,
        store: TokenStore,
        audit: AuditService,
    ) -> Self {
        Self {
            users,
            verifier,
            issuer,
            store,
            audit,
            unknown_account_digest: Arc::new(OnceLock::new()),
        }
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// Register an account. No tokens are issued; callers sign in separately.
    pub async fn sign_up(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<UserRecord, AuthError> {
        let account = NewAccount::parse(name, email, password)?;

        if self.users.find_by_email(&account.email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let password_digest = self.hash_password(account.password).await?;
        let user = self
            .users
            .create_user(CreateUserParams {
                name: account.name,
                email: account.email,
                password_digest,
            })
            .await
            .map_err(|err| match err {
                RepoError::Duplicate { .. } => AuthError::EmailTaken,
                other => AuthError::Repo(other),
            })?;

        info!(target = "quaderno::auth", user_id = user.id, "account registered");
        self.audit
            .record(user.id, AuditAction::Register, AuditEntity::User, Some(user.id))
            .await;

        Ok(user)
    }

    /// Check credentials and issue a token pair.
    ///
    /// An unknown email and a wrong password both yield
    /// [`AuthError::InvalidCredentials`].
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<TokenPair, AuthError> {
        let email = normalize_email(email)?;
        let password = validate_password(password)?;

        let user = match self.users.find_by_email(&email).await? {
            Some(user) => user,
            None => {
                self.verify_unknown_account(password).await;
                counter!(SIGN_IN_METRIC, "outcome" => "rejected").increment(1);
                return Err(AuthError::InvalidCredentials);
            }
        };

        if !self
            .verify_password(password, user.password_digest.clone())
            .await?
        {
            counter!(SIGN_IN_METRIC, "outcome" => "rejected").increment(1);
            return Err(AuthError::InvalidCredentials);
        }

        let pair = self.issuer.issue_pair(user.id).await?;
        counter!(SIGN_IN_METRIC, "outcome" => "accepted").increment(1);
        self.audit
            .record(user.id, AuditAction::Login, AuditEntity::User, Some(user.id))
            .await;

        Ok(pair)
    }

    /// Consume `refresh_token` and issue a fresh pair for the same user.
    ///
    /// The presented token is unusable afterwards, including when it had
    /// already expired.
    pub async fn refresh_tokens(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let refresh_token = require_token(refresh_token)?;

        let record = match self.store.redeem(refresh_token).await? {
            Some(record) => record,
            None => {
                counter!(REFRESH_METRIC, "outcome" => "not_found").increment(1);
                return Err(AuthError::RefreshTokenNotFound);
            }
        };

        if record.is_expired_at(OffsetDateTime::now_utc()) {
            counter!(REFRESH_METRIC, "outcome" => "expired").increment(1);
            debug!(
                target = "quaderno::auth",
                user_id = record.user_id,
                "expired refresh token redeemed"
            );
            return Err(AuthError::RefreshTokenExpired);
        }

        let pair = self.issuer.issue_pair(record.user_id).await?;
        counter!(REFRESH_METRIC, "outcome" => "rotated").increment(1);
        Ok(pair)
    }

    /// Resolve the owner of `refresh_token` without consuming it.
    pub async fn user_id_by_token(&self, refresh_token: &str) -> Result<i64, AuthError> {
        let refresh_token = require_token(refresh_token)?;

        let record = self
            .store
            .peek(refresh_token)
            .await?
            .ok_or(AuthError::RefreshTokenNotFound)?;

        if record.is_expired_at(OffsetDateTime::now_utc()) {
            return Err(AuthError::RefreshTokenExpired);
        }

        Ok(record.user_id)
    }

    pub fn parse_access_token(&self, access_token: &str) -> Result<i64, AuthError> {
        self.issuer.parse_access_token(access_token)
    }

    /// Drop refresh tokens that can no longer be redeemed.
    pub async fn purge_expired_tokens(&self) -> Result<u64, AuthError> {
        let removed = self.store.purge_expired(OffsetDateTime::now_utc()).await?;
        if removed > 0 {
            info!(
                target = "quaderno::auth",
                removed, "purged expired refresh tokens"
            );
        }
        Ok(removed)
    }
}

impl SessionManager {
    async fn hash_password(&self, plaintext: String) -> Result<String, AuthError> {
        let verifier = self.verifier.clone();
        let digest = tokio::task::spawn_blocking(move || verifier.hash(&plaintext))
            .await
            .map_err(|err| PasswordError::Hash(err.to_string()))??;
        Ok(digest)
    }

    async fn verify_password(&self, plaintext: String, digest: String) -> Result<bool, AuthError> {
        let verifier = self.verifier.clone();
        let matched = tokio::task::spawn_blocking(move || verifier.verify(&plaintext, &digest))
            .await
            .map_err(|err| PasswordError::Hash(err.to_string()))??;
        Ok(matched)
    }

    /// Spend a verification on a throwaway digest. Failures are only logged;
    /// the caller answers with invalid credentials regardless.
    async fn verify_unknown_account(&self, plaintext: String) {
        let digest = match self.unknown_account_digest.get() {
            Some(digest) => digest.clone(),
            None => match self.hash_password(UNKNOWN_ACCOUNT_PASSWORD.to_string()).await {
                Ok(digest) => self.unknown_account_digest.get_or_init(|| digest).clone(),
                Err(err) => {
                    debug!(
                        target = "quaderno::auth",
                        error = %err,
                        "unknown-account digest unavailable"
                    );
                    return;
                }
            },
        };

        if let Err(err) = self.verify_password(plaintext, digest).await {
            debug!(
                target = "quaderno::auth",
                error = %err,
                "unknown-account verification failed"
            );
        }
    }
}

fn require_token(token: &str) -> Result<&str, AuthError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(DomainError::validation("refresh token must not be empty").into());
    }
    Ok(token)
}
