use std::sync::Arc;

use sha2::{Digest, Sha256};
use time::OffsetDateTime;

use crate::application::repos::{NewRefreshToken, RepoError, TokensRepo};
use crate::domain::entities::RefreshTokenRecord;

/// Refresh-token persistence keyed by opaque token strings.
///
/// Raw token values never reach the repository; every operation hashes the
/// presented string first.
#[derive(Clone)]
pub struct TokenStore {
    repo: Arc<dyn TokensRepo>,
}

impl TokenStore {
    pub fn new(repo: Arc<dyn TokensRepo>) -> Self {
        Self { repo }
    }

    pub async fn save(
        &self,
        user_id: i64,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<RefreshTokenRecord, RepoError> {
        self.repo
            .save_token(NewRefreshToken {
                user_id,
                token_hash: hash_refresh_token(token),
                expires_at,
            })
            .await
    }

    /// Consume `token`. The row is gone afterwards whether or not it had expired.
    pub async fn redeem(&self, token: &str) -> Result<Option<RefreshTokenRecord>, RepoError> {
        self.repo.redeem_token(&hash_refresh_token(token)).await
    }

    /// Look `token` up without consuming it.
    pub async fn peek(&self, token: &str) -> Result<Option<RefreshTokenRecord>, RepoError> {
        self.repo.peek_token(&hash_refresh_token(token)).await
    }

    pub async fn purge_expired(&self, now: OffsetDateTime) -> Result<u64, RepoError> {
        self.repo.purge_expired(now).await
    }
}

pub fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
