use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{RepositoryError, ResetTokenStore, UserDirectory};
use crate::models::{NewResetToken, ResetToken, TokenState};
use crate::services::token_codec::hashes_match;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// プロセス内トークンストア（テスト・単一プロセス組み込み用）
///
/// 各操作は1つのロック区間で完結するため、`replace_active` と
/// `consume_if_active` は PostgreSQL 版と同じく原子的に振る舞う。
#[derive(Debug, Default)]
pub struct InMemoryResetTokenStore {
    tokens: Mutex<Vec<ResetToken>>,
}

impl InMemoryResetTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 保存中の全レコードのスナップショット
    pub fn snapshot(&self) -> Vec<ResetToken> {
        lock(&self.tokens).clone()
    }

    /// ユーザーの Active レコード数（期限は考慮しない）
    pub fn active_count(&self, user_id: Uuid) -> usize {
        lock(&self.tokens)
            .iter()
            .filter(|t| t.user_id == user_id && t.state == TokenState::Active)
            .count()
    }
}

fn supersede_locked(tokens: &mut [ResetToken], user_id: Uuid, now: OffsetDateTime) -> u64 {
    let mut count = 0;
    for token in tokens
        .iter_mut()
        .filter(|t| t.user_id == user_id && t.state == TokenState::Active)
    {
        token.state = TokenState::Superseded;
        token.superseded_at = Some(now);
        count += 1;
    }
    count
}

#[async_trait]
impl ResetTokenStore for InMemoryResetTokenStore {
    async fn supersede_active(
        &self,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<u64, RepositoryError> {
        Ok(supersede_locked(&mut lock(&self.tokens), user_id, now))
    }

    async fn insert(&self, record: NewResetToken) -> Result<ResetToken, RepositoryError> {
        let token = record.into_active(Uuid::new_v4());
        lock(&self.tokens).push(token.clone());
        Ok(token)
    }

    async fn replace_active(&self, record: NewResetToken) -> Result<ResetToken, RepositoryError> {
        let token = record.into_active(Uuid::new_v4());
        let mut tokens = lock(&self.tokens);
        supersede_locked(&mut tokens, token.user_id, token.issued_at);
        tokens.push(token.clone());
        Ok(token)
    }

    async fn consume_if_active(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Option<Uuid>, RepositoryError> {
        let mut tokens = lock(&self.tokens);
        let found = tokens
            .iter_mut()
            .find(|t| hashes_match(&t.token_hash, token_hash) && t.is_redeemable(now));

        Ok(found.map(|t| {
            t.state = TokenState::Consumed;
            t.consumed_at = Some(now);
            t.user_id
        }))
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<ResetToken>, RepositoryError> {
        Ok(lock(&self.tokens)
            .iter()
            .find(|t| hashes_match(&t.token_hash, token_hash))
            .cloned())
    }

    async fn purge_expired(&self, before: OffsetDateTime) -> Result<u64, RepositoryError> {
        let mut tokens = lock(&self.tokens);
        let len = tokens.len();
        tokens.retain(|t| t.expires_at >= before);
        Ok((len - tokens.len()) as u64)
    }
}

#[derive(Debug, Clone)]
struct DirectoryEntry {
    email: String,
    password_hash: Option<String>,
}

/// プロセス内ユーザーディレクトリ（テスト・単一プロセス組み込み用）
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: Mutex<HashMap<Uuid, DirectoryEntry>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// ユーザーを登録して ID を返す（メールアドレスは小文字で保持）
    pub fn add_user(&self, email: &str) -> Uuid {
        let id = Uuid::new_v4();
        lock(&self.users).insert(
            id,
            DirectoryEntry {
                email: email.trim().to_lowercase(),
                password_hash: None,
            },
        );
        id
    }

    pub fn password_hash(&self, user_id: Uuid) -> Option<String> {
        lock(&self.users)
            .get(&user_id)
            .and_then(|u| u.password_hash.clone())
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<Uuid>, RepositoryError> {
        Ok(lock(&self.users)
            .iter()
            .find(|(_, u)| u.email == email)
            .map(|(id, _)| *id))
    }

    async fn update_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), RepositoryError> {
        match lock(&self.users).get_mut(&user_id) {
            Some(user) => {
                user.password_hash = Some(password_hash.to_string());
                Ok(())
            }
            None => Err(RepositoryError::UserNotFound),
        }
    }
}
