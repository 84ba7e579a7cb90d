use async_trait::async_trait;
use sqlx::{FromRow, PgConnection, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{RepositoryError, ResetTokenStore};
use crate::models::{NewResetToken, ResetToken, TokenState};

/// PostgreSQL 版トークンストア
///
/// テーブル定義は `migrations/` を参照
#[derive(Clone)]
pub struct PgResetTokenStore {
    pool: PgPool,
}

impl PgResetTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct ResetTokenRow {
    id: Uuid,
    user_id: Uuid,
    token_hash: String,
    issued_at: OffsetDateTime,
    expires_at: OffsetDateTime,
    state: String,
    consumed_at: Option<OffsetDateTime>,
    superseded_at: Option<OffsetDateTime>,
}

impl TryFrom<ResetTokenRow> for ResetToken {
    type Error = RepositoryError;

    fn try_from(row: ResetTokenRow) -> Result<Self, Self::Error> {
        let state = row
            .state
            .parse::<TokenState>()
            .map_err(|e| RepositoryError::Database(sqlx::Error::Decode(Box::new(e))))?;

        Ok(ResetToken {
            id: row.id,
            user_id: row.user_id,
            token_hash: row.token_hash,
            issued_at: row.issued_at,
            expires_at: row.expires_at,
            state,
            consumed_at: row.consumed_at,
            superseded_at: row.superseded_at,
        })
    }
}

async fn supersede_on(
    conn: &mut PgConnection,
    user_id: Uuid,
    now: OffsetDateTime,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE password_reset_tokens
        SET state = 'superseded', superseded_at = $2
        WHERE user_id = $1 AND state = 'active'
        "#,
    )
    .bind(user_id)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

async fn insert_on(
    conn: &mut PgConnection,
    record: &NewResetToken,
) -> Result<ResetTokenRow, sqlx::Error> {
    sqlx::query_as::<_, ResetTokenRow>(
        r#"
        INSERT INTO password_reset_tokens (id, user_id, token_hash, issued_at, expires_at, state)
        VALUES ($1, $2, $3, $4, $5, 'active')
        RETURNING id, user_id, token_hash, issued_at, expires_at, state, consumed_at, superseded_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(record.user_id)
    .bind(&record.token_hash)
    .bind(record.issued_at)
    .bind(record.expires_at)
    .fetch_one(&mut *conn)
    .await
}

#[async_trait]
impl ResetTokenStore for PgResetTokenStore {
    async fn supersede_active(
        &self,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<u64, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        Ok(supersede_on(&mut conn, user_id, now).await?)
    }

    async fn insert(&self, record: NewResetToken) -> Result<ResetToken, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        insert_on(&mut conn, &record).await?.try_into()
    }

    /// 同一ユーザーの発行はアドバイザリロックで直列化する
    ///
    /// 後から来たトランザクションは先行分のコミット後に UPDATE を評価するため、
    /// 先行トークンを Superseded にしてから自分のトークンを挿入する（後勝ち）。
    /// `password_reset_tokens_one_active_per_user` 部分ユニークインデックスが最後の防壁。
    async fn replace_active(&self, record: NewResetToken) -> Result<ResetToken, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
            .bind(record.user_id)
            .execute(&mut *tx)
            .await?;

        let superseded = supersede_on(&mut tx, record.user_id, record.issued_at).await?;
        let row = insert_on(&mut tx, &record).await?;

        tx.commit().await?;

        if superseded > 0 {
            tracing::debug!(user_id = %record.user_id, superseded, "既存トークンを無効化");
        }

        row.try_into()
    }

    async fn consume_if_active(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Option<Uuid>, RepositoryError> {
        // 行ロック取得後に WHERE が再評価されるため、同一トークンの並行更新は1件のみ成功する
        let user_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE password_reset_tokens
            SET state = 'consumed', consumed_at = $2
            WHERE token_hash = $1 AND state = 'active' AND expires_at > $2
            RETURNING user_id
            "#,
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user_id)
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<ResetToken>, RepositoryError> {
        sqlx::query_as::<_, ResetTokenRow>(
            r#"
            SELECT id, user_id, token_hash, issued_at, expires_at, state, consumed_at, superseded_at
            FROM password_reset_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?
        .map(ResetToken::try_from)
        .transpose()
    }

    async fn purge_expired(&self, before: OffsetDateTime) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r#"
            DELETE FROM password_reset_tokens
            WHERE expires_at < $1
            "#,
        )
        .bind(before)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
