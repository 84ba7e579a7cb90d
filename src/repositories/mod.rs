pub mod memory;
pub mod password_reset_token;
pub mod user;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::{NewResetToken, ResetToken};

pub use memory::{InMemoryResetTokenStore, InMemoryUserDirectory};
pub use password_reset_token::PgResetTokenStore;
pub use user::PgUserDirectory;

/// 永続化層のエラー
///
/// 詳細はサービス境界でログ出力し、呼び出し元には粗い分類だけを返す
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("データベースエラー")]
    Database(#[from] sqlx::Error),

    #[error("ユーザーが見つかりません")]
    UserNotFound,

    #[error("ストアが利用できません: {0}")]
    Unavailable(String),
}

/// パスワードリセットトークンの保存先
///
/// 並行性の正しさはすべてこのトレイトの原子操作に依存する。
/// 実装は `replace_active` と `consume_if_active` をそれぞれ単一の原子操作として提供すること。
#[async_trait]
pub trait ResetTokenStore: Send + Sync {
    /// ユーザーの Active なトークンをすべて Superseded にする
    ///
    /// # Returns
    /// 遷移した件数
    async fn supersede_active(
        &self,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<u64, RepositoryError>;

    /// トークンを Active として挿入
    async fn insert(&self, record: NewResetToken) -> Result<ResetToken, RepositoryError>;

    /// 既存の Active トークンを Superseded にしてから挿入する（単一トランザクション）
    ///
    /// 同一ユーザーに対する並行呼び出しでも Active は高々1件
    async fn replace_active(&self, record: NewResetToken) -> Result<ResetToken, RepositoryError>;

    /// Active かつ期限内のトークンを Consumed にし、ユーザーIDを返す
    ///
    /// 条件付き更新1回で行うこと（検証と更新を分けない）
    async fn consume_if_active(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Option<Uuid>, RepositoryError>;

    /// ハッシュでトークンを参照（ログ用の診断のみ、有効性判定には使わない）
    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<ResetToken>, RepositoryError>;

    /// `before` より前に期限切れとなったトークンを削除
    ///
    /// # Returns
    /// 削除された件数
    async fn purge_expired(&self, before: OffsetDateTime) -> Result<u64, RepositoryError>;
}

/// ユーザーディレクトリ
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// 正規化済みメールアドレスでユーザーIDを検索
    async fn find_by_email(&self, email: &str) -> Result<Option<Uuid>, RepositoryError>;

    /// パスワードハッシュを更新
    ///
    /// # Note
    /// password_hash はログに出力しないこと
    async fn update_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), RepositoryError>;
}
