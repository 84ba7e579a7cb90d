use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use tokio::time::Instant;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::ResetError;
use crate::models::NewResetToken;
use crate::repositories::{RepositoryError, ResetTokenStore, UserDirectory};
use crate::services::notifier::Notifier;
use crate::services::password::hash_password;
use crate::services::token_codec::{DEFAULT_TOKEN_BYTES, IssuedToken, TokenCodec};

const MAX_EMAIL_LENGTH: usize = 254;

/// リセット要求に対する唯一の応答文言
pub const RESET_ACK_MESSAGE: &str =
    "アカウントが存在する場合、パスワードリセット用のリンクをメールで送信しました";

/// パスワードリセットの動作設定
#[derive(Debug, Clone)]
pub struct ResetPolicy {
    /// トークン有効期間
    pub token_ttl: time::Duration,
    /// トークンの乱数バイト数
    pub token_byte_length: usize,
    /// 新パスワードの最小文字数
    pub min_password_length: usize,
    /// ストア・ディレクトリ呼び出しごとの期限
    pub call_timeout: std::time::Duration,
    /// `request_reset` の最小所要時間
    pub request_floor: std::time::Duration,
}

impl Default for ResetPolicy {
    fn default() -> Self {
        Self {
            token_ttl: time::Duration::hours(1),
            token_byte_length: DEFAULT_TOKEN_BYTES,
            min_password_length: 8,
            call_timeout: std::time::Duration::from_secs(5),
            request_floor: std::time::Duration::from_millis(250),
        }
    }
}

/// リセット要求への汎用応答
///
/// ユーザーの存在有無・入力の妥当性に関わらず常に同じ内容
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenericAck {
    pub message: &'static str,
}

impl Default for GenericAck {
    fn default() -> Self {
        Self {
            message: RESET_ACK_MESSAGE,
        }
    }
}

/// パスワードリセットサービス
///
/// 共有可変状態は持たない。同期はすべてトークンストアの原子操作に委ねる。
#[derive(Clone)]
pub struct PasswordResetService {
    tokens: Arc<dyn ResetTokenStore>,
    users: Arc<dyn UserDirectory>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    codec: TokenCodec,
    policy: ResetPolicy,
}

impl PasswordResetService {
    /// 新しい PasswordResetService を作成
    pub fn new(
        tokens: Arc<dyn ResetTokenStore>,
        users: Arc<dyn UserDirectory>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        policy: ResetPolicy,
    ) -> Self {
        Self {
            tokens,
            users,
            notifier,
            clock,
            codec: TokenCodec::new(policy.token_byte_length),
            policy,
        }
    }

    pub fn policy(&self) -> &ResetPolicy {
        &self.policy
    }

    /// パスワードリセットをリクエスト
    ///
    /// # Security
    /// - 形式不正・ユーザー不在・内部エラーのいずれでも同じ応答を返す（情報漏洩防止）
    /// - 応答時間は `request_floor` 以上に揃える
    /// - 応答経路で待つのはユーザー検索のみ（発行・送信はバックグラウンド）
    /// - トークン（平文）はログに出力しない
    pub async fn request_reset(&self, email: &str) -> GenericAck {
        let started = Instant::now();

        match normalize_email(email) {
            Some(email) => self.issue_for(&email).await,
            None => {
                tracing::info!("パスワードリセット: メールアドレス形式不正（成功レスポンス返却）");
            }
        }

        tokio::time::sleep_until(started + self.policy.request_floor).await;

        GenericAck::default()
    }

    async fn issue_for(&self, email: &str) {
        let user_id = match self.bounded(None, self.users.find_by_email(email)).await {
            Ok(Some(user_id)) => user_id,
            Ok(None) => {
                // ユーザー不在でも同じ生成処理を行い、処理量の差を小さくする
                let _ = self.codec.generate();
                tracing::info!(email = %email, "パスワードリセット: ユーザー不在（成功レスポンス返却）");
                return;
            }
            Err(e) => {
                tracing::error!(error = ?e, "パスワードリセット: ユーザー検索に失敗（成功レスポンス返却）");
                return;
            }
        };

        let issued = self.codec.generate();

        // 発行と送信は応答経路の外で行う
        let service = self.clone();
        let email = email.to_string();
        tokio::spawn(async move {
            service.deliver(user_id, &email, issued).await;
        });
    }

    /// トークンを保存し、成功した場合のみ通知する
    async fn deliver(&self, user_id: Uuid, email: &str, issued: IssuedToken) {
        let issued_at = self.clock.now();
        let record = NewResetToken {
            user_id,
            token_hash: issued.token_hash,
            issued_at,
            expires_at: issued_at + self.policy.token_ttl,
        };

        match self.bounded(None, self.tokens.replace_active(record)).await {
            Ok(token) => {
                tracing::info!(
                    user_id = %user_id,
                    token_id = %token.id,
                    expires_at = %token.expires_at,
                    "パスワードリセットトークン発行"
                );
            }
            Err(e) => {
                tracing::error!(error = ?e, user_id = %user_id, "トークン発行に失敗");
                return;
            }
        }

        // 送信結果は応答に影響させない
        if let Err(e) = self.notifier.send(email, &issued.plaintext).await {
            tracing::warn!(error = %e, to = %email, "パスワードリセットメール送信失敗");
        }
    }

    /// 新しいパスワードでリセットを実行
    ///
    /// パスワードポリシーはトークン消費前に検査する（有効なトークンを無駄にしない）
    ///
    /// # Security
    /// - トークン・新パスワードはログに出力しない
    pub async fn redeem(&self, token: &str, new_password: &str) -> Result<(), ResetError> {
        self.redeem_until(token, new_password, None).await
    }

    /// 呼び出し側の期限付きで `redeem` を実行
    ///
    /// 各呼び出しの期限は `deadline` と `call_timeout` の早い方。
    /// 期限を過ぎている場合はトークンに触れずに `Unavailable` を返す。
    pub async fn redeem_until(
        &self,
        token: &str,
        new_password: &str,
        deadline: Option<Instant>,
    ) -> Result<(), ResetError> {
        self.check_password_policy(new_password)?;

        let password = new_password.to_owned();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, "パスワードハッシュ処理タスクの異常終了");
                ResetError::Unavailable
            })?
            .map_err(|e| {
                tracing::error!(error = %e, "パスワードハッシュ生成エラー");
                ResetError::Unavailable
            })?;

        self.redeem_hash_until(token, &password_hash, deadline).await
    }

    /// ハッシュ済みパスワードでリセットを実行
    ///
    /// トークンの消費は条件付き更新1回で行う。消費後にパスワード更新が失敗しても
    /// トークンは復活させない（ユーザーには再リクエストしてもらう）。
    pub async fn redeem_hash(&self, token: &str, new_password_hash: &str) -> Result<(), ResetError> {
        self.redeem_hash_until(token, new_password_hash, None).await
    }

    /// 呼び出し側の期限付きで `redeem_hash` を実行
    pub async fn redeem_hash_until(
        &self,
        token: &str,
        new_password_hash: &str,
        deadline: Option<Instant>,
    ) -> Result<(), ResetError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ResetError::InvalidOrExpiredToken);
        }

        let token_hash = TokenCodec::hash(token);
        let now = self.clock.now();

        let consumed = self
            .bounded(deadline, self.tokens.consume_if_active(&token_hash, now))
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, "トークン消費処理に失敗");
                ResetError::Unavailable
            })?;

        let Some(user_id) = consumed else {
            self.log_rejection(&token_hash, now).await;
            return Err(ResetError::InvalidOrExpiredToken);
        };

        if let Err(e) = self
            .bounded(deadline, self.users.update_password_hash(user_id, new_password_hash))
            .await
        {
            tracing::error!(
                error = ?e,
                user_id = %user_id,
                "トークン消費後のパスワード更新に失敗（トークンは使用済みのまま）"
            );
            return Err(ResetError::PasswordUpdateFailed);
        }

        tracing::info!(user_id = %user_id, "パスワードリセット完了");

        Ok(())
    }

    /// ユーザーの未使用トークンをすべて無効化
    ///
    /// 別経路でパスワードが変更された場合などに呼び出す
    ///
    /// # Returns
    /// 無効化した件数
    pub async fn revoke_outstanding(&self, user_id: Uuid) -> Result<u64, ResetError> {
        let now = self.clock.now();
        let revoked = self
            .bounded(None, self.tokens.supersede_active(user_id, now))
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, user_id = %user_id, "トークン無効化に失敗");
                ResetError::Unavailable
            })?;

        tracing::info!(user_id = %user_id, revoked, "未使用トークンを無効化");

        Ok(revoked)
    }

    /// `before` より前に期限切れとなったトークンを削除
    pub async fn purge_expired(&self, before: OffsetDateTime) -> Result<u64, ResetError> {
        self.bounded(None, self.tokens.purge_expired(before))
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, "期限切れトークンの削除に失敗");
                ResetError::Unavailable
            })
    }

    fn check_password_policy(&self, new_password: &str) -> Result<(), ResetError> {
        if new_password.chars().count() < self.policy.min_password_length {
            return Err(ResetError::WeakPassword {
                min_length: self.policy.min_password_length,
            });
        }
        Ok(())
    }

    /// 拒否理由をログにのみ記録（呼び出し元には区別を返さない）
    async fn log_rejection(&self, token_hash: &str, now: OffsetDateTime) {
        match self.bounded(None, self.tokens.find_by_hash(token_hash)).await {
            Ok(Some(token)) => {
                tracing::warn!(
                    token_id = %token.id,
                    user_id = %token.user_id,
                    reason = token.status(now).as_str(),
                    "リセットトークン拒否"
                );
            }
            Ok(None) => {
                tracing::warn!(reason = "unknown", "リセットトークン拒否");
            }
            Err(e) => {
                tracing::debug!(error = ?e, "拒否理由の参照に失敗");
            }
        }
    }

    /// 呼び出しに期限を設ける（超過は Unavailable 扱い）
    ///
    /// 期限は `call_timeout` 後と `deadline` の早い方
    async fn bounded<T, F>(&self, deadline: Option<Instant>, call: F) -> Result<T, RepositoryError>
    where
        F: Future<Output = Result<T, RepositoryError>>,
    {
        let now = Instant::now();
        let limit = now + self.policy.call_timeout;
        let limit = deadline.map_or(limit, |deadline| deadline.min(limit));

        if limit <= now {
            return Err(RepositoryError::Unavailable("deadline exceeded".to_string()));
        }

        tokio::time::timeout_at(limit, call)
            .await
            .unwrap_or_else(|_| {
                Err(RepositoryError::Unavailable(format!(
                    "timed out after {}ms",
                    (limit - now).as_millis()
                )))
            })
    }
}

/// メールアドレスを正規化（前後空白除去・小文字化）し、形式を検査
fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    if email.is_empty()
        || email.len() > MAX_EMAIL_LENGTH
        || email.chars().any(char::is_whitespace)
    {
        return None;
    }

    let (local, domain) = email.split_once('@')?;
    if local.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
    {
        return None;
    }

    Some(email)
}
