use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use crate::error::ResetError;
use crate::services::GenericAck;
use crate::state::AppState;

// === リセットリクエスト ===

#[derive(Debug, Deserialize)]
pub struct ResetRequestRequest {
    pub email: String,
}

/// POST /api/password/reset-request
///
/// # Security
/// 常に200と同一の本文を返す（ユーザー存在有無・入力形式を漏洩しない）
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(request): Json<ResetRequestRequest>,
) -> Json<GenericAck> {
    Json(state.reset_service.request_reset(&request.email).await)
}

// === パスワードリセット実行 ===

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct ResetPasswordResponse {
    pub message: String,
}

/// POST /api/password/reset
///
/// # Security
/// - token, new_password はログに出力しない
pub async fn reset_password(
    State(state): State<AppState>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<ResetPasswordResponse>, ResetError> {
    state
        .reset_service
        .redeem(&request.token, &request.new_password)
        .await?;

    Ok(Json(ResetPasswordResponse {
        message: "パスワードが更新されました".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use secrecy::{ExposeSecret, SecretString};
    use tokio::sync::mpsc;

    use crate::clock::SystemClock;
    use crate::repositories::{InMemoryResetTokenStore, InMemoryUserDirectory};
    use crate::services::{Notifier, NotifyError, PasswordResetService, ResetPolicy};

    struct ChannelNotifier(mpsc::UnboundedSender<String>);

    #[async_trait]
    impl Notifier for ChannelNotifier {
        async fn send(&self, _email: &str, token: &SecretString) -> Result<(), NotifyError> {
            let _ = self.0.send(token.expose_secret().to_string());
            Ok(())
        }
    }

    fn test_state() -> (AppState, mpsc::UnboundedReceiver<String>) {
        let directory = Arc::new(InMemoryUserDirectory::new());
        directory.add_user("user@example.com");
        let (tx, rx) = mpsc::unbounded_channel();
        let service = PasswordResetService::new(
            Arc::new(InMemoryResetTokenStore::new()),
            directory,
            Arc::new(ChannelNotifier(tx)),
            Arc::new(SystemClock),
            ResetPolicy {
                request_floor: Duration::ZERO,
                ..ResetPolicy::default()
            },
        );
        (AppState::new(service), rx)
    }

    async fn request(state: &AppState, email: &str) -> GenericAck {
        let Json(ack) = request_password_reset(
            State(state.clone()),
            Json(ResetRequestRequest {
                email: email.to_string(),
            }),
        )
        .await;
        ack
    }

    async fn reset(
        state: &AppState,
        token: &str,
        new_password: &str,
    ) -> Result<Json<ResetPasswordResponse>, ResetError> {
        reset_password(
            State(state.clone()),
            Json(ResetPasswordRequest {
                token: token.to_string(),
                new_password: new_password.to_string(),
            }),
        )
        .await
    }

    #[tokio::test]
    async fn test_request_returns_same_body_for_any_email() {
        let (state, _rx) = test_state();

        let existing = request(&state, "user@example.com").await;
        let missing = request(&state, "nobody@example.com").await;
        let malformed = request(&state, "invalid-email").await;

        assert_eq!(existing, missing);
        assert_eq!(existing, malformed);
    }

    #[tokio::test]
    async fn test_reset_with_issued_token() {
        let (state, mut rx) = test_state();

        request(&state, "user@example.com").await;
        let token = rx.recv().await.unwrap();

        let response = reset(&state, &token, "password123").await.unwrap();
        assert!(!response.message.is_empty());

        let again = reset(&state, &token, "password123").await;
        assert_eq!(again.unwrap_err(), ResetError::InvalidOrExpiredToken);
    }

    #[tokio::test]
    async fn test_reset_with_empty_token() {
        let (state, _rx) = test_state();
        let result = reset(&state, "", "password123").await;
        assert_eq!(result.unwrap_err(), ResetError::InvalidOrExpiredToken);
    }

    #[tokio::test]
    async fn test_reset_with_short_password() {
        let (state, _rx) = test_state();
        let result = reset(&state, "valid-token", "short").await;
        assert_eq!(
            result.unwrap_err(),
            ResetError::WeakPassword { min_length: 8 }
        );
    }
}
