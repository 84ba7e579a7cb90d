use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// パスワードリセットの失敗分類
///
/// 呼び出し元に見せるのはこの4種のみ。
/// 「存在しない」「期限切れ」「使用済み」「無効化済み」は推測の手掛かりを与えないよう1つにまとめる。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResetError {
    #[error("無効または期限切れのリンクです")]
    InvalidOrExpiredToken,

    #[error("パスワードの更新に失敗しました。再度リセットをリクエストしてください")]
    PasswordUpdateFailed,

    #[error("パスワードは{min_length}文字以上で入力してください")]
    WeakPassword { min_length: usize },

    #[error("一時的に利用できません。しばらくしてから再度お試しください")]
    Unavailable,
}

impl ResetError {
    /// クライアント向けの機械可読コード
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidOrExpiredToken => "invalid_or_expired_token",
            Self::PasswordUpdateFailed => "password_update_failed",
            Self::WeakPassword { .. } => "weak_password",
            Self::Unavailable => "unavailable",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::InvalidOrExpiredToken => StatusCode::BAD_REQUEST,
            Self::PasswordUpdateFailed => StatusCode::INTERNAL_SERVER_ERROR,
            Self::WeakPassword { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

impl IntoResponse for ResetError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code(),
        };

        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ResetError::InvalidOrExpiredToken.into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ResetError::WeakPassword { min_length: 8 }
                .into_response()
                .status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ResetError::PasswordUpdateFailed.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ResetError::Unavailable.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_weak_password_message_includes_minimum() {
        let message = ResetError::WeakPassword { min_length: 12 }.to_string();
        assert!(message.contains("12"));
    }
}
