use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// 保存されるトークン状態
///
/// `Active` のみが初期状態。`Consumed` / `Superseded` は終端状態。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenState {
    Active,
    Consumed,
    Superseded,
}

impl TokenState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Consumed => "consumed",
            Self::Superseded => "superseded",
        }
    }
}

impl fmt::Display for TokenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("不明なトークン状態: {0}")]
pub struct UnknownTokenState(pub String);

impl FromStr for TokenState {
    type Err = UnknownTokenState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "consumed" => Ok(Self::Consumed),
            "superseded" => Ok(Self::Superseded),
            other => Err(UnknownTokenState(other.to_string())),
        }
    }
}

/// 時刻を加味した実効状態
///
/// `Expired` は保存されず、`Active` かつ期限切れのときに導出される。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    Active,
    Consumed,
    Superseded,
    Expired,
}

impl TokenStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Consumed => "consumed",
            Self::Superseded => "superseded",
            Self::Expired => "expired",
        }
    }
}

/// パスワードリセットトークン
///
/// トークン自体はハッシュ化して保存（token_hash）
/// 平文トークンはユーザーにメールで送信し、保存しない
#[derive(Debug, Clone, Serialize)]
pub struct ResetToken {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(skip)]
    pub token_hash: String,
    pub issued_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub state: TokenState,
    pub consumed_at: Option<OffsetDateTime>,
    pub superseded_at: Option<OffsetDateTime>,
}

impl ResetToken {
    /// `now` 時点で引き換え可能か
    pub fn is_redeemable(&self, now: OffsetDateTime) -> bool {
        self.state == TokenState::Active && self.expires_at > now
    }

    /// `now` 時点の実効状態
    pub fn status(&self, now: OffsetDateTime) -> TokenStatus {
        match self.state {
            TokenState::Consumed => TokenStatus::Consumed,
            TokenState::Superseded => TokenStatus::Superseded,
            TokenState::Active if self.expires_at > now => TokenStatus::Active,
            TokenState::Active => TokenStatus::Expired,
        }
    }
}

/// 新規トークンの挿入内容（id はストアが採番する）
#[derive(Debug, Clone)]
pub struct NewResetToken {
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

impl NewResetToken {
    pub fn into_active(self, id: Uuid) -> ResetToken {
        ResetToken {
            id,
            user_id: self.user_id,
            token_hash: self.token_hash,
            issued_at: self.issued_at,
            expires_at: self.expires_at,
            state: TokenState::Active,
            consumed_at: None,
            superseded_at: None,
        }
    }
}
