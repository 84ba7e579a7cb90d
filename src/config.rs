use secrecy::SecretBox;
use serde::Deserialize;

use crate::services::password_reset::ResetPolicy;
use crate::services::token_codec::MIN_TOKEN_BYTES;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub database_url: SecretBox<String>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    // SMTP設定（オプション - email機能有効時のみ使用）
    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<SecretBox<String>>,
    pub smtp_password: Option<SecretBox<String>>,
    #[serde(default)]
    pub smtp_from_address: Option<String>,

    // パスワードリセット設定
    #[serde(default = "default_password_reset_url_base")]
    pub password_reset_url_base: String,
    #[serde(default = "default_password_reset_token_ttl_secs")]
    pub password_reset_token_ttl_secs: i64,
    #[serde(default = "default_password_reset_token_bytes")]
    pub password_reset_token_bytes: usize,
    #[serde(default = "default_min_password_length")]
    pub min_password_length: usize,
    /// ストア・ディレクトリ呼び出しごとのタイムアウト
    #[serde(default = "default_collaborator_timeout_ms")]
    pub collaborator_timeout_ms: u64,
    /// リセット要求の最小応答時間（ユーザー存在有無を応答時間から推測させない）
    #[serde(default = "default_reset_request_floor_ms")]
    pub reset_request_floor_ms: u64,
    /// 期限切れトークン削除の間隔（0で無効）
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,
}

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_PASSWORD_RESET_URL_BASE: &str = "http://localhost:3000/password-reset";
const DEFAULT_PASSWORD_RESET_TOKEN_TTL_SECS: i64 = 3600;
const DEFAULT_PASSWORD_RESET_TOKEN_BYTES: usize = 32;
const DEFAULT_MIN_PASSWORD_LENGTH: usize = 8;
const DEFAULT_COLLABORATOR_TIMEOUT_MS: u64 = 5000;
const DEFAULT_RESET_REQUEST_FLOOR_MS: u64 = 250;
const DEFAULT_PURGE_INTERVAL_SECS: u64 = 3600;

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_smtp_port() -> u16 {
    DEFAULT_SMTP_PORT
}

fn default_password_reset_url_base() -> String {
    DEFAULT_PASSWORD_RESET_URL_BASE.to_string()
}

fn default_password_reset_token_ttl_secs() -> i64 {
    DEFAULT_PASSWORD_RESET_TOKEN_TTL_SECS
}

fn default_password_reset_token_bytes() -> usize {
    DEFAULT_PASSWORD_RESET_TOKEN_BYTES
}

fn default_min_password_length() -> usize {
    DEFAULT_MIN_PASSWORD_LENGTH
}

fn default_collaborator_timeout_ms() -> u64 {
    DEFAULT_COLLABORATOR_TIMEOUT_MS
}

fn default_reset_request_floor_ms() -> u64 {
    DEFAULT_RESET_REQUEST_FLOOR_MS
}

fn default_purge_interval_secs() -> u64 {
    DEFAULT_PURGE_INTERVAL_SECS
}

/// 設定値の検証エラー
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("PASSWORD_RESET_TOKEN_TTL_SECS は正の値が必要です: {0}")]
    InvalidTokenTtl(i64),

    #[error("PASSWORD_RESET_TOKEN_BYTES は{min}以上が必要です: {actual}")]
    TokenTooShort { min: usize, actual: usize },

    #[error("MIN_PASSWORD_LENGTH は1以上が必要です")]
    InvalidMinPasswordLength,

    #[error("COLLABORATOR_TIMEOUT_MS は1以上が必要です")]
    InvalidTimeout,
}

impl Config {
    pub fn load() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    /// リセット処理のポリシーに変換（値の検証込み）
    pub fn reset_policy(&self) -> Result<ResetPolicy, ConfigError> {
        if self.password_reset_token_ttl_secs <= 0 {
            return Err(ConfigError::InvalidTokenTtl(
                self.password_reset_token_ttl_secs,
            ));
        }
        if self.password_reset_token_bytes < MIN_TOKEN_BYTES {
            return Err(ConfigError::TokenTooShort {
                min: MIN_TOKEN_BYTES,
                actual: self.password_reset_token_bytes,
            });
        }
        if self.min_password_length == 0 {
            return Err(ConfigError::InvalidMinPasswordLength);
        }
        if self.collaborator_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout);
        }

        Ok(ResetPolicy {
            token_ttl: time::Duration::seconds(self.password_reset_token_ttl_secs),
            token_byte_length: self.password_reset_token_bytes,
            min_password_length: self.min_password_length,
            call_timeout: std::time::Duration::from_millis(self.collaborator_timeout_ms),
            request_floor: std::time::Duration::from_millis(self.reset_request_floor_ms),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<Vec<_>>();
        envy::from_iter(vars).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("DATABASE_URL", "postgres://localhost/test")]);
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.password_reset_token_ttl_secs, 3600);
        assert_eq!(config.password_reset_token_bytes, 32);
        assert_eq!(config.min_password_length, 8);

        let policy = config.reset_policy().unwrap();
        assert_eq!(policy.token_ttl, time::Duration::hours(1));
        assert_eq!(policy.token_byte_length, 32);
        assert_eq!(policy.min_password_length, 8);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/test"),
            ("PASSWORD_RESET_TOKEN_TTL_SECS", "600"),
            ("PASSWORD_RESET_TOKEN_BYTES", "48"),
            ("MIN_PASSWORD_LENGTH", "12"),
            ("COLLABORATOR_TIMEOUT_MS", "1500"),
        ]);

        let policy = config.reset_policy().unwrap();
        assert_eq!(policy.token_ttl, time::Duration::minutes(10));
        assert_eq!(policy.token_byte_length, 48);
        assert_eq!(policy.min_password_length, 12);
        assert_eq!(policy.call_timeout, std::time::Duration::from_millis(1500));
    }

    #[test]
    fn test_missing_database_url() {
        let vars: Vec<(String, String)> = vec![];
        assert!(envy::from_iter::<_, Config>(vars).is_err());
    }

    #[test]
    fn test_rejects_low_entropy_token() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/test"),
            ("PASSWORD_RESET_TOKEN_BYTES", "8"),
        ]);
        assert!(matches!(
            config.reset_policy(),
            Err(ConfigError::TokenTooShort { actual: 8, .. })
        ));
    }

    #[test]
    fn test_rejects_non_positive_ttl() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/test"),
            ("PASSWORD_RESET_TOKEN_TTL_SECS", "0"),
        ]);
        assert!(matches!(
            config.reset_policy(),
            Err(ConfigError::InvalidTokenTtl(0))
        ));
    }
}
