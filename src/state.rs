use std::sync::Arc;

use sqlx::PgPool;

use crate::clock::Clock;
use crate::config::Config;
use crate::repositories::{PgResetTokenStore, PgUserDirectory};
use crate::services::{LogNotifier, Notifier, PasswordResetService};

/// アプリケーション共有状態
///
/// axum の State として全ハンドラーで共有される。
/// Clone は必須（axum が内部で clone するため）。
#[derive(Clone)]
pub struct AppState {
    /// パスワードリセットサービス
    pub reset_service: PasswordResetService,
}

impl AppState {
    pub fn new(reset_service: PasswordResetService) -> Self {
        Self { reset_service }
    }

    /// PostgreSQL の各実装でサービスを組み立てる
    pub fn from_config(
        db_pool: PgPool,
        config: &Config,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let policy = config.reset_policy()?;
        let notifier = build_notifier(config)?;

        let reset_service = PasswordResetService::new(
            Arc::new(PgResetTokenStore::new(db_pool.clone())),
            Arc::new(PgUserDirectory::new(db_pool)),
            notifier,
            clock,
            policy,
        );

        Ok(Self::new(reset_service))
    }
}

#[cfg(feature = "email")]
fn build_notifier(config: &Config) -> anyhow::Result<Arc<dyn Notifier>> {
    use secrecy::ExposeSecret;

    use crate::services::notifier::{SmtpNotifier, SmtpSettings};

    match (
        &config.smtp_host,
        &config.smtp_username,
        &config.smtp_password,
        &config.smtp_from_address,
    ) {
        (Some(host), Some(username), Some(password), Some(from_address)) => {
            tracing::info!(smtp_host = %host, "SMTP 通知を初期化");
            let notifier = SmtpNotifier::new(SmtpSettings {
                host: host.clone(),
                port: config.smtp_port,
                username: username.expose_secret().clone(),
                password: password.expose_secret().clone(),
                from_address: from_address.clone(),
                reset_url_base: config.password_reset_url_base.clone(),
            })?;
            Ok(Arc::new(notifier))
        }
        _ => {
            tracing::warn!("SMTP 未設定（ログ出力のみ）");
            Ok(Arc::new(LogNotifier))
        }
    }
}

#[cfg(not(feature = "email"))]
fn build_notifier(config: &Config) -> anyhow::Result<Arc<dyn Notifier>> {
    if config.smtp_host.is_some() {
        tracing::warn!("SMTP が設定されていますが email 機能が無効です（ログ出力のみ）");
    }
    Ok(Arc::new(LogNotifier))
}
