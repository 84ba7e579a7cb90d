use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

/// 通知送信のエラー
///
/// 通知側でログ出力し、リセット処理の結果には影響させない
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("メールアドレスが不正です")]
    InvalidAddress,

    #[error("メッセージ構築エラー: {0}")]
    Message(String),

    #[error("送信エラー: {0}")]
    Transport(String),
}

/// リセットリンクの送信先
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, email: &str, token: &SecretString) -> Result<(), NotifyError>;
}

/// リセットURLを構築
pub fn build_reset_url(base: &str, token: &SecretString) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{}{}token={}", base, separator, token.expose_secret())
}

/// ログ出力のみの通知（開発環境）
///
/// 宛先のみ記録し、トークンやURLは出力しない
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, email: &str, _token: &SecretString) -> Result<(), NotifyError> {
        tracing::info!(to = %email, "パスワードリセットメール送信（開発モード、送信省略）");
        Ok(())
    }
}

#[cfg(feature = "email")]
pub use smtp::{SmtpNotifier, SmtpSettings};

#[cfg(feature = "email")]
mod smtp {
    use async_trait::async_trait;
    use lettre::message::header::ContentType;
    use lettre::message::Mailbox;
    use lettre::transport::smtp::authentication::Credentials;
    use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
    use secrecy::SecretString;

    use super::{Notifier, NotifyError, build_reset_url};

    /// SMTP 接続設定
    pub struct SmtpSettings {
        pub host: String,
        pub port: u16,
        pub username: String,
        pub password: String,
        pub from_address: String,
        pub reset_url_base: String,
    }

    /// lettre による SMTP 送信
    #[derive(Clone)]
    pub struct SmtpNotifier {
        mailer: AsyncSmtpTransport<Tokio1Executor>,
        from: Mailbox,
        reset_url_base: String,
    }

    impl SmtpNotifier {
        pub fn new(settings: SmtpSettings) -> Result<Self, NotifyError> {
            let from = settings
                .from_address
                .parse::<Mailbox>()
                .map_err(|_| NotifyError::InvalidAddress)?;

            let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
                .map_err(|e| NotifyError::Transport(e.to_string()))?
                .port(settings.port)
                .credentials(Credentials::new(settings.username, settings.password))
                .build();

            Ok(Self {
                mailer,
                from,
                reset_url_base: settings.reset_url_base,
            })
        }
    }

    #[async_trait]
    impl Notifier for SmtpNotifier {
        async fn send(&self, email: &str, token: &SecretString) -> Result<(), NotifyError> {
            let to = email
                .parse::<Mailbox>()
                .map_err(|_| NotifyError::InvalidAddress)?;
            let reset_url = build_reset_url(&self.reset_url_base, token);

            let message = Message::builder()
                .from(self.from.clone())
                .to(to)
                .subject("パスワードリセットのご案内")
                .header(ContentType::TEXT_PLAIN)
                .body(format!(
                    "以下のリンクからパスワードを再設定してください（有効期限あり、1回限り）。\n\n{}\n\n\
                     心当たりがない場合はこのメールを破棄してください。\n",
                    reset_url
                ))
                .map_err(|e| NotifyError::Message(e.to_string()))?;

            self.mailer.send(message).await.map_err(|e| {
                tracing::error!(error = %e, to = %email, "SMTP送信エラー");
                NotifyError::Transport(e.to_string())
            })?;

            tracing::info!(to = %email, "パスワードリセットメール送信完了");
            Ok(())
        }
    }
}
