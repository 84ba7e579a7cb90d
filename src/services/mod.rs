pub mod janitor;
pub mod notifier;
pub mod password;
pub mod password_reset;
pub mod token_codec;

pub use notifier::{LogNotifier, Notifier, NotifyError};
pub use password_reset::{GenericAck, PasswordResetService, ResetPolicy};
pub use token_codec::TokenCodec;
