pub mod password_reset_token;

pub use password_reset_token::{NewResetToken, ResetToken, TokenState, TokenStatus};
