use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};

/// パスワードハッシュ処理のエラー
#[derive(Debug, thiserror::Error)]
#[error("パスワードハッシュ処理に失敗: {0}")]
pub struct PasswordHashError(argon2::password_hash::Error);

/// パスワードをargon2idでハッシュ化
pub fn hash_password(password: &str) -> Result<String, PasswordHashError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(PasswordHashError)?;
    Ok(hash.to_string())
}

/// パスワードを検証
///
/// ハッシュ形式が不正な場合はエラー、不一致は `Ok(false)`
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordHashError> {
    let parsed_hash = PasswordHash::new(hash).map_err(PasswordHashError)?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("NewPass123!").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("NewPass123!", &hash).unwrap());
        assert!(!verify_password("wrong-password", &hash).unwrap());
    }

    #[test]
    fn test_hash_is_salted() {
        let a = hash_password("same-password").unwrap();
        let b = hash_password("same-password").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_verify_password_logic() {
        // 無効なハッシュ形式でエラーハンドリングを確認
        let result = verify_password("password", "invalid_hash_format");
        assert!(result.is_err());
    }
}
