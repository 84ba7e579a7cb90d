use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use rand::rngs::OsRng;
use secrecy::SecretString;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// 128ビットのエントロピーを下回らないための最小バイト数
pub const MIN_TOKEN_BYTES: usize = 16;

/// 既定のトークン長（バイト）
pub const DEFAULT_TOKEN_BYTES: usize = 32;

/// 発行したトークン
///
/// 平文はメール本文のリンクに埋め込むためだけに返す。保存・ログ出力はしない
pub struct IssuedToken {
    pub plaintext: SecretString,
    pub token_hash: String,
}

/// リセットトークンの生成とハッシュ化
#[derive(Debug, Clone, Copy)]
pub struct TokenCodec {
    byte_length: usize,
}

impl Default for TokenCodec {
    fn default() -> Self {
        Self {
            byte_length: DEFAULT_TOKEN_BYTES,
        }
    }
}

impl TokenCodec {
    /// `byte_length` は `MIN_TOKEN_BYTES` 未満にならないよう切り上げる
    pub fn new(byte_length: usize) -> Self {
        Self {
            byte_length: byte_length.max(MIN_TOKEN_BYTES),
        }
    }

    pub fn byte_length(&self) -> usize {
        self.byte_length
    }

    /// OS の CSPRNG からトークンを生成し、Base64URL で符号化する
    ///
    /// エントロピー源の枯渇は OsRng 内で panic する（回復不能）
    pub fn generate(&self) -> IssuedToken {
        let mut bytes = vec![0u8; self.byte_length];
        OsRng.fill_bytes(&mut bytes);
        let plaintext = URL_SAFE_NO_PAD.encode(&bytes);
        let token_hash = Self::hash(&plaintext);

        IssuedToken {
            plaintext: SecretString::from(plaintext),
            token_hash,
        }
    }

    /// トークンを SHA256 でハッシュ化（小文字16進）
    pub fn hash(plaintext: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(plaintext.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// ハッシュ同士を定数時間で比較
pub fn hashes_match(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_generate_default_length() {
        let issued = TokenCodec::default().generate();
        // 32バイトを Base64URL（パディングなし）で符号化すると43文字
        assert_eq!(issued.plaintext.expose_secret().len(), 43);
        assert!(
            issued
                .plaintext
                .expose_secret()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_generate_hash_matches_plaintext() {
        let issued = TokenCodec::default().generate();
        assert_eq!(
            TokenCodec::hash(issued.plaintext.expose_secret()),
            issued.token_hash
        );
        // SHA256 = 64桁の16進
        assert_eq!(issued.token_hash.len(), 64);
    }

    #[test]
    fn test_generate_is_unique() {
        let codec = TokenCodec::default();
        let a = codec.generate();
        let b = codec.generate();
        assert_ne!(a.token_hash, b.token_hash);
    }

    #[test]
    fn test_short_length_is_raised_to_minimum() {
        let codec = TokenCodec::new(4);
        assert_eq!(codec.byte_length(), MIN_TOKEN_BYTES);
        // 16バイト = 22文字
        assert_eq!(codec.generate().plaintext.expose_secret().len(), 22);
    }

    #[test]
    fn test_hash_known_vector() {
        assert_eq!(
            TokenCodec::hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_hashes_match() {
        let h = TokenCodec::hash("token");
        assert!(hashes_match(&h, &TokenCodec::hash("token")));
        assert!(!hashes_match(&h, &TokenCodec::hash("other")));
        assert!(!hashes_match(&h, ""));
    }
}
