//! 필드 암호화 및 해시
//!
//! - 암호화: AES-CFB (키 길이 16/24/32 바이트에 따라 AES-128/192/256), IV는 키의 앞 16바이트
//! - 암호문 인코딩: base64 (standard, padding 포함)
//! - 해시: SHA-256 hex
//!
//! IV가 키에서 고정적으로 유도되므로 같은 평문은 항상 같은 암호문이 됩니다.
//! 기존에 저장된 암호문과의 호환을 위해 이 방식을 유지합니다.

use aes::{Aes128, Aes192, Aes256};
use base64::{engine::general_purpose, Engine as _};
use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

const IV_LEN: usize = 16;

#[derive(Debug, Clone, Copy)]
enum Direction {
    Encrypt,
    Decrypt,
}

/// base64로 인코딩된 AES 키 파싱
pub fn parse_aes_key(encoded: &str) -> Result<Vec<u8>> {
    let key = general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| Error::crypto(format!("aes key is not valid base64: {e}")))?;
    validate_key(&key)?;
    Ok(key)
}

/// 평문 문자열을 암호화하고 base64로 인코딩
pub fn encrypt_string(key: &[u8], plaintext: &str) -> Result<String> {
    let mut buf = plaintext.as_bytes().to_vec();
    apply_cfb(key, &mut buf, Direction::Encrypt)?;
    Ok(general_purpose::STANDARD.encode(buf))
}

/// base64 암호문을 복호화
pub fn decrypt_string(key: &[u8], ciphertext: &str) -> Result<String> {
    let mut buf = general_purpose::STANDARD
        .decode(ciphertext)
        .map_err(|e| Error::crypto(format!("ciphertext is not valid base64: {e}")))?;
    apply_cfb(key, &mut buf, Direction::Decrypt)?;
    String::from_utf8(buf).map_err(|e| Error::crypto(format!("decrypted value is not utf-8: {e}")))
}

/// SHA-256 hex 다이제스트
pub fn hash_string(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

fn validate_key(key: &[u8]) -> Result<()> {
    match key.len() {
        16 | 24 | 32 => Ok(()),
        other => Err(Error::crypto(format!(
            "aes key must be 16, 24 or 32 bytes, got {other}"
        ))),
    }
}

fn apply_cfb(key: &[u8], buf: &mut [u8], direction: Direction) -> Result<()> {
    validate_key(key)?;
    let iv = &key[..IV_LEN];
    let invalid = |e: cfb_mode::cipher::InvalidLength| Error::crypto(e.to_string());

    match (key.len(), direction) {
        (16, Direction::Encrypt) => cfb_mode::Encryptor::<Aes128>::new_from_slices(key, iv)
            .map_err(invalid)?
            .encrypt(buf),
        (16, Direction::Decrypt) => cfb_mode::Decryptor::<Aes128>::new_from_slices(key, iv)
            .map_err(invalid)?
            .decrypt(buf),
        (24, Direction::Encrypt) => cfb_mode::Encryptor::<Aes192>::new_from_slices(key, iv)
            .map_err(invalid)?
            .encrypt(buf),
        (24, Direction::Decrypt) => cfb_mode::Decryptor::<Aes192>::new_from_slices(key, iv)
            .map_err(invalid)?
            .decrypt(buf),
        (_, Direction::Encrypt) => cfb_mode::Encryptor::<Aes256>::new_from_slices(key, iv)
            .map_err(invalid)?
            .encrypt(buf),
        (_, Direction::Decrypt) => cfb_mode::Decryptor::<Aes256>::new_from_slices(key, iv)
            .map_err(invalid)?
            .decrypt(buf),
    }

    Ok(())
}
