//! `biz_content` encryption.
//!
//! AES-CBC with PKCS#7 padding and an all-zero IV, as the gateway expects.
//! The key is configured as base64 text; 16, 24 and 32 byte keys select
//! AES-128, AES-192 and AES-256.

use std::fmt;

use aes::cipher::{
    block_padding::Pkcs7, BlockCipher, BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit,
};
use aes::{Aes128, Aes192, Aes256};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::error::{GatewayError, GatewayResult};
use crate::types::EncryptType;

const ZERO_IV: [u8; 16] = [0u8; 16];

/// Symmetric cipher for the `biz_content` field.
#[derive(Clone)]
pub struct ContentCipher {
    encrypt_type: EncryptType,
    key: Vec<u8>,
}

impl fmt::Debug for ContentCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentCipher")
            .field("encrypt_type", &self.encrypt_type)
            .field("key_bits", &(self.key.len() * 8))
            .finish()
    }
}

impl ContentCipher {
    /// Build an AES cipher from a base64 key.
    pub fn new(key_b64: &str) -> GatewayResult<Self> {
        Self::from_settings(Some(EncryptType::Aes), Some(key_b64))
    }

    /// Build a cipher from the configured type and key.
    ///
    /// Both must be present; anything else is a local validation failure.
    pub fn from_settings(
        encrypt_type: Option<EncryptType>,
        key_b64: Option<&str>,
    ) -> GatewayResult<Self> {
        let encrypt_type = encrypt_type.ok_or_else(|| GatewayError::Validation {
            message: "encrypt type is not configured".to_string(),
        })?;

        let key_b64 = key_b64.map(str::trim).unwrap_or_default();
        if key_b64.is_empty() {
            return Err(GatewayError::Validation {
                message: "encrypt key is empty".to_string(),
            });
        }

        let key = BASE64.decode(key_b64).map_err(|e| GatewayError::Validation {
            message: format!("encrypt key is not valid base64: {}", e),
        })?;
        if !matches!(key.len(), 16 | 24 | 32) {
            return Err(GatewayError::Validation {
                message: format!(
                    "encrypt key must be 16, 24 or 32 bytes, got {}",
                    key.len()
                ),
            });
        }

        Ok(Self { encrypt_type, key })
    }

    pub fn encrypt_type(&self) -> EncryptType {
        self.encrypt_type
    }

    /// Encrypt `plaintext` and return base64 ciphertext.
    pub fn encrypt(&self, plaintext: &str) -> GatewayResult<String> {
        if plaintext.trim().is_empty() {
            return Err(GatewayError::Validation {
                message: "plaintext to encrypt is empty".to_string(),
            });
        }

        let bytes = plaintext.as_bytes();
        let ciphertext = match self.key.len() {
            16 => encrypt_cbc::<Aes128>(&self.key, bytes),
            24 => encrypt_cbc::<Aes192>(&self.key, bytes),
            _ => encrypt_cbc::<Aes256>(&self.key, bytes),
        }?;

        Ok(BASE64.encode(ciphertext))
    }

    /// Decrypt base64 ciphertext into UTF-8 text.
    pub fn decrypt(&self, ciphertext_b64: &str) -> GatewayResult<String> {
        let ciphertext_b64 = ciphertext_b64.trim();
        if ciphertext_b64.is_empty() {
            return Err(GatewayError::Validation {
                message: "ciphertext to decrypt is empty".to_string(),
            });
        }

        let ciphertext = BASE64
            .decode(ciphertext_b64)
            .map_err(|e| GatewayError::Encryption {
                message: format!("ciphertext is not valid base64: {}", e),
            })?;

        let plaintext = match self.key.len() {
            16 => decrypt_cbc::<Aes128>(&self.key, &ciphertext),
            24 => decrypt_cbc::<Aes192>(&self.key, &ciphertext),
            _ => decrypt_cbc::<Aes256>(&self.key, &ciphertext),
        }?;

        String::from_utf8(plaintext).map_err(|_| GatewayError::Encryption {
            message: "decrypted content is not UTF-8".to_string(),
        })
    }
}

fn encrypt_cbc<C>(key: &[u8], plaintext: &[u8]) -> GatewayResult<Vec<u8>>
where
    C: BlockEncryptMut + BlockCipher + KeyInit,
{
    let encryptor =
        cbc::Encryptor::<C>::new_from_slices(key, &ZERO_IV).map_err(|e| GatewayError::Encryption {
            message: e.to_string(),
        })?;
    Ok(encryptor.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

fn decrypt_cbc<C>(key: &[u8], ciphertext: &[u8]) -> GatewayResult<Vec<u8>>
where
    C: BlockDecryptMut + BlockCipher + KeyInit,
{
    let decryptor =
        cbc::Decryptor::<C>::new_from_slices(key, &ZERO_IV).map_err(|e| GatewayError::Encryption {
            message: e.to_string(),
        })?;
    decryptor
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| GatewayError::Encryption {
            message: "invalid ciphertext or padding".to_string(),
        })
}
