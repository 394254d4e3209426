use aes::Aes128;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use des::Des;

use crate::error::{Error, Result};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type DesCbcEnc = cbc::Encryptor<Des>;
type DesCbcDec = cbc::Decryptor<Des>;

/// The two ciphers a vault document may be encrypted under. Opening tries
/// `Current` first and falls back to `Legacy`; saving always writes
/// `Current`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CipherKind {
    /// AES-128-CBC with PKCS7 padding.
    Current,
    /// DES-CBC with PKCS7 padding, kept for documents written by old
    /// releases.
    Legacy,
}

/// Key (and IV) bytes derived from the password: UTF-8 bytes zero-padded or
/// truncated to the cipher's key size, with the key reused as the IV. An
/// inherited property of the file format; changing it would orphan every
/// existing vault, so any hardening has to arrive as a new `CipherKind`.
fn key_bytes<const N: usize>(password: &str) -> [u8; N] {
    let mut key = [0u8; N];
    let bytes = password.as_bytes();
    let len = bytes.len().min(N);
    key[..len].copy_from_slice(&bytes[..len]);
    key
}

/// Encrypt under the current cipher, returning base64 ciphertext. An empty
/// password is the explicit no-encryption mode: the plaintext passes through
/// unchanged.
pub fn encrypt(plaintext: &str, password: &str) -> String {
    encrypt_with(plaintext, password, CipherKind::Current)
}

/// Encrypt under an explicit cipher. Exposed so old-format documents can be
/// produced for migration tests and tooling.
pub fn encrypt_with(plaintext: &str, password: &str, cipher: CipherKind) -> String {
    if password.is_empty() {
        return plaintext.to_string();
    }
    let raw = match cipher {
        CipherKind::Current => {
            let key = key_bytes::<16>(password);
            Aes128CbcEnc::new(&key.into(), &key.into())
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes())
        }
        CipherKind::Legacy => {
            let key = key_bytes::<8>(password);
            DesCbcEnc::new(&key.into(), &key.into())
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes())
        }
    };
    STANDARD.encode(raw)
}

/// Exact inverse of [`encrypt_with`]. Invalid base64, a failed padding check
/// (wrong password or corrupted ciphertext), and non-UTF-8 plaintext all
/// surface as [`Error::Decryption`].
pub fn decrypt(ciphertext: &str, password: &str, cipher: CipherKind) -> Result<String> {
    if password.is_empty() {
        return Ok(ciphertext.to_string());
    }
    let raw = STANDARD
        .decode(ciphertext.trim())
        .map_err(|e| Error::Decryption(format!("ciphertext is not valid base64: {e}")))?;
    let plain = match cipher {
        CipherKind::Current => {
            let key = key_bytes::<16>(password);
            Aes128CbcDec::new(&key.into(), &key.into())
                .decrypt_padded_vec_mut::<Pkcs7>(&raw)
                .map_err(|_| Error::Decryption("wrong password or corrupted ciphertext".into()))?
        }
        CipherKind::Legacy => {
            let key = key_bytes::<8>(password);
            DesCbcDec::new(&key.into(), &key.into())
                .decrypt_padded_vec_mut::<Pkcs7>(&raw)
                .map_err(|_| Error::Decryption("wrong password or corrupted ciphertext".into()))?
        }
    };
    String::from_utf8(plain)
        .map_err(|_| Error::Decryption("decrypted payload is not valid UTF-8".into()))
}
