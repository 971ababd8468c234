// AES-256-CBC helpers for the credential store.
//
// Ciphertext layout: 16-byte random IV followed by PKCS7-padded blocks,
// the whole blob base64-encoded. The key lives next to the entries in
// the store document — the goal is at-rest obfuscation of the password
// in config backups, not protection against an attacker who owns the
// config directory.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::RngCore;

use crate::ConfigError;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const IV_LEN: usize = 16;

pub(crate) fn generate_key() -> [u8; 32] {
    let mut key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut key);
    key
}

pub(crate) fn encode_key(key: &[u8; 32]) -> String {
    BASE64.encode(key)
}

pub(crate) fn decode_key(encoded: &str) -> Result<[u8; 32], ConfigError> {
    let bytes = BASE64.decode(encoded)?;
    bytes
        .try_into()
        .map_err(|_| ConfigError::Crypto("stored key is not 32 bytes".into()))
}

pub(crate) fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> String {
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);

    let cipher = Aes256CbcEnc::new(key.into(), (&iv).into());
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut blob = Vec::with_capacity(IV_LEN + ciphertext.len());
    blob.extend_from_slice(&iv);
    blob.extend_from_slice(&ciphertext);
    BASE64.encode(blob)
}

pub(crate) fn decrypt(key: &[u8; 32], encoded: &str) -> Result<Vec<u8>, ConfigError> {
    let blob = BASE64.decode(encoded)?;
    if blob.len() < IV_LEN {
        return Err(ConfigError::Crypto("ciphertext shorter than IV".into()));
    }

    let (iv, ciphertext) = blob.split_at(IV_LEN);
    let cipher = Aes256CbcDec::new_from_slices(key, iv)
        .map_err(|e| ConfigError::Crypto(e.to_string()))?;

    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| ConfigError::Crypto("invalid padding (wrong key?)".into()))
}
