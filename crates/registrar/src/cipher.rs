//! Password obfuscation required by the identity provider's login form.
//!
//! The portal's login script encrypts `nonce || password` with AES-CBC, using
//! the page's `pwdEncryptSalt` value directly as the key. The IV it generates
//! is never sent, so the server only ever checks the tail of the plaintext.

use aes::cipher::{BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use base64::{Engine, engine::general_purpose::STANDARD};
use rand::{Rng, distr::Alphanumeric};

use registrar_common::RegistrarError;
use registrar_common::constants::CIPHER_NONCE_LEN;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes192CbcEnc = cbc::Encryptor<aes::Aes192>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;

const IV_LEN: usize = 16;

/// Encrypt `password` with `salt` as key material.
///
/// Returns base64 of the ciphertext. The salt must be 16, 24 or 32 bytes.
pub fn encrypt(password: &str, salt: &str) -> Result<String, RegistrarError> {
    let nonce = random_alphanumeric(CIPHER_NONCE_LEN);
    let iv = random_alphanumeric(IV_LEN);
    encrypt_with(password, salt, &nonce, iv.as_bytes())
}

fn encrypt_with(
    password: &str,
    salt: &str,
    nonce: &str,
    iv: &[u8],
) -> Result<String, RegistrarError> {
    let key = salt.as_bytes();
    let plaintext = format!("{}{}", nonce, password);
    let plaintext = plaintext.as_bytes();

    let ciphertext = match key.len() {
        16 => Aes128CbcEnc::new_from_slices(key, iv)
            .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(plaintext)),
        24 => Aes192CbcEnc::new_from_slices(key, iv)
            .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(plaintext)),
        32 => Aes256CbcEnc::new_from_slices(key, iv)
            .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(plaintext)),
        other => {
            return Err(RegistrarError::Encryption(format!(
                "salt length {} is not a valid AES key length",
                other
            )));
        }
    }
    .map_err(|e| RegistrarError::Encryption(e.to_string()))?;

    Ok(STANDARD.encode(ciphertext))
}

fn random_alphanumeric(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes::cipher::BlockDecryptMut;

    type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

    const SALT: &str = "rjBFAaHsNkKAhpoi";

    fn decrypt(ciphertext: &str, salt: &str, iv: &[u8]) -> Vec<u8> {
        let raw = STANDARD.decode(ciphertext).unwrap();
        Aes128CbcDec::new_from_slices(salt.as_bytes(), iv)
            .unwrap()
            .decrypt_padded_vec_mut::<Pkcs7>(&raw)
            .unwrap()
    }

    #[test]
    fn test_known_iv_decrypts_to_nonce_and_password() {
        let nonce = "N".repeat(CIPHER_NONCE_LEN);
        let iv = [7u8; IV_LEN];
        let ct = encrypt_with("s3cret!", SALT, &nonce, &iv).unwrap();

        let plain = decrypt(&ct, SALT, &iv);
        assert_eq!(plain, format!("{}s3cret!", nonce).into_bytes());
    }

    #[test]
    fn test_password_recoverable_without_iv() {
        // A wrong IV only garbles the first block, which lies inside the nonce
        let ct = encrypt("hunter2", SALT).unwrap();
        let plain = decrypt(&ct, SALT, &[0u8; IV_LEN]);

        assert_eq!(plain.len(), CIPHER_NONCE_LEN + "hunter2".len());
        assert!(plain.ends_with(b"hunter2"));
        assert!(plain[IV_LEN..CIPHER_NONCE_LEN].iter().all(u8::is_ascii_alphanumeric));
    }

    #[test]
    fn test_fresh_ciphertext_every_call() {
        let a = encrypt("same", SALT).unwrap();
        let b = encrypt("same", SALT).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_accepts_wider_keys() {
        assert!(encrypt("pw", &"k".repeat(24)).is_ok());
        assert!(encrypt("pw", &"k".repeat(32)).is_ok());
    }

    #[test]
    fn test_malformed_salt_rejected() {
        let too_long = "x".repeat(17);
        for salt in ["", "short", too_long.as_str()] {
            let err = encrypt("pw", salt).unwrap_err();
            assert!(matches!(err, RegistrarError::Encryption(_)), "salt {:?}", salt);
        }
    }
}
