//! At-rest secret encryption (§4.5.4, §6). Secret contents are serialized to
//! JSON and sealed with `scryptenc`'s self-describing file format: an
//! embedded scrypt salt and cost parameters, AES-256-CTR for the payload, and
//! an HMAC-SHA256 footer over the whole thing. Anything that ever held
//! plaintext is wrapped in [`Zeroizing`] so it's wiped on drop, including on
//! the early-return error paths above it.

use anyhow::{Context, Result};
use scryptenc::{Decryptor, Encryptor};
use zeroize::Zeroizing;

/// Seals `plaintext` under `password`. The result is opaque ciphertext safe
/// to hand to a [`StoreBackend`](meridian_store::backend::StoreBackend).
pub fn seal(plaintext: &[u8], password: &str) -> Result<Vec<u8>> {
    let cipher = Encryptor::new(plaintext, password).context("failed to initialize scrypt encryptor")?;
    Ok(cipher.encrypt_to_vec())
}

/// Opens `ciphertext` sealed by [`seal`] with the same password. Any
/// mismatch (wrong password, corrupted footer) fails the HMAC check inside
/// `scryptenc` and surfaces as an error rather than garbage plaintext.
pub fn open(ciphertext: &[u8], password: &str) -> Result<Zeroizing<Vec<u8>>> {
    let cipher = Decryptor::new(ciphertext, password).context("malformed secret ciphertext")?;
    let plaintext = cipher
        .decrypt_to_vec()
        .map_err(|err| anyhow::anyhow!("secret decryption failed: {err}"))?;
    Ok(Zeroizing::new(plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_under_the_same_password() {
        let sealed = seal(b"{\"password\":\"hunter2\"}", "server-password").unwrap();
        let opened = open(&sealed, "server-password").unwrap();
        assert_eq!(&opened[..], b"{\"password\":\"hunter2\"}");
    }

    #[test]
    fn refuses_to_open_under_the_wrong_password() {
        let sealed = seal(b"top secret", "correct-password").unwrap();
        assert!(open(&sealed, "wrong-password").is_err());
    }
}
