//! Write-key derivation and color packing.
//!
//! Gateways only accept writes that prove possession of the developer
//! passphrase: the write payload must carry `key`, the AES-128-CBC
//! encryption of the gateway's current session token under the passphrase,
//! hex encoded. The IV is a fixed constant baked into the firmware.

use aes::cipher::{block_padding::NoPadding, BlockEncryptMut, KeyIvInit};
use thiserror::Error;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;

/// IV the gateway firmware uses for key verification. Not secret.
pub const GATEWAY_IV: [u8; 16] = [
    0x17, 0x99, 0x6d, 0x09, 0x3d, 0x28, 0xdd, 0xb3, 0xba, 0x69, 0x5a, 0x2e, 0x6f, 0x58, 0x56,
    0x2e,
];

/// Failures preparing a gateway write. Display strings are published in
/// status envelopes, so they name the faulty field, never secret material.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CipherError {
    #[error("gateway passphrase must be 16 bytes, got {0}")]
    InvalidPassphrase(usize),

    #[error("rgb value `{0}` is not an 8 digit hex word")]
    MalformedColorWord(String),
}

/// Encrypt the session token under the developer passphrase and return the
/// lowercase hex `key` the gateway expects.
///
/// Only the token's complete 16-byte blocks are encrypted; a trailing
/// partial block is dropped, matching the gateway tooling's cipher-stream
/// semantics. Tokens are 16 ASCII characters in practice, so this is exact
/// for real traffic and merely deterministic for malformed tokens.
pub fn derive_key(token: &str, passphrase: &str) -> Result<String, CipherError> {
    let key: [u8; 16] = passphrase
        .as_bytes()
        .try_into()
        .map_err(|_| CipherError::InvalidPassphrase(passphrase.len()))?;

    let bytes = token.as_bytes();
    let whole = bytes.len() - bytes.len() % 16;
    let cipher = Aes128CbcEnc::new(&key.into(), &GATEWAY_IV.into());
    let ciphertext = cipher.encrypt_padded_vec_mut::<NoPadding>(&bytes[..whole]);
    Ok(hex::encode(ciphertext))
}

/// Pack an 8-hex-digit color word into the u32 the gateway expects: the
/// four 2-digit fields (brightness, red, green, blue) in big-endian order,
/// which is exactly the word read as one hex number. Mixed case accepted.
pub fn pack_color(word: &str) -> Result<u32, CipherError> {
    if word.len() != 8 || !word.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(CipherError::MalformedColorWord(word.to_string()));
    }
    u32::from_str_radix(word, 16).map_err(|_| CipherError::MalformedColorWord(word.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PASSPHRASE: &str = "0987654321qwerty";

    #[test]
    fn test_derive_key_single_block() {
        let key = derive_key("1234567890abcdef", PASSPHRASE).unwrap();
        assert_eq!(key, "3eb43e37c20aff4c5872cc0d04d81314");
    }

    #[test]
    fn test_derive_key_chains_blocks() {
        // Two identical plaintext blocks encrypt differently under CBC.
        let key = derive_key("1234567890abcdef1234567890abcdef", PASSPHRASE).unwrap();
        assert_eq!(
            key,
            "3eb43e37c20aff4c5872cc0d04d81314a789da9fc2deec59cee9128fa8053945"
        );
    }

    #[test]
    fn test_derive_key_drops_partial_block() {
        let full = derive_key("1234567890abcdef", PASSPHRASE).unwrap();
        let extra = derive_key("1234567890abcdefXY", PASSPHRASE).unwrap();
        assert_eq!(full, extra);
    }

    #[test]
    fn test_derive_key_short_token_is_empty() {
        assert_eq!(derive_key("abc", PASSPHRASE).unwrap(), "");
    }

    #[test]
    fn test_derive_key_rejects_wrong_passphrase_length() {
        // One byte off in either direction is still rejected.
        let err = derive_key("1234567890abcdef", "0987654321qwert").unwrap_err();
        assert_eq!(err, CipherError::InvalidPassphrase(15));
        let err = derive_key("1234567890abcdef", "0987654321qwertyu").unwrap_err();
        assert_eq!(err, CipherError::InvalidPassphrase(17));
        assert!(err.to_string().contains("16 bytes"));
    }

    #[test]
    fn test_pack_color() {
        assert_eq!(pack_color("ff0a140a").unwrap(), 0xff0a140a);
        assert_eq!(pack_color("00000000").unwrap(), 0);
    }

    #[test]
    fn test_pack_color_accepts_upper_case() {
        assert_eq!(pack_color("FF0A140A").unwrap(), 0xff0a140a);
    }

    #[test]
    fn test_pack_color_rejects_wrong_length() {
        assert!(pack_color("ff0a140").is_err());
        assert!(pack_color("ff0a140a0").is_err());
        assert!(pack_color("").is_err());
    }

    #[test]
    fn test_pack_color_rejects_non_hex() {
        let err = pack_color("gg0a140a").unwrap_err();
        assert_eq!(
            err.to_string(),
            "rgb value `gg0a140a` is not an 8 digit hex word"
        );
    }
}
