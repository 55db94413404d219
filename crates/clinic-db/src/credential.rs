//! Argon2id credential hashing.
//!
//! Stored form: `argon2id$<salt hex>$<hash hex>`.

use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;

use crate::DbError;

const MEMORY_COST_KIB: u32 = 8 * 1024;
const ITERATIONS: u32 = 2;
const PARALLELISM: u32 = 1;
const PREFIX: &str = "argon2id";

fn hasher() -> Result<Argon2<'static>, DbError> {
    let params = Params::new(MEMORY_COST_KIB, ITERATIONS, PARALLELISM, Some(32))
        .map_err(|e| DbError::Credential(format!("invalid Argon2id parameters: {e}")))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

fn derive(secret: &str, salt: &[u8]) -> Result<[u8; 32], DbError> {
    let mut output = [0u8; 32];
    hasher()?
        .hash_password_into(secret.as_bytes(), salt, &mut output)
        .map_err(|e| DbError::Credential(format!("Argon2id derivation failed: {e}")))?;
    Ok(output)
}

pub(crate) fn hash_credential(secret: &str) -> Result<String, DbError> {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    let hash = derive(secret, &salt)?;
    Ok(format!("{PREFIX}${}${}", hex::encode(salt), hex::encode(hash)))
}

/// Checks `secret` against a stored credential hash.
pub fn verify_credential(secret: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(PREFIX), Some(salt), Some(hash), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (hex::decode(salt), hex::decode(hash)) else {
        return false;
    };
    derive(secret, &salt).is_ok_and(|actual| actual.as_slice() == expected.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let stored = hash_credential("changeme").unwrap();
        assert!(stored.starts_with("argon2id$"));
        assert!(verify_credential("changeme", &stored));
        assert!(!verify_credential("wrong", &stored));
    }

    #[test]
    fn salts_differ_between_hashes() {
        assert_ne!(
            hash_credential("same").unwrap(),
            hash_credential("same").unwrap()
        );
    }

    #[test]
    fn malformed_hashes_never_verify() {
        assert!(!verify_credential("x", ""));
        assert!(!verify_credential("x", "argon2id$zz$00"));
        assert!(!verify_credential("x", "bcrypt$00$00"));
    }
}
