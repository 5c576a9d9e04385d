use super::record::PasswordHashRecord;
use super::salt::SaltGenerator;
use super::{digests_equal, PasswordHash};
use crate::error::HashResult;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha512;
use std::sync::Arc;

pub const PBKDF2_ALGORITHM: &str = "PBKDF2";

/// Derived key length in bytes.
pub const PBKDF2_KEY_BYTES: usize = 64;

/// PBKDF2-HMAC-SHA512 password hashing.
pub struct Pbkdf2PasswordHash {
    iterations: u32,
    salts: Arc<SaltGenerator>,
}

impl Pbkdf2PasswordHash {
    pub fn new(iterations: u32, salts: Arc<SaltGenerator>) -> Self {
        Self { iterations, salts }
    }

    fn derive(&self, secret: &str, salt: &[u8]) -> [u8; PBKDF2_KEY_BYTES] {
        let mut key = [0u8; PBKDF2_KEY_BYTES];
        pbkdf2_hmac::<Sha512>(secret.as_bytes(), salt, self.iterations, &mut key);
        key
    }
}

impl PasswordHash for Pbkdf2PasswordHash {
    fn algorithm_name(&self) -> &str {
        PBKDF2_ALGORITHM
    }

    fn hash(&self, secret: &str) -> HashResult<PasswordHashRecord> {
        let salt = self.salts.generate()?;
        self.hash_with_salt(secret, &salt)
    }

    fn hash_with_salt(&self, secret: &str, salt: &[u8]) -> HashResult<PasswordHashRecord> {
        let key = self.derive(secret, salt);
        Ok(PasswordHashRecord::new(
            Some(PBKDF2_ALGORITHM),
            Some(salt.to_vec()),
            Some(key.to_vec()),
        ))
    }

    fn matches(&self, secret: &str, record: &PasswordHashRecord) -> bool {
        if record.algorithm() != Some(PBKDF2_ALGORITHM) {
            return false;
        }
        let Some(stored) = record.digest() else {
            return false;
        };
        let key = self.derive(secret, record.salt().unwrap_or_default());
        digests_equal(&key, stored)
    }
}
