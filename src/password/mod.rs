//! Salted, multi-round password hashing with pluggable algorithms.

pub mod factory;
pub mod kdf;
pub mod record;
pub mod salt;
pub mod service;
pub mod simple;

use crate::error::HashResult;
use record::PasswordHashRecord;
use subtle::ConstantTimeEq;

/// One hashing algorithm.
pub trait PasswordHash: Send + Sync {
    /// Name recorded with every hash this instance produces.
    fn algorithm_name(&self) -> &str;

    /// Hash a secret under a fresh salt.
    fn hash(&self, secret: &str) -> HashResult<PasswordHashRecord>;

    /// Hash a secret under a caller-supplied salt.
    fn hash_with_salt(&self, secret: &str, salt: &[u8]) -> HashResult<PasswordHashRecord>;

    /// Is `secret` the string whose hash `record` holds?
    fn matches(&self, secret: &str, record: &PasswordHashRecord) -> bool;
}

pub(crate) fn digests_equal(candidate: &[u8], stored: &[u8]) -> bool {
    candidate.ct_eq(stored).into()
}
