use crate::error::HashResult;
use serde::{Deserialize, Serialize};

/// A digested secret as stored alongside an account.
///
/// An absent algorithm marks a legacy record: unsalted single-pass MD5. Such
/// records are readable forever but never produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordHashRecord {
    algorithm: Option<String>,
    salt: Option<Vec<u8>>,
    digest: Option<Vec<u8>>,
}

impl PasswordHashRecord {
    /// Package an existing hash. An empty algorithm name is treated as absent.
    pub fn new(algorithm: Option<&str>, salt: Option<Vec<u8>>, digest: Option<Vec<u8>>) -> Self {
        Self {
            algorithm: algorithm.filter(|a| !a.is_empty()).map(ToString::to_string),
            salt,
            digest,
        }
    }

    /// Like [`PasswordHashRecord::new`] with hexadecimal salt and digest.
    ///
    /// # Errors
    ///
    /// Returns `InvalidHex` if either value is not valid hexadecimal.
    pub fn from_hex(
        algorithm: Option<&str>,
        salt: Option<&str>,
        digest: Option<&str>,
    ) -> HashResult<Self> {
        let salt = salt.map(hex::decode).transpose()?;
        let digest = digest.map(hex::decode).transpose()?;
        Ok(Self::new(algorithm, salt, digest))
    }

    pub fn algorithm(&self) -> Option<&str> {
        self.algorithm.as_deref()
    }

    pub fn salt(&self) -> Option<&[u8]> {
        self.salt.as_deref()
    }

    pub fn digest(&self) -> Option<&[u8]> {
        self.digest.as_deref()
    }

    pub fn salt_hex(&self) -> Option<String> {
        self.salt.as_ref().map(hex::encode)
    }

    pub fn digest_hex(&self) -> Option<String> {
        self.digest.as_ref().map(hex::encode)
    }

    pub fn is_legacy(&self) -> bool {
        self.algorithm.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HashError;

    #[test]
    fn test_null_inputs() {
        let record = PasswordHashRecord::new(None, None, None);
        assert_eq!(record.algorithm(), None);
        assert_eq!(record.salt(), None);
        assert_eq!(record.digest(), None);
        assert!(record.is_legacy());
    }

    #[test]
    fn test_empty_algorithm_is_legacy() {
        let record = PasswordHashRecord::new(Some(""), None, Some(vec![1, 2]));
        assert!(record.is_legacy());
    }

    #[test]
    fn test_from_hex() {
        let record =
            PasswordHashRecord::from_hex(Some("SHA-512"), Some("00ff"), Some("deadbeef")).unwrap();
        assert_eq!(record.algorithm(), Some("SHA-512"));
        assert_eq!(record.salt(), Some(&[0x00, 0xff][..]));
        assert_eq!(record.digest_hex().as_deref(), Some("deadbeef"));
        assert_eq!(record.salt_hex().as_deref(), Some("00ff"));
    }

    #[test]
    fn test_from_hex_null_strings() {
        let record = PasswordHashRecord::from_hex(None, None, None).unwrap();
        assert_eq!(record, PasswordHashRecord::new(None, None, None));
    }

    #[test]
    fn test_from_hex_rejects_bad_digits() {
        let result = PasswordHashRecord::from_hex(Some("MD5"), Some("xyz"), None);
        assert!(matches!(result, Err(HashError::InvalidHex(_))));
    }
}
