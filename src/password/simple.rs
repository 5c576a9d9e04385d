use super::record::PasswordHashRecord;
use super::salt::SaltGenerator;
use super::{digests_equal, PasswordHash};
use crate::error::{HashError, HashResult};
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Message digests usable for salted multi-round hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DigestAlgorithm {
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    pub const ALL: [Self; 6] = [
        Self::Md5,
        Self::Sha1,
        Self::Sha224,
        Self::Sha256,
        Self::Sha384,
        Self::Sha512,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Sha1 => "SHA-1",
            Self::Sha224 => "SHA-224",
            Self::Sha256 => "SHA-256",
            Self::Sha384 => "SHA-384",
            Self::Sha512 => "SHA-512",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.name() == name)
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Round 0 digests `salt || secret`; every later round digests the previous
/// output alone. `rounds` counts digest applications, so 1 means round 0 only.
fn digest_rounds<D: Digest>(salt: Option<&[u8]>, secret: &[u8], rounds: u32) -> Vec<u8> {
    let mut hasher = D::new();
    if let Some(salt) = salt {
        hasher.update(salt);
    }
    hasher.update(secret);
    let mut output = hasher.finalize();
    for _ in 1..rounds {
        output = D::digest(&output);
    }
    output.to_vec()
}

/// Digest a secret.
///
/// With no algorithm this is the legacy form: one unsalted MD5 pass, salt and
/// round count ignored.
pub fn digest(
    algorithm: Option<DigestAlgorithm>,
    salt: Option<&[u8]>,
    secret: &str,
    rounds: u32,
) -> Vec<u8> {
    let secret = secret.as_bytes();
    match algorithm {
        None => Md5::digest(secret).to_vec(),
        Some(DigestAlgorithm::Md5) => digest_rounds::<Md5>(salt, secret, rounds),
        Some(DigestAlgorithm::Sha1) => digest_rounds::<Sha1>(salt, secret, rounds),
        Some(DigestAlgorithm::Sha224) => digest_rounds::<Sha224>(salt, secret, rounds),
        Some(DigestAlgorithm::Sha256) => digest_rounds::<Sha256>(salt, secret, rounds),
        Some(DigestAlgorithm::Sha384) => digest_rounds::<Sha384>(salt, secret, rounds),
        Some(DigestAlgorithm::Sha512) => digest_rounds::<Sha512>(salt, secret, rounds),
    }
}

/// Salted multi-round message-digest hashing, plus legacy MD5 matching.
pub struct SimplePasswordHash {
    algorithm: DigestAlgorithm,
    rounds: u32,
    salts: Arc<SaltGenerator>,
}

impl SimplePasswordHash {
    pub fn new(algorithm: DigestAlgorithm, rounds: u32, salts: Arc<SaltGenerator>) -> Self {
        Self {
            algorithm,
            rounds,
            salts,
        }
    }

    pub fn rounds(&self) -> u32 {
        self.rounds
    }
}

impl PasswordHash for SimplePasswordHash {
    fn algorithm_name(&self) -> &str {
        self.algorithm.name()
    }

    fn hash(&self, secret: &str) -> HashResult<PasswordHashRecord> {
        let salt = self.salts.generate()?;
        self.hash_with_salt(secret, &salt)
    }

    fn hash_with_salt(&self, secret: &str, salt: &[u8]) -> HashResult<PasswordHashRecord> {
        let digest = digest(Some(self.algorithm), Some(salt), secret, self.rounds);
        Ok(PasswordHashRecord::new(
            Some(self.algorithm.name()),
            Some(salt.to_vec()),
            Some(digest),
        ))
    }

    fn matches(&self, secret: &str, record: &PasswordHashRecord) -> bool {
        let Some(stored) = record.digest() else {
            return false;
        };
        let algorithm = match record.algorithm() {
            None => None,
            Some(name) => match DigestAlgorithm::from_name(name) {
                Some(algorithm) => Some(algorithm),
                None => {
                    warn!(algorithm = name, "record uses a digest this hasher does not know");
                    return false;
                }
            },
        };
        let candidate = digest(algorithm, record.salt(), secret, self.rounds);
        digests_equal(&candidate, stored)
    }
}

impl SimplePasswordHash {
    pub(crate) fn check_algorithm(name: &str) -> HashResult<DigestAlgorithm> {
        DigestAlgorithm::from_name(name).ok_or_else(|| HashError::UnknownAlgorithm {
            algorithm: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher(algorithm: DigestAlgorithm, rounds: u32) -> SimplePasswordHash {
        SimplePasswordHash::new(algorithm, rounds, Arc::new(SaltGenerator::new().unwrap()))
    }

    // ========== Algorithm name tests ==========

    #[test]
    fn test_algorithm_names_round_trip() {
        for algorithm in DigestAlgorithm::ALL {
            assert_eq!(DigestAlgorithm::from_name(algorithm.name()), Some(algorithm));
        }
        assert_eq!(DigestAlgorithm::from_name("sha-512"), None);
        assert_eq!(DigestAlgorithm::from_name("MD2"), None);
    }

    // ========== Digest tests ==========

    #[test]
    fn test_legacy_digest_is_plain_md5() {
        let expected = hex::decode("5d41402abc4b2a76b9719d911017c592").unwrap();
        assert_eq!(digest(None, Some(b"ignored"), "hello", 1024), expected);
    }

    #[test]
    fn test_single_round_is_round_zero_only() {
        let salt = [3u8; 16];
        let mut hasher = Sha512::new();
        hasher.update(salt);
        hasher.update(b"secret");
        let round_zero = hasher.finalize().to_vec();
        assert_eq!(
            digest(Some(DigestAlgorithm::Sha512), Some(&salt), "secret", 1),
            round_zero
        );
    }

    #[test]
    fn test_extra_rounds_redigest_without_salt() {
        let salt = [3u8; 16];
        let one = digest(Some(DigestAlgorithm::Sha256), Some(&salt), "secret", 1);
        let two = digest(Some(DigestAlgorithm::Sha256), Some(&salt), "secret", 2);
        assert_eq!(two, Sha256::digest(&one).to_vec());
    }

    #[test]
    fn test_zero_rounds_behaves_like_one() {
        let salt = [5u8; 16];
        assert_eq!(
            digest(Some(DigestAlgorithm::Md5), Some(&salt), "x", 0),
            digest(Some(DigestAlgorithm::Md5), Some(&salt), "x", 1)
        );
    }

    #[test]
    fn test_digest_lengths() {
        let lengths = [16, 20, 28, 32, 48, 64];
        for (algorithm, length) in DigestAlgorithm::ALL.into_iter().zip(lengths) {
            assert_eq!(digest(Some(algorithm), None, "pw", 3).len(), length);
        }
    }

    // ========== Hash and match tests ==========

    #[test]
    fn test_hash_and_match() {
        let hasher = hasher(DigestAlgorithm::Sha512, 1024);
        let record = hasher.hash("I've got a secret.").unwrap();
        assert_eq!(record.algorithm(), Some("SHA-512"));
        assert_eq!(record.salt().map(<[u8]>::len), Some(16));
        assert!(hasher.matches("I've got a secret.", &record));
        assert!(!hasher.matches("random rubbish", &record));
    }

    #[test]
    fn test_rebuilt_record_matches() {
        let hasher = hasher(DigestAlgorithm::Sha512, 64);
        let original = hasher.hash("password").unwrap();
        let copy = PasswordHashRecord::new(
            original.algorithm(),
            original.salt().map(<[u8]>::to_vec),
            original.digest().map(<[u8]>::to_vec),
        );
        assert!(hasher.matches("password", &copy));
    }

    #[test]
    fn test_same_salt_same_digest() {
        let hasher = hasher(DigestAlgorithm::Sha256, 16);
        let salt = [42u8; 16];
        let a = hasher.hash_with_salt("secret", &salt).unwrap();
        let b = hasher.hash_with_salt("secret", &salt).unwrap();
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn test_fresh_salts_give_different_digests() {
        let hasher = hasher(DigestAlgorithm::Sha256, 16);
        let a = hasher.hash("secret").unwrap();
        let b = hasher.hash("secret").unwrap();
        assert_ne!(a.salt(), b.salt());
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn test_legacy_record_matches() {
        let hasher = hasher(DigestAlgorithm::Sha512, 1024);
        let secret = "Clark Kent is Superman";
        let record = PasswordHashRecord::new(None, None, Some(Md5::digest(secret).to_vec()));
        assert!(hasher.matches(secret, &record));
        assert!(!hasher.matches("Bruce Wayne is Batman", &record));
    }

    #[test]
    fn test_legacy_record_ignores_salt() {
        let hasher = hasher(DigestAlgorithm::Sha512, 1024);
        let record =
            PasswordHashRecord::new(None, Some(vec![1, 2, 3]), Some(Md5::digest("pw").to_vec()));
        assert!(hasher.matches("pw", &record));
    }

    #[test]
    fn test_record_without_digest_never_matches() {
        let hasher = hasher(DigestAlgorithm::Sha512, 1024);
        let record = PasswordHashRecord::new(None, None, None);
        assert!(!hasher.matches("", &record));
        assert!(!hasher.matches("not null", &record));
    }

    #[test]
    fn test_unknown_record_algorithm_does_not_match() {
        let hasher = hasher(DigestAlgorithm::Sha512, 1);
        let record = PasswordHashRecord::new(Some("ROT13"), None, Some(vec![0]));
        assert!(!hasher.matches("anything", &record));
    }

    #[test]
    fn test_check_algorithm() {
        assert_eq!(
            SimplePasswordHash::check_algorithm("SHA-1").unwrap(),
            DigestAlgorithm::Sha1
        );
        assert!(matches!(
            SimplePasswordHash::check_algorithm("WHIRLPOOL"),
            Err(HashError::UnknownAlgorithm { .. })
        ));
    }
}
