use super::kdf::{Pbkdf2PasswordHash, PBKDF2_ALGORITHM};
use super::salt::SaltGenerator;
use super::simple::{DigestAlgorithm, SimplePasswordHash};
use super::PasswordHash;
use crate::config::{PasswordConfig, DEFAULT_DIGEST_ALGORITHM};
use crate::error::{HashError, HashResult};
use std::sync::Arc;

/// Builds [`PasswordHash`] instances for the algorithms it claims.
pub trait PasswordHashFactory: Send + Sync {
    /// Does this factory understand `algorithm`? `None` is the legacy format.
    fn is_known_algorithm(&self, algorithm: Option<&str>) -> bool;

    /// A hasher for `algorithm`, or for the factory's default when `None`.
    fn create(&self, algorithm: Option<&str>) -> HashResult<Box<dyn PasswordHash>>;
}

pub struct SimplePasswordHashFactory {
    default_algorithm: String,
    rounds: u32,
    salts: Arc<SaltGenerator>,
}

impl SimplePasswordHashFactory {
    /// When the configured default is not a plain digest (e.g. `PBKDF2`), this
    /// factory falls back to [`DEFAULT_DIGEST_ALGORITHM`] so it can still
    /// build hashers for matching legacy records.
    pub fn new(config: &PasswordConfig, salts: Arc<SaltGenerator>) -> Self {
        let default_algorithm = if DigestAlgorithm::from_name(&config.digest_algorithm).is_some() {
            config.digest_algorithm.clone()
        } else {
            DEFAULT_DIGEST_ALGORITHM.to_string()
        };
        Self {
            default_algorithm,
            rounds: config.hash_rounds,
            salts,
        }
    }
}

impl PasswordHashFactory for SimplePasswordHashFactory {
    fn is_known_algorithm(&self, algorithm: Option<&str>) -> bool {
        match algorithm {
            None | Some("") => true,
            Some(name) => DigestAlgorithm::from_name(name).is_some(),
        }
    }

    fn create(&self, algorithm: Option<&str>) -> HashResult<Box<dyn PasswordHash>> {
        let name = algorithm
            .filter(|a| !a.is_empty())
            .unwrap_or(&self.default_algorithm);
        let algorithm = SimplePasswordHash::check_algorithm(name)?;
        Ok(Box::new(SimplePasswordHash::new(
            algorithm,
            self.rounds,
            Arc::clone(&self.salts),
        )))
    }
}

pub struct Pbkdf2PasswordHashFactory {
    iterations: u32,
    salts: Arc<SaltGenerator>,
}

impl Pbkdf2PasswordHashFactory {
    pub fn new(config: &PasswordConfig, salts: Arc<SaltGenerator>) -> Self {
        Self {
            iterations: config.pbkdf2_iterations,
            salts,
        }
    }
}

impl PasswordHashFactory for Pbkdf2PasswordHashFactory {
    fn is_known_algorithm(&self, algorithm: Option<&str>) -> bool {
        algorithm == Some(PBKDF2_ALGORITHM)
    }

    fn create(&self, algorithm: Option<&str>) -> HashResult<Box<dyn PasswordHash>> {
        match algorithm {
            None | Some(PBKDF2_ALGORITHM) => Ok(Box::new(Pbkdf2PasswordHash::new(
                self.iterations,
                Arc::clone(&self.salts),
            ))),
            Some(other) => Err(HashError::UnknownAlgorithm {
                algorithm: other.to_string(),
            }),
        }
    }
}
