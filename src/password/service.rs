use super::factory::{Pbkdf2PasswordHashFactory, PasswordHashFactory, SimplePasswordHashFactory};
use super::record::PasswordHashRecord;
use super::salt::SaltGenerator;
use super::PasswordHash;
use crate::config::PasswordConfig;
use crate::error::{HashError, HashResult};
use std::sync::Arc;
use tracing::debug;

/// Registry of hash factories.
///
/// New hashes come from the default factory; stored records are matched by
/// whichever factory claims their algorithm.
pub struct PasswordHashService {
    factories: Vec<Arc<dyn PasswordHashFactory>>,
    default: Arc<dyn PasswordHashFactory>,
}

impl PasswordHashService {
    /// Registers the simple digest and PBKDF2 factories, sharing one salt
    /// source, with the default chosen by `config.digest_algorithm`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownAlgorithm` if no factory claims the configured algorithm,
    /// or `Entropy` if the salt source cannot be seeded.
    pub fn new(config: &PasswordConfig) -> HashResult<Self> {
        let salts = Arc::new(SaltGenerator::new()?);
        Self::with_salts(config, salts)
    }

    /// Like [`new`](Self::new) with a caller-supplied salt source.
    ///
    /// # Errors
    ///
    /// Returns `UnknownAlgorithm` if no factory claims the configured algorithm.
    pub fn with_salts(config: &PasswordConfig, salts: Arc<SaltGenerator>) -> HashResult<Self> {
        let factories: Vec<Arc<dyn PasswordHashFactory>> = vec![
            Arc::new(SimplePasswordHashFactory::new(config, Arc::clone(&salts))),
            Arc::new(Pbkdf2PasswordHashFactory::new(config, salts)),
        ];
        let algorithm = config.digest_algorithm.as_str();
        let default = factories
            .iter()
            .find(|f| f.is_known_algorithm(Some(algorithm)))
            .cloned()
            .ok_or_else(|| HashError::UnknownAlgorithm {
                algorithm: algorithm.to_string(),
            })?;
        Ok(Self::with_factories(factories, default))
    }

    pub fn with_factories(
        factories: Vec<Arc<dyn PasswordHashFactory>>,
        default: Arc<dyn PasswordHashFactory>,
    ) -> Self {
        Self { factories, default }
    }

    fn factory_for(&self, algorithm: Option<&str>) -> HashResult<&Arc<dyn PasswordHashFactory>> {
        self.factories
            .iter()
            .find(|f| f.is_known_algorithm(algorithm))
            .ok_or_else(|| HashError::UnknownAlgorithm {
                algorithm: algorithm.unwrap_or_default().to_string(),
            })
    }

    /// A hasher for new secrets. `None` selects the configured default.
    ///
    /// # Errors
    ///
    /// Returns `UnknownAlgorithm` if no registered factory claims `algorithm`.
    pub fn hasher_for(&self, algorithm: Option<&str>) -> HashResult<Box<dyn PasswordHash>> {
        match algorithm {
            None => self.default.create(None),
            Some(name) => self.factory_for(Some(name))?.create(Some(name)),
        }
    }

    /// Hash a new secret with the default algorithm.
    ///
    /// # Errors
    ///
    /// Returns `Entropy` if a salt cannot be generated.
    pub fn hash(&self, secret: &str) -> HashResult<PasswordHashRecord> {
        let record = self.hasher_for(None)?.hash(secret)?;
        debug!(algorithm = ?record.algorithm(), "hashed new secret");
        Ok(record)
    }

    /// Package a precomputed hash, checking that its algorithm is registered.
    ///
    /// # Errors
    ///
    /// Returns `MissingAlgorithm` without an algorithm name and
    /// `UnknownAlgorithm` for a name no factory claims.
    pub fn record_for(
        &self,
        algorithm: Option<&str>,
        salt: Option<Vec<u8>>,
        digest: Option<Vec<u8>>,
    ) -> HashResult<PasswordHashRecord> {
        let algorithm = algorithm.ok_or(HashError::MissingAlgorithm)?;
        self.factory_for(Some(algorithm))?;
        Ok(PasswordHashRecord::new(Some(algorithm), salt, digest))
    }

    /// Compare a candidate secret with a stored record.
    ///
    /// # Errors
    ///
    /// Returns `UnknownAlgorithm` if the record names an unregistered algorithm.
    pub fn matches(&self, secret: &str, record: &PasswordHashRecord) -> HashResult<bool> {
        let factory = self.factory_for(record.algorithm())?;
        Ok(factory.create(record.algorithm())?.matches(secret, record))
    }
}
