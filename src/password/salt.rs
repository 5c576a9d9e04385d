use crate::error::{HashError, HashResult};
use parking_lot::Mutex;
use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

pub const SALT_BYTES: usize = 128 / 8;

/// Fresh entropy drawn on every reseed.
pub const SEED_BYTES: usize = 64;

/// Generations between reseeds.
pub const RESEED_INTERVAL: u32 = 100;

struct SaltState {
    rng: StdRng,
    uses: u32,
    reseeds: u64,
}

/// Shared salt source.
///
/// Check-reseed-generate runs under one lock; callers only serialize on
/// salt generation, never on digesting.
pub struct SaltGenerator {
    state: Mutex<SaltState>,
}

impl SaltGenerator {
    /// Seed from the operating system.
    ///
    /// # Errors
    ///
    /// Returns `Entropy` if the operating system cannot supply a seed.
    pub fn new() -> HashResult<Self> {
        let rng = StdRng::from_rng(OsRng).map_err(|e| HashError::Entropy(e.to_string()))?;
        info!("initialized a salt random number stream from the operating system");
        Ok(Self::with_rng(rng))
    }

    /// Deterministic start; reseeds still mix in operating system entropy.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self::with_rng(StdRng::from_seed(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            state: Mutex::new(SaltState {
                rng,
                uses: 0,
                reseeds: 0,
            }),
        }
    }

    /// Sixteen fresh salt bytes.
    ///
    /// # Errors
    ///
    /// Returns `Entropy` if a due reseed cannot read operating system entropy.
    pub fn generate(&self) -> HashResult<[u8; SALT_BYTES]> {
        let mut state = self.state.lock();
        if state.uses >= RESEED_INTERVAL {
            debug!("re-seeding the salt generator");
            reseed(&mut state.rng)?;
            state.uses = 0;
            state.reseeds += 1;
        }
        state.uses += 1;
        let mut salt = [0u8; SALT_BYTES];
        state.rng.fill_bytes(&mut salt);
        Ok(salt)
    }

    pub fn reseed_count(&self) -> u64 {
        self.state.lock().reseeds
    }
}

/// Fold fresh OS entropy into the current stream.
fn reseed(rng: &mut StdRng) -> HashResult<()> {
    let mut entropy = [0u8; SEED_BYTES];
    OsRng
        .try_fill_bytes(&mut entropy)
        .map_err(|e| HashError::Entropy(e.to_string()))?;
    let mut carry = [0u8; 32];
    rng.fill_bytes(&mut carry);
    let seed: [u8; 32] = Sha256::new()
        .chain_update(entropy)
        .chain_update(carry)
        .finalize()
        .into();
    *rng = StdRng::from_seed(seed);
    Ok(())
}
