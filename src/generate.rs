use crate::error::Result;
use crate::parse::compose;
use crate::store::HandleStore;

/// Mints new handles under one prefix from the store's suffix sequence.
pub struct HandleMinter {
    prefix: String,
}

impl HandleMinter {
    /// Create a new minter for the given prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Get the prefix for this minter.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Format a handle for a given suffix.
    pub fn candidate(&self, suffix: u64) -> String {
        compose(&self.prefix, &suffix.to_string())
    }

    /// Allocate the next suffix from `store` and return the composed handle.
    ///
    /// Suffixes are never reused, even when the handle they produced was
    /// later unbound.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the suffix cannot be allocated.
    pub fn mint(&self, store: &dyn HandleStore) -> Result<String> {
        let suffix = store.next_suffix()?;
        Ok(self.candidate(suffix))
    }
}
