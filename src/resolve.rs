use crate::config::HandleConfig;
use crate::error::{HandleError, Result};
use crate::generate::HandleMinter;
use crate::parse::{is_valid_handle_format, HandleParser};
use crate::resource::{HandleTarget, ResourceRef};
use crate::store::{HandleRecord, HandleStore};
use crate::versions::preferred_handle;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};
use uuid::Uuid;

/// Mint, bind, unbind and resolve persistent identifiers.
///
/// Lookup misses are `Ok(None)`; integrity violations and infrastructure
/// failures are errors.
pub trait HandleResolver: Send + Sync {
    fn parser(&self) -> &HandleParser;

    fn config(&self) -> &HandleConfig;

    /// Mint a handle under the local prefix and bind it to `target`.
    fn mint_and_bind(&self, target: &mut dyn HandleTarget) -> Result<String>;

    /// Bind a caller-supplied handle to `target`.
    ///
    /// Binding a handle that is live on a different resource always fails with
    /// [`HandleError::AlreadyBound`]; `force` does not override it. A
    /// tombstoned handle may only be rebound to a resource of its previous type.
    fn bind_explicit(
        &self,
        target: &mut dyn HandleTarget,
        supplied: &str,
        force: bool,
    ) -> Result<String>;

    /// Clear the binding of every handle on `target`. Idempotent.
    fn unbind(&self, target: &mut dyn HandleTarget) -> Result<()>;

    /// Look up the resource bound to any accepted textual form of a handle.
    fn resolve(&self, identifier: &str) -> Result<Option<ResourceRef>>;

    fn resolve_to_url(&self, handle: &str) -> Result<Option<String>>;

    fn prefix(&self) -> &str {
        &self.config().prefix
    }

    fn canonical_prefix(&self) -> &str {
        &self.config().canonical_prefix
    }

    fn additional_prefixes(&self) -> &[String] {
        &self.config().additional_prefixes
    }

    fn parse_handle(&self, identifier: &str) -> Option<String> {
        self.parser().parse_handle(identifier)
    }

    fn canonical_form(&self, handle: &str) -> String {
        self.parser().canonical_form(handle)
    }

    /// The handle to cite for `target`: its first unversioned handle.
    fn find_handle(&self, target: &dyn HandleTarget) -> Option<String> {
        preferred_handle(target.handles()).map(ToString::to_string)
    }
}

/// Per-handle mutual exclusion. Different handles never contend.
#[derive(Debug, Default)]
pub(crate) struct HandleLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl HandleLocks {
    pub(crate) fn with_lock<T>(&self, handle: &str, f: impl FnOnce() -> T) -> T {
        let lock = {
            let mut locks = self.locks.lock();
            Arc::clone(locks.entry(handle.to_string()).or_default())
        };
        let result = {
            let _guard = lock.lock();
            f()
        };
        let mut locks = self.locks.lock();
        // Only the map and this call hold it: nobody else is waiting.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(handle);
        }
        result
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().len()
    }
}

fn attach(target: &mut dyn HandleTarget, handle: &str) {
    if !target.handles().iter().any(|h| h == handle) {
        target.handles_mut().push(handle.to_string());
    }
}

/// Resolver backed by a local [`HandleStore`].
pub struct LocalHandleResolver<S: HandleStore> {
    config: HandleConfig,
    parser: HandleParser,
    minter: HandleMinter,
    store: S,
    locks: HandleLocks,
}

impl<S: HandleStore> LocalHandleResolver<S> {
    pub fn new(config: HandleConfig, store: S) -> Self {
        Self {
            parser: HandleParser::new(&config),
            minter: HandleMinter::new(config.prefix.clone()),
            config,
            store,
            locks: HandleLocks::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Map a repository URL back to a known handle.
    ///
    /// Accepts `<ui.url>/handle/<handle>` and `<canonical prefix><handle>`.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the lookup fails.
    pub fn resolve_url_to_handle(&self, url: &str) -> Result<Option<String>> {
        let local_base = format!("{}/handle/", self.config.ui_url.trim_end_matches('/'));
        let candidate = url
            .strip_prefix(local_base.as_str())
            .or_else(|| url.strip_prefix(self.config.canonical_prefix.as_str()));
        let Some(candidate) = candidate else {
            return Ok(None);
        };
        let handle = candidate.trim_start_matches('/');
        Ok(self
            .store
            .find_by_handle(handle)?
            .map(|_| handle.to_string()))
    }

    /// Every stored handle under `prefix`, bound or tombstoned.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the lookup fails.
    pub fn handles_for_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .store
            .find_by_prefix(prefix)?
            .into_iter()
            .map(|r| r.handle)
            .collect())
    }

    /// Number of stored handles under `prefix`.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the store cannot count.
    pub fn count_by_prefix(&self, prefix: &str) -> Result<u64> {
        self.store.count_by_prefix(prefix)
    }

    pub fn count_total(&self) -> Result<u64> {
        self.store.count_total()
    }

    /// Move every handle from `old_prefix` to `new_prefix`.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the rewrite fails.
    pub fn update_prefix(&self, new_prefix: &str, old_prefix: &str) -> Result<usize> {
        let changed = self.store.update_prefix(new_prefix, old_prefix)?;
        debug!(old_prefix, new_prefix, changed, "rewrote handle prefix");
        Ok(changed)
    }

    /// Transfer an existing handle to `new_owner`.
    ///
    /// Returns the previous owner, if the handle was bound, so the caller can
    /// drop the handle from that object's list. Unknown handles are a no-op.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the record cannot be read or saved.
    pub fn modify_owner(
        &self,
        handle: &str,
        new_owner: &mut dyn HandleTarget,
    ) -> Result<Option<ResourceRef>> {
        let owner = new_owner.to_ref();
        let previous = self.locks.with_lock(handle, || -> Result<Option<Option<ResourceRef>>> {
            let Some(mut record) = self.store.find_by_handle(handle)? else {
                return Ok(None);
            };
            let previous = record.resource;
            record.bind(owner);
            self.store.save_record(&record)?;
            Ok(Some(previous))
        })?;
        let Some(previous) = previous else {
            return Ok(None);
        };
        new_owner.handles_mut().retain(|h| h != handle);
        new_owner.handles_mut().insert(0, handle.to_string());
        debug!(handle, owner = %owner.id, "transferred handle");
        Ok(previous)
    }

    pub(crate) fn find_record(&self, handle: &str) -> Result<Option<HandleRecord>> {
        self.store.find_by_handle(handle)
    }

    /// Tombstone `handle` if `target` owns it and drop it from the target's list.
    pub(crate) fn release(&self, target: &mut dyn HandleTarget, handle: &str) -> Result<()> {
        let id = target.id();
        self.locks.with_lock(handle, || -> Result<()> {
            if let Some(mut record) = self.store.find_by_handle(handle)? {
                if record.resource.is_some_and(|owner| owner.id == id) {
                    record.unbind();
                    self.store.save_record(&record)?;
                }
            }
            Ok(())
        })?;
        target.handles_mut().retain(|h| h != handle);
        debug!(
            handle,
            resource_type = %target.resource_type(),
            id = %id,
            "unbound handle"
        );
        Ok(())
    }

    /// Is `handle` currently bound to the resource with this id?
    pub(crate) fn is_bound_to(&self, handle: &str, id: Uuid) -> Result<bool> {
        Ok(self
            .store
            .find_by_handle(handle)?
            .and_then(|record| record.resource)
            .is_some_and(|owner| owner.id == id))
    }

    /// The repository page a handle resolves to.
    pub(crate) fn landing_url(&self, handle: &str) -> String {
        format!("{}/handle/{}", self.config.ui_url.trim_end_matches('/'), handle)
    }
}

impl<S: HandleStore> HandleResolver for LocalHandleResolver<S> {
    fn parser(&self) -> &HandleParser {
        &self.parser
    }

    fn config(&self) -> &HandleConfig {
        &self.config
    }

    fn mint_and_bind(&self, target: &mut dyn HandleTarget) -> Result<String> {
        let mut record = self.store.create_record()?;
        let handle = self.minter.mint(&self.store)?;
        record.handle.clone_from(&handle);
        record.bind(target.to_ref());
        self.store.save_record(&record)?;
        attach(target, &handle);

        debug!(
            resource_type = %target.resource_type(),
            id = %target.id(),
            handle = %handle,
            "created new handle"
        );
        Ok(handle)
    }

    fn bind_explicit(
        &self,
        target: &mut dyn HandleTarget,
        supplied: &str,
        force: bool,
    ) -> Result<String> {
        if !is_valid_handle_format(supplied) {
            return Err(HandleError::InvalidHandle {
                handle: supplied.to_string(),
            });
        }
        let requested = target.to_ref();

        self.locks.with_lock(supplied, || -> Result<()> {
            let mut record = match self.store.find_by_handle(supplied)? {
                Some(record) => {
                    if let Some(owner) = record.resource {
                        if owner.id == requested.id {
                            return Ok(());
                        }
                        return Err(HandleError::AlreadyBound {
                            handle: supplied.to_string(),
                        });
                    }
                    if let Some(previous) = record.resource_type {
                        if previous != requested.resource_type {
                            return Err(HandleError::TypeMismatch {
                                handle: supplied.to_string(),
                                previous,
                                requested: requested.resource_type,
                            });
                        }
                    }
                    record
                }
                None => {
                    let mut record = self.store.create_record()?;
                    record.handle = supplied.to_string();
                    record
                }
            };
            record.bind(requested);
            self.store.save_record(&record)
        })?;
        attach(target, supplied);

        debug!(
            resource_type = %requested.resource_type,
            id = %requested.id,
            handle = supplied,
            force,
            "bound supplied handle"
        );
        Ok(supplied.to_string())
    }

    fn unbind(&self, target: &mut dyn HandleTarget) -> Result<()> {
        let handles = target.handles().to_vec();
        if handles.is_empty() {
            trace!(
                resource_type = %target.resource_type(),
                id = %target.id(),
                "cannot find handle entry to unbind, handle could have been unbound before"
            );
            return Ok(());
        }

        for handle in handles {
            self.release(target, &handle)?;
        }
        Ok(())
    }

    fn resolve(&self, identifier: &str) -> Result<Option<ResourceRef>> {
        let Some(handle) = self.parser.parse_handle(identifier) else {
            return Ok(None);
        };
        Ok(self
            .store
            .find_by_handle(&handle)?
            .filter(HandleRecord::is_bound)
            .and_then(|record| record.resource))
    }

    fn resolve_to_url(&self, handle: &str) -> Result<Option<String>> {
        if self.store.find_by_handle(handle)?.is_none() {
            return Ok(None);
        }
        let url = self.landing_url(handle);
        debug!(handle, url = %url, "resolved handle to URL");
        Ok(Some(url))
    }
}
