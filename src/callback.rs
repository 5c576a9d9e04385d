use arc_swap::ArcSwap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

/// Asked once per identifier provider during assignment.
pub trait IdentifierServiceCallback: Send + Sync {
    /// Should `provider` register an identifier for the current object?
    fn register_p(&self, provider: &str) -> bool;
}

/// Which identifier providers each collection wants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderRules {
    per_collection: HashMap<Uuid, HashSet<String>>,
    default: Option<HashSet<String>>,
}

impl ProviderRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict `collection` to exactly `providers`. An empty list wants nothing.
    pub fn collection<I, S>(mut self, collection: Uuid, providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.per_collection
            .insert(collection, providers.into_iter().map(Into::into).collect());
        self
    }

    /// Providers wanted by collections that have no list of their own.
    pub fn default_providers<I, S>(mut self, providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default = Some(providers.into_iter().map(Into::into).collect());
        self
    }

    /// First match wins: the collection's own list, then the default list,
    /// then everything.
    pub fn wanted(&self, collection: Uuid, provider: &str) -> bool {
        self.per_collection
            .get(&collection)
            .or(self.default.as_ref())
            .is_none_or(|allowed| allowed.contains(provider))
    }
}

/// Shared, replaceable provider rules.
///
/// Readers take a snapshot; [`replace`](Self::replace) swaps the whole rule set
/// at once so no reader sees a half-updated mapping.
#[derive(Debug, Default)]
pub struct ProviderSelection {
    rules: ArcSwap<ProviderRules>,
}

impl ProviderSelection {
    pub fn new(rules: ProviderRules) -> Self {
        Self {
            rules: ArcSwap::from_pointee(rules),
        }
    }

    /// The rule set current at the time of the call.
    pub fn snapshot(&self) -> Arc<ProviderRules> {
        self.rules.load_full()
    }

    pub fn replace(&self, rules: ProviderRules) {
        self.rules.store(Arc::new(rules));
    }

    pub fn wanted(&self, collection: Uuid, provider: &str) -> bool {
        self.rules.load().wanted(collection, provider)
    }

    /// A callback for items being installed into `collection`.
    pub fn for_collection(self: &Arc<Self>, collection: Uuid) -> CollectionCallback {
        CollectionCallback {
            selection: Arc::clone(self),
            collection,
        }
    }
}

/// Callback bound to one collection. Every call consults the current rules.
#[derive(Debug, Clone)]
pub struct CollectionCallback {
    selection: Arc<ProviderSelection>,
    collection: Uuid,
}

impl CollectionCallback {
    pub fn collection(&self) -> Uuid {
        self.collection
    }
}

impl IdentifierServiceCallback for CollectionCallback {
    fn register_p(&self, provider: &str) -> bool {
        self.selection.wanted(self.collection, provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HANDLE: &str = "handle";
    const DOI: &str = "doi";

    // ========== Precedence tests ==========

    #[test]
    fn test_no_rules_wants_everything() {
        let rules = ProviderRules::new();
        assert!(rules.wanted(Uuid::new_v4(), HANDLE));
        assert!(rules.wanted(Uuid::new_v4(), DOI));
    }

    #[test]
    fn test_collection_list_beats_default() {
        let theses = Uuid::new_v4();
        let rules = ProviderRules::new()
            .collection(theses, [HANDLE])
            .default_providers([DOI]);
        assert!(rules.wanted(theses, HANDLE));
        assert!(!rules.wanted(theses, DOI));
    }

    #[test]
    fn test_default_applies_without_collection_list() {
        let theses = Uuid::new_v4();
        let rules = ProviderRules::new()
            .collection(theses, [HANDLE])
            .default_providers([DOI]);
        let other = Uuid::new_v4();
        assert!(rules.wanted(other, DOI));
        assert!(!rules.wanted(other, HANDLE));
    }

    #[test]
    fn test_collection_list_without_default() {
        let theses = Uuid::new_v4();
        let rules = ProviderRules::new().collection(theses, [DOI]);
        assert!(!rules.wanted(theses, HANDLE));
        assert!(rules.wanted(Uuid::new_v4(), HANDLE));
    }

    #[test]
    fn test_empty_collection_list_wants_nothing() {
        let theses = Uuid::new_v4();
        let rules = ProviderRules::new().collection(theses, Vec::<String>::new());
        assert!(!rules.wanted(theses, HANDLE));
    }

    // ========== Callback tests ==========

    #[test]
    fn test_callback_sees_replaced_rules() {
        let theses = Uuid::new_v4();
        let selection = Arc::new(ProviderSelection::default());
        let callback = selection.for_collection(theses);
        assert!(callback.register_p(DOI));

        selection.replace(ProviderRules::new().collection(theses, [HANDLE]));
        assert!(!callback.register_p(DOI));
        assert!(callback.register_p(HANDLE));
    }

    #[test]
    fn test_snapshot_is_unaffected_by_replace() {
        let theses = Uuid::new_v4();
        let selection = ProviderSelection::new(ProviderRules::new().default_providers([HANDLE]));
        let before = selection.snapshot();
        selection.replace(ProviderRules::new());
        assert!(!before.wanted(theses, DOI));
        assert!(selection.wanted(theses, DOI));
    }

    #[test]
    fn test_concurrent_readers_see_whole_rule_sets() {
        let theses = Uuid::new_v4();
        let only_handle = ProviderRules::new().collection(theses, [HANDLE]);
        let only_doi = ProviderRules::new().collection(theses, [DOI]);
        let selection = Arc::new(ProviderSelection::new(only_handle.clone()));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let selection = Arc::clone(&selection);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        let rules = selection.snapshot();
                        assert_ne!(rules.wanted(theses, HANDLE), rules.wanted(theses, DOI));
                    }
                })
            })
            .collect();
        for i in 0..200 {
            let next = if i % 2 == 0 { &only_doi } else { &only_handle };
            selection.replace(next.clone());
        }
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
