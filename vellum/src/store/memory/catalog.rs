use super::collection::CollectionState;
use crate::errors::{CommandCode, StoreError, StoreResult};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use itertools::Itertools;
use std::sync::Arc;

type Namespace = (String, String);

/// Every collection held by one embedded store, keyed by (database, name).
///
/// A database exists as long as it holds at least one collection.
#[derive(Default)]
pub(crate) struct Catalog {
    collections: DashMap<Namespace, Arc<CollectionState>>,
}

impl Catalog {
    pub(crate) fn new() -> Self {
        Catalog {
            collections: DashMap::new(),
        }
    }

    pub(crate) fn get(&self, database: &str, name: &str) -> Option<Arc<CollectionState>> {
        self.collections
            .get(&namespace(database, name))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Creates a collection; exactly one of several racing callers succeeds.
    pub(crate) fn create(&self, database: &str, name: &str) -> StoreResult<Arc<CollectionState>> {
        match self.collections.entry(namespace(database, name)) {
            Entry::Occupied(_) => {
                log::debug!("Collection {}.{} already exists", database, name);
                Err(StoreError::command(
                    &format!("collection '{}.{}' already exists", database, name),
                    CommandCode::NamespaceExists,
                ))
            }
            Entry::Vacant(vacant) => {
                let state = Arc::new(CollectionState::new(database, name));
                vacant.insert(Arc::clone(&state));
                log::debug!("Created collection {}.{}", database, name);
                Ok(state)
            }
        }
    }

    /// Resolves a collection, creating it implicitly the way writes do.
    pub(crate) fn get_or_create(&self, database: &str, name: &str) -> Arc<CollectionState> {
        let entry = self
            .collections
            .entry(namespace(database, name))
            .or_insert_with(|| Arc::new(CollectionState::new(database, name)));
        Arc::clone(entry.value())
    }

    pub(crate) fn collection_names(&self, database: &str) -> Vec<String> {
        self.collections
            .iter()
            .filter(|entry| entry.key().0 == database)
            .map(|entry| entry.key().1.clone())
            .sorted()
            .collect()
    }

    pub(crate) fn database_names(&self) -> Vec<String> {
        self.collections
            .iter()
            .map(|entry| entry.key().0.clone())
            .unique()
            .sorted()
            .collect()
    }

    pub(crate) fn drop_collection(&self, database: &str, name: &str) -> bool {
        self.collections.remove(&namespace(database, name)).is_some()
    }

    pub(crate) fn drop_database(&self, database: &str) {
        self.collections.retain(|key, _| key.0 != database);
    }

    /// Removes every document whose TTL has elapsed at `now`.
    pub(crate) fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let states: Vec<Arc<CollectionState>> = self
            .collections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        states.iter().map(|state| state.purge_expired(now)).sum()
    }
}

fn namespace(database: &str, name: &str) -> Namespace {
    (database.to_string(), name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn create_conflicts_on_second_call() {
        let catalog = Catalog::new();
        assert!(catalog.create("db", "events").is_ok());

        let err = catalog.create("db", "events").err().unwrap();
        assert_eq!(err.code(), Some(CommandCode::NamespaceExists));
        assert!(err.is_namespace_conflict());
        assert_eq!(err.message(), "collection 'db.events' already exists");
    }

    #[test]
    fn racing_creates_have_one_winner() {
        let catalog = Arc::new(Catalog::new());
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let catalog = Arc::clone(&catalog);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    catalog.create("db", "events").is_ok()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|created| *created)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn names_are_grouped_by_database() {
        let catalog = Catalog::new();
        catalog.get_or_create("b", "two");
        catalog.get_or_create("b", "one");
        catalog.get_or_create("a", "three");

        assert_eq!(catalog.collection_names("b"), vec!["one", "two"]);
        assert_eq!(catalog.database_names(), vec!["a", "b"]);

        catalog.drop_database("b");
        assert!(catalog.collection_names("b").is_empty());
        assert!(catalog.drop_collection("a", "three"));
        assert!(!catalog.drop_collection("a", "three"));
        assert!(catalog.database_names().is_empty());
    }
}
