use crate::client::CollectionAccessor;
use crate::common::{Document, Value, INDEX_NAME_KEY};
use crate::errors::{ErrorKind, StoreError, StoreResult};
use crate::store::{ascending_index_name, IndexModel, StoreCollection};
use std::time::Duration;

/// Maintains TTL indexes.
///
/// The store treats index options as immutable, so a changed expiry is
/// applied by dropping the field's index and creating it again. The last
/// caller wins.
#[derive(Clone)]
pub struct IndexManager {
    accessor: CollectionAccessor,
}

impl IndexManager {
    pub fn new(accessor: CollectionAccessor) -> Self {
        IndexManager { accessor }
    }

    /// Makes `field` the key of a TTL index expiring documents
    /// `expire_after` past the date the field holds.
    ///
    /// # Errors
    ///
    /// Any failure while listing, dropping or creating is reported as a
    /// `ConnectionError` with the underlying error as its cause. Dropping
    /// and creating are two steps, so a concurrent caller on the same field
    /// can make either step fail.
    pub fn ensure_ttl_index(
        &self,
        database: &str,
        collection: &str,
        field: &str,
        expire_after: Duration,
    ) -> StoreResult<()> {
        self.replace_ttl_index(database, collection, field, expire_after)
            .map_err(|e| {
                log::error!(
                    "Failed to create TTL index on {}.{}({}): {}",
                    database,
                    collection,
                    field,
                    e
                );
                StoreError::new_with_cause("Store connection down", ErrorKind::ConnectionError, e)
            })
    }

    fn replace_ttl_index(
        &self,
        database: &str,
        collection: &str,
        field: &str,
        expire_after: Duration,
    ) -> StoreResult<()> {
        let handle = self.accessor.ensure_collection(database, collection)?;
        drop_ttl_index(&handle, field)?;

        let name = handle.create_index(&IndexModel::ascending(field).expire_after(expire_after))?;
        log::debug!(
            "Created TTL index {} on {} expiring after {}s",
            name,
            handle.namespace(),
            expire_after.as_secs()
        );
        Ok(())
    }
}

fn drop_ttl_index(collection: &StoreCollection, field: &str) -> StoreResult<()> {
    let name = ascending_index_name(field);
    if has_index_named(&collection.list_indexes()?, &name) {
        log::debug!("Dropping the index {} for {}", name, collection.namespace());
        collection.drop_index(&name)?;
    }
    Ok(())
}

fn has_index_named(indexes: &[Document], name: &str) -> bool {
    indexes
        .iter()
        .any(|index| index.get(INDEX_NAME_KEY).and_then(Value::as_str) == Some(name))
}
