//! Storage for denormalized read models.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::Identifier;
use event_store::Version;
use tokio::sync::RwLock;

use crate::Result;

/// A denormalized row kept by a projection, one per aggregate.
pub trait ReadModel: Clone + Send + Sync + 'static {
    fn id(&self) -> &Identifier;

    /// Version of the last event projected into this row.
    fn last_version(&self) -> Version;

    fn set_last_version(&mut self, version: Version);

    /// A tombstone keeps the last version of a deleted aggregate so that
    /// redelivered events cannot bring the row back. Tombstones are hidden
    /// from `get`, `count` and `list`.
    fn is_tombstone(&self) -> bool {
        false
    }
}

/// Query-side storage for one kind of read model.
#[async_trait]
pub trait QueryStore<T: ReadModel>: Send + Sync {
    async fn get(&self, id: &Identifier) -> Result<Option<T>>;

    /// Like `get`, but also returns tombstones.
    async fn get_any(&self, id: &Identifier) -> Result<Option<T>>;

    /// Inserts the row unless one with the same id exists, tombstones
    /// included. Returns true if inserted.
    async fn create(&self, row: T) -> Result<bool>;

    async fn upsert(&self, row: T) -> Result<()>;

    /// Applies `change` to the row with the given id. Returns false if there is no such row.
    async fn update<F>(&self, id: &Identifier, change: F) -> Result<bool>
    where
        F: FnOnce(&mut T) + Send + 'static;

    /// Removes the row. Returns false if there was no such row.
    async fn remove(&self, id: &Identifier) -> Result<bool>;

    async fn count(&self) -> Result<usize>;

    async fn list(&self) -> Result<Vec<T>>;

    /// Removes every row. Intended for tests and rebuilds.
    async fn destroy_all(&self) -> Result<()>;
}

/// In-memory query store.
#[derive(Clone)]
pub struct InMemoryQueryStore<T> {
    rows: Arc<RwLock<HashMap<Identifier, T>>>,
}

impl<T> Default for InMemoryQueryStore<T> {
    fn default() -> Self {
        Self {
            rows: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<T: ReadModel> InMemoryQueryStore<T> {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl<T: ReadModel> QueryStore<T> for InMemoryQueryStore<T> {
    async fn get(&self, id: &Identifier) -> Result<Option<T>> {
        Ok(self
            .rows
            .read()
            .await
            .get(id)
            .filter(|row| !row.is_tombstone())
            .cloned())
    }

    async fn get_any(&self, id: &Identifier) -> Result<Option<T>> {
        Ok(self.rows.read().await.get(id).cloned())
    }

    async fn create(&self, row: T) -> Result<bool> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(row.id()) {
            return Ok(false);
        }
        rows.insert(row.id().clone(), row);
        Ok(true)
    }

    async fn upsert(&self, row: T) -> Result<()> {
        self.rows.write().await.insert(row.id().clone(), row);
        Ok(())
    }

    async fn update<F>(&self, id: &Identifier, change: F) -> Result<bool>
    where
        F: FnOnce(&mut T) + Send + 'static,
    {
        match self.rows.write().await.get_mut(id) {
            Some(row) => {
                change(row);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove(&self, id: &Identifier) -> Result<bool> {
        Ok(self.rows.write().await.remove(id).is_some())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|row| !row.is_tombstone())
            .count())
    }

    async fn list(&self) -> Result<Vec<T>> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|row| !row.is_tombstone())
            .cloned()
            .collect())
    }

    async fn destroy_all(&self) -> Result<()> {
        self.rows.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: Identifier,
        name: String,
        version: Version,
        deleted: bool,
    }

    impl ReadModel for Row {
        fn id(&self) -> &Identifier {
            &self.id
        }

        fn last_version(&self) -> Version {
            self.version
        }

        fn set_last_version(&mut self, version: Version) {
            self.version = version;
        }

        fn is_tombstone(&self) -> bool {
            self.deleted
        }
    }

    fn row(id: &str, name: &str) -> Row {
        Row {
            id: Identifier::parse(id).unwrap(),
            name: name.to_string(),
            version: Version::first(),
            deleted: false,
        }
    }

    #[tokio::test]
    async fn create_does_not_overwrite() {
        let store = InMemoryQueryStore::new();
        assert!(store.create(row("r_1", "first")).await.unwrap());
        assert!(!store.create(row("r_1", "second")).await.unwrap());

        let stored = store.get(&Identifier::parse("r_1").unwrap()).await.unwrap();
        assert_eq!(stored.unwrap().name, "first");
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn update_changes_existing_rows_only() {
        let store = InMemoryQueryStore::new();
        store.upsert(row("r_1", "first")).await.unwrap();

        let id = Identifier::parse("r_1").unwrap();
        assert!(
            store
                .update(&id, |r: &mut Row| r.name = "changed".to_string())
                .await
                .unwrap()
        );
        assert!(
            !store
                .update(&Identifier::parse("r_2").unwrap(), |r: &mut Row| r
                    .name
                    .clear())
                .await
                .unwrap()
        );
        assert_eq!(store.get(&id).await.unwrap().unwrap().name, "changed");
    }

    #[tokio::test]
    async fn tombstones_are_hidden_but_block_create() {
        let store = InMemoryQueryStore::new();
        let id = Identifier::parse("r_1").unwrap();
        store.upsert(row("r_1", "a")).await.unwrap();
        store.upsert(row("r_2", "b")).await.unwrap();
        store.update(&id, |r: &mut Row| r.deleted = true).await.unwrap();

        assert!(store.get(&id).await.unwrap().is_none());
        assert!(store.get_any(&id).await.unwrap().unwrap().deleted);
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.list().await.unwrap().len(), 1);
        assert!(!store.create(row("r_1", "again")).await.unwrap());
    }

    #[tokio::test]
    async fn remove_and_destroy_all() {
        let store = InMemoryQueryStore::new();
        store.upsert(row("r_1", "a")).await.unwrap();
        store.upsert(row("r_2", "b")).await.unwrap();

        assert!(store.remove(&Identifier::parse("r_1").unwrap()).await.unwrap());
        assert!(!store.remove(&Identifier::parse("r_1").unwrap()).await.unwrap());
        assert_eq!(store.list().await.unwrap().len(), 1);

        store.destroy_all().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
