//! Document store gateway. One document per record, keyed by its id and
//! grouped by collection.
use anyhow::Context;
use sled::Db;
use std::path::Path;
use std::sync::Arc;

pub const ORDERS: &str = "orders";
pub const USERS: &str = "users";

pub trait DocumentStore {
    /// Every document in the collection with its id.
    fn get(&self, collection: &str) -> anyhow::Result<Vec<(String, Vec<u8>)>>;

    fn get_one(&self, collection: &str, id: &str) -> anyhow::Result<Option<Vec<u8>>>;

    fn set(&self, collection: &str, id: &str, document: Vec<u8>) -> anyhow::Result<()>;

    /// Returns whether a document was removed.
    fn delete(&self, collection: &str, id: &str) -> anyhow::Result<bool>;

    /// Writes `document` only if the stored bytes still equal `expected`
    /// (`None` meaning no document). Returns false when someone else won.
    fn swap(
        &self,
        collection: &str,
        id: &str,
        expected: Option<&[u8]>,
        document: Vec<u8>,
    ) -> anyhow::Result<bool>;
}

/// sled backed store, one tree per collection.
#[derive(Clone)]
pub struct SledStore {
    instance: Arc<Db>,
}

impl SledStore {
    pub fn new(instance: Arc<Db>) -> Self {
        Self { instance }
    }

    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path)
            .with_context(|| format!("failed to open order store at {}", path.display()))?;
        Ok(Self::new(Arc::new(db)))
    }

    fn tree(&self, collection: &str) -> anyhow::Result<sled::Tree> {
        self.instance
            .open_tree(collection)
            .with_context(|| format!("failed to open collection '{}'", collection))
    }
}

impl DocumentStore for SledStore {
    fn get(&self, collection: &str) -> anyhow::Result<Vec<(String, Vec<u8>)>> {
        self.tree(collection)?
            .iter()
            .map(|entry| -> anyhow::Result<(String, Vec<u8>)> {
                let (key, value) = entry?;
                Ok((String::from_utf8(key.to_vec())?, value.to_vec()))
            })
            .collect()
    }

    fn get_one(&self, collection: &str, id: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self
            .tree(collection)?
            .get(id.as_bytes())?
            .map(|value| value.to_vec()))
    }

    fn set(&self, collection: &str, id: &str, document: Vec<u8>) -> anyhow::Result<()> {
        self.tree(collection)?.insert(id.as_bytes(), document)?;
        Ok(())
    }

    fn delete(&self, collection: &str, id: &str) -> anyhow::Result<bool> {
        Ok(self.tree(collection)?.remove(id.as_bytes())?.is_some())
    }

    fn swap(
        &self,
        collection: &str,
        id: &str,
        expected: Option<&[u8]>,
        document: Vec<u8>,
    ) -> anyhow::Result<bool> {
        let outcome =
            self.tree(collection)?
                .compare_and_swap(id.as_bytes(), expected, Some(document))?;
        Ok(outcome.is_ok())
    }
}
