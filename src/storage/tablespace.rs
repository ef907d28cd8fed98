use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::Arc,
};

use async_trait::async_trait;

use super::{Appender, Fragment, Scanner, StorageError};
use crate::{option::StorageOptions, record::Schema};

/// A pluggable storage backend: metadata discovery plus scanner and appender
/// factories for one class of storage technology.
#[async_trait]
pub trait Tablespace: Send + Sync {
    /// Name the tablespace is registered under.
    fn name(&self) -> &str;

    /// Database (or directory, or remote namespace) the tablespace maps to.
    fn database_name(&self) -> &str;

    /// Options every scanner and appender of this tablespace receives.
    fn options(&self) -> &Arc<StorageOptions>;

    /// Logical tables this source exposes.
    async fn list_tables(&self) -> Result<BTreeSet<String>, StorageError>;

    /// Schema of `table`.
    async fn describe_table(&self, table: &str) -> Result<Schema, StorageError>;

    /// Create an empty `table`. Fails with `TableExists` when it is already
    /// present.
    async fn create_table(&self, table: &str, schema: Schema) -> Result<(), StorageError>;

    /// Split a table into disjoint fragments that together cover every row
    /// exactly once.
    async fn fragments(&self, table: &str) -> Result<Vec<Fragment>, StorageError>;

    /// A scanner over `fragment`, producing tuples shaped like `schema`.
    /// `schema` may be any projection of the table's columns.
    fn scanner(
        &self,
        schema: Schema,
        fragment: Fragment,
    ) -> Result<Box<dyn Scanner>, StorageError>;

    /// An appender writing output partition `partition` of `table`.
    fn appender(
        &self,
        table: &str,
        partition: u32,
        schema: Schema,
    ) -> Result<Box<dyn Appender>, StorageError>;
}

/// Name-indexed registry of the tablespaces a process can reach.
#[derive(Default)]
pub struct TablespaceManager {
    spaces: BTreeMap<String, Arc<dyn Tablespace>>,
}

impl TablespaceManager {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `space` under its own name, returning any tablespace it
    /// replaced.
    pub fn register(&mut self, space: Arc<dyn Tablespace>) -> Option<Arc<dyn Tablespace>> {
        self.spaces.insert(space.name().to_string(), space)
    }

    /// The tablespace registered as `name`.
    pub fn get_by_name(&self, name: &str) -> Option<Arc<dyn Tablespace>> {
        self.spaces.get(name).cloned()
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.spaces.keys().map(String::as_str)
    }
}

impl fmt::Debug for TablespaceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TablespaceManager")
            .field("spaces", &self.spaces.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{logging::LogContext, option::ConnectionInfo, storage::memory::MemTablespace};

    #[test]
    fn registry_resolves_by_name() {
        let mut manager = TablespaceManager::new();
        let warehouse = Arc::new(MemTablespace::new(
            "warehouse",
            ConnectionInfo::new("mem", "tpch"),
            StorageOptions::default(),
            LogContext::default(),
        ));
        assert!(manager.register(warehouse).is_none());
        assert!(manager
            .register(Arc::new(MemTablespace::new(
                "scratch",
                ConnectionInfo::new("mem", "tmp"),
                StorageOptions::default(),
                LogContext::default(),
            )))
            .is_none());

        let found = manager.get_by_name("warehouse").unwrap();
        assert_eq!(found.database_name(), "tpch");
        assert!(manager.get_by_name("missing").is_none());
        assert_eq!(manager.names().collect::<Vec<_>>(), vec!["scratch", "warehouse"]);
    }
}
