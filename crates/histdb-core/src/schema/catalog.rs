//! In-memory catalog of tables and indexes.

use std::collections::BTreeMap;

use super::index::{IndexDef, IndexLayout};
use super::table::TableDef;
use crate::error::Error;

/// Registered tables and indexes, by name.
///
/// Index names share one namespace across tables, so a query can name its
/// index alone.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: BTreeMap<String, TableDef>,
    indexes: BTreeMap<String, IndexDef>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table. Re-adding an identical definition is allowed.
    pub fn add_table(&mut self, table: TableDef) -> Result<(), Error> {
        table.validate()?;
        match self.tables.get(&table.name) {
            Some(existing) if *existing == table => Ok(()),
            Some(_) => Err(Error::Config(format!(
                "table {} is already defined differently",
                table.name
            ))),
            None => {
                self.tables.insert(table.name.clone(), table);
                Ok(())
            }
        }
    }

    /// Add an index, compiling it against its table.
    pub fn add_index(&mut self, index: IndexDef) -> Result<IndexLayout, Error> {
        let table = self
            .tables
            .get(&index.table)
            .ok_or_else(|| Error::UnknownTable(index.table.clone()))?;
        let layout = index.compile(table)?;
        match self.indexes.get(&index.name) {
            Some(existing) if *existing == index => {}
            Some(_) => {
                return Err(Error::Config(format!(
                    "index {} is already defined differently",
                    index.name
                )))
            }
            None => {
                self.indexes.insert(index.name.clone(), index);
            }
        }
        Ok(layout)
    }

    /// Look up a table.
    pub fn table(&self, name: &str) -> Result<&TableDef, Error> {
        self.tables
            .get(name)
            .ok_or_else(|| Error::UnknownTable(name.to_string()))
    }

    /// Look up an index.
    pub fn index(&self, name: &str) -> Result<&IndexDef, Error> {
        self.indexes
            .get(name)
            .ok_or_else(|| Error::UnknownIndex(name.to_string()))
    }

    /// All tables, by name.
    pub fn tables(&self) -> impl Iterator<Item = &TableDef> {
        self.tables.values()
    }

    /// All indexes, by name.
    pub fn indexes(&self) -> impl Iterator<Item = &IndexDef> {
        self.indexes.values()
    }
}
