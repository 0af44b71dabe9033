use std::collections::BTreeMap;

use log::debug;

use crate::{
    error::{HsError, Result},
    protocol::IndexId,
};

/// An index opened on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedIndex {
    pub database: String,
    pub table: String,
    pub name: String,
    pub columns: Vec<String>,
}

/// Ids handed out by one connection.
///
/// Ids count up from 0 and are never reused for the lifetime of the
/// connection; HandlerSocket has no request to release an index.
#[derive(Debug)]
pub struct IndexTable {
    next: u32,
    entries: BTreeMap<IndexId, OpenedIndex>,
    closed: bool,
}

impl IndexTable {
    pub fn new() -> Self {
        Self {
            next: 0,
            entries: BTreeMap::new(),
            closed: false,
        }
    }

    /// The id the next [`assign`](Self::assign) will return.
    pub fn next_id(&self) -> Result<IndexId> {
        if self.closed {
            return Err(HsError::NotOpen);
        }
        Ok(IndexId::new(self.next))
    }

    pub fn assign(
        &mut self,
        database: &str,
        table: &str,
        name: &str,
        columns: Vec<String>,
    ) -> Result<IndexId> {
        let id = self.next_id()?;
        self.next = self
            .next
            .checked_add(1)
            .ok_or_else(|| HsError::InvalidArgument("index ids exhausted".to_string()))?;
        self.entries.insert(
            id,
            OpenedIndex {
                database: database.to_string(),
                table: table.to_string(),
                name: name.to_string(),
                columns,
            },
        );
        debug!("assigned index {id} to {database}.{table}.{name}");
        Ok(id)
    }

    pub fn get(&self, id: IndexId) -> Option<&OpenedIndex> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget every index; later assignments fail with [`HsError::NotOpen`].
    pub fn close(&mut self) {
        self.entries.clear();
        self.closed = true;
    }
}

impl Default for IndexTable {
    fn default() -> Self {
        Self::new()
    }
}
