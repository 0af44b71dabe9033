//! Public HandlerSocket client.
//!
//! [`HandlerSocket`] validates arguments against what was declared when an
//! index was opened, then hands typed requests to the [`Executor`], which
//! pipelines them over one [`Connection`](crate::protocol::Connection).
//!
//! # Error convention
//!
//! Every request produces a [`Response`] carrying the server status. Methods
//! that send a single request return `Err(HsError::Operation)` for a non-zero
//! status, so a duplicate key on insert or an unknown index surfaces as an
//! error. [`HandlerSocket::execute_multi`] returns one `Response` per request
//! and leaves the status for the caller to inspect;
//! [`Response::into_result`] converts it when wanted.
//!
//! # Example
//! ```no_run
//! use handlersocket::{ClientConfig, HandlerSocket, Operator};
//!
//! let mut hs = HandlerSocket::connect(ClientConfig::new("127.0.0.1", 9999))?;
//! let idx = hs.open_index("hstest", "table1", "PRIMARY", ["k", "v"])?;
//!
//! hs.execute_insert(idx, ["k1", "v1"])?;
//! let found = hs.execute_single(idx, Operator::Eq, ["k1"], 1, 0)?;
//! assert_eq!(found.rows, vec![vec!["k1", "v1"]]);
//!
//! let deleted = hs.execute_delete(idx, Operator::Eq, ["k1"], 1, 0)?;
//! assert_eq!(deleted.rows, vec![vec!["1"]]);
//! hs.close();
//! # Ok::<(), handlersocket::HsError>(())
//! ```
mod executor;
mod index;

use std::{
    io::{Read, Write},
    net::TcpStream,
};

use log::info;

pub use executor::Executor;
pub use index::{IndexTable, OpenedIndex};

use crate::{
    config::ClientConfig,
    error::{HsError, Result},
    protocol::{Connection, Execute, IndexId, Modification, Operation, Operator, Response, Value},
};

/// Authentication type understood by HandlerSocket (plain text secret).
pub const DEFAULT_AUTH_KIND: &str = "1";

#[derive(Debug)]
pub struct HandlerSocket<T: Read + Write = TcpStream> {
    executor: Executor<T>,
    config: Option<ClientConfig>,
}

impl HandlerSocket<TcpStream> {
    pub fn connect(config: ClientConfig) -> Result<Self> {
        let connection = Connection::connect(&config)?;
        info!("connected to {}", config.address());
        Ok(Self {
            executor: Executor::new(connection),
            config: Some(config),
        })
    }

    /// Drop the current connection and open a new one with the same
    /// configuration. Index ids restart at 0; indexes must be opened again.
    pub fn reconnect(&mut self) -> Result<()> {
        let Some(config) = self.config.as_ref() else {
            return Err(HsError::InvalidArgument(
                "client was built from a stream and cannot reconnect".to_string(),
            ));
        };

        self.executor.close();
        let connection = Connection::connect(config)?;
        info!("reconnected to {}", config.address());
        self.executor = Executor::new(connection);
        Ok(())
    }
}

impl<T: Read + Write> HandlerSocket<T> {
    /// Use an already connected stream.
    pub fn with_stream(stream: T) -> Self {
        Self {
            executor: Executor::new(Connection::new(stream)),
            config: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.executor.connection().is_open()
    }

    /// Whether a new request can be issued with nothing left in flight.
    pub fn stable_point(&self) -> bool {
        self.executor.connection().stable_point()
    }

    pub fn index(&self, index: IndexId) -> Option<&OpenedIndex> {
        self.executor.indexes().get(index)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(HsError::NotOpen)
        }
    }

    fn declared(&self, index: IndexId) -> Result<&OpenedIndex> {
        self.ensure_open()?;
        self.executor
            .indexes()
            .get(index)
            .ok_or_else(|| HsError::InvalidArgument(format!("index {index} is not open")))
    }

    fn check_values(&self, index: IndexId, values: &[Value]) -> Result<()> {
        let declared = self.declared(index)?;
        if values.len() != declared.columns.len() {
            return Err(HsError::InvalidArgument(format!(
                "index {index} was opened with {} columns, got {} values",
                declared.columns.len(),
                values.len()
            )));
        }
        Ok(())
    }

    fn check_execute(&self, execute: &Execute) -> Result<()> {
        self.declared(execute.index)?;
        if execute.keys.is_empty() {
            return Err(HsError::InvalidArgument(
                "at least one key is required".to_string(),
            ));
        }

        match &execute.modification {
            None | Some(Modification::Delete) => Ok(()),
            Some(modification) => self.check_values(execute.index, modification.values()),
        }
    }

    fn check_operation(&self, operation: &Operation) -> Result<()> {
        match operation {
            Operation::Execute(execute) => self.check_execute(execute),
            Operation::Insert { index, values } => self.check_values(*index, values),
        }
    }

    /// Authenticate the connection. `kind` is the HandlerSocket auth type,
    /// usually [`DEFAULT_AUTH_KIND`].
    pub fn auth(&mut self, secret: &str, kind: &str) -> Result<()> {
        self.ensure_open()?;
        self.executor.auth(secret, kind)?.into_result()?;
        Ok(())
    }

    /// Open `database.table` through index `name`, exposing `columns`.
    ///
    /// Returns the id of the opened index: 0 for the first index of a
    /// connection, then 1, 2 and so on.
    pub fn open_index<C, S>(
        &mut self,
        database: &str,
        table: &str,
        name: &str,
        columns: C,
    ) -> Result<IndexId>
    where
        C: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ensure_open()?;

        let columns: Vec<String> = columns
            .into_iter()
            .map(|c| c.as_ref().to_string())
            .collect();
        if columns.is_empty() {
            return Err(HsError::InvalidArgument(
                "at least one column is required".to_string(),
            ));
        }
        for column in &columns {
            if column.is_empty()
                || column.trim() != column.as_str()
                || column.contains(',')
                || column.contains(char::is_control)
            {
                return Err(HsError::InvalidArgument(format!(
                    "invalid column name '{column}'"
                )));
            }
        }
        for part in [database, table, name] {
            if part.is_empty() {
                return Err(HsError::InvalidArgument(
                    "database, table and index names must not be empty".to_string(),
                ));
            }
        }

        self.executor.open_index(database, table, name, columns)
    }

    /// Run one execute request, with or without a modify clause.
    pub fn execute(&mut self, execute: Execute) -> Result<Response> {
        self.check_execute(&execute)?;
        self.executor.execute(execute)?.into_result()
    }

    /// Find rows whose key compares to `keys` with `op`.
    pub fn execute_single<K, V>(
        &mut self,
        index: IndexId,
        op: Operator,
        keys: K,
        limit: u32,
        offset: u32,
    ) -> Result<Response>
    where
        K: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.execute(Execute::find(index, op, keys).limit(limit).offset(offset))
    }

    /// [`execute_single`](Self::execute_single) with a limit of 1 and no
    /// offset.
    pub fn execute_find<K, V>(&mut self, index: IndexId, op: Operator, keys: K) -> Result<Response>
    where
        K: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.execute(Execute::find(index, op, keys))
    }

    /// Send every operation in one round trip. Finds, modifications and
    /// inserts ([`Operation::insert`]) can be mixed freely.
    ///
    /// Returns exactly one response per operation, in order. A failed
    /// operation shows up as a non-zero status in its response; only
    /// connection and protocol failures fail the whole call.
    pub fn execute_multi<I, O>(&mut self, operations: I) -> Result<Vec<Response>>
    where
        I: IntoIterator<Item = O>,
        O: Into<Operation>,
    {
        self.ensure_open()?;
        let operations: Vec<Operation> = operations.into_iter().map(Into::into).collect();
        for operation in &operations {
            self.check_operation(operation)?;
        }
        self.executor.execute_many(operations)
    }

    /// Insert one row. `values` must match the columns the index was opened
    /// with.
    pub fn execute_insert<I, V>(&mut self, index: IndexId, values: I) -> Result<Response>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.check_values(index, &values)?;
        self.executor.insert(index, values)?.into_result()
    }

    /// Update matched rows. The response holds the affected row count as a
    /// single text field.
    pub fn execute_update<K, KV, I, V>(
        &mut self,
        index: IndexId,
        op: Operator,
        keys: K,
        limit: u32,
        offset: u32,
        values: I,
    ) -> Result<Response>
    where
        K: IntoIterator<Item = KV>,
        KV: Into<Value>,
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.execute(
            Execute::find(index, op, keys)
                .limit(limit)
                .offset(offset)
                .modify(Modification::Update(values)),
        )
    }

    /// Delete matched rows. The response holds the affected row count as a
    /// single text field.
    pub fn execute_delete<K, V>(
        &mut self,
        index: IndexId,
        op: Operator,
        keys: K,
        limit: u32,
        offset: u32,
    ) -> Result<Response>
    where
        K: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.execute(
            Execute::find(index, op, keys)
                .limit(limit)
                .offset(offset)
                .modify(Modification::Delete),
        )
    }

    /// Close the connection. Every later call fails with
    /// [`HsError::NotOpen`]; closing twice is a no-op.
    pub fn close(&mut self) {
        self.executor.close();
    }
}
