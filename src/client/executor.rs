use std::io::{Read, Write};

use log::debug;

use crate::{
    error::{HsError, Result},
    protocol::{Connection, Execute, IndexId, Operation, Request, Response, Value},
};

use super::index::IndexTable;

/// Turns operations into requests on a single connection and collects their
/// responses in submission order.
#[derive(Debug)]
pub struct Executor<T: Read + Write> {
    connection: Connection<T>,
    indexes: IndexTable,
}

impl<T: Read + Write> Executor<T> {
    pub fn new(connection: Connection<T>) -> Self {
        Self {
            connection,
            indexes: IndexTable::new(),
        }
    }

    pub fn connection(&self) -> &Connection<T> {
        &self.connection
    }

    pub fn indexes(&self) -> &IndexTable {
        &self.indexes
    }

    /// Send `requests` as one pipelined batch and wait for all of their
    /// responses.
    pub fn submit(&mut self, requests: &[Request]) -> Result<Vec<Response>> {
        if !self.connection.is_open() {
            return Err(HsError::NotOpen);
        }
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        debug!("submitting {} requests", requests.len());
        let result = self.pipeline(requests);
        if let Err(e) = &result {
            if e.is_fatal() {
                self.indexes.close();
            }
        }
        result
    }

    fn pipeline(&mut self, requests: &[Request]) -> Result<Vec<Response>> {
        for request in requests {
            self.connection.queue(request)?;
        }
        self.connection.flush()?;
        self.connection.receive(requests.len())
    }

    fn submit_one(&mut self, request: Request) -> Result<Response> {
        let mut responses = self.submit(std::slice::from_ref(&request))?;
        responses
            .pop()
            .ok_or_else(|| HsError::Protocol("missing response".to_string()))
    }

    pub fn auth(&mut self, secret: &str, kind: &str) -> Result<Response> {
        self.submit_one(Request::Auth {
            kind: kind.to_string(),
            secret: secret.to_string(),
        })
    }

    /// Open an index under the next free id. The id is only taken once the
    /// server has accepted the open.
    pub fn open_index(
        &mut self,
        database: &str,
        table: &str,
        name: &str,
        columns: Vec<String>,
    ) -> Result<IndexId> {
        let index = self.indexes.next_id()?;
        self.submit_one(Request::OpenIndex {
            index,
            database: database.to_string(),
            table: table.to_string(),
            name: name.to_string(),
            columns: columns.clone(),
        })?
        .into_result()?;

        self.indexes.assign(database, table, name, columns)
    }

    pub fn execute(&mut self, execute: Execute) -> Result<Response> {
        self.submit_one(Request::Execute(execute))
    }

    pub fn execute_many(&mut self, operations: Vec<Operation>) -> Result<Vec<Response>> {
        let requests: Vec<Request> = operations.into_iter().map(Request::from).collect();
        self.submit(&requests)
    }

    pub fn insert(&mut self, index: IndexId, values: Vec<Value>) -> Result<Response> {
        self.submit_one(Request::Insert { index, values })
    }

    pub fn close(&mut self) {
        self.connection.close();
        self.indexes.close();
    }
}
