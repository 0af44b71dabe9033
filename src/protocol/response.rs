use std::fmt;

use crate::error::{HsError, Result};

use super::Value;

pub type Row = Vec<Value>;

/// A decoded response line.
///
/// A status of 0 is success. On failure the server sends a single row with a
/// single column describing the error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: i32,
    pub columns: usize,
    pub rows: Vec<Row>,
}

impl Response {
    pub fn is_ok(&self) -> bool {
        self.status == 0
    }

    pub fn error_message(&self) -> Option<&str> {
        if self.is_ok() {
            return None;
        }
        self.rows
            .first()
            .and_then(|row| row.first())
            .and_then(Value::as_str)
    }

    /// Affected-row count of an update or delete, as sent by the server.
    pub fn affected(&self) -> Option<&str> {
        match self.rows.as_slice() {
            [row] if row.len() == 1 && self.is_ok() => row[0].as_str(),
            _ => None,
        }
    }

    /// Turn a non-zero status into [`HsError::Operation`].
    pub fn into_result(self) -> Result<Response> {
        if self.is_ok() {
            Ok(self)
        } else {
            Err(HsError::Operation {
                status: self.status,
                message: self.error_message().unwrap_or_default().to_string(),
            })
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_ok() {
            return write!(
                f,
                "error {}: {}",
                self.status,
                self.error_message().unwrap_or_default()
            );
        }

        for row in &self.rows {
            let line = row
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\t");
            writeln!(f, "{line}")?;
        }
        write!(f, "({} rows)", self.rows.len())
    }
}
