//! CLI utilities for HandlerSocket.
//!
//! The utilities present in this module back the `hs-cli` interactive client.
//! A line typed at the prompt is parsed into a [`Command`], which [`run`] then
//! performs against a connected [`HandlerSocket`].
//!
//! # Overview
//!
//! Supported commands:
//!
//! - `open <db> <table> <index> <col,col,...>`
//! - `find <id> <op> <key,key,...> [limit] [offset]`
//! - `insert <id> <value> [value ...]`
//! - `update <id> <op> <key,key,...> <limit> <offset> <value> [value ...]`
//! - `delete <id> <op> <key,key,...> [limit] [offset]`
//! - `.exit`
//!
//! Arguments are separated by whitespace. `\N` stands for NULL wherever a key
//! or value is expected.
//!
//! # Example
//! ```rust
//! use handlersocket::{Command, IndexId, Operator};
//!
//! let cmd: Command = "find 0 >= k1 5".try_into().unwrap();
//! assert_eq!(
//!     cmd,
//!     Command::Find {
//!         index: IndexId::new(0),
//!         op: Operator::Ge,
//!         keys: vec!["k1".into()],
//!         limit: 5,
//!         offset: 0,
//!     }
//! );
//! ```
use std::io::{self, BufRead, Read, Write};

use thiserror::Error;

use crate::{
    client::HandlerSocket,
    error::Result,
    protocol::{IndexId, Operator, Value},
};

/// Token standing for NULL in keys and values.
pub const NULL_LITERAL: &str = "\\N";

/// List of possible errors a command can throw.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unrecognized command '{0}'")]
    UnrecognizedCommand(String),

    #[error("invalid '{command}' command, {reason}")]
    InvalidCommandArguments { command: String, reason: String },

    #[error("no command provided")]
    Empty,

    #[error("failed to read command: {0}")]
    Io(#[from] io::Error),
}

/// User supplied commands to run against a HandlerSocket connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Close the connection and terminate the process.
    Exit,
    Open {
        database: String,
        table: String,
        index: String,
        columns: Vec<String>,
    },
    Find {
        index: IndexId,
        op: Operator,
        keys: Vec<Value>,
        limit: u32,
        offset: u32,
    },
    Insert {
        index: IndexId,
        values: Vec<Value>,
    },
    Update {
        index: IndexId,
        op: Operator,
        keys: Vec<Value>,
        limit: u32,
        offset: u32,
        values: Vec<Value>,
    },
    Delete {
        index: IndexId,
        op: Operator,
        keys: Vec<Value>,
        limit: u32,
        offset: u32,
    },
}

fn invalid(command: &str, reason: impl Into<String>) -> CommandError {
    CommandError::InvalidCommandArguments {
        command: command.to_string(),
        reason: reason.into(),
    }
}

fn value(token: &str) -> Value {
    if token == NULL_LITERAL {
        Value::NULL
    } else {
        token.into()
    }
}

fn keys(command: &str, token: Option<&&str>) -> std::result::Result<Vec<Value>, CommandError> {
    let token = token.ok_or_else(|| invalid(command, "requires comma separated keys"))?;
    Ok(token.split(',').map(value).collect())
}

fn index(command: &str, token: Option<&&str>) -> std::result::Result<IndexId, CommandError> {
    token
        .and_then(|t| t.parse::<u32>().ok())
        .map(IndexId::new)
        .ok_or_else(|| invalid(command, "requires a non-negative integer index id"))
}

fn operator(command: &str, token: Option<&&str>) -> std::result::Result<Operator, CommandError> {
    let token = token.ok_or_else(|| invalid(command, "requires an operator"))?;
    token
        .parse::<Operator>()
        .map_err(|e| invalid(command, e.to_string()))
}

fn number(
    command: &str,
    token: Option<&&str>,
    default: u32,
) -> std::result::Result<u32, CommandError> {
    match token {
        None => Ok(default),
        Some(t) => t
            .parse::<u32>()
            .map_err(|_| invalid(command, format!("'{t}' is not a non-negative integer"))),
    }
}

impl TryFrom<&str> for Command {
    type Error = CommandError;

    fn try_from(s: &str) -> std::result::Result<Self, Self::Error> {
        let parts = s.split_whitespace().collect::<Vec<&str>>();
        let Some((&name, args)) = parts.split_first() else {
            return Err(CommandError::Empty);
        };

        match name {
            ".exit" => Ok(Command::Exit),
            "open" => {
                let [database, table, index, columns] = args else {
                    return Err(invalid(
                        name,
                        "requires db, table, index and columns. Example: open hstest table1 PRIMARY k,v",
                    ));
                };
                Ok(Command::Open {
                    database: database.to_string(),
                    table: table.to_string(),
                    index: index.to_string(),
                    columns: columns.split(',').map(String::from).collect(),
                })
            }
            "find" | "delete" => {
                if args.len() > 5 {
                    return Err(invalid(name, "takes at most limit and offset after the keys"));
                }
                let index = index(name, args.first())?;
                let op = operator(name, args.get(1))?;
                let keys = keys(name, args.get(2))?;
                let limit = number(name, args.get(3), 1)?;
                let offset = number(name, args.get(4), 0)?;

                Ok(if name == "find" {
                    Command::Find {
                        index,
                        op,
                        keys,
                        limit,
                        offset,
                    }
                } else {
                    Command::Delete {
                        index,
                        op,
                        keys,
                        limit,
                        offset,
                    }
                })
            }
            "insert" => {
                let index = index(name, args.first())?;
                if args.len() < 2 {
                    return Err(invalid(name, "requires at least one value. Example: insert 0 k1 v1"));
                }
                Ok(Command::Insert {
                    index,
                    values: args[1..].iter().copied().map(value).collect(),
                })
            }
            "update" => {
                if args.len() < 6 {
                    return Err(invalid(
                        name,
                        "requires id, op, keys, limit, offset and values. Example: update 0 = k1 1 0 k1 v2",
                    ));
                }
                Ok(Command::Update {
                    index: index(name, args.first())?,
                    op: operator(name, args.get(1))?,
                    keys: keys(name, args.get(2))?,
                    limit: number(name, args.get(3), 1)?,
                    offset: number(name, args.get(4), 0)?,
                    values: args[5..].iter().copied().map(value).collect(),
                })
            }
            other => Err(CommandError::UnrecognizedCommand(other.to_string())),
        }
    }
}

/// Prompt user for a valid command.
///
/// End of input is treated as `.exit`.
pub fn prompt<R, W>(mut reader: R, mut writer: W) -> std::result::Result<Command, CommandError>
where
    R: BufRead,
    W: Write,
{
    write!(&mut writer, "> ")?;
    writer.flush()?;

    let mut s = String::default();
    if reader.read_line(&mut s)? == 0 {
        return Ok(Command::Exit);
    }

    s.as_str().try_into()
}

/// Perform `command` on `hs`, returning the text to show the user.
pub fn run<T: Read + Write>(hs: &mut HandlerSocket<T>, command: Command) -> Result<Option<String>> {
    match command {
        Command::Exit => {
            hs.close();
            Ok(None)
        }
        Command::Open {
            database,
            table,
            index,
            columns,
        } => {
            let id = hs.open_index(&database, &table, &index, &columns)?;
            Ok(Some(format!("opened index {id}")))
        }
        Command::Find {
            index,
            op,
            keys,
            limit,
            offset,
        } => {
            let response = hs.execute_single(index, op, keys, limit, offset)?;
            Ok(Some(response.to_string()))
        }
        Command::Insert { index, values } => {
            hs.execute_insert(index, values)?;
            Ok(Some("inserted".to_string()))
        }
        Command::Update {
            index,
            op,
            keys,
            limit,
            offset,
            values,
        } => {
            let response = hs.execute_update(index, op, keys, limit, offset, values)?;
            Ok(Some(format!(
                "{} rows updated",
                response.affected().unwrap_or("0")
            )))
        }
        Command::Delete {
            index,
            op,
            keys,
            limit,
            offset,
        } => {
            let response = hs.execute_delete(index, op, keys, limit, offset)?;
            Ok(Some(format!(
                "{} rows deleted",
                response.affected().unwrap_or("0")
            )))
        }
    }
}
