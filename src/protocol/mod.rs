//! HandlerSocket wire protocol.
//!
//! This module defines the requests a client sends, the responses a server
//! returns, the text encoding both travel in, and the [`Connection`] that
//! carries them over a byte stream.
//!
//! # Wire Format
//!
//! Every message is a single line:
//!
//! - Tokens are separated by a tab (`0x09`) and the line ends with a newline (`0x0a`).
//! - Bytes below `0x10` inside a token are written as `0x01` followed by the byte plus `0x40`.
//! - A lone `0x00` token is NULL; an empty token is the empty string.
//!
//! Requests:
//!
//! - `A <type> <secret>` authenticates the connection.
//! - `P <id> <db> <table> <index> <col,col,...>` opens an index under `id`.
//! - `<id> <op> <nkeys> <key>... [<limit> <offset> [<modop> <value>...]]` finds and
//!   optionally modifies rows.
//! - `<id> + <n> <value>...` inserts a row.
//!
//! Responses are `<status> <ncols> <field>...`, with the fields forming rows of
//! `ncols` values. A non-zero status carries an error message as its only field.
//!
//! # Key Components
//!
//! - [`Request`]: A typed request, encoded with [`encode_request`].
//! - [`Response`]: A decoded response line.
//! - [`ResponseDecoder`]: Incremental decoder that accepts arbitrarily split reads.
//! - [`Connection`]: Pipelining transport over any `Read + Write` stream.
//!
//! # See Also
//!
//! - [`client`](crate::client): Typed operations built on top of this layer.
mod codec;
mod request;
mod response;
mod transport;

pub use codec::{
    DEFAULT_MAX_LINE_LENGTH, ResponseDecoder, decode_fields, encode_request, encode_response,
    parse_response,
};
pub use request::{
    Execute, IndexId, Modification, Operation, Operator, Request, RequestKind, Value,
};
pub use response::{Response, Row};
pub use transport::{Connection, ConnectionState};
