//! Line codec for the HandlerSocket protocol.
//!
//! Every request and every response is a single line: tokens separated by a
//! tab and terminated by a newline. Bytes below `0x10` never appear raw inside a
//! token; they are written as [`ESCAPE_PREFIX`] followed by the byte shifted by
//! [`ESCAPE_SHIFT`]. A token made of the single byte `0x00` is NULL, which keeps
//! it apart from the empty token (the empty string).
//!
//! Responses are decoded incrementally by [`ResponseDecoder`], since socket
//! reads return arbitrary chunk boundaries.
use bytes::{BufMut, BytesMut};
use log::trace;

use crate::error::{HsError, Result};

use super::{IndexId, Modification, Request, Response, Row, Value};

pub const TOKEN_SEPARATOR: u8 = b'\t';
pub const LINE_TERMINATOR: u8 = b'\n';
pub const NULL_TOKEN: u8 = 0x00;
pub const ESCAPE_PREFIX: u8 = 0x01;
pub const ESCAPE_SHIFT: u8 = 0x40;
const NOESCAPE_MIN: u8 = 0x10;

pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024 * 1024;

const OPEN_INDEX_TOKEN: &[u8] = b"P";
const AUTH_TOKEN: &[u8] = b"A";
const INSERT_OPERATOR: &str = "+";

/// Append `bytes` to `buf`, escaping control bytes.
pub fn escape_into(buf: &mut BytesMut, bytes: &[u8]) {
    for &b in bytes {
        if b < NOESCAPE_MIN {
            buf.put_u8(ESCAPE_PREFIX);
            buf.put_u8(b + ESCAPE_SHIFT);
        } else {
            buf.put_u8(b);
        }
    }
}

pub fn encode_value(buf: &mut BytesMut, value: &Value) {
    match value.as_bytes() {
        Some(bytes) => escape_into(buf, bytes),
        None => buf.put_u8(NULL_TOKEN),
    }
}

/// Decode a single token.
pub fn unescape(token: &[u8]) -> Result<Value> {
    if token == [NULL_TOKEN] {
        return Ok(Value::NULL);
    }
    if !token.contains(&ESCAPE_PREFIX) {
        return Ok(Value::from(token));
    }

    let mut out = Vec::with_capacity(token.len());
    let mut bytes = token.iter();
    while let Some(&b) = bytes.next() {
        if b != ESCAPE_PREFIX {
            out.push(b);
            continue;
        }

        let escaped = bytes
            .next()
            .and_then(|c| c.checked_sub(ESCAPE_SHIFT))
            .ok_or_else(|| HsError::Protocol("invalid escape sequence".to_string()))?;
        out.push(escaped);
    }

    Ok(Value::from(out))
}

/// Split a line (without its terminator) into decoded tokens.
pub fn decode_fields(line: &[u8]) -> Result<Vec<Value>> {
    line.split(|&b| b == TOKEN_SEPARATOR).map(unescape).collect()
}

fn push_number(buf: &mut BytesMut, n: impl ToString) {
    buf.put_slice(n.to_string().as_bytes());
}

fn push_text(buf: &mut BytesMut, text: &str) {
    buf.put_u8(TOKEN_SEPARATOR);
    escape_into(buf, text.as_bytes());
}

fn encode_execute(
    buf: &mut BytesMut,
    index: IndexId,
    op: &str,
    keys: &[Value],
    limit: u32,
    offset: u32,
    modification: Option<&Modification>,
) {
    push_number(buf, index.get());
    push_text(buf, op);
    buf.put_u8(TOKEN_SEPARATOR);
    push_number(buf, keys.len());
    for key in keys {
        buf.put_u8(TOKEN_SEPARATOR);
        encode_value(buf, key);
    }

    // limit and offset are optional on the wire unless a modify clause follows
    if limit != 0 || offset != 0 || modification.is_some() {
        buf.put_u8(TOKEN_SEPARATOR);
        push_number(buf, limit);
        buf.put_u8(TOKEN_SEPARATOR);
        push_number(buf, offset);
    }

    if let Some(modification) = modification {
        push_text(buf, modification.token());
        for value in modification.values() {
            buf.put_u8(TOKEN_SEPARATOR);
            encode_value(buf, value);
        }
    }
}

/// Append the line for `request` to `buf`.
pub fn encode_request(buf: &mut BytesMut, request: &Request) {
    let start = buf.len();

    match request {
        Request::Auth { kind, secret } => {
            buf.put_slice(AUTH_TOKEN);
            push_text(buf, kind);
            push_text(buf, secret);
        }
        Request::OpenIndex {
            index,
            database,
            table,
            name,
            columns,
        } => {
            buf.put_slice(OPEN_INDEX_TOKEN);
            buf.put_u8(TOKEN_SEPARATOR);
            push_number(buf, index.get());
            push_text(buf, database);
            push_text(buf, table);
            push_text(buf, name);
            push_text(buf, &columns.join(","));
        }
        Request::Execute(execute) => encode_execute(
            buf,
            execute.index,
            execute.op.as_str(),
            &execute.keys,
            execute.limit,
            execute.offset,
            execute.modification.as_ref(),
        ),
        Request::Insert { index, values } => {
            encode_execute(buf, *index, INSERT_OPERATOR, values, 0, 0, None)
        }
    }

    buf.put_u8(LINE_TERMINATOR);
    trace!("encoded request: {:?}", String::from_utf8_lossy(&buf[start..]));
}

/// Append the line for `response` to `buf`.
pub fn encode_response(buf: &mut BytesMut, response: &Response) {
    push_number(buf, response.status);
    buf.put_u8(TOKEN_SEPARATOR);
    push_number(buf, response.columns);
    for value in response.rows.iter().flatten() {
        buf.put_u8(TOKEN_SEPARATOR);
        encode_value(buf, value);
    }
    buf.put_u8(LINE_TERMINATOR);
}

fn parse_number<N: std::str::FromStr>(token: Option<&[u8]>, what: &str) -> Result<N> {
    token
        .and_then(|t| std::str::from_utf8(t).ok())
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| {
            HsError::Protocol(format!(
                "invalid {what} in response: {:?}",
                token.map(String::from_utf8_lossy)
            ))
        })
}

/// Parse a response line (without its terminator).
pub fn parse_response(line: &[u8]) -> Result<Response> {
    let mut tokens = line.split(|&b| b == TOKEN_SEPARATOR);
    let status = parse_number::<i32>(tokens.next(), "status")?;
    let columns = parse_number::<usize>(tokens.next(), "column count")?;
    let fields = tokens.map(unescape).collect::<Result<Vec<_>>>()?;

    if fields.is_empty() {
        return Ok(Response {
            status,
            columns,
            rows: Vec::new(),
        });
    }

    if columns == 0 || fields.len() % columns != 0 {
        return Err(HsError::Protocol(format!(
            "{} fields do not fill rows of {} columns",
            fields.len(),
            columns
        )));
    }

    let mut rows: Vec<Row> = Vec::with_capacity(fields.len() / columns);
    let mut fields = fields.into_iter();
    loop {
        let row: Row = fields.by_ref().take(columns).collect();
        if row.is_empty() {
            break;
        }
        rows.push(row);
    }

    Ok(Response {
        status,
        columns,
        rows,
    })
}

/// Accumulates socket reads and yields complete responses.
///
/// A partial trailing line is retained until the rest of it arrives.
#[derive(Debug)]
pub struct ResponseDecoder {
    buffer: BytesMut,
    max_line_length: usize,
}

impl ResponseDecoder {
    pub fn new() -> Self {
        Self::with_max_line_length(DEFAULT_MAX_LINE_LENGTH)
    }

    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            max_line_length,
        }
    }

    /// Append `data` and decode every complete response it finishes.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Response>> {
        self.buffer.extend_from_slice(data);

        let mut responses = Vec::new();
        while let Some(response) = self.try_decode_one()? {
            responses.push(response);
        }
        Ok(responses)
    }

    fn try_decode_one(&mut self) -> Result<Option<Response>> {
        let terminator = self.buffer.iter().position(|&b| b == LINE_TERMINATOR);
        let line_length = terminator.unwrap_or(self.buffer.len());
        if line_length > self.max_line_length {
            return Err(HsError::Protocol(format!(
                "response line exceeds {} bytes",
                self.max_line_length
            )));
        }

        let Some(pos) = terminator else {
            return Ok(None);
        };
        let line = self.buffer.split_to(pos + 1).freeze();
        parse_response(&line[..pos]).map(Some)
    }

    /// Number of buffered bytes not yet decoded.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for ResponseDecoder {
    fn default() -> Self {
        Self::new()
    }
}
