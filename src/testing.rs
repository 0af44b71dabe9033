//! Test doubles: a scripted in-memory stream and an in-process HandlerSocket
//! server speaking enough of the protocol to exercise the client.
use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    io::{self, BufRead, BufReader, ErrorKind, Read, Write},
    net::{SocketAddr, TcpListener, TcpStream},
    ops::Bound,
    sync::{Arc, Mutex},
    thread,
};

use bytes::BytesMut;
use log::{info, warn};

use crate::{
    config::ClientConfig,
    protocol::{Response, Value, decode_fields, encode_response},
};

/// Stream that replays canned reads and records every write.
#[derive(Debug)]
pub(crate) struct ScriptedStream {
    reads: VecDeque<Vec<u8>>,
    written: Vec<u8>,
    fail_writes: bool,
}

impl ScriptedStream {
    pub(crate) fn new(reads: Vec<Vec<u8>>) -> Self {
        Self {
            reads: reads.into(),
            written: Vec::new(),
            fail_writes: false,
        }
    }

    pub(crate) fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub(crate) fn written(&self) -> &[u8] {
        &self.written
    }
}

impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(mut chunk) = self.reads.pop_front() else {
            return Ok(0);
        };

        if chunk.len() > buf.len() {
            let rest = chunk.split_off(buf.len());
            self.reads.push_front(rest);
        }
        buf[..chunk.len()].copy_from_slice(&chunk);
        Ok(chunk.len())
    }
}

impl Write for ScriptedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.fail_writes {
            return Err(io::Error::new(ErrorKind::BrokenPipe, "scripted write failure"));
        }
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct Table {
    columns: Vec<String>,
    /// Rows keyed by their first column.
    rows: BTreeMap<String, Vec<Value>>,
}

#[derive(Default)]
struct Store {
    tables: HashMap<String, Table>,
    secret: Option<String>,
}

struct OpenedIndex {
    table: String,
    fields: Vec<usize>,
}

/// In-process HandlerSocket server backed by in-memory tables.
///
/// Every table is indexed by `PRIMARY` on its first column.
pub(crate) struct MockServer {
    addr: SocketAddr,
    store: Arc<Mutex<Store>>,
}

impl MockServer {
    /// Serve `table1 (k, v)` and `table2 (k, v1, v2, v3)`.
    pub(crate) fn start() -> Self {
        Self::start_with(None)
    }

    pub(crate) fn with_secret(secret: &str) -> Self {
        Self::start_with(Some(secret.to_string()))
    }

    fn start_with(secret: Option<String>) -> Self {
        let mut store = Store {
            secret,
            ..Store::default()
        };
        for (name, columns) in [
            ("table1", vec!["k", "v"]),
            ("table2", vec!["k", "v1", "v2", "v3"]),
        ] {
            store.tables.insert(
                name.to_string(),
                Table {
                    columns: columns.into_iter().map(String::from).collect(),
                    rows: BTreeMap::new(),
                },
            );
        }

        let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind mock server");
        let addr = listener.local_addr().expect("mock server has no address");
        let store = Arc::new(Mutex::new(store));

        let handle = Arc::clone(&store);
        thread::spawn(move || listen(listener, handle));
        info!("mock server listening at {addr}");

        Self { addr, store }
    }

    pub(crate) fn config(&self) -> ClientConfig {
        ClientConfig::new(self.addr.ip().to_string(), self.addr.port())
    }

    pub(crate) fn insert_row(&self, table: &str, row: &[&str]) {
        let mut store = self.store.lock().unwrap();
        let table = store.tables.get_mut(table).unwrap();
        table.rows.insert(
            row[0].to_string(),
            row.iter().map(|v| Value::from(*v)).collect(),
        );
    }

    pub(crate) fn row(&self, table: &str, key: &str) -> Option<Vec<Value>> {
        let store = self.store.lock().unwrap();
        store.tables.get(table).unwrap().rows.get(key).cloned()
    }
}

fn listen(listener: TcpListener, store: Arc<Mutex<Store>>) {
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let handle = Arc::clone(&store);
                thread::spawn(move || {
                    if let Err(e) = handle_connection(stream, handle) {
                        warn!("mock connection failed: {e}");
                    }
                });
            }
            Err(e) => warn!("broken connection: {e:?}"),
        }
    }
}

fn handle_connection(stream: TcpStream, store: Arc<Mutex<Store>>) -> io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;
    let mut session = Session {
        indexes: HashMap::new(),
        authenticated: false,
    };

    loop {
        let mut line = Vec::new();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(());
        }
        if line.last() == Some(&b'\n') {
            line.pop();
        }

        let response = match decode_fields(&line) {
            Ok(fields) => {
                let mut store = store.lock().unwrap();
                session.handle(&mut store, fields)
            }
            Err(_) => error(2, "syntax"),
        };

        let mut out = BytesMut::new();
        encode_response(&mut out, &response);
        writer.write_all(&out)?;
    }
}

fn error(status: i32, message: &str) -> Response {
    Response {
        status,
        columns: 1,
        rows: vec![vec![message.into()]],
    }
}

fn ok(rows: Vec<Vec<Value>>, columns: usize) -> Response {
    Response {
        status: 0,
        columns,
        rows,
    }
}

fn text(value: &Value) -> String {
    value.to_string()
}

struct Session {
    indexes: HashMap<u32, OpenedIndex>,
    authenticated: bool,
}

impl Session {
    fn handle(&mut self, store: &mut Store, fields: Vec<Value>) -> Response {
        let head = fields.first().map(text).unwrap_or_default();

        if head == "A" {
            return match (&store.secret, fields.get(2)) {
                (Some(secret), Some(given)) if given == &secret.as_str() => {
                    self.authenticated = true;
                    ok(vec![], 1)
                }
                (None, _) => ok(vec![], 1),
                _ => error(3, "unauth"),
            };
        }

        if store.secret.is_some() && !self.authenticated {
            return error(3, "unauth");
        }

        if head == "P" {
            return self.open_index(store, &fields);
        }

        match head.parse::<u32>() {
            Ok(id) => self.execute(store, id, &fields[1..]),
            Err(_) => error(2, "cmd"),
        }
    }

    fn open_index(&mut self, store: &Store, fields: &[Value]) -> Response {
        let [_, id, _db, table, index, columns] = fields else {
            return error(2, "args");
        };
        let Ok(id) = text(id).parse::<u32>() else {
            return error(2, "id");
        };
        let Some(schema) = store.tables.get(&text(table)) else {
            return error(1, "open_table");
        };
        if text(index) != "PRIMARY" {
            return error(1, "open_index");
        }

        let mut positions = Vec::new();
        for column in text(columns).split(',') {
            match schema.columns.iter().position(|c| c == column) {
                Some(pos) => positions.push(pos),
                None => return error(1, "fld"),
            }
        }

        self.indexes.insert(
            id,
            OpenedIndex {
                table: text(table),
                fields: positions,
            },
        );
        ok(vec![], 1)
    }

    fn execute(&mut self, store: &mut Store, id: u32, args: &[Value]) -> Response {
        let Some(index) = self.indexes.get(&id) else {
            return error(2, "stmtnum");
        };
        let Some(table) = store.tables.get_mut(&index.table) else {
            return error(1, "open_table");
        };
        let (Some(op), Some(nkeys)) = (args.first(), args.get(1)) else {
            return error(2, "args");
        };
        let Ok(nkeys) = text(nkeys).parse::<usize>() else {
            return error(2, "kpnum");
        };
        if args.len() < 2 + nkeys || nkeys == 0 {
            return error(2, "kpnum");
        }
        let keys = &args[2..2 + nkeys];
        let rest = &args[2 + nkeys..];
        let op = text(op);

        if op == "+" {
            return insert(table, &index.fields, keys);
        }

        let (limit, offset) = match rest {
            [limit, offset, ..] => (
                text(limit).parse::<usize>().unwrap_or(1),
                text(offset).parse::<usize>().unwrap_or(0),
            ),
            _ => (1, 0),
        };

        let key = text(&keys[0]);
        let matched: Vec<String> = match op.as_str() {
            "=" => table.rows.range(key.clone()..=key).map(|(k, _)| k.clone()).collect(),
            ">" => collect_keys(table.rows.range((Bound::Excluded(key), Bound::Unbounded))),
            ">=" => collect_keys(table.rows.range(key..)),
            "<" => collect_keys(table.rows.range(..key).rev()),
            "<=" => collect_keys(table.rows.range(..=key).rev()),
            _ => return error(2, "op"),
        };
        let matched: Vec<String> = matched.into_iter().skip(offset).take(limit).collect();

        match rest.get(2).map(text).as_deref() {
            None => {
                let rows = matched
                    .iter()
                    .map(|k| {
                        let row = &table.rows[k];
                        index.fields.iter().map(|&pos| row[pos].clone()).collect()
                    })
                    .collect();
                ok(rows, index.fields.len())
            }
            Some("D") => {
                for k in &matched {
                    table.rows.remove(k);
                }
                ok(vec![vec![matched.len().into()]], 1)
            }
            Some("U") => {
                let values = &rest[3..];
                if values.len() > index.fields.len() {
                    return error(2, "modop");
                }
                for k in &matched {
                    if let Some(mut row) = table.rows.remove(k) {
                        for (pos, value) in index.fields.iter().zip(values) {
                            row[*pos] = value.clone();
                        }
                        table.rows.insert(text(&row[0]), row);
                    }
                }
                ok(vec![vec![matched.len().into()]], 1)
            }
            Some(sign @ ("+" | "-")) => {
                let values = &rest[3..];
                for k in &matched {
                    let Some(row) = table.rows.get_mut(k) else {
                        continue;
                    };
                    for (pos, value) in index.fields.iter().zip(values) {
                        let (Ok(current), Ok(delta)) =
                            (text(&row[*pos]).parse::<i64>(), text(value).parse::<i64>())
                        else {
                            return error(1, "arith");
                        };
                        let next = if sign == "+" { current + delta } else { current - delta };
                        row[*pos] = next.into();
                    }
                }
                ok(vec![vec![matched.len().into()]], 1)
            }
            Some(_) => error(2, "modop"),
        }
    }
}

fn collect_keys<'a>(iter: impl Iterator<Item = (&'a String, &'a Vec<Value>)>) -> Vec<String> {
    iter.map(|(k, _)| k.clone()).collect()
}

fn insert(table: &mut Table, fields: &[usize], values: &[Value]) -> Response {
    if values.len() > fields.len() || !fields.contains(&0) {
        return error(2, "fld");
    }

    let mut row = vec![Value::NULL; table.columns.len()];
    for (pos, value) in fields.iter().zip(values) {
        row[*pos] = value.clone();
    }

    let key = text(&row[0]);
    if table.rows.contains_key(&key) {
        return error(1, "121");
    }
    table.rows.insert(key, row);
    ok(vec![], 1)
}
