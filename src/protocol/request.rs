use std::{fmt, str::FromStr};

use bytes::Bytes;

use crate::error::HsError;

/// Client-assigned identifier of an opened index.
///
/// Ids are handed out sequentially per connection, starting at 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexId(u32);

impl IndexId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for IndexId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for IndexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single protocol field: bytes or NULL.
///
/// NULL and the empty string are distinct on the wire. Fields are not
/// required to be UTF-8; binary and latin1 columns come back untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Value(Option<Bytes>);

impl Value {
    pub const NULL: Value = Value(None);

    pub fn as_bytes(&self) -> Option<&[u8]> {
        self.0.as_deref()
    }

    /// The field as text; `None` for NULL and for fields that are not UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    pub fn into_inner(self) -> Option<Bytes> {
        self.0
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self(Some(Bytes::copy_from_slice(value.as_bytes())))
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self(Some(Bytes::from(value)))
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Self(Some(Bytes::copy_from_slice(value)))
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self(Some(Bytes::from(value)))
    }
}

impl From<Bytes> for Value {
    fn from(value: Bytes) -> Self {
        Self(Some(value))
    }
}

impl<T: Into<String>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        Self(value.map(|v| Bytes::from(v.into())))
    }
}

macro_rules! value_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Self(Some(Bytes::from(value.to_string())))
                }
            }
        )*
    };
}

value_from_integer!(i32, i64, u32, u64, usize);

impl PartialEq<&str> for Value {
    fn eq(&self, other: &&str) -> bool {
        self.as_bytes() == Some(other.as_bytes())
    }
}

impl PartialEq<Option<&str>> for Value {
    fn eq(&self, other: &Option<&str>) -> bool {
        self.as_bytes() == other.map(str::as_bytes)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_bytes() {
            Some(b) => f.write_str(&String::from_utf8_lossy(b)),
            None => f.write_str("NULL"),
        }
    }
}

/// Key comparison used by find, update and delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Lt => "<",
            Operator::Le => "<=",
        }
    }
}

impl FromStr for Operator {
    type Err = HsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "=" => Ok(Operator::Eq),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Ge),
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Le),
            other => Err(HsError::InvalidArgument(format!(
                "unknown operator '{other}'"
            ))),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Modify clause applied to the rows matched by an execute request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modification {
    Update(Vec<Value>),
    Delete,
    Increment(Vec<Value>),
    Decrement(Vec<Value>),
}

impl Modification {
    pub fn token(&self) -> &'static str {
        match self {
            Modification::Update(_) => "U",
            Modification::Delete => "D",
            Modification::Increment(_) => "+",
            Modification::Decrement(_) => "-",
        }
    }

    pub fn values(&self) -> &[Value] {
        match self {
            Modification::Update(values)
            | Modification::Increment(values)
            | Modification::Decrement(values) => values,
            Modification::Delete => &[],
        }
    }
}

/// A find against an opened index, optionally modifying the matched rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execute {
    pub index: IndexId,
    pub op: Operator,
    pub keys: Vec<Value>,
    pub limit: u32,
    pub offset: u32,
    pub modification: Option<Modification>,
}

impl Execute {
    /// Plain find with a limit of 1 and no offset.
    pub fn find<K, V>(index: IndexId, op: Operator, keys: K) -> Self
    where
        K: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            index,
            op,
            keys: keys.into_iter().map(Into::into).collect(),
            limit: 1,
            offset: 0,
            modification: None,
        }
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    pub fn modify(mut self, modification: Modification) -> Self {
        self.modification = Some(modification);
        self
    }

    pub fn kind(&self) -> RequestKind {
        match self.modification {
            None => RequestKind::Find,
            Some(Modification::Delete) => RequestKind::Delete,
            Some(_) => RequestKind::Update,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Auth,
    Open,
    Find,
    Insert,
    Update,
    Delete,
}

/// One HandlerSocket request, as queued on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Auth {
        kind: String,
        secret: String,
    },
    OpenIndex {
        index: IndexId,
        database: String,
        table: String,
        name: String,
        columns: Vec<String>,
    },
    Execute(Execute),
    Insert {
        index: IndexId,
        values: Vec<Value>,
    },
}

impl Request {
    pub fn kind(&self) -> RequestKind {
        match self {
            Request::Auth { .. } => RequestKind::Auth,
            Request::OpenIndex { .. } => RequestKind::Open,
            Request::Execute(execute) => execute.kind(),
            Request::Insert { .. } => RequestKind::Insert,
        }
    }
}

impl From<Execute> for Request {
    fn from(value: Execute) -> Self {
        Request::Execute(value)
    }
}

/// A data request that may share a pipelined batch with others.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Execute(Execute),
    Insert { index: IndexId, values: Vec<Value> },
}

impl Operation {
    pub fn insert<I, V>(index: IndexId, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Operation::Insert {
            index,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn index(&self) -> IndexId {
        match self {
            Operation::Execute(execute) => execute.index,
            Operation::Insert { index, .. } => *index,
        }
    }
}

impl From<Execute> for Operation {
    fn from(value: Execute) -> Self {
        Operation::Execute(value)
    }
}

impl From<Operation> for Request {
    fn from(value: Operation) -> Self {
        match value {
            Operation::Execute(execute) => Request::Execute(execute),
            Operation::Insert { index, values } => Request::Insert { index, values },
        }
    }
}
