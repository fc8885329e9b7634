use std::fmt;

use bytes::Bytes;

/// The result of a successfully executed command. A transport layer maps
/// these onto its wire format.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Ok,
    Status(String),
    /// The absent indicator: missing key, field or member.
    Nil,
    Integer(i64),
    Bool(bool),
    Double(f64),
    Bulk(Bytes),
    Array(Vec<Reply>),
    /// Field → value pairs in a stable order (HGETALL).
    Map(Vec<(Bytes, Reply)>),
}

impl Reply {
    pub fn status(s: impl Into<String>) -> Self {
        Reply::Status(s.into())
    }

    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Reply::Bulk(data.into())
    }

    pub fn optional_bulk(data: Option<Bytes>) -> Self {
        data.map_or(Reply::Nil, Reply::Bulk)
    }

    pub fn bulk_array(items: impl IntoIterator<Item = Bytes>) -> Self {
        Reply::Array(items.into_iter().map(Reply::Bulk).collect())
    }

    /// Members with optional `[member, score]` pairs.
    pub fn scored(items: Vec<(Bytes, f64)>, with_scores: bool) -> Self {
        Reply::Array(
            items
                .into_iter()
                .map(|(member, score)| {
                    if with_scores {
                        Reply::Array(vec![Reply::Bulk(member), Reply::Double(score)])
                    } else {
                        Reply::Bulk(member)
                    }
                })
                .collect(),
        )
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Reply::Nil)
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Reply::Integer(n) => Some(*n),
            Reply::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Reply::Bool(b) => Some(*b),
            Reply::Integer(n) => Some(*n != 0),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Reply::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_bulk(&self) -> Option<&Bytes> {
        match self {
            Reply::Bulk(b) => Some(b),
            _ => None,
        }
    }

    pub fn into_array(self) -> Option<Vec<Reply>> {
        match self {
            Reply::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn into_map(self) -> Option<Vec<(Bytes, Reply)>> {
        match self {
            Reply::Map(pairs) => Some(pairs),
            _ => None,
        }
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        match self {
            Reply::Ok => write!(f, "OK"),
            Reply::Status(s) => write!(f, "{s}"),
            Reply::Nil => write!(f, "(nil)"),
            Reply::Integer(n) => write!(f, "(integer) {n}"),
            Reply::Bool(b) => write!(f, "(integer) {}", *b as i64),
            Reply::Double(d) => write!(f, "(double) {d}"),
            Reply::Bulk(b) => write!(f, "{:?}", String::from_utf8_lossy(b)),
            Reply::Array(items) if items.is_empty() => write!(f, "(empty array)"),
            Reply::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, "\n{:indent$}", "")?;
                    }
                    write!(f, "{}) ", i + 1)?;
                    item.write_indented(f, indent + 3)?;
                }
                Ok(())
            }
            Reply::Map(pairs) if pairs.is_empty() => write!(f, "(empty hash)"),
            Reply::Map(pairs) => {
                for (i, (field, value)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, "\n{:indent$}", "")?;
                    }
                    write!(f, "{}# {:?} => ", i + 1, String::from_utf8_lossy(field))?;
                    value.write_indented(f, indent + 3)?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}
