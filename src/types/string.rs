use bytes::Bytes;

use crate::error::{MnemoError, MnemoResult};

/// String type: binary-safe bytes. Numeric commands reinterpret the
/// contents as a base-10 signed integer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringValue {
    data: Bytes,
}

impl StringValue {
    pub fn new(data: Bytes) -> Self {
        StringValue { data }
    }

    pub fn from_i64(n: i64) -> Self {
        StringValue {
            data: Bytes::from(n.to_string()),
        }
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Try to parse the value as an i64.
    pub fn as_i64(&self) -> Option<i64> {
        parse_i64(&self.data)
    }

    /// Add `delta` to the integer held by this string and store the result.
    pub fn incr_by(&mut self, delta: i64) -> MnemoResult<i64> {
        let current = self.as_i64().ok_or(MnemoError::NotAnInteger)?;
        let next = current.checked_add(delta).ok_or(MnemoError::Overflow)?;
        self.data = Bytes::from(next.to_string());
        Ok(next)
    }
}

/// Strict base-10 parse: no surrounding whitespace, no leading `+`.
pub fn parse_i64(data: &[u8]) -> Option<i64> {
    if data.is_empty() || data[0] == b'+' {
        return None;
    }
    std::str::from_utf8(data).ok()?.parse::<i64>().ok()
}
