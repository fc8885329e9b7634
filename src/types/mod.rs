pub mod hash;
pub mod list;
pub mod set;
pub mod sorted_set;
pub mod string;

use crate::error::{MnemoError, MnemoResult};
use hash::HashValue;
use list::ListValue;
use set::SetValue;
use sorted_set::SortedSetValue;
use string::StringValue;

/// The value stored under a key. Operations match on the variant and fail
/// with `TypeMismatch` instead of converting between kinds.
#[derive(Debug, Clone)]
pub enum Value {
    String(StringValue),
    List(ListValue),
    Hash(HashValue),
    Set(SetValue),
    SortedSet(SortedSetValue),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Hash(_) => "hash",
            Value::Set(_) => "set",
            Value::SortedSet(_) => "zset",
        }
    }

    /// Collections with no elements left are deleted from the keyspace.
    pub fn is_empty_collection(&self) -> bool {
        match self {
            Value::String(_) => false,
            Value::List(l) => l.is_empty(),
            Value::Hash(h) => h.is_empty(),
            Value::Set(s) => s.is_empty(),
            Value::SortedSet(z) => z.is_empty(),
        }
    }

    pub fn as_string(&self) -> MnemoResult<&StringValue> {
        match self {
            Value::String(s) => Ok(s),
            _ => Err(MnemoError::TypeMismatch),
        }
    }

    pub fn as_string_mut(&mut self) -> MnemoResult<&mut StringValue> {
        match self {
            Value::String(s) => Ok(s),
            _ => Err(MnemoError::TypeMismatch),
        }
    }

    pub fn as_list(&self) -> MnemoResult<&ListValue> {
        match self {
            Value::List(l) => Ok(l),
            _ => Err(MnemoError::TypeMismatch),
        }
    }

    pub fn as_list_mut(&mut self) -> MnemoResult<&mut ListValue> {
        match self {
            Value::List(l) => Ok(l),
            _ => Err(MnemoError::TypeMismatch),
        }
    }

    pub fn as_hash(&self) -> MnemoResult<&HashValue> {
        match self {
            Value::Hash(h) => Ok(h),
            _ => Err(MnemoError::TypeMismatch),
        }
    }

    pub fn as_hash_mut(&mut self) -> MnemoResult<&mut HashValue> {
        match self {
            Value::Hash(h) => Ok(h),
            _ => Err(MnemoError::TypeMismatch),
        }
    }

    pub fn as_set(&self) -> MnemoResult<&SetValue> {
        match self {
            Value::Set(s) => Ok(s),
            _ => Err(MnemoError::TypeMismatch),
        }
    }

    pub fn as_set_mut(&mut self) -> MnemoResult<&mut SetValue> {
        match self {
            Value::Set(s) => Ok(s),
            _ => Err(MnemoError::TypeMismatch),
        }
    }

    pub fn as_sorted_set(&self) -> MnemoResult<&SortedSetValue> {
        match self {
            Value::SortedSet(z) => Ok(z),
            _ => Err(MnemoError::TypeMismatch),
        }
    }

    pub fn as_sorted_set_mut(&mut self) -> MnemoResult<&mut SortedSetValue> {
        match self {
            Value::SortedSet(z) => Ok(z),
            _ => Err(MnemoError::TypeMismatch),
        }
    }
}

/// Resolve an inclusive `start..=stop` pair of possibly negative indices
/// (-1 is the last element) against a sequence of `len` elements.
/// Out-of-range indices are clamped; `None` means the slice is empty.
pub fn normalize_range(start: i64, stop: i64, len: usize) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}
