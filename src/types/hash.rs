use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;

use super::string::parse_i64;
use crate::error::{MnemoError, MnemoResult};

/// Hash type. Fields iterate in insertion order; overwriting a field keeps
/// its original position.
#[derive(Debug, Clone, Default)]
pub struct HashValue {
    fields: HashMap<Bytes, (u64, Bytes)>,
    order: BTreeMap<u64, Bytes>,
    next_seq: u64,
}

impl HashValue {
    pub fn new() -> Self {
        HashValue::default()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field: &[u8]) -> Option<&Bytes> {
        self.fields.get(field).map(|(_, v)| v)
    }

    /// Set a field. Returns true if the field is new.
    pub fn set(&mut self, field: Bytes, value: Bytes) -> bool {
        match self.fields.get_mut(&field) {
            Some((_, slot)) => {
                *slot = value;
                false
            }
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.order.insert(seq, field.clone());
                self.fields.insert(field, (seq, value));
                true
            }
        }
    }

    pub fn remove(&mut self, field: &[u8]) -> bool {
        match self.fields.remove(field) {
            Some((seq, _)) => {
                self.order.remove(&seq);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, field: &[u8]) -> bool {
        self.fields.contains_key(field)
    }

    pub fn keys(&self) -> impl Iterator<Item = &Bytes> {
        self.order.values()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&Bytes, &Bytes)> {
        self.order
            .values()
            .filter_map(|field| self.fields.get(field).map(|(_, v)| (field, v)))
    }

    /// Increment an integer field, treating a missing field as 0.
    pub fn incr_by(&mut self, field: Bytes, delta: i64) -> MnemoResult<i64> {
        let current = match self.get(&field) {
            Some(v) => parse_i64(v).ok_or(MnemoError::NotAnInteger)?,
            None => 0,
        };
        let next = current.checked_add(delta).ok_or(MnemoError::Overflow)?;
        self.set(field, Bytes::from(next.to_string()));
        Ok(next)
    }
}
