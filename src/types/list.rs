use std::collections::VecDeque;

use bytes::Bytes;

use super::normalize_range;

/// List type backed by a VecDeque for O(1) push/pop at both ends.
#[derive(Debug, Clone, Default)]
pub struct ListValue {
    data: VecDeque<Bytes>,
}

impl ListValue {
    pub fn new() -> Self {
        ListValue {
            data: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn push_front(&mut self, value: Bytes) {
        self.data.push_front(value);
    }

    pub fn push_back(&mut self, value: Bytes) {
        self.data.push_back(value);
    }

    pub fn pop_front(&mut self) -> Option<Bytes> {
        self.data.pop_front()
    }

    pub fn pop_back(&mut self) -> Option<Bytes> {
        self.data.pop_back()
    }

    pub fn get(&self, index: i64) -> Option<&Bytes> {
        let idx = if index < 0 {
            self.data.len() as i64 + index
        } else {
            index
        };
        if idx < 0 {
            return None;
        }
        self.data.get(idx as usize)
    }

    /// Inclusive range with negative indices counted from the tail.
    pub fn range(&self, start: i64, stop: i64) -> Vec<Bytes> {
        match normalize_range(start, stop, self.data.len()) {
            Some((s, e)) => self.data.range(s..=e).cloned().collect(),
            None => Vec::new(),
        }
    }
}
