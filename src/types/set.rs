use std::collections::HashSet;

use bytes::Bytes;

/// Set type: unique members, no ordering.
#[derive(Debug, Clone, Default)]
pub struct SetValue {
    data: HashSet<Bytes>,
}

impl SetValue {
    pub fn new() -> Self {
        SetValue {
            data: HashSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns true if the member was not already present.
    pub fn add(&mut self, member: Bytes) -> bool {
        self.data.insert(member)
    }

    pub fn remove(&mut self, member: &[u8]) -> bool {
        self.data.remove(member)
    }

    pub fn contains(&self, member: &[u8]) -> bool {
        self.data.contains(member)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bytes> {
        self.data.iter()
    }
}

/// Members present in every operand. Missing keys count as empty sets.
pub fn intersection(sets: &[Option<&SetValue>]) -> HashSet<Bytes> {
    let Some((first, rest)) = sets.split_first() else {
        return HashSet::new();
    };
    let Some(first) = first else {
        return HashSet::new();
    };
    first
        .iter()
        .filter(|m| rest.iter().all(|s| s.is_some_and(|s| s.contains(m))))
        .cloned()
        .collect()
}

pub fn union(sets: &[Option<&SetValue>]) -> HashSet<Bytes> {
    sets.iter()
        .flatten()
        .flat_map(|s| s.iter().cloned())
        .collect()
}

/// Members of the first operand not present in any of the others.
pub fn difference(sets: &[Option<&SetValue>]) -> HashSet<Bytes> {
    let Some((Some(first), rest)) = sets.split_first() else {
        return HashSet::new();
    };
    first
        .iter()
        .filter(|m| !rest.iter().flatten().any(|s| s.contains(m)))
        .cloned()
        .collect()
}
