//! Sorted set: members ordered by (score, member).
//!
//! A `BTreeSet` of `(score, member)` pairs keeps the ordering and a
//! member→score `HashMap` gives O(1) score lookups. Both indexes are kept in
//! step by every mutation.

use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;

use bytes::Bytes;
use ordered_float::OrderedFloat;

use super::normalize_range;
use crate::error::{MnemoError, MnemoResult};

#[derive(Debug, Clone, Default)]
pub struct SortedSetValue {
    sorted: BTreeSet<(OrderedFloat<f64>, Bytes)>,
    scores: HashMap<Bytes, OrderedFloat<f64>>,
}

impl SortedSetValue {
    pub fn new() -> Self {
        SortedSetValue::default()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Insert a member or replace its score. Returns true if the member is new.
    pub fn insert(&mut self, member: Bytes, score: f64) -> bool {
        let score = OrderedFloat(score);
        let added = match self.scores.insert(member.clone(), score) {
            Some(old) if old == score => return false,
            Some(old) => {
                self.sorted.remove(&(old, member.clone()));
                false
            }
            None => true,
        };
        self.sorted.insert((score, member));
        added
    }

    pub fn remove(&mut self, member: &[u8]) -> bool {
        match self.scores.remove_entry(member) {
            Some((member, score)) => {
                self.sorted.remove(&(score, member));
                true
            }
            None => false,
        }
    }

    pub fn score(&self, member: &[u8]) -> Option<f64> {
        self.scores.get(member).map(|s| s.0)
    }

    /// 0-based position in ascending order.
    pub fn rank(&self, member: &[u8]) -> Option<usize> {
        let (member, score) = self.scores.get_key_value(member)?;
        Some(self.sorted.range(..(*score, member.clone())).count())
    }

    /// 0-based position in descending order.
    pub fn rev_rank(&self, member: &[u8]) -> Option<usize> {
        self.rank(member).map(|r| self.len() - 1 - r)
    }

    /// Inclusive rank range. With `rev` the ordering is reversed first and
    /// the indices apply to the reversed sequence.
    pub fn range(&self, start: i64, stop: i64, rev: bool) -> Vec<(Bytes, f64)> {
        let Some((s, e)) = normalize_range(start, stop, self.len()) else {
            return Vec::new();
        };
        let pair = |(score, m): &(OrderedFloat<f64>, Bytes)| (m.clone(), score.0);
        if rev {
            self.sorted.iter().rev().skip(s).take(e - s + 1).map(pair).collect()
        } else {
            self.sorted.iter().skip(s).take(e - s + 1).map(pair).collect()
        }
    }

    /// Members with `min <= score <= max`, ascending.
    pub fn range_by_score(&self, min: f64, max: f64) -> Vec<(Bytes, f64)> {
        let lower = (OrderedFloat(min), Bytes::new());
        self.sorted
            .range((Bound::Included(lower), Bound::Unbounded))
            .take_while(|(score, _)| score.0 <= max)
            .map(|(score, m)| (m.clone(), score.0))
            .collect()
    }

    /// Add `delta` to the member's score, treating a new member as 0.
    pub fn incr_by(&mut self, member: Bytes, delta: f64) -> MnemoResult<f64> {
        let next = self.score(&member).unwrap_or(0.0) + delta;
        if next.is_nan() {
            return Err(MnemoError::NanScore);
        }
        self.insert(member, next);
        Ok(next)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Bytes, f64)> {
        self.sorted.iter().map(|(score, m)| (m, score.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zset(items: &[(&'static str, f64)]) -> SortedSetValue {
        let mut z = SortedSetValue::new();
        for (member, score) in items {
            z.insert(Bytes::from_static(member.as_bytes()), *score);
        }
        z
    }

    fn members(range: Vec<(Bytes, f64)>) -> Vec<Bytes> {
        range.into_iter().map(|(m, _)| m).collect()
    }

    #[test]
    fn test_order_and_ties() {
        let z = zset(&[("c", 2.0), ("b", 1.0), ("a", 1.0), ("d", -1.5)]);
        assert_eq!(members(z.range(0, -1, false)), vec!["d", "a", "b", "c"]);
        assert_eq!(members(z.range(0, -1, true)), vec!["c", "b", "a", "d"]);
        assert_eq!(members(z.range(0, 1, true)), vec!["c", "b"]);
        assert_eq!(members(z.range(-2, -1, false)), vec!["b", "c"]);
    }

    #[test]
    fn test_update_replaces_score() {
        let mut z = zset(&[("player1", 100.0)]);
        assert!(!z.insert(Bytes::from_static(b"player1"), 200.0));
        assert_eq!(z.len(), 1);
        assert_eq!(z.score(b"player1"), Some(200.0));
        assert_eq!(z.range(0, -1, false).len(), 1);
    }

    #[test]
    fn test_rank() {
        let z = zset(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]);
        assert_eq!(z.rank(b"a"), Some(0));
        assert_eq!(z.rank(b"c"), Some(2));
        assert_eq!(z.rev_rank(b"c"), Some(0));
        assert_eq!(z.rev_rank(b"a"), Some(2));
        assert_eq!(z.rank(b"missing"), None);
    }

    #[test]
    fn test_range_by_score() {
        let z = zset(&[("p1", 600.0), ("p2", 700.0), ("p3", 800.0), ("p4", 900.0), ("p5", 1000.0)]);
        assert_eq!(members(z.range_by_score(700.0, 900.0)), vec!["p2", "p3", "p4"]);
        assert_eq!(z.range_by_score(f64::NEG_INFINITY, f64::INFINITY).len(), 5);
        assert!(z.range_by_score(950.0, 800.0).is_empty());
    }

    #[test]
    fn test_incr_by_moves_member() {
        let mut z = zset(&[("a", 1.0), ("b", 2.0)]);
        assert_eq!(z.incr_by(Bytes::from_static(b"a"), 5.0).unwrap(), 6.0);
        assert_eq!(z.rank(b"a"), Some(1));
        assert_eq!(z.incr_by(Bytes::from_static(b"new"), 0.5).unwrap(), 0.5);
        assert_eq!(z.rank(b"new"), Some(0));

        let mut inf = zset(&[("x", f64::INFINITY)]);
        assert!(matches!(
            inf.incr_by(Bytes::from_static(b"x"), f64::NEG_INFINITY),
            Err(MnemoError::NanScore)
        ));
        assert_eq!(inf.score(b"x"), Some(f64::INFINITY));
    }

    #[test]
    fn test_many_score_updates_stay_ordered() {
        let mut z = SortedSetValue::new();
        for i in 0..10_000 {
            z.insert(Bytes::from(format!("m{i}")), (10_000 - i) as f64);
        }
        for i in (0..10_000).step_by(2) {
            z.insert(Bytes::from(format!("m{i}")), -(i as f64));
        }
        assert_eq!(z.len(), 10_000);
        assert_eq!(z.iter().count(), 10_000);
        let scores: Vec<f64> = z.iter().map(|(_, s)| s).collect();
        assert!(scores.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(z.rank(b"m9998"), Some(0));
        assert_eq!(z.rev_rank(b"m1"), Some(0));
        assert_eq!(members(z.range_by_score(-2.0, 0.0)), vec!["m2", "m0"]);
    }

    #[test]
    fn test_remove() {
        let mut z = zset(&[("a", 1.0), ("b", 2.0)]);
        assert!(z.remove(b"a"));
        assert!(!z.remove(b"a"));
        assert_eq!(z.rank(b"b"), Some(0));
        assert_eq!(z.iter().count(), 1);
    }
}
