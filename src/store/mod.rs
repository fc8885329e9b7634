pub mod clock;
pub mod entry;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use bytes::Bytes;
use dashmap::{DashMap, DashSet};
use parking_lot::{Mutex, MutexGuard};
use rand::seq::IteratorRandom;
use tracing::trace;

use crate::types::Value;
use clock::{Clock, SystemClock};
use entry::Entry;

pub type Key = Bytes;

/// Per-key lock cell. A slot is retired once its key has been removed from
/// the map; anyone who grabbed the `Arc` before that must look the key up
/// again.
#[derive(Debug, Default)]
struct Slot {
    entry: Option<Entry>,
    retired: bool,
}

type SlotRef = Arc<Mutex<Slot>>;

/// The keyspace: key → entry, with one mutex per key.
///
/// Lock order is map shard, then slot, then the volatile-key set. Nothing
/// waits on a map shard while holding a slot lock, so per-key work on
/// different keys never blocks each other and multi-key commands lock
/// their slots in sorted key order.
#[derive(Debug)]
pub struct Keyspace {
    slots: DashMap<Key, SlotRef>,
    /// Keys that currently carry an expiry, sampled by the reaper.
    volatile: DashSet<Key>,
    clock: Arc<dyn Clock>,
    lazy_expired: AtomicU64,
    active_expired: AtomicU64,
}

impl Default for Keyspace {
    fn default() -> Self {
        Keyspace::new(Arc::new(SystemClock))
    }
}

impl Keyspace {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Keyspace {
            slots: DashMap::new(),
            volatile: DashSet::new(),
            clock,
            lazy_expired: AtomicU64::new(0),
            active_expired: AtomicU64::new(0),
        }
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    fn slot(&self, key: &[u8]) -> Option<SlotRef> {
        self.slots.get(key).map(|r| Arc::clone(r.value()))
    }

    fn slot_or_create(&self, key: &Key) -> SlotRef {
        Arc::clone(self.slots.entry(key.clone()).or_default().value())
    }

    /// Drop the entry if it is past its expiry instant.
    fn expire_locked(&self, key: &[u8], slot: &mut Slot, now: Instant) -> bool {
        match &slot.entry {
            Some(entry) if entry.is_expired_at(now) => {
                slot.entry = None;
                self.volatile.remove(key);
                trace!(key = %String::from_utf8_lossy(key), "lazily expired");
                true
            }
            _ => false,
        }
    }

    /// Bring bookkeeping in line with the slot after a mutation. Returns
    /// true when the slot no longer holds anything and can be released.
    fn settle(&self, key: &Key, slot: &mut Slot) -> bool {
        if slot
            .entry
            .as_ref()
            .is_some_and(|e| e.value.is_empty_collection())
        {
            slot.entry = None;
        }
        match &slot.entry {
            Some(entry) if entry.expires_at.is_some() => {
                if !self.volatile.contains(key) {
                    self.volatile.insert(key.clone());
                }
                false
            }
            Some(_) => {
                self.volatile.remove(key);
                false
            }
            None => {
                self.volatile.remove(key);
                true
            }
        }
    }

    /// Remove an empty slot from the map. Must be called without holding
    /// any slot lock.
    fn release(&self, key: &[u8]) {
        self.slots.remove_if(key, |_, slot| {
            let mut slot = slot.lock();
            if slot.entry.is_none() {
                slot.retired = true;
                true
            } else {
                false
            }
        });
    }

    /// Run `f` against the current entry of `key` (expired entries read as
    /// absent).
    pub fn read<R>(&self, key: &[u8], f: impl FnOnce(Option<&Entry>) -> R) -> R {
        loop {
            let Some(slot) = self.slot(key) else {
                return f(None);
            };
            let mut guard = slot.lock();
            if guard.retired {
                continue;
            }
            if self.expire_locked(key, &mut guard, self.now()) {
                self.lazy_expired.fetch_add(1, Ordering::Relaxed);
            }
            let out = f(guard.entry.as_ref());
            let empty = guard.entry.is_none();
            drop(guard);
            if empty {
                self.release(key);
            }
            return out;
        }
    }

    /// Atomically read-modify-write the entry of `key`. `f` sees `None` when
    /// the key is absent and may create, replace or clear the entry. Empty
    /// collections left behind are deleted.
    pub fn update<R>(&self, key: &Key, f: impl FnOnce(&mut Option<Entry>) -> R) -> R {
        loop {
            let slot = self.slot_or_create(key);
            let mut guard = slot.lock();
            if guard.retired {
                continue;
            }
            if self.expire_locked(key, &mut guard, self.now()) {
                self.lazy_expired.fetch_add(1, Ordering::Relaxed);
            }
            let out = f(&mut guard.entry);
            let empty = self.settle(key, &mut guard);
            drop(guard);
            if empty {
                self.release(key);
            }
            return out;
        }
    }

    /// Lock every key in `keys` (sorted, deduplicated) and run `f` with a
    /// consistent view of all of them.
    pub fn with_locked<R>(&self, keys: &[Key], f: impl FnOnce(&mut LockedKeys<'_>) -> R) -> R {
        let mut sorted: Vec<Key> = keys.to_vec();
        sorted.sort();
        sorted.dedup();

        loop {
            let slots: Vec<SlotRef> = sorted.iter().map(|k| self.slot_or_create(k)).collect();
            let mut guards: Vec<MutexGuard<'_, Slot>> = slots.iter().map(|s| s.lock()).collect();
            if guards.iter().any(|g| g.retired) {
                continue;
            }

            let now = self.now();
            for (key, guard) in sorted.iter().zip(guards.iter_mut()) {
                if self.expire_locked(key, guard, now) {
                    self.lazy_expired.fetch_add(1, Ordering::Relaxed);
                }
            }

            let out = {
                let mut locked = LockedKeys {
                    keys: &sorted,
                    entries: guards.iter_mut().map(|g| &mut g.entry).collect(),
                };
                f(&mut locked)
            };

            let mut to_release = Vec::new();
            for (key, guard) in sorted.iter().zip(guards.iter_mut()) {
                if self.settle(key, guard) {
                    to_release.push(key);
                }
            }
            drop(guards);
            for key in to_release {
                self.release(key);
            }
            return out;
        }
    }

    pub fn get(&self, key: &[u8]) -> Option<Entry> {
        self.read(key, |entry| entry.cloned())
    }

    pub fn set(&self, key: Key, value: Value, expires_at: Option<Instant>) {
        self.update(&key, |slot| *slot = Some(Entry::with_expiry(value, expires_at)));
    }

    /// Delete `key`. The volatile index is only touched through a live
    /// slot, so a stale handle can never unregister a newer entry.
    pub fn remove(&self, key: &[u8]) -> bool {
        loop {
            let Some(slot) = self.slot(key) else {
                return false;
            };
            let mut guard = slot.lock();
            if guard.retired {
                continue;
            }
            self.expire_locked(key, &mut guard, self.now());
            let removed = guard.entry.take().is_some();
            self.volatile.remove(key);
            drop(guard);
            self.release(key);
            return removed;
        }
    }

    pub fn exists(&self, key: &[u8]) -> bool {
        self.read(key, |entry| entry.is_some())
    }

    /// Incremental, cursor-based key enumeration ordered by key hash.
    ///
    /// Cursor 0 starts a scan; a returned cursor of 0 ends it. Keys present
    /// for the whole scan are returned at least once; keys sharing a hash
    /// are always returned in the same page.
    pub fn scan(
        &self,
        cursor: u64,
        count: usize,
        filter: impl Fn(&Key, &Entry) -> bool,
    ) -> (u64, Vec<Key>) {
        let mut candidates: Vec<(u64, Key)> = self
            .slots
            .iter()
            .map(|r| (scan_hash(r.key()), r.key().clone()))
            .filter(|(h, _)| *h >= cursor)
            .collect();
        candidates.sort_unstable();

        let mut end = count.max(1).min(candidates.len());
        while end > 0 && end < candidates.len() && candidates[end].0 == candidates[end - 1].0 {
            end += 1;
        }
        let next = candidates.get(end).map_or(0, |(h, _)| *h);

        let keys = candidates
            .into_iter()
            .take(end)
            .filter(|(_, key)| self.read(key, |entry| entry.is_some_and(|e| filter(key, e))))
            .map(|(_, key)| key)
            .collect();
        (next, keys)
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let slots: Vec<(Key, SlotRef)> = self
            .slots
            .iter()
            .map(|r| (r.key().clone(), Arc::clone(r.value())))
            .collect();
        let now = self.now();
        slots
            .iter()
            .filter(|(_, slot)| {
                slot.lock()
                    .entry
                    .as_ref()
                    .is_some_and(|e| !e.is_expired_at(now))
            })
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys physically held, including expired ones not yet reaped.
    pub fn resident_len(&self) -> usize {
        self.slots.len()
    }

    /// Keys that carry an expiry.
    pub fn volatile_len(&self) -> usize {
        self.volatile.len()
    }

    /// Remove every key. Returns how many were resident.
    pub fn flush(&self) -> usize {
        let mut removed = 0;
        self.slots.retain(|_, slot| {
            let mut slot = slot.lock();
            if slot.entry.take().is_some() {
                removed += 1;
            }
            slot.retired = true;
            false
        });
        self.volatile.clear();
        removed
    }

    /// Pick up to `n` random keys that carry an expiry.
    pub fn sample_volatile(&self, n: usize) -> Vec<Key> {
        let mut rng = rand::thread_rng();
        self.volatile
            .iter()
            .map(|r| r.key().clone())
            .choose_multiple(&mut rng, n)
    }

    /// Remove `key` if it is past its expiry. Used by the reaper, under the
    /// same per-key lock as every other writer.
    pub fn expire_if_due(&self, key: &[u8]) -> bool {
        let Some(slot) = self.slot(key) else {
            self.volatile.remove(key);
            return false;
        };
        let mut guard = slot.lock();
        if guard.retired {
            return false;
        }
        let expired = self.expire_locked(key, &mut guard, self.now());
        let empty = guard.entry.is_none();
        drop(guard);
        if empty {
            self.release(key);
        }
        if expired {
            self.active_expired.fetch_add(1, Ordering::Relaxed);
        }
        expired
    }

    pub fn lazy_expired(&self) -> u64 {
        self.lazy_expired.load(Ordering::Relaxed)
    }

    pub fn active_expired(&self) -> u64 {
        self.active_expired.load(Ordering::Relaxed)
    }
}

fn scan_hash(key: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

/// The entries of a locked key set, handed to multi-key commands.
pub struct LockedKeys<'a> {
    keys: &'a [Key],
    entries: Vec<&'a mut Option<Entry>>,
}

impl LockedKeys<'_> {
    fn position(&self, key: &[u8]) -> Option<usize> {
        self.keys.binary_search_by(|k| k[..].cmp(key)).ok()
    }

    pub fn get(&self, key: &[u8]) -> Option<&Entry> {
        self.position(key).and_then(|i| self.entries[i].as_ref())
    }

    pub fn take(&mut self, key: &[u8]) -> Option<Entry> {
        self.position(key).and_then(|i| self.entries[i].take())
    }

    /// Store `entry` under `key`. `key` must be one of the locked keys.
    pub fn put(&mut self, key: &[u8], entry: Entry) -> bool {
        match self.position(key) {
            Some(i) => {
                *self.entries[i] = Some(entry);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::types::string::StringValue;
    use clock::ManualClock;

    fn string(s: &'static str) -> Value {
        Value::String(StringValue::new(Bytes::from_static(s.as_bytes())))
    }

    fn manual() -> (Arc<ManualClock>, Keyspace) {
        let clock = Arc::new(ManualClock::new());
        let ks = Keyspace::new(clock.clone());
        (clock, ks)
    }

    #[test]
    fn test_set_get_remove() {
        let ks = Keyspace::default();
        ks.set(Bytes::from_static(b"k"), string("v"), None);
        assert!(ks.exists(b"k"));
        let entry = ks.get(b"k").unwrap();
        assert_eq!(entry.value.as_string().unwrap().as_bytes(), "v");
        assert!(ks.remove(b"k"));
        assert!(!ks.remove(b"k"));
        assert!(!ks.exists(b"k"));
        assert_eq!(ks.resident_len(), 0);
    }

    #[test]
    fn test_lazy_expiry() {
        let (clock, ks) = manual();
        let expires = ks.now() + Duration::from_secs(5);
        ks.set(Bytes::from_static(b"k"), string("v"), Some(expires));
        assert_eq!(ks.volatile_len(), 1);
        assert!(ks.exists(b"k"));

        clock.advance(Duration::from_secs(5));
        assert_eq!(ks.resident_len(), 1);
        assert!(!ks.exists(b"k"));
        assert_eq!(ks.resident_len(), 0);
        assert_eq!(ks.volatile_len(), 0);
        assert_eq!(ks.lazy_expired(), 1);
    }

    #[test]
    fn test_expire_if_due() {
        let (clock, ks) = manual();
        let expires = ks.now() + Duration::from_millis(100);
        ks.set(Bytes::from_static(b"a"), string("1"), Some(expires));
        ks.set(Bytes::from_static(b"b"), string("2"), None);
        assert!(!ks.expire_if_due(b"a"));
        clock.advance(Duration::from_millis(100));
        assert_eq!(ks.sample_volatile(20), vec![Bytes::from_static(b"a")]);
        assert!(ks.expire_if_due(b"a"));
        assert_eq!(ks.active_expired(), 1);
        assert_eq!(ks.resident_len(), 1);
        assert_eq!(ks.len(), 1);
    }

    #[test]
    fn test_update_failed_write_leaves_nothing() {
        let ks = Keyspace::default();
        let key = Bytes::from_static(b"k");
        let res: Result<(), ()> = ks.update(&key, |_| Err(()));
        assert!(res.is_err());
        assert_eq!(ks.resident_len(), 0);
    }

    #[test]
    fn test_with_locked_moves_entry() {
        let ks = Keyspace::default();
        ks.set(Bytes::from_static(b"src"), string("v"), None);
        let keys = [Bytes::from_static(b"src"), Bytes::from_static(b"dst")];
        let moved = ks.with_locked(&keys, |locked| match locked.take(b"src") {
            Some(entry) => locked.put(b"dst", entry),
            None => false,
        });
        assert!(moved);
        assert!(!ks.exists(b"src"));
        assert!(ks.exists(b"dst"));
        assert_eq!(ks.resident_len(), 1);
    }

    #[test]
    fn test_scan_visits_every_key() {
        let ks = Keyspace::default();
        for i in 0..100 {
            ks.set(Bytes::from(format!("key:{i}")), string("v"), None);
        }
        let mut seen = HashSet::new();
        let mut cursor = 0;
        let mut rounds = 0;
        loop {
            let (next, keys) = ks.scan(cursor, 7, |_, _| true);
            seen.extend(keys);
            rounds += 1;
            if next == 0 {
                break;
            }
            assert!(next > cursor);
            cursor = next;
        }
        assert_eq!(seen.len(), 100);
        assert!(rounds >= 100 / 7);
    }

    #[test]
    fn test_flush() {
        let ks = Keyspace::default();
        ks.set(Bytes::from_static(b"a"), string("1"), None);
        ks.set(Bytes::from_static(b"b"), string("2"), Some(ks.now() + Duration::from_secs(60)));
        assert_eq!(ks.flush(), 2);
        assert!(ks.is_empty());
        assert_eq!(ks.volatile_len(), 0);
    }

    /// Every live entry with an expiry must be in the volatile index.
    fn assert_volatile_consistent(ks: &Keyspace) {
        for r in ks.slots.iter() {
            let slot = r.value().lock();
            if slot.entry.as_ref().is_some_and(|e| e.expires_at.is_some()) {
                assert!(ks.volatile.contains(r.key()), "{:?} missing from volatile", r.key());
            }
        }
    }

    #[test]
    fn test_racing_delete_keeps_volatile_index() {
        let ks = Arc::new(Keyspace::default());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let ks = Arc::clone(&ks);
                thread::spawn(move || {
                    for i in 0..2000 {
                        let key = Bytes::from(format!("k{}", i % 4));
                        if (i + t) % 2 == 0 {
                            ks.remove(&key);
                        } else {
                            let at = ks.now() + Duration::from_secs(60);
                            ks.set(key, string("v"), Some(at));
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_volatile_consistent(&ks);
    }

    #[test]
    fn test_removed_slot_is_retired() {
        let ks = Keyspace::default();
        let at = ks.now() + Duration::from_secs(60);
        ks.set(Bytes::from_static(b"k"), string("v"), Some(at));
        let old = ks.slot(b"k").unwrap();
        assert!(ks.remove(b"k"));
        assert!(old.lock().retired);

        ks.set(Bytes::from_static(b"k"), string("v2"), Some(at));
        assert!(!Arc::ptr_eq(&old, &ks.slot(b"k").unwrap()));
        assert_eq!(ks.volatile_len(), 1);
        assert_volatile_consistent(&ks);
    }

    #[test]
    fn test_concurrent_updates_same_key() {
        let ks = Arc::new(Keyspace::default());
        let key = Bytes::from_static(b"counter");
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ks = Arc::clone(&ks);
                let key = key.clone();
                thread::spawn(move || {
                    for _ in 0..500 {
                        ks.update(&key, |slot| {
                            let value = entry::value_or_insert_with(slot, || {
                                Value::String(StringValue::from_i64(0))
                            });
                            value.as_string_mut().unwrap().incr_by(1).unwrap();
                        });
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let entry = ks.get(b"counter").unwrap();
        assert_eq!(entry.value.as_string().unwrap().as_i64(), Some(4000));
    }
}
