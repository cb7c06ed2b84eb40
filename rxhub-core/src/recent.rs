//! Recent-entries cache: bounded, most-recently-touched first.
//!
//! Each protocol view keeps one of these, keyed by whatever identifies an
//! emitter (MMSI, ICAO address, sensor id). A packet for a known key moves
//! that entry to the front and updates it; a packet for a new key inserts
//! at the front and evicts from the back once the cache exceeds capacity.
//!
//! ```text
//!   on_packet(3)       front                     back
//!   before:            [4] [3] [2]
//!   after:             [3] [4] [2]
//!   on_packet(5):      [5] [3] [4]   ([2] evicted)
//! ```

use std::collections::VecDeque;
use std::fmt::Debug;
use std::ops::Range;

pub const DEFAULT_MAX_ENTRIES: usize = 64;

// ---------------------------------------------------------------------------
// Entry traits
// ---------------------------------------------------------------------------

pub trait Keyed {
    type Key: Copy + PartialEq + Debug;

    fn key(&self) -> Self::Key;
}

/// Construct a fresh entry for a key seen for the first time.
pub trait FromKey: Keyed {
    fn from_key(key: Self::Key) -> Self;
}

pub trait Updatable<P> {
    fn update(&mut self, packet: &P);
}

/// Entries that go stale over time.
pub trait Aging {
    /// Advance the entry's age by `seconds`.
    fn tick(&mut self, seconds: u32);

    fn is_expired(&self) -> bool;
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RecentEntries<E> {
    entries: VecDeque<E>,
    capacity: usize,
}

impl<E> Default for RecentEntries<E> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl<E> RecentEntries<E> {
    /// # Panics
    /// If `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "recent entries capacity must be non-zero");
        RecentEntries {
            entries: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most recently touched entry.
    ///
    /// # Panics
    /// If the cache is empty.
    pub fn front(&self) -> &E {
        self.entries
            .front()
            .unwrap_or_else(|| panic!("front() on empty recent entries"))
    }

    pub fn front_mut(&mut self) -> &mut E {
        self.entries
            .front_mut()
            .unwrap_or_else(|| panic!("front() on empty recent entries"))
    }

    /// Least recently touched entry; next to be evicted.
    pub fn back(&self) -> Option<&E> {
        self.entries.back()
    }

    pub fn get(&self, index: usize) -> Option<&E> {
        self.entries.get(index)
    }

    /// Front to back.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &E> + ExactSizeIterator {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drop entries past `max` from the back.
    pub fn truncate(&mut self, max: usize) {
        self.entries.truncate(max);
    }

    /// Reorder by `compare`. Stable: equal entries keep their recency order.
    pub fn sort_by<F>(&mut self, compare: F)
    where
        F: FnMut(&E, &E) -> std::cmp::Ordering,
    {
        self.entries.make_contiguous().sort_by(compare);
    }

    pub fn sort_by_key<K: Ord, F: FnMut(&E) -> K>(&mut self, f: F) {
        self.entries.make_contiguous().sort_by_key(f);
    }

    pub fn retain<F: FnMut(&E) -> bool>(&mut self, f: F) {
        self.entries.retain(f);
    }

    /// Apply `f` to every entry without changing the order.
    pub fn set_all<F: FnMut(&mut E)>(&mut self, f: F) {
        self.entries.iter_mut().for_each(f);
    }

    /// Pagination window around `index`.
    ///
    /// Walks back from `index` up to `count / 2` entries (stopping at the
    /// front), then forward from `index` until the window holds `count`
    /// entries (stopping at the back). Near either edge the window is
    /// clamped and may be shorter than `count`.
    pub fn range_around(&self, index: usize, count: usize) -> Range<usize> {
        let len = self.entries.len();
        let item = index.min(len);

        let mut start = item;
        let mut taken = 0;
        while start > 0 && taken < count / 2 {
            start -= 1;
            taken += 1;
        }

        let mut end = item;
        while end < len && taken < count {
            end += 1;
            taken += 1;
        }

        start..end
    }

    /// Entries in [`range_around`](Self::range_around), front to back.
    pub fn window(&self, index: usize, count: usize) -> impl Iterator<Item = &E> {
        let range = self.range_around(index, count);
        self.entries.range(range)
    }
}

impl<E: Keyed> RecentEntries<E> {
    pub fn position(&self, key: E::Key) -> Option<usize> {
        self.entries.iter().position(|e| e.key() == key)
    }

    /// Look up without touching recency.
    pub fn find(&self, key: E::Key) -> Option<&E> {
        self.entries.iter().find(|e| e.key() == key)
    }

    pub fn find_mut(&mut self, key: E::Key) -> Option<&mut E> {
        self.entries.iter_mut().find(|e| e.key() == key)
    }

    /// Move the entry for `key` to the front (creating it if unseen), then
    /// update it with `packet`.
    pub fn on_packet<P>(&mut self, key: E::Key, packet: &P) -> &mut E
    where
        E: FromKey + Updatable<P>,
    {
        match self.position(key) {
            Some(0) => {}
            Some(i) => {
                if let Some(entry) = self.entries.remove(i) {
                    self.entries.push_front(entry);
                }
            }
            None => {
                self.entries.push_front(E::from_key(key));
                if self.entries.len() > self.capacity {
                    self.entries.pop_back();
                }
            }
        }

        let entry = self.front_mut();
        entry.update(packet);
        entry
    }
}

impl<E: Aging> RecentEntries<E> {
    pub fn tick_all(&mut self, seconds: u32) {
        self.set_all(|e| e.tick(seconds));
    }

    /// Returns how many entries were removed.
    pub fn remove_expired(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| !e.is_expired());
        before - self.entries.len()
    }
}

impl<'a, E> IntoIterator for &'a RecentEntries<E> {
    type Item = &'a E;
    type IntoIter = std::collections::vec_deque::Iter<'a, E>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
