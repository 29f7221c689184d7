//! Bounded, time-ordered record logs

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::time::Duration;

/// Records carrying the time they were produced
pub trait Timestamped {
    fn timestamp(&self) -> DateTime<Utc>;
}

/// FIFO with a fixed capacity; the oldest entry is evicted first
#[derive(Debug)]
pub struct BoundedLog<T> {
    capacity: usize,
    entries: RwLock<VecDeque<T>>,
}

impl<T: Clone + Timestamped> BoundedLog<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an entry, returning the one evicted to make room
    pub fn push(&self, entry: T) -> Option<T> {
        let mut entries = self.entries.write();
        let evicted = if entries.len() >= self.capacity {
            entries.pop_front()
        } else {
            None
        };
        entries.push_back(entry);
        evicted
    }

    /// Entries newer than `window` (all when `None`) that satisfy `filter`,
    /// most recent first, at most `limit`
    pub fn recent<F>(&self, window: Option<Duration>, limit: usize, filter: F) -> Vec<T>
    where
        F: Fn(&T) -> bool,
    {
        let cutoff = window
            .and_then(|w| chrono::Duration::from_std(w).ok())
            .map(|w| Utc::now() - w);
        self.entries
            .read()
            .iter()
            .rev()
            .filter(|e| cutoff.map_or(true, |c| e.timestamp() >= c))
            .filter(|e| filter(e))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Entry {
        n: u32,
        at: DateTime<Utc>,
    }

    impl Timestamped for Entry {
        fn timestamp(&self) -> DateTime<Utc> {
            self.at
        }
    }

    fn entry(n: u32) -> Entry {
        Entry { n, at: Utc::now() }
    }

    #[test]
    fn test_evicts_oldest_at_capacity() {
        let log = BoundedLog::new(3);
        for n in 0..3 {
            assert!(log.push(entry(n)).is_none());
        }
        let evicted = log.push(entry(3)).unwrap();
        assert_eq!(evicted.n, 0);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_recent_is_newest_first_and_limited() {
        let log = BoundedLog::new(10);
        for n in 0..5 {
            log.push(entry(n));
        }
        let got: Vec<u32> = log.recent(None, 2, |_| true).iter().map(|e| e.n).collect();
        assert_eq!(got, vec![4, 3]);
        let even: Vec<u32> = log
            .recent(None, usize::MAX, |e| e.n % 2 == 0)
            .iter()
            .map(|e| e.n)
            .collect();
        assert_eq!(even, vec![4, 2, 0]);
    }

    #[test]
    fn test_window_excludes_old_entries() {
        let log = BoundedLog::new(10);
        log.push(Entry {
            n: 0,
            at: Utc::now() - chrono::Duration::hours(2),
        });
        log.push(entry(1));
        let got = log.recent(Some(Duration::from_secs(3600)), usize::MAX, |_| true);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].n, 1);
        log.clear();
        assert!(log.is_empty());
    }
}
