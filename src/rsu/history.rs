//! Per-sender sequence-number dedup cache (§3, §4.3).
//!
//! Bounded FIFO: only the latest seqno per source is kept, oldest entry
//! evicted once more than `MAX_HISTORY_SIZE` sources are tracked. A plain
//! `HashMap` has no eviction order of its own, so insertion order is
//! tracked alongside it explicitly.

use std::collections::VecDeque;

use crate::node_id::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HistoryEntry {
    source_id: NodeId,
    last_seqno: u8,
}

/// The RSU dedup window (§3 "RSU history entry").
pub struct History {
    capacity: usize,
    entries: VecDeque<HistoryEntry>,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        History {
            capacity,
            entries: VecDeque::new(),
        }
    }

    /// Returns `true` iff the history already has an entry for `source` with
    /// exactly `seqno`.
    pub fn check(&self, source: NodeId, seqno: u8) -> bool {
        self.entries
            .iter()
            .any(|e| e.source_id == source && e.last_seqno == seqno)
    }

    /// Record `(source, seqno)`, replacing any prior entry for `source`
    /// (only the latest seqno per source is retained) and evicting the
    /// oldest entry if the cache is now over capacity.
    pub fn add(&mut self, source: NodeId, seqno: u8) {
        self.entries.retain(|e| e.source_id != source);
        self.entries.push_back(HistoryEntry {
            source_id: source,
            last_seqno: seqno,
        });
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// P3: no second delivery of the same (source, seqno) pair.
    #[test]
    fn dedup_detects_repeat() {
        let mut h = History::new(30);
        assert!(!h.check(NodeId(1), 7));
        h.add(NodeId(1), 7);
        assert!(h.check(NodeId(1), 7));
        assert!(!h.check(NodeId(1), 8));
    }

    #[test]
    fn only_latest_seqno_per_source_kept() {
        let mut h = History::new(30);
        h.add(NodeId(1), 1);
        h.add(NodeId(1), 2);
        assert!(!h.check(NodeId(1), 1));
        assert!(h.check(NodeId(1), 2));
        assert_eq!(h.entries.len(), 1);
    }

    #[test]
    fn capacity_evicts_oldest_source() {
        let mut h = History::new(2);
        h.add(NodeId(1), 0);
        h.add(NodeId(2), 0);
        h.add(NodeId(3), 0);
        assert!(!h.check(NodeId(1), 0));
        assert!(h.check(NodeId(2), 0));
        assert!(h.check(NodeId(3), 0));
    }
}
