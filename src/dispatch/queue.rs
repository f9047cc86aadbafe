//! Priority queue over pending jobs.
//!
//! Entries order by `(tier, created_at, seq)`: EMERGENCY before LOW, then
//! oldest first, then allocation order. The queue holds job ids only. It
//! does not know job status; stale entries are discarded by
//! [`JobRegistry::pop_next_pending`](crate::dispatch::registry::JobRegistry::pop_next_pending),
//! which re-validates every popped entry.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::dispatch::job::{Job, JobId, PriorityTier};
use crate::error::DispatchError;

/// One queued reference to a job.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct QueueEntry {
    pub tier: PriorityTier,
    pub created_at: DateTime<Utc>,
    /// Allocation order, breaks ties between jobs created in the same instant.
    pub seq: u64,
    pub job_id: JobId,
}

impl QueueEntry {
    pub fn for_job(job: &Job) -> Self {
        Self {
            tier: job.priority,
            created_at: job.created_at,
            seq: job.id.seq().unwrap_or(u64::MAX),
            job_id: job.id.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct PriorityQueue {
    heap: BinaryHeap<Reverse<QueueEntry>>,
    queued: HashSet<JobId>,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry. Returns `false` (and changes nothing) if the job is
    /// already queued.
    pub fn push(&mut self, entry: QueueEntry) -> bool {
        if !self.queued.insert(entry.job_id.clone()) {
            return false;
        }
        self.heap.push(Reverse(entry));
        true
    }

    /// Remove and return the highest-priority, oldest entry.
    pub fn pop_highest(&mut self) -> Result<QueueEntry, DispatchError> {
        let Reverse(entry) = self.heap.pop().ok_or(DispatchError::Empty)?;
        self.queued.remove(&entry.job_id);
        Ok(entry)
    }

    /// The first `n` entries in pop order, without removing them.
    pub fn peek_top_n(&self, n: usize) -> Vec<QueueEntry> {
        let mut entries: Vec<QueueEntry> =
            self.heap.iter().map(|Reverse(e)| e.clone()).collect();
        entries.sort();
        entries.truncate(n);
        entries
    }

    /// Every entry in pop order.
    pub fn snapshot(&self) -> Vec<QueueEntry> {
        self.peek_top_n(self.heap.len())
    }

    pub fn contains(&self, job_id: &JobId) -> bool {
        self.queued.contains(job_id)
    }

    /// Number of entries, stale ones included.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(seq: u64, tier: PriorityTier, created_at: DateTime<Utc>) -> QueueEntry {
        QueueEntry {
            tier,
            created_at,
            seq,
            job_id: JobId::from_seq(seq),
        }
    }

    #[test]
    fn emergency_pops_before_earlier_routine_work() {
        let t0 = Utc::now();
        let mut q = PriorityQueue::new();
        q.push(entry(1, PriorityTier::Low, t0));
        q.push(entry(2, PriorityTier::Medium, t0 + Duration::seconds(1)));
        q.push(entry(3, PriorityTier::High, t0 + Duration::seconds(2)));
        q.push(entry(4, PriorityTier::Emergency, t0 + Duration::seconds(3)));

        let order: Vec<u64> = std::iter::from_fn(|| q.pop_highest().ok())
            .map(|e| e.seq)
            .collect();
        assert_eq!(order, vec![4, 3, 2, 1]);
    }

    #[test]
    fn fifo_within_tier() {
        let t0 = Utc::now();
        let mut q = PriorityQueue::new();
        for seq in 1..=3 {
            q.push(entry(seq, PriorityTier::Medium, t0 + Duration::seconds(seq as i64)));
        }
        assert_eq!(q.pop_highest().unwrap().seq, 1);
        assert_eq!(q.pop_highest().unwrap().seq, 2);
        assert_eq!(q.pop_highest().unwrap().seq, 3);
    }

    #[test]
    fn same_instant_breaks_on_seq() {
        let t0 = Utc::now();
        let mut q = PriorityQueue::new();
        q.push(entry(10, PriorityTier::High, t0));
        q.push(entry(9, PriorityTier::High, t0));
        assert_eq!(q.pop_highest().unwrap().seq, 9);
    }

    #[test]
    fn pop_empty_is_empty_error() {
        let mut q = PriorityQueue::new();
        assert!(matches!(q.pop_highest(), Err(DispatchError::Empty)));
    }

    #[test]
    fn push_is_idempotent_per_job() {
        let t0 = Utc::now();
        let mut q = PriorityQueue::new();
        assert!(q.push(entry(1, PriorityTier::Low, t0)));
        assert!(!q.push(entry(1, PriorityTier::Low, t0)));
        assert_eq!(q.len(), 1);
        q.pop_highest().unwrap();
        assert!(!q.contains(&JobId::from_seq(1)));
        assert!(q.push(entry(1, PriorityTier::Low, t0)));
    }

    #[test]
    fn peek_does_not_mutate() {
        let t0 = Utc::now();
        let mut q = PriorityQueue::new();
        q.push(entry(1, PriorityTier::Low, t0));
        q.push(entry(2, PriorityTier::Emergency, t0));
        q.push(entry(3, PriorityTier::High, t0));

        let top = q.peek_top_n(2);
        assert_eq!(top.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(q.len(), 3);
        assert_eq!(q.peek_top_n(10).len(), 3);
    }
}
