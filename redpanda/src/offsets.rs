//! Per-partition commit positions for one subscription.
//!
//! Deliveries may be settled in any order (the listener host handles several
//! records of a queue concurrently), but a Kafka commit covers every offset
//! below it. [`OffsetLedger`] therefore only ever commits up to the lowest
//! offset that is still in flight or was refused:
//!
//! ```text
//! offsets   5     6     7     8
//!           nack  ack   ack   (in flight)
//! commit ─► 5                  held back by the refused record
//! ```
//!
//! A refused record that was not forwarded to a dead-letter topic holds its
//! partition's commit position for the lifetime of the consumer, so the
//! record and everything after it is redelivered after a restart or
//! rebalance.

use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default)]
struct PartitionOffsets {
    /// Position the group is known to be at (next offset to read).
    committed: i64,
    in_flight: BTreeSet<i64>,
    refused: BTreeSet<i64>,
    highest_settled: Option<i64>,
    last_tracked: Option<i64>,
}

impl PartitionOffsets {
    fn starting_at(offset: i64) -> Self {
        Self {
            committed: offset,
            ..Self::default()
        }
    }

    /// Next commit position, if it moved forward.
    fn advance(&mut self) -> Option<i64> {
        let blocked = [self.in_flight.first(), self.refused.first()]
            .into_iter()
            .flatten()
            .min()
            .copied();
        let position = match (blocked, self.highest_settled) {
            (Some(offset), _) => offset,
            (None, Some(settled)) => settled + 1,
            (None, None) => return None,
        };

        if position > self.committed {
            self.committed = position;
            Some(position)
        } else {
            None
        }
    }
}

/// Settlement bookkeeping for the partitions of one consumer.
#[derive(Debug, Default)]
pub(crate) struct OffsetLedger {
    partitions: BTreeMap<i32, PartitionOffsets>,
}

impl OffsetLedger {
    /// Record that `offset` of `partition` was handed out.
    ///
    /// Offsets of a partition arrive in increasing order; one that does not
    /// means the consumer was rewound (rebalance or seek) and the partition
    /// starts over from it.
    pub(crate) fn track(&mut self, partition: i32, offset: i64) {
        let entry = self
            .partitions
            .entry(partition)
            .or_insert_with(|| PartitionOffsets::starting_at(offset));
        if entry.last_tracked.is_some_and(|last| offset <= last) {
            *entry = PartitionOffsets::starting_at(offset);
        }
        entry.last_tracked = Some(offset);
        entry.in_flight.insert(offset);
    }

    /// Mark `offset` as processed. Returns the new commit position if it
    /// moved forward.
    pub(crate) fn settle(&mut self, partition: i32, offset: i64) -> Option<i64> {
        let entry = self.partitions.get_mut(&partition)?;
        if !entry.in_flight.remove(&offset) {
            return None;
        }
        entry.highest_settled = entry.highest_settled.max(Some(offset));
        entry.advance()
    }

    /// Mark `offset` as refused. The partition is never committed past it.
    pub(crate) fn refuse(&mut self, partition: i32, offset: i64) {
        let Some(entry) = self.partitions.get_mut(&partition) else {
            return;
        };
        if entry.in_flight.remove(&offset) {
            entry.refused.insert(offset);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_order_acks_commit_the_next_offset() {
        let mut ledger = OffsetLedger::default();
        ledger.track(0, 5);
        ledger.track(0, 6);

        assert_eq!(ledger.settle(0, 5), Some(6));
        assert_eq!(ledger.settle(0, 6), Some(7));
    }

    #[test]
    fn refused_record_blocks_later_commits_on_its_partition() {
        let mut ledger = OffsetLedger::default();
        ledger.track(0, 5);
        ledger.track(0, 6);

        ledger.refuse(0, 5);
        assert_eq!(ledger.settle(0, 6), None);

        ledger.track(0, 7);
        assert_eq!(ledger.settle(0, 7), None);
    }

    #[test]
    fn out_of_order_acks_wait_for_the_lowest_in_flight_offset() {
        let mut ledger = OffsetLedger::default();
        ledger.track(0, 5);
        ledger.track(0, 6);
        ledger.track(0, 7);

        assert_eq!(ledger.settle(0, 6), None);
        assert_eq!(ledger.settle(0, 7), None);
        assert_eq!(ledger.settle(0, 5), Some(8));
    }

    #[test]
    fn partitions_are_independent() {
        let mut ledger = OffsetLedger::default();
        ledger.track(0, 5);
        ledger.track(1, 40);

        ledger.refuse(0, 5);
        assert_eq!(ledger.settle(1, 40), Some(41));
    }

    #[test]
    fn rewound_partition_starts_over() {
        let mut ledger = OffsetLedger::default();
        ledger.track(0, 5);
        ledger.refuse(0, 5);
        ledger.track(0, 6);
        assert_eq!(ledger.settle(0, 6), None);

        // Redelivered after a rebalance.
        ledger.track(0, 5);
        assert_eq!(ledger.settle(0, 5), Some(6));
    }

    #[test]
    fn unknown_or_repeated_settlements_are_ignored() {
        let mut ledger = OffsetLedger::default();
        assert_eq!(ledger.settle(3, 1), None);

        ledger.track(0, 5);
        assert_eq!(ledger.settle(0, 5), Some(6));
        assert_eq!(ledger.settle(0, 5), None);
    }
}
