//! The outstanding local operation queue.
//!
//! Every local edit is queued with the version it was made against and a
//! per-session sequence number until the server acknowledges it. Incoming
//! server operations are transformed through the queue in order, and each
//! queued entry is replaced by its transformed counterpart so the queue
//! always applies cleanly on top of the latest server state.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use rt_ot::{Operation, TransformError, Transformer};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperation {
    sequence_number: u64,
    context_version: u64,
    operation: Operation,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    transmitted: bool,
    /// Nodes this edit detached locally. Server operations aimed at them
    /// are dropped while the edit is outstanding.
    #[serde(default)]
    detached: Vec<String>,
}

impl PendingOperation {
    pub fn new(sequence_number: u64, context_version: u64, operation: Operation, detached: Vec<String>) -> Self {
        Self {
            sequence_number,
            context_version,
            operation,
            timestamp: Utc::now(),
            transmitted: false,
            detached,
        }
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn context_version(&self) -> u64 {
        self.context_version
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn is_transmitted(&self) -> bool {
        self.transmitted
    }

    pub fn detached(&self) -> &[String] {
        &self.detached
    }
}

#[derive(Debug, Clone, Default)]
pub struct PendingQueue {
    entries: VecDeque<PendingOperation>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<PendingOperation>) -> Self {
        Self {
            entries: entries.into(),
        }
    }

    pub fn push(&mut self, entry: PendingOperation) {
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingOperation> {
        self.entries.iter()
    }

    pub fn front(&self) -> Option<&PendingOperation> {
        self.entries.front()
    }

    pub fn to_vec(&self) -> Vec<PendingOperation> {
        self.entries.iter().cloned().collect()
    }

    /// The sequence number the next local edit should take.
    pub fn next_sequence_number(&self) -> u64 {
        self.entries.back().map_or(1, |e| e.sequence_number + 1)
    }

    /// True if an outstanding edit detached `id`.
    pub fn detached(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.detached.iter().any(|d| d == id))
    }

    /// Remove the head of the queue, which must carry `seq` and must have
    /// been sent.
    pub fn acknowledge(&mut self, seq: u64) -> Result<PendingOperation, ProtocolError> {
        match self.entries.front() {
            Some(head) if head.sequence_number == seq && head.transmitted => {
                self.entries.pop_front().ok_or(ProtocolError::OutOfOrderAck {
                    expected: None,
                    actual: seq,
                })
            }
            head => Err(ProtocolError::OutOfOrderAck {
                expected: head.map(|h| h.sequence_number),
                actual: seq,
            }),
        }
    }

    /// Transform a server operation through every queued entry.
    ///
    /// Returns the server operation rewritten to apply on top of the local
    /// state. Entries not yet sent are rebased onto `version`; entries
    /// already sent keep their context, since the server transforms them
    /// itself. The queue is left untouched on error.
    pub fn transform_incoming(
        &mut self,
        transformer: &Transformer,
        incoming: Operation,
        version: u64,
    ) -> Result<Operation, TransformError> {
        let mut server = incoming;
        let mut next = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let pair = transformer.transform(&server, &entry.operation)?;
            server = pair.server;
            let mut entry = entry.clone();
            entry.operation = pair.client;
            if !entry.transmitted {
                entry.context_version = version;
            }
            next.push(entry);
        }
        self.entries = next.into();
        Ok(server)
    }

    /// Entries that still have to go out, in order.
    pub fn untransmitted(&self) -> impl Iterator<Item = &PendingOperation> {
        self.entries.iter().filter(|e| !e.transmitted)
    }

    pub fn mark_transmitted(&mut self, seq: u64) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.sequence_number == seq) {
            entry.transmitted = true;
        }
    }

    /// Renumber every entry from 1 against `version` and mark it unsent.
    pub fn rebase(&mut self, version: u64) {
        for (i, entry) in self.entries.iter_mut().enumerate() {
            entry.sequence_number = i as u64 + 1;
            entry.context_version = version;
            entry.transmitted = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rt_ot::DiscreteOperation;

    fn insert(index: usize, text: &str) -> Operation {
        DiscreteOperation::string_insert("s", index, text).into()
    }

    #[test]
    fn transforms_through_queue_in_order() {
        let mut queue = PendingQueue::new();
        queue.push(PendingOperation::new(1, 5, insert(0, "foo"), Vec::new()));
        queue.push(PendingOperation::new(2, 5, insert(3, "bar"), Vec::new()));
        queue.mark_transmitted(1);

        let server = DiscreteOperation::string_insert("s", 0, "XY").into();
        let out = queue.transform_incoming(&Transformer::default(), server, 6).unwrap();

        // The server's insert goes first on ties, so it still lands at 0.
        assert_eq!(out, insert(0, "XY"));
        let entries = queue.to_vec();
        assert_eq!(entries[0].operation(), &insert(2, "foo"));
        assert_eq!(entries[1].operation(), &insert(5, "bar"));
        assert_eq!(entries[0].context_version(), 5);
        assert_eq!(entries[1].context_version(), 6);
    }

    #[test]
    fn acks_must_match_sent_head() {
        let mut queue = PendingQueue::new();
        queue.push(PendingOperation::new(1, 0, insert(0, "a"), Vec::new()));
        queue.push(PendingOperation::new(2, 0, insert(1, "b"), Vec::new()));
        assert!(queue.acknowledge(1).is_err(), "unsent head");
        queue.mark_transmitted(1);
        queue.mark_transmitted(2);
        assert_eq!(
            queue.acknowledge(2),
            Err(ProtocolError::OutOfOrderAck {
                expected: Some(1),
                actual: 2
            })
        );
        assert_eq!(queue.acknowledge(1).unwrap().sequence_number(), 1);
        assert_eq!(queue.next_sequence_number(), 3);
    }

    #[test]
    fn rebase_renumbers_from_one() {
        let mut queue = PendingQueue::new();
        queue.push(PendingOperation::new(4, 2, insert(0, "a"), Vec::new()));
        queue.push(PendingOperation::new(5, 2, insert(1, "b"), Vec::new()));
        queue.mark_transmitted(4);
        queue.rebase(9);
        let seqs: Vec<_> = queue.iter().map(|e| (e.sequence_number(), e.context_version())).collect();
        assert_eq!(seqs, vec![(1, 9), (2, 9)]);
        assert_eq!(queue.untransmitted().count(), 2);
    }

    #[test]
    fn remembers_detached_ids() {
        let mut queue = PendingQueue::new();
        queue.push(PendingOperation::new(
            1,
            0,
            DiscreteOperation::array_remove("a", 0).into(),
            vec!["child".into()],
        ));
        assert!(queue.detached("child"));
        assert!(!queue.detached("a"));
    }
}
