use crate::messaging::membership::ProcessId;
use crate::messaging::wire::DataMessage;

/// Progress of ack collection for a message, tracked only at the message's origin
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AckPhase {
    AwaitingAcks,
    SeqBroadcast,
}

/// A data message that was received but not yet delivered, together with its ordering state
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PendingEntry {
    pub message: DataMessage,
    /// set when the message's Seq message is processed, never reset afterwards
    pub deliverable: bool,
    /// at the origin, the highest proposal so far; everywhere, the agreed value once deliverable
    pub final_seq: u32,
    pub final_seq_proposer: ProcessId,
    pub acks_received: usize,
    pub ack_phase: AckPhase,
}

impl PendingEntry {
    pub fn new(message: DataMessage) -> PendingEntry {
        PendingEntry {
            message,
            deliverable: false,
            final_seq: 0,
            final_seq_proposer: 0,
            acks_received: 0,
            ack_phase: AckPhase::AwaitingAcks,
        }
    }

    pub fn is_for(&self, sender: ProcessId, msg_id: u32) -> bool {
        self.message.sender == sender && self.message.msg_id == msg_id
    }
}

/// In-flight messages in the order they were received by this process. The queue is the sole
///  owner of its entries, and [PendingQueue::remove] is the only way an entry leaves it.
///
/// Lookups are linear: the queue only holds messages that are in flight.
#[derive(Debug, Default)]
pub struct PendingQueue {
    entries: Vec<PendingEntry>,
}

impl PendingQueue {
    pub fn new() -> PendingQueue {
        Default::default()
    }

    /// Appends a new entry for `message`. Returns `false` without changing the queue if an entry
    ///  for the same `(sender, msg_id)` is already present.
    pub fn insert(&mut self, message: DataMessage) -> bool {
        if self.find(message.sender, message.msg_id).is_some() {
            return false;
        }
        self.entries.push(PendingEntry::new(message));
        true
    }

    pub fn find(&self, sender: ProcessId, msg_id: u32) -> Option<&PendingEntry> {
        self.entries.iter()
            .find(|e| e.is_for(sender, msg_id))
    }

    pub fn find_mut(&mut self, sender: ProcessId, msg_id: u32) -> Option<&mut PendingEntry> {
        self.entries.iter_mut()
            .find(|e| e.is_for(sender, msg_id))
    }

    pub fn remove(&mut self, sender: ProcessId, msg_id: u32) -> Option<PendingEntry> {
        let idx = self.entries.iter()
            .position(|e| e.is_for(sender, msg_id))?;
        Some(self.entries.remove(idx))
    }

    /// entries in queue order
    pub fn iter(&self) -> impl Iterator<Item = &PendingEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Visits all entries in queue order, removing (and returning) those for which `f` returns
    ///  `true`. Removed entries are returned in the order they were visited.
    pub(crate) fn drain_in_order(&mut self, mut f: impl FnMut(&mut PendingEntry) -> bool) -> Vec<PendingEntry> {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.entries.len());
        for mut entry in self.entries.drain(..) {
            if f(&mut entry) {
                removed.push(entry);
            }
            else {
                kept.push(entry);
            }
        }
        self.entries = kept;
        removed
    }

    /// Removes the longest prefix of entries that are all deliverable
    pub(crate) fn drain_deliverable_prefix(&mut self) -> Vec<PendingEntry> {
        let prefix_len = self.entries.iter()
            .take_while(|e| e.deliverable)
            .count();
        self.entries.drain(..prefix_len).collect()
    }
}
