use tracing::{debug, trace};

use crate::messaging::membership::ProcessId;
use crate::messaging::wire::SeqMessage;
use crate::ordering::pending_queue::{PendingEntry, PendingQueue};

/// A message handed to the application, in the agreed order
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct DeliveredMessage {
    pub sender: ProcessId,
    pub msg_id: u32,
    pub final_seq: u32,
    pub final_seq_proposer: ProcessId,
    pub payload: u32,
}

impl From<PendingEntry> for DeliveredMessage {
    fn from(entry: PendingEntry) -> Self {
        DeliveredMessage {
            sender: entry.message.sender,
            msg_id: entry.message.msg_id,
            final_seq: entry.final_seq,
            final_seq_proposer: entry.final_seq_proposer,
            payload: entry.message.payload,
        }
    }
}

/// Applies a Seq message to the queue, returning the messages that became deliverable in the
///  order they must be handed to the application.
///
/// In a single pass in queue order, every entry that was already deliverable and has a final
///  sequence number below the Seq message's is delivered, and the entry the Seq message refers to
///  is marked deliverable. Delivery follows queue order, it does *not* sort by final sequence
///  number. Afterwards, the deliverable prefix of the queue is delivered as well.
///
/// The prefix flush delivers a superset of what the threshold pass alone delivers. Without it, the
///  message a Seq refers to is never delivered by its own Seq, and the most recent message stays
///  in the queue until some later Seq arrives.
pub fn apply_seq(queue: &mut PendingQueue, seq: &SeqMessage) -> Vec<DeliveredMessage> {
    let mut matched = false;

    let mut delivered = queue.drain_in_order(|entry| {
        if entry.deliverable && entry.final_seq < seq.final_seq {
            trace!(sender = entry.message.sender, msg_id = entry.message.msg_id, final_seq = entry.final_seq, "below new sequence number");
            return true;
        }

        if entry.is_for(seq.sender, seq.msg_id) {
            entry.deliverable = true;
            entry.final_seq = seq.final_seq;
            entry.final_seq_proposer = seq.final_seq_proposer;
            matched = true;
        }
        false
    });

    if !matched {
        debug!(sender = seq.sender, msg_id = seq.msg_id, "Seq message for a message that is not in the queue");
    }

    delivered.extend(queue.drain_deliverable_prefix());

    delivered.into_iter()
        .map(DeliveredMessage::from)
        .collect()
}
