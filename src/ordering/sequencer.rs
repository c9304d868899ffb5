use tracing::{debug, trace, warn};

use crate::messaging::membership::ProcessId;
use crate::messaging::wire::{AckMessage, SeqMessage};
use crate::ordering::pending_queue::{AckPhase, PendingQueue};
use crate::ordering::ProtocolError;

/// Collects acks for messages originated by `myself` and decides their final sequence numbers.
///
/// Every host in the membership (including the origin itself) acks every message exactly once,
///  and the final sequence number is the maximum of all proposals. There is no timeout: a message
///  with a missing ack never gets a final sequence number.
pub struct Sequencer {
    myself: ProcessId,
    num_hosts: usize,
}

impl Sequencer {
    pub fn new(myself: ProcessId, num_hosts: usize) -> Sequencer {
        Sequencer {
            myself,
            num_hosts,
        }
    }

    /// Registers an ack with the matching queue entry. Returns the Seq message to broadcast once
    ///  the last outstanding ack is counted, `None` while acks are still missing.
    pub fn on_ack(&self, queue: &mut PendingQueue, ack: &AckMessage) -> Result<Option<SeqMessage>, ProtocolError> {
        if ack.sender != self.myself {
            return Err(ProtocolError::NotOrigin { sender: ack.sender, msg_id: ack.msg_id });
        }

        let entry = queue.find_mut(ack.sender, ack.msg_id)
            .ok_or(ProtocolError::UnknownMessage { sender: ack.sender, msg_id: ack.msg_id })?;

        if entry.ack_phase == AckPhase::SeqBroadcast {
            warn!(msg_id = ack.msg_id, proposer = ack.proposer, "received ack after final sequence number was decided - ignoring");
            return Ok(None);
        }

        entry.acks_received += 1;
        // the first proposer of the maximum keeps it: ties do not replace
        if ack.proposed_seq > entry.final_seq {
            entry.final_seq = ack.proposed_seq;
            entry.final_seq_proposer = ack.proposer;
        }
        trace!(msg_id = ack.msg_id, proposer = ack.proposer, proposed_seq = ack.proposed_seq, acks_received = entry.acks_received, "counted ack");

        if entry.acks_received < self.num_hosts {
            return Ok(None);
        }

        entry.ack_phase = AckPhase::SeqBroadcast;
        debug!(msg_id = ack.msg_id, final_seq = entry.final_seq, proposer = entry.final_seq_proposer, "all acks received");

        // NB: the Seq message names the origin as proposer, not the process that proposed the
        //      winning sequence number
        Ok(Some(SeqMessage {
            sender: entry.message.sender,
            msg_id: entry.message.msg_id,
            final_seq: entry.final_seq,
            final_seq_proposer: self.myself,
        }))
    }
}
