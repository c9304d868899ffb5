use tracing::{debug, trace};

use crate::messaging::membership::ProcessId;
use crate::messaging::wire::{AckMessage, DataMessage, MulticastMessage, SeqMessage};
use crate::ordering::delivery::{apply_seq, DeliveredMessage};
use crate::ordering::pending_queue::PendingQueue;
use crate::ordering::sequencer::Sequencer;
use crate::ordering::ProtocolError;

/// A message this process wants to send as a result of handling an event
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Outbound {
    ToOne(ProcessId, MulticastMessage),
    /// to every host in the membership, including this process
    Broadcast(MulticastMessage),
}

/// Everything that results from handling a single inbound message
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct Reaction {
    pub outbound: Vec<Outbound>,
    pub delivered: Vec<DeliveredMessage>,
}

/// The protocol state of a single process: its pending queue and counters. This is pure
///  state-machine logic without any IO - the caller performs the sends in [Reaction::outbound]
///  and hands [Reaction::delivered] to the application.
///
/// Handling a message always runs to completion before the next one is handled, so there is no
///  internal synchronization.
pub struct Multicaster {
    myself: ProcessId,
    num_hosts: usize,
    queue: PendingQueue,
    sequencer: Sequencer,
    /// the most recently seen final sequence number, seeding the next proposal
    last_seq_received: u32,
    /// the id for this process's next own message
    last_msg_id: u32,
}

impl Multicaster {
    pub fn new(myself: ProcessId, num_hosts: usize) -> Multicaster {
        Multicaster {
            myself,
            num_hosts,
            queue: PendingQueue::new(),
            sequencer: Sequencer::new(myself, num_hosts),
            last_seq_received: 0,
            last_msg_id: 0,
        }
    }

    pub fn queue(&self) -> &PendingQueue {
        &self.queue
    }

    pub fn last_seq_received(&self) -> u32 {
        self.last_seq_received
    }

    pub fn last_msg_id(&self) -> u32 {
        self.last_msg_id
    }

    /// Starts ordering a new application payload: the returned Data message must be broadcast to
    ///  all hosts, this process included. The message is queued when it is received back.
    pub fn multicast(&mut self, payload: u32) -> Outbound {
        let msg_id = self.last_msg_id;
        self.last_msg_id = self.last_msg_id.wrapping_add(1);
        debug!(msg_id, payload, "multicasting message");

        Outbound::Broadcast(MulticastMessage::Data(DataMessage {
            sender: self.myself,
            msg_id,
            payload,
        }))
    }

    pub fn on_message(&mut self, msg: MulticastMessage) -> Result<Reaction, ProtocolError> {
        match msg {
            MulticastMessage::Data(data) => self.on_data(data),
            MulticastMessage::Ack(ack) => self.on_ack(ack),
            MulticastMessage::Seq(seq) => Ok(self.on_seq(seq)),
        }
    }

    fn on_data(&mut self, data: DataMessage) -> Result<Reaction, ProtocolError> {
        if data.sender as usize >= self.num_hosts {
            return Err(ProtocolError::UnknownProcess(data.sender));
        }

        if !self.queue.insert(data) {
            debug!(sender = data.sender, msg_id = data.msg_id, "duplicate data message - ignoring");
            return Ok(Reaction::default());
        }
        // stay clear of message ids used by others
        self.last_msg_id = self.last_msg_id.max(data.msg_id.saturating_add(1));

        let ack = AckMessage {
            sender: data.sender,
            msg_id: data.msg_id,
            proposed_seq: self.last_seq_received.wrapping_add(1),
            proposer: self.myself,
        };
        trace!(sender = data.sender, msg_id = data.msg_id, proposed_seq = ack.proposed_seq, "queued data message, acking");

        Ok(Reaction {
            outbound: vec![Outbound::ToOne(data.sender, ack.into())],
            delivered: vec![],
        })
    }

    fn on_ack(&mut self, ack: AckMessage) -> Result<Reaction, ProtocolError> {
        let outbound = self.sequencer.on_ack(&mut self.queue, &ack)?
            .map(|seq| Outbound::Broadcast(seq.into()))
            .into_iter()
            .collect();

        Ok(Reaction {
            outbound,
            delivered: vec![],
        })
    }

    fn on_seq(&mut self, seq: SeqMessage) -> Reaction {
        let delivered = apply_seq(&mut self.queue, &seq);
        // NB: this is an assignment, not a maximum
        self.last_seq_received = seq.final_seq;
        trace!(last_seq_received = self.last_seq_received, "updated last received sequence number");

        Reaction {
            outbound: vec![],
            delivered,
        }
    }
}


#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;

    fn data(sender: ProcessId, msg_id: u32, payload: u32) -> MulticastMessage {
        MulticastMessage::Data(DataMessage { sender, msg_id, payload })
    }

    fn ack(sender: ProcessId, msg_id: u32, proposed_seq: u32, proposer: ProcessId) -> MulticastMessage {
        MulticastMessage::Ack(AckMessage { sender, msg_id, proposed_seq, proposer })
    }

    fn seq(sender: ProcessId, msg_id: u32, final_seq: u32) -> MulticastMessage {
        MulticastMessage::Seq(SeqMessage { sender, msg_id, final_seq, final_seq_proposer: sender })
    }

    #[test]
    fn test_multicast_assigns_increasing_ids() {
        let mut multicaster = Multicaster::new(1, 3);
        assert_eq!(multicaster.multicast(7), Outbound::Broadcast(data(1, 0, 7)));
        assert_eq!(multicaster.multicast(8), Outbound::Broadcast(data(1, 1, 8)));
        assert_eq!(multicaster.last_msg_id(), 2);
        assert!(multicaster.queue().is_empty());
    }

    #[test]
    fn test_data_is_queued_and_acked() {
        let mut multicaster = Multicaster::new(2, 3);

        let reaction = multicaster.on_message(data(0, 0, 42)).unwrap();
        assert_eq!(reaction, Reaction {
            outbound: vec![Outbound::ToOne(0, ack(0, 0, 1, 2))],
            delivered: vec![],
        });

        let entry = multicaster.queue().find(0, 0).unwrap();
        assert_eq!(entry.message.payload, 42);
        assert!(!entry.deliverable);
    }

    #[rstest]
    #[case::higher_id(5, 0, 6)]
    #[case::lower_id(1, 4, 4)]
    #[case::max_id(u32::MAX, 0, u32::MAX)]
    fn test_data_bumps_msg_id(#[case] received_id: u32, #[case] own_multicasts: u32, #[case] expected: u32) {
        let mut multicaster = Multicaster::new(0, 2);
        for i in 0..own_multicasts {
            multicaster.multicast(i);
        }

        multicaster.on_message(data(1, received_id, 0)).unwrap();
        assert_eq!(multicaster.last_msg_id(), expected);
    }

    #[test]
    fn test_duplicate_data_is_neither_queued_nor_acked() {
        let mut multicaster = Multicaster::new(0, 2);
        multicaster.on_message(data(1, 3, 10)).unwrap();

        let reaction = multicaster.on_message(data(1, 3, 11)).unwrap();
        assert_eq!(reaction, Reaction::default());
        assert_eq!(multicaster.queue().len(), 1);
        assert_eq!(multicaster.queue().find(1, 3).unwrap().message.payload, 10);
    }

    #[test]
    fn test_data_from_unknown_process() {
        let mut multicaster = Multicaster::new(0, 2);
        assert_eq!(multicaster.on_message(data(2, 0, 1)), Err(ProtocolError::UnknownProcess(2)));
        assert!(multicaster.queue().is_empty());
    }

    #[test]
    fn test_proposal_follows_last_seq_received() {
        let mut multicaster = Multicaster::new(1, 3);

        multicaster.on_message(data(0, 0, 1)).unwrap();
        multicaster.on_message(seq(2, 9, 3)).unwrap();
        let reaction = multicaster.on_message(data(2, 0, 1)).unwrap();
        assert_eq!(reaction.outbound, vec![Outbound::ToOne(2, ack(2, 0, 4, 1))]);

        multicaster.on_message(seq(2, 0, 10)).unwrap();
        assert_eq!(multicaster.last_seq_received(), 10);

        let reaction = multicaster.on_message(data(0, 1, 1)).unwrap();
        assert_eq!(reaction.outbound, vec![Outbound::ToOne(0, ack(0, 1, 11, 1))]);
    }

    #[test]
    fn test_last_seq_received_is_overwritten_by_lower_value() {
        let mut multicaster = Multicaster::new(0, 2);
        multicaster.on_message(seq(1, 0, 10)).unwrap();
        multicaster.on_message(seq(1, 1, 4)).unwrap();
        assert_eq!(multicaster.last_seq_received(), 4);
    }

    #[test]
    fn test_full_round_at_origin() {
        let mut multicaster = Multicaster::new(0, 3);
        let Outbound::Broadcast(msg) = multicaster.multicast(42) else {
            panic!("multicast must broadcast");
        };

        // self-reception
        let reaction = multicaster.on_message(msg).unwrap();
        assert_eq!(reaction.outbound, vec![Outbound::ToOne(0, ack(0, 0, 1, 0))]);

        assert_eq!(multicaster.on_message(ack(0, 0, 1, 0)).unwrap(), Reaction::default());
        assert_eq!(multicaster.on_message(ack(0, 0, 2, 1)).unwrap(), Reaction::default());

        let reaction = multicaster.on_message(ack(0, 0, 1, 2)).unwrap();
        let expected_seq = MulticastMessage::Seq(SeqMessage { sender: 0, msg_id: 0, final_seq: 2, final_seq_proposer: 0 });
        assert_eq!(reaction.outbound, vec![Outbound::Broadcast(expected_seq)]);
        assert!(reaction.delivered.is_empty());

        let reaction = multicaster.on_message(expected_seq).unwrap();
        assert_eq!(reaction.delivered, vec![DeliveredMessage {
            sender: 0,
            msg_id: 0,
            final_seq: 2,
            final_seq_proposer: 0,
            payload: 42,
        }]);
        assert!(multicaster.queue().is_empty());
        assert_eq!(multicaster.last_seq_received(), 2);
    }
}
