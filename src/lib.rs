//! Totally ordered multicast between a fixed set of processes over UDP.
//!
//! Every process that delivers two messages delivers them in the same relative order. Ordering
//!  is agreed without a dedicated sequencer process:
//!
//! * The origin broadcasts a *Data* message to all hosts, itself included.
//! * Every host queues the message as undeliverable and answers with an *Ack* proposing a
//!    sequence number: one more than the last final sequence number it has seen.
//! * Once the origin has an ack from every host, it broadcasts a *Seq* message with the maximum
//!    of all proposals as the message's final sequence number.
//! * Every host marks the message as deliverable and delivers whatever became ready.
//!
//! There are no retransmissions and no timeouts: a message whose Data, Ack or Seq datagram is
//!  lost never completes its round.

pub mod bootstrap;
pub mod config;
pub mod driver;
pub mod messaging;
pub mod ordering;
pub mod test_util;
