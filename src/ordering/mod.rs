use crate::messaging::membership::ProcessId;

pub mod delivery;
pub mod multicaster;
pub mod pending_queue;
pub mod sequencer;

/// Inbound messages that are well-formed on the wire but cannot be applied to this process's
///  protocol state. They are logged and dropped.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    #[error("process {0} is not part of the membership")]
    UnknownProcess(ProcessId),
    #[error("message ({sender}, {msg_id}) is not in the pending queue")]
    UnknownMessage { sender: ProcessId, msg_id: u32 },
    #[error("received ack for message ({sender}, {msg_id}) which was originated by another process")]
    NotOrigin { sender: ProcessId, msg_id: u32 },
}
