use bytes::{Buf, BufMut, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::messaging::membership::ProcessId;

const WORD_SIZE: usize = std::mem::size_of::<u32>();

#[repr(u32)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, TryFromPrimitive, IntoPrimitive)]
pub enum MessageKind {
    Data = 1,
    Ack = 2,
    Seq = 3,
}
impl MessageKind {
    /// number of 32-bit words in a message of this kind, including the kind word itself
    pub const fn num_words(self) -> usize {
        match self {
            MessageKind::Data => 4,
            MessageKind::Ack | MessageKind::Seq => 5,
        }
    }

    pub const fn num_bytes(self) -> usize {
        self.num_words() * WORD_SIZE
    }
}

/// Errors caused by data received from the network. These are routine and never fatal to
///  anything but the decode attempt.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("short buffer: {kind:?} message requires {required} bytes, got {actual}")]
    ShortBuffer {
        kind: Option<MessageKind>,
        required: usize,
        actual: usize,
    },
    #[error("unknown message kind {0}")]
    UnknownMessageKind(u32),
}

/// Errors caused by a call site violating the encoder's contract
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum EncodeError {
    #[error("encode target buffer is not empty ({len} bytes)")]
    TargetNotEmpty { len: usize },
}

/// An application payload as it travels on the wire. Ordering state is tracked separately by
///  the pending queue.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct DataMessage {
    pub sender: ProcessId,
    pub msg_id: u32,
    pub payload: u32,
}

/// A peer's proposal for the sequence number of a data message, sent back to the message's origin
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct AckMessage {
    /// the *origin* of the acknowledged message, not the acknowledging process
    pub sender: ProcessId,
    pub msg_id: u32,
    pub proposed_seq: u32,
    pub proposer: ProcessId,
}

/// The origin's final ordering decision for one of its messages
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct SeqMessage {
    pub sender: ProcessId,
    pub msg_id: u32,
    pub final_seq: u32,
    pub final_seq_proposer: ProcessId,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum MulticastMessage {
    Data(DataMessage),
    Ack(AckMessage),
    Seq(SeqMessage),
}
impl From<DataMessage> for MulticastMessage {
    fn from(value: DataMessage) -> Self {
        MulticastMessage::Data(value)
    }
}
impl From<AckMessage> for MulticastMessage {
    fn from(value: AckMessage) -> Self {
        MulticastMessage::Ack(value)
    }
}
impl From<SeqMessage> for MulticastMessage {
    fn from(value: SeqMessage) -> Self {
        MulticastMessage::Seq(value)
    }
}

impl MulticastMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            MulticastMessage::Data(_) => MessageKind::Data,
            MulticastMessage::Ack(_) => MessageKind::Ack,
            MulticastMessage::Seq(_) => MessageKind::Seq,
        }
    }

    /// Encodes the message into `buf`, which must be empty. On error, `buf` is left untouched.
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), EncodeError> {
        if !buf.is_empty() {
            return Err(EncodeError::TargetNotEmpty { len: buf.len() });
        }

        buf.reserve(self.kind().num_bytes());
        buf.put_u32(self.kind().into());
        match self {
            MulticastMessage::Data(data) => {
                buf.put_u32(data.sender);
                buf.put_u32(data.msg_id);
                buf.put_u32(data.payload);
            }
            MulticastMessage::Ack(data) => {
                buf.put_u32(data.sender);
                buf.put_u32(data.msg_id);
                buf.put_u32(data.proposed_seq);
                buf.put_u32(data.proposer);
            }
            MulticastMessage::Seq(data) => {
                buf.put_u32(data.sender);
                buf.put_u32(data.msg_id);
                buf.put_u32(data.final_seq);
                buf.put_u32(data.final_seq_proposer);
            }
        }
        Ok(())
    }

    /// Decodes a single message. Bytes beyond the message's fixed size are ignored.
    pub fn decode(buf: &[u8]) -> Result<MulticastMessage, DecodeError> {
        if buf.len() < WORD_SIZE {
            return Err(DecodeError::ShortBuffer {
                kind: None,
                required: WORD_SIZE,
                actual: buf.len(),
            });
        }

        let mut parse_buf = buf;
        let raw_kind = parse_buf.get_u32();
        let kind = MessageKind::try_from(raw_kind)
            .map_err(|_| DecodeError::UnknownMessageKind(raw_kind))?;

        // all field access below relies on this check
        if buf.len() < kind.num_bytes() {
            return Err(DecodeError::ShortBuffer {
                kind: Some(kind),
                required: kind.num_bytes(),
                actual: buf.len(),
            });
        }

        let sender = parse_buf.get_u32();
        let msg_id = parse_buf.get_u32();

        let msg = match kind {
            MessageKind::Data => MulticastMessage::Data(DataMessage {
                sender,
                msg_id,
                payload: parse_buf.get_u32(),
            }),
            MessageKind::Ack => MulticastMessage::Ack(AckMessage {
                sender,
                msg_id,
                proposed_seq: parse_buf.get_u32(),
                proposer: parse_buf.get_u32(),
            }),
            MessageKind::Seq => MulticastMessage::Seq(SeqMessage {
                sender,
                msg_id,
                final_seq: parse_buf.get_u32(),
                final_seq_proposer: parse_buf.get_u32(),
            }),
        };
        Ok(msg)
    }
}
