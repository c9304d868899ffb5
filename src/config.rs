use std::path::PathBuf;

use crate::messaging::membership::ProcessId;

#[derive(Debug, Clone)]
pub struct MulticastConfig {
    /// The UDP port this process listens on. It is also the port of every host in the host file
    ///  that does not specify a port explicitly.
    pub port: u16,

    /// path of a file listing all hosts, one per line. The position of a host in this file is its
    ///  process id.
    pub host_file: PathBuf,

    /// number of messages this process originates after startup, with payloads `0..n`
    pub num_messages_to_originate: u32,

    /// If present, this is the local process id. Otherwise it is determined by looking up the
    ///  local hostname in the host file.
    pub process_id: Option<ProcessId>,

    /// Received datagrams are truncated to this size. Protocol messages are 20 bytes at most, so
    ///  anything beyond that is ignored anyway.
    pub recv_buffer_size: usize,

    pub command_channel_capacity: usize,
}

impl MulticastConfig {
    pub fn new(port: u16, host_file: impl Into<PathBuf>) -> MulticastConfig {
        MulticastConfig {
            port,
            host_file: host_file.into(),
            num_messages_to_originate: 0,
            process_id: None,
            recv_buffer_size: 1500,
            command_channel_capacity: 1024,
        }
    }
}
