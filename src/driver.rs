use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::anyhow;
use bytes::BytesMut;
use tokio::select;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::config::MulticastConfig;
use crate::messaging::membership::{Membership, ProcessId};
use crate::messaging::transport::Transport;
use crate::messaging::wire::{MessageKind, MulticastMessage};
use crate::ordering::delivery::DeliveredMessage;
use crate::ordering::multicaster::{Multicaster, Outbound, Reaction};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Command {
    Multicast(u32),
    Shutdown,
}

/// Application-side handle for a running [Driver]
#[derive(Debug, Clone)]
pub struct MulticastHandle {
    commands: mpsc::Sender<Command>,
}

impl MulticastHandle {
    /// Queues a payload for total-order multicast. Delivery (at this process as at every other)
    ///  happens through the delivery sink once the ordering round completes.
    pub async fn multicast(&self, payload: u32) -> anyhow::Result<()> {
        self.commands.send(Command::Multicast(payload)).await
            .map_err(|_| anyhow!("multicast driver is not running"))
    }

    /// Stops the driver. Messages still waiting for acks or for their turn are discarded.
    pub async fn shut_down(&self) -> anyhow::Result<()> {
        self.commands.send(Command::Shutdown).await
            .map_err(|_| anyhow!("multicast driver is not running"))
    }
}

/// The event loop of a single process: it owns the transport and the protocol state, and it
///  handles one event at a time (a received datagram, a multicast request, or the origination of
///  one of the configured messages) to completion before looking at the next.
pub struct Driver {
    membership: Membership,
    transport: Arc<dyn Transport>,
    multicaster: Multicaster,
    commands: mpsc::Receiver<Command>,
    delivery_sink: mpsc::UnboundedSender<DeliveredMessage>,
    recv_buffer_size: usize,
    num_messages_to_originate: u32,
    num_originated: u32,
}

impl Driver {
    pub fn new(
        config: &MulticastConfig,
        membership: Membership,
        transport: Arc<dyn Transport>,
        delivery_sink: mpsc::UnboundedSender<DeliveredMessage>,
    ) -> (Driver, MulticastHandle) {
        let (command_sender, commands) = mpsc::channel(config.command_channel_capacity);

        let driver = Driver {
            multicaster: Multicaster::new(membership.myself(), membership.num_hosts()),
            membership,
            transport,
            commands,
            delivery_sink,
            recv_buffer_size: config.recv_buffer_size.max(MessageKind::Ack.num_bytes()),
            num_messages_to_originate: config.num_messages_to_originate,
            num_originated: 0,
        };
        (driver, MulticastHandle { commands: command_sender })
    }

    /// Runs until a [Command::Shutdown] is received. Nothing that happens inside the loop
    ///  terminates it: undecodable datagrams and transport errors are logged and skipped.
    pub async fn run(mut self) {
        info!("starting multicast event loop as process {} of {:?}", self.membership.myself(), self.membership);

        let mut buf = vec![0u8; self.recv_buffer_size];
        let mut commands_open = true;

        loop {
            select! {
                received = self.transport.recv(&mut buf) => {
                    match received {
                        Ok((len, from)) => self.on_datagram(&buf[..len], from).await,
                        Err(e) => error!("error receiving datagram: {}", e),
                    }
                }
                command = self.commands.recv(), if commands_open => {
                    match command {
                        Some(Command::Multicast(payload)) => self.do_multicast(payload).await,
                        Some(Command::Shutdown) => {
                            info!("shutting down with {} undelivered messages", self.multicaster.queue().len());
                            return;
                        }
                        None => {
                            // peers still rely on our acks, so the loop keeps running
                            debug!("all multicast handles were dropped");
                            commands_open = false;
                        }
                    }
                }
                _ = std::future::ready(()), if self.num_originated < self.num_messages_to_originate => {
                    let payload = self.num_originated;
                    self.num_originated += 1;
                    self.do_multicast(payload).await;
                }
            }
        }
    }

    async fn do_multicast(&mut self, payload: u32) {
        let outbound = self.multicaster.multicast(payload);
        self.send(outbound).await;
    }

    async fn on_datagram(&mut self, buf: &[u8], from: SocketAddr) {
        let msg = match MulticastMessage::decode(buf) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(?from, "dropping datagram: {}", e);
                return;
            }
        };
        trace!(?from, ?msg, "received message");

        match self.multicaster.on_message(msg) {
            Ok(reaction) => self.apply(reaction).await,
            Err(e) => warn!(?from, "dropping {:?} message: {}", msg.kind(), e),
        }
    }

    async fn apply(&mut self, reaction: Reaction) {
        for delivered in reaction.delivered {
            self.deliver(delivered);
        }
        for outbound in reaction.outbound {
            self.send(outbound).await;
        }
    }

    fn deliver(&self, msg: DeliveredMessage) {
        debug!("process {}: delivering message {} from sender {} with seq ({}, {})", self.membership.myself(), msg.msg_id, msg.sender, msg.final_seq, msg.final_seq_proposer);
        if self.delivery_sink.send(msg).is_err() {
            trace!("delivery sink is closed - discarding delivered message");
        }
    }

    async fn send(&self, outbound: Outbound) {
        match outbound {
            Outbound::ToOne(to, msg) => self.send_to_one(to, &msg).await,
            Outbound::Broadcast(msg) => self.broadcast(&msg).await,
        }
    }

    async fn send_to_one(&self, to: ProcessId, msg: &MulticastMessage) {
        let Some(addr) = self.membership.addr_of(to) else {
            warn!("no host for process {} - not sending {:?}", to, msg);
            return;
        };
        if let Some(buf) = Self::encode(msg) {
            self.send_datagram(addr, &buf).await;
        }
    }

    /// one datagram per host, including this process
    async fn broadcast(&self, msg: &MulticastMessage) {
        if let Some(buf) = Self::encode(msg) {
            for &addr in self.membership.hosts() {
                self.send_datagram(addr, &buf).await;
            }
            trace!("multicast {:?} to {} hosts", msg.kind(), self.membership.num_hosts());
        }
    }

    fn encode(msg: &MulticastMessage) -> Option<BytesMut> {
        let mut buf = BytesMut::with_capacity(msg.kind().num_bytes());
        match msg.encode(&mut buf) {
            Ok(()) => Some(buf),
            Err(e) => {
                error!("error encoding {:?}: {}", msg, e);
                None
            }
        }
    }

    async fn send_datagram(&self, to: SocketAddr, buf: &[u8]) {
        if let Err(e) = self.transport.send(to, buf).await {
            error!(?to, "error sending datagram: {}", e);
        }
    }
}


#[cfg(test)]
mod test {
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::messaging::transport::MockTransport;
    use crate::messaging::wire::{AckMessage, DataMessage, SeqMessage};

    use super::*;

    type SentLog = Arc<Mutex<Vec<(SocketAddr, Vec<u8>)>>>;

    fn addr(id: ProcessId) -> SocketAddr {
        SocketAddr::from_str(&format!("127.0.0.1:{}", 16385 + id)).unwrap()
    }

    fn encoded(msg: impl Into<MulticastMessage>) -> Vec<u8> {
        let msg: MulticastMessage = msg.into();
        let mut buf = BytesMut::new();
        msg.encode(&mut buf).unwrap();
        buf.to_vec()
    }

    fn tracking_transport() -> (MockTransport, SentLog) {
        let sent: SentLog = Default::default();
        let mut transport = MockTransport::new();
        let log = sent.clone();
        transport.expect_send()
            .returning(move |to, buf| {
                log.lock().unwrap().push((to, buf.to_vec()));
                Ok(())
            });
        (transport, sent)
    }

    fn new_driver(myself: ProcessId, num_hosts: u32, transport: MockTransport) -> (Driver, MulticastHandle, mpsc::UnboundedReceiver<DeliveredMessage>) {
        let membership = Membership::new((0..num_hosts).map(addr).collect(), myself).unwrap();
        let (sink, delivered) = mpsc::unbounded_channel();
        let (driver, handle) = Driver::new(&MulticastConfig::new(16385, "hosts"), membership, Arc::new(transport), sink);
        (driver, handle, delivered)
    }

    #[tokio::test]
    async fn test_data_is_acked_to_origin() {
        let (transport, sent) = tracking_transport();
        let (mut driver, _handle, _delivered) = new_driver(1, 3, transport);

        driver.on_datagram(&encoded(DataMessage { sender: 2, msg_id: 0, payload: 42 }), addr(2)).await;

        assert_eq!(*sent.lock().unwrap(), vec![
            (addr(2), encoded(AckMessage { sender: 2, msg_id: 0, proposed_seq: 1, proposer: 1 })),
        ]);
    }

    #[tokio::test]
    async fn test_multicast_is_broadcast_to_all_hosts() {
        let (transport, sent) = tracking_transport();
        let (mut driver, _handle, _delivered) = new_driver(0, 3, transport);

        driver.do_multicast(7).await;

        let expected = encoded(DataMessage { sender: 0, msg_id: 0, payload: 7 });
        assert_eq!(*sent.lock().unwrap(), vec![
            (addr(0), expected.clone()),
            (addr(1), expected.clone()),
            (addr(2), expected),
        ]);
    }

    #[tokio::test]
    async fn test_single_process_round() {
        let (transport, sent) = tracking_transport();
        let (mut driver, _handle, mut delivered) = new_driver(0, 1, transport);

        driver.do_multicast(42).await;
        let data = sent.lock().unwrap().remove(0).1;
        driver.on_datagram(&data, addr(0)).await;
        let ack = sent.lock().unwrap().remove(0).1;
        driver.on_datagram(&ack, addr(0)).await;
        let seq = sent.lock().unwrap().remove(0).1;
        assert_eq!(seq, encoded(SeqMessage { sender: 0, msg_id: 0, final_seq: 1, final_seq_proposer: 0 }));

        driver.on_datagram(&seq, addr(0)).await;
        assert_eq!(delivered.try_recv().unwrap(), DeliveredMessage {
            sender: 0,
            msg_id: 0,
            final_seq: 1,
            final_seq_proposer: 0,
            payload: 42,
        });
        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_datagrams_are_dropped() {
        let mut transport = MockTransport::new();
        transport.expect_send().never();
        let (mut driver, _handle, _delivered) = new_driver(0, 2, transport);

        driver.on_datagram(b"", addr(1)).await;
        driver.on_datagram(&[0, 0, 0, 9, 0, 0, 0, 0], addr(1)).await;
        driver.on_datagram(&encoded(DataMessage { sender: 0, msg_id: 0, payload: 1 })[..12], addr(1)).await;
        // sender outside the membership
        driver.on_datagram(&encoded(DataMessage { sender: 5, msg_id: 0, payload: 1 }), addr(1)).await;
        // ack for a message this process never sent
        driver.on_datagram(&encoded(AckMessage { sender: 0, msg_id: 3, proposed_seq: 1, proposer: 1 }), addr(1)).await;

        assert!(driver.multicaster.queue().is_empty());
    }

    #[tokio::test]
    async fn test_send_failure_does_not_stop_broadcast() {
        let mut transport = MockTransport::new();
        transport.expect_send()
            .times(3)
            .returning(|to, _| {
                if to == addr(1) {
                    Err(anyhow!("network unreachable"))
                }
                else {
                    Ok(())
                }
            });
        let (mut driver, _handle, _delivered) = new_driver(0, 3, transport);

        driver.do_multicast(1).await;
    }

    #[tokio::test]
    async fn test_loop_survives_garbage_and_recv_errors_until_shutdown() {
        const NUM_BAD_DATAGRAMS: usize = 6;

        let recv_calls = Arc::new(AtomicUsize::new(0));
        let shutdown_trigger: Arc<Mutex<Option<mpsc::Sender<Command>>>> = Default::default();

        let mut transport = MockTransport::new();
        let calls = recv_calls.clone();
        let trigger = shutdown_trigger.clone();
        transport.expect_recv()
            .returning(move |buf| {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                if call == NUM_BAD_DATAGRAMS {
                    // only now is the loop allowed to see the shutdown
                    if let Some(commands) = trigger.lock().unwrap().take() {
                        commands.try_send(Command::Shutdown).unwrap();
                    }
                    return Err(anyhow!("connection refused"));
                }
                if call % 2 == 0 {
                    buf[..3].copy_from_slice(b"bad");
                    Ok((3, addr(1)))
                }
                else {
                    // well-formed, but from a sender outside the membership
                    let msg = encoded(DataMessage { sender: 5, msg_id: 0, payload: 1 });
                    buf[..msg.len()].copy_from_slice(&msg);
                    Ok((msg.len(), addr(1)))
                }
            });
        transport.expect_send().never();
        let (driver, handle, _delivered) = new_driver(0, 2, transport);
        *shutdown_trigger.lock().unwrap() = Some(handle.commands.clone());

        tokio::time::timeout(Duration::from_secs(5), driver.run()).await
            .expect("event loop did not shut down");

        assert!(recv_calls.load(Ordering::SeqCst) > NUM_BAD_DATAGRAMS);
        assert!(shutdown_trigger.lock().unwrap().is_none());
        assert!(handle.multicast(1).await.is_err());
    }
}
