use std::collections::VecDeque;

use tracing::warn;

use crate::messaging::membership::ProcessId;
use crate::messaging::wire::MulticastMessage;
use crate::ordering::delivery::DeliveredMessage;
use crate::ordering::multicaster::{Multicaster, Outbound};

/// A datagram travelling through a [SimulatedNetwork]
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct InFlight {
    pub from: ProcessId,
    pub to: ProcessId,
    pub msg: MulticastMessage,
}

/// Runs several [Multicaster]s in memory, routing their outbound messages between them without
///  any IO. Datagrams are held in flight until a test explicitly delivers them, so tests control
///  the interleaving of messages (and may drop some of them).
pub struct SimulatedNetwork {
    processes: Vec<Multicaster>,
    in_flight: VecDeque<InFlight>,
    delivered: Vec<Vec<DeliveredMessage>>,
}

impl SimulatedNetwork {
    pub fn new(num_processes: usize) -> SimulatedNetwork {
        SimulatedNetwork {
            processes: (0..num_processes)
                .map(|id| Multicaster::new(id as ProcessId, num_processes))
                .collect(),
            in_flight: Default::default(),
            delivered: vec![Vec::new(); num_processes],
        }
    }

    pub fn process(&self, id: ProcessId) -> &Multicaster {
        &self.processes[id as usize]
    }

    /// messages delivered to the application at process `id`, in delivery order
    pub fn delivered(&self, id: ProcessId) -> &[DeliveredMessage] {
        &self.delivered[id as usize]
    }

    pub fn in_flight(&self) -> impl Iterator<Item = &InFlight> {
        self.in_flight.iter()
    }

    pub fn multicast(&mut self, from: ProcessId, payload: u32) {
        let outbound = self.processes[from as usize].multicast(payload);
        self.enqueue(from, outbound);
    }

    /// Delivers the oldest datagram in flight. Returns `false` if there was none.
    pub fn step(&mut self) -> bool {
        match self.in_flight.pop_front() {
            Some(datagram) => {
                self.handle(datagram);
                true
            }
            None => false,
        }
    }

    /// Delivers the first datagram in flight that matches `predicate`, regardless of its position
    pub fn step_first(&mut self, predicate: impl Fn(&InFlight) -> bool) -> bool {
        match self.in_flight.iter().position(predicate) {
            Some(idx) => {
                if let Some(datagram) = self.in_flight.remove(idx) {
                    self.handle(datagram);
                }
                true
            }
            None => false,
        }
    }

    /// Delivers datagrams in FIFO order until nothing is left in flight
    pub fn run_until_quiet(&mut self) {
        while self.step() {}
    }

    /// removes all datagrams in flight that match `predicate`, simulating packet loss
    pub fn drop_where(&mut self, predicate: impl Fn(&InFlight) -> bool) -> usize {
        let before = self.in_flight.len();
        self.in_flight.retain(|d| !predicate(d));
        before - self.in_flight.len()
    }

    fn handle(&mut self, datagram: InFlight) {
        match self.processes[datagram.to as usize].on_message(datagram.msg) {
            Ok(reaction) => {
                self.delivered[datagram.to as usize].extend(reaction.delivered);
                for outbound in reaction.outbound {
                    self.enqueue(datagram.to, outbound);
                }
            }
            Err(e) => {
                warn!("simulated process {} rejected {:?}: {}", datagram.to, datagram.msg, e);
            }
        }
    }

    fn enqueue(&mut self, from: ProcessId, outbound: Outbound) {
        match outbound {
            Outbound::ToOne(to, msg) => {
                self.in_flight.push_back(InFlight { from, to, msg });
            }
            Outbound::Broadcast(msg) => {
                for to in 0..self.processes.len() {
                    self.in_flight.push_back(InFlight { from, to: to as ProcessId, msg });
                }
            }
        }
    }
}
