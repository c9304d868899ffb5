use std::fmt::{Debug, Formatter};
use std::net::SocketAddr;

use anyhow::{anyhow, bail};
use tokio::net::lookup_host;
use tracing::debug;

/// A process is identified by its index in the (fixed, ordered) list of hosts
pub type ProcessId = u32;

/// The fixed set of processes taking part in a run. It is immutable for the lifetime of the
///  process, and it always contains the local process itself.
#[derive(Clone, Eq, PartialEq)]
pub struct Membership {
    hosts: Vec<SocketAddr>,
    myself: ProcessId,
}

impl Debug for Membership {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Membership{{myself:{}, hosts:{:?}}}", self.myself, self.hosts)
    }
}

impl Membership {
    pub fn new(hosts: Vec<SocketAddr>, myself: ProcessId) -> anyhow::Result<Membership> {
        if hosts.is_empty() {
            bail!("membership requires at least one host");
        }
        if myself as usize >= hosts.len() {
            bail!("process id {} is out of range for {} hosts", myself, hosts.len());
        }
        Ok(Membership {
            hosts,
            myself,
        })
    }

    /// Resolves host entries, each either `host` (using `default_port`) or `host:port`.
    ///  Only IPv4 addresses are used.
    pub async fn resolve(entries: &[HostEntry], default_port: u16, myself: ProcessId) -> anyhow::Result<Membership> {
        let mut hosts = Vec::with_capacity(entries.len());
        for entry in entries {
            let port = entry.port.unwrap_or(default_port);
            let addr = lookup_host((entry.host.as_str(), port)).await?
                .find(|addr| addr.is_ipv4())
                .ok_or_else(|| anyhow!("could not resolve host {:?} to an IPv4 address", entry.host))?;
            debug!("resolved host {:?} to {:?}", entry.host, addr);
            hosts.push(addr);
        }
        Membership::new(hosts, myself)
    }

    pub fn myself(&self) -> ProcessId {
        self.myself
    }

    pub fn num_hosts(&self) -> usize {
        self.hosts.len()
    }

    pub fn addr_of(&self, process_id: ProcessId) -> Option<SocketAddr> {
        self.hosts.get(process_id as usize).copied()
    }

    /// all hosts in process id order, including the local process
    pub fn hosts(&self) -> &[SocketAddr] {
        &self.hosts
    }
}


/// One line of a host file: a host name or address with an optional port
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct HostEntry {
    pub host: String,
    pub port: Option<u16>,
}

impl HostEntry {
    pub fn parse(s: &str) -> anyhow::Result<HostEntry> {
        let s = s.trim();
        if s.is_empty() {
            bail!("empty host entry");
        }

        // bracketed IPv6 literals are not supported, so a single colon separates the port
        match s.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') => {
                let port = port.parse::<u16>()
                    .map_err(|e| anyhow!("invalid port in host entry {:?}: {}", s, e))?;
                Ok(HostEntry {
                    host: host.to_string(),
                    port: Some(port),
                })
            }
            _ => Ok(HostEntry {
                host: s.to_string(),
                port: None,
            }),
        }
    }

    /// Parses a host file's content: one entry per line, blank lines are skipped. The order of
    ///  entries defines process ids.
    pub fn parse_host_list(content: &str) -> anyhow::Result<Vec<HostEntry>> {
        content.lines()
            .filter(|line| !line.trim().is_empty())
            .map(HostEntry::parse)
            .collect()
    }
}
