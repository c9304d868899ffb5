use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use tokio::sync::mpsc;
use tracing::info;

use crate::config::MulticastConfig;
use crate::driver::{Driver, MulticastHandle};
use crate::messaging::membership::{HostEntry, Membership, ProcessId};
use crate::messaging::transport::UdpTransport;
use crate::ordering::delivery::DeliveredMessage;

/// Reads and resolves the host file, and determines this process's id in it
pub async fn load_membership(config: &MulticastConfig) -> anyhow::Result<Membership> {
    let content = tokio::fs::read_to_string(&config.host_file).await
        .with_context(|| format!("unable to read host file {:?}", config.host_file))?;
    let entries = HostEntry::parse_host_list(&content)?;
    if entries.is_empty() {
        bail!("host file {:?} contains no hosts", config.host_file);
    }
    for entry in &entries {
        info!("discovered host: {:?}", entry);
    }

    let myself = match config.process_id {
        Some(id) => id,
        None => own_process_id(&entries, &local_hostname()?)?,
    };
    info!("process id: {}", myself);

    Membership::resolve(&entries, config.port, myself).await
}

/// The process id is the position of the first host entry matching the local hostname
pub fn own_process_id(entries: &[HostEntry], hostname: &str) -> anyhow::Result<ProcessId> {
    let idx = entries.iter()
        .position(|e| e.host == hostname)
        .ok_or_else(|| anyhow!("local hostname {:?} is not in the host file", hostname))?;
    Ok(idx.try_into()?)
}

/// The kernel's hostname, falling back to `/etc/hostname` and finally to the `HOSTNAME`
///  environment variable, which may be inherited from a different host
pub fn local_hostname() -> anyhow::Result<String> {
    let candidates = [
        std::fs::read_to_string("/proc/sys/kernel/hostname").ok(),
        std::fs::read_to_string("/etc/hostname").ok(),
        std::env::var("HOSTNAME").ok(),
    ];
    first_hostname(candidates)
        .ok_or_else(|| anyhow!("unable to determine the local hostname - pass the process id explicitly"))
}

fn first_hostname(candidates: impl IntoIterator<Item = Option<String>>) -> Option<String> {
    candidates.into_iter()
        .flatten()
        .map(|hostname| hostname.trim().to_string())
        .find(|hostname| !hostname.is_empty())
}

/// Binds the listening socket and sets up the driver. Failure here is fatal: the event loop is
///  never entered.
pub async fn start(config: &MulticastConfig, membership: Membership) -> anyhow::Result<(Driver, MulticastHandle, mpsc::UnboundedReceiver<DeliveredMessage>)> {
    let bind_addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.port));
    let transport = UdpTransport::bind(bind_addr).await
        .with_context(|| format!("unable to bind UDP socket to {:?}", bind_addr))?;

    let (delivery_sink, delivered) = mpsc::unbounded_channel();
    let (driver, handle) = Driver::new(config, membership, Arc::new(transport), delivery_sink);
    Ok((driver, handle, delivered))
}
