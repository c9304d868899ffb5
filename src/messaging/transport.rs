use std::fmt::{Debug, Formatter};
use std::net::SocketAddr;

use async_trait::async_trait;
#[cfg(test)] use mockall::automock;
use tokio::net::UdpSocket;
use tracing::trace;

/// Unordered, unreliable datagram transport. A datagram is delivered at most once, or not at all.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    fn local_addr(&self) -> anyhow::Result<SocketAddr>;

    /// fire-and-forget: success means the datagram was handed to the network, nothing more
    async fn send(&self, to: SocketAddr, buf: &[u8]) -> anyhow::Result<()>;

    /// Waits for the next datagram, writing it into `buf` and returning its length and source.
    ///  Datagrams longer than `buf` are truncated.
    async fn recv(&self, buf: &mut [u8]) -> anyhow::Result<(usize, SocketAddr)>;
}


pub struct UdpTransport {
    socket: UdpSocket,
}

impl Debug for UdpTransport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "UdpTransport{{{:?}}}", self.socket.local_addr().ok())
    }
}

impl UdpTransport {
    /// A single socket is used for both sending and receiving, so peers see the
    ///  listening address as the source of every datagram
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<UdpTransport> {
        let socket = UdpSocket::bind(addr).await?;
        trace!("bound UDP socket to {:?}", socket.local_addr()?);
        Ok(UdpTransport {
            socket,
        })
    }
}

#[async_trait]
impl Transport for UdpTransport {
    fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    async fn send(&self, to: SocketAddr, buf: &[u8]) -> anyhow::Result<()> {
        self.socket.send_to(buf, to).await?;
        Ok(())
    }

    async fn recv(&self, buf: &mut [u8]) -> anyhow::Result<(usize, SocketAddr)> {
        Ok(self.socket.recv_from(buf).await?)
    }
}
