use super::{FrameTransport, TransportMode, UDP_PORT};
use crate::error::TransportError;
use crate::frame::EncodedFrame;
use async_trait::async_trait;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::UdpSocket;
use tracing::{debug, info};

/// Fire-and-forget datagrams to the head-tracking PC
///
/// Each frame is one 48-byte datagram. The socket is bound to an ephemeral port;
/// no connection state is kept and nothing is ever read back.
pub struct UdpTransport {
    socket: UdpSocket,
    destination: Option<SocketAddr>,
    closed: AtomicBool,
}

impl UdpTransport {
    /// Resolve `host` to the address frames go to, on the fixed tracker port
    pub async fn resolve(host: &str) -> Result<SocketAddr, TransportError> {
        let mut addrs = tokio::net::lookup_host((host, UDP_PORT))
            .await
            .map_err(|e| TransportError::Resolve {
                host: host.to_string(),
                details: e.to_string(),
            })?;

        addrs.next().ok_or_else(|| TransportError::Resolve {
            host: host.to_string(),
            details: "no addresses returned".to_string(),
        })
    }

    /// Bind a socket for the given destination
    ///
    /// Without a destination the transport still exists but every send reports
    /// [`TransportError::NoDestination`].
    pub async fn bind(destination: Option<SocketAddr>) -> Result<Self, TransportError> {
        let local: SocketAddr = match destination {
            Some(SocketAddr::V6(_)) => (Ipv6Addr::UNSPECIFIED, 0).into(),
            _ => (Ipv4Addr::UNSPECIFIED, 0).into(),
        };

        let socket = UdpSocket::bind(local)
            .await
            .map_err(|e| TransportError::Send(format!("failed to bind UDP socket: {}", e)))?;

        match destination {
            Some(addr) => info!(destination = %addr, "UDP transport ready"),
            None => info!("UDP transport ready without a destination"),
        }

        Ok(Self {
            socket,
            destination,
            closed: AtomicBool::new(false),
        })
    }

    pub fn destination(&self) -> Option<SocketAddr> {
        self.destination
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.local_addr().ok()
    }
}

#[async_trait]
impl FrameTransport for UdpTransport {
    fn kind(&self) -> TransportMode {
        TransportMode::Udp
    }

    fn describe(&self) -> String {
        match self.destination {
            Some(addr) => format!("udp://{}", addr),
            None => "udp://<unresolved>".to_string(),
        }
    }

    async fn send(&self, frame: &EncodedFrame) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let destination = self.destination.ok_or(TransportError::NoDestination)?;

        self.socket
            .send_to(frame, destination)
            .await
            .map_err(|e| TransportError::Send(e.to_string()))?;
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(transport = %self.describe(), "UDP transport closed");
        }
        Ok(())
    }
}
