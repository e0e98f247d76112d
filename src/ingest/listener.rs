use std::io;
use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::Ingestor;

/// Largest datagram accepted; anything longer is truncated by the socket
pub const MAX_DATAGRAM_SIZE: usize = 64 * 1024;

/// Receive loop feeding an [`Ingestor`]
pub struct UdpListener {
    socket: UdpSocket,
    ingestor: Ingestor,
    shutdown: CancellationToken,
}

impl UdpListener {
    pub async fn bind(addr: SocketAddr, ingestor: Ingestor) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        let shutdown = ingestor.store().shutdown_token();
        Ok(Self {
            socket,
            ingestor,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Receive until the store's shutdown token fires
    pub async fn run(self) {
        let local = self.socket.local_addr().ok();
        info!(addr = ?local, "UDP listener started");

        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, source)) => {
                        self.ingestor.receive(&buf[..len], source);
                    }
                    Err(err) => warn!(error = %err, "UDP receive failed"),
                },
            }
        }

        info!("UDP listener stopped");
    }
}
