use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use async_channel::{unbounded, Receiver, Sender};
use tokio::net::{lookup_host, UdpSocket};
use tracing::{debug, trace, warn};
use voicechat_protocol::framing::{decode_clientbound, encode_serverbound};
use voicechat_protocol::{PacketRegistry, SessionCrypto, SocketPacket, Uuid};

use crate::config::PACKET_BUFFER_SIZE;
use crate::error::SdkError;

/// What a link reports back to the session, tagged with the link generation so
/// events from a replaced socket can be told apart.
#[derive(Debug)]
pub(crate) enum LinkEvent {
    Packet { generation: u64, packet: SocketPacket },
    Closed { generation: u64, reason: String },
}

pub(crate) struct LinkParams {
    pub crypto: SessionCrypto,
    pub player: Uuid,
    pub generation: u64,
}

/// Encrypted UDP connection to one voice server.
///
/// Dropping the link stops its handler task and closes the socket.
pub(crate) struct UdpLink {
    send_tx: Sender<SocketPacket>,
    local_addr: SocketAddr,
}

impl UdpLink {
    /// Resolves `addr`, binds a socket of the same family and connects it.
    pub(crate) async fn connect(
        addr: &str,
        params: LinkParams,
        event_tx: Sender<LinkEvent>,
    ) -> Result<Self, SdkError> {
        let target = lookup_host(addr)
            .await
            .map_err(|e| SdkError::ConnectionFailed(format!("cannot resolve {addr}: {e}")))?
            .next()
            .ok_or_else(|| SdkError::ConnectionFailed(format!("no address for {addr}")))?;

        let bind: SocketAddr = if target.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind)
            .await
            .map_err(|e| SdkError::ConnectionFailed(format!("UDP bind failed: {e}")))?;
        socket
            .connect(target)
            .await
            .map_err(|e| SdkError::ConnectionFailed(format!("UDP connect failed: {e}")))?;
        let local_addr = socket.local_addr()?;

        debug!("[Voice] UDP {} connected to {}", local_addr, target);

        let (send_tx, send_rx) = unbounded();
        Self::spawn_handler(socket, send_rx, params, event_tx);

        Ok(Self {
            send_tx,
            local_addr,
        })
    }

    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Queues a packet; fails only after the handler has stopped.
    pub(crate) fn send(&self, packet: SocketPacket) -> Result<(), SdkError> {
        self.send_tx
            .try_send(packet)
            .map_err(|_| SdkError::NotConnected)
    }

    fn spawn_handler(
        socket: UdpSocket,
        send_rx: Receiver<SocketPacket>,
        params: LinkParams,
        event_tx: Sender<LinkEvent>,
    ) {
        tokio::spawn(async move {
            let registry = PacketRegistry::clientbound();
            let mut read_buf = vec![0u8; PACKET_BUFFER_SIZE];

            let failure = loop {
                tokio::select! {
                    result = send_rx.recv() => {
                        // Sender dropped: the session replaced or closed this link.
                        let Ok(packet) = result else { break None };
                        if let Err(e) = Self::handle_outgoing(&socket, &params, &packet).await {
                            break Some(e);
                        }
                    }

                    result = socket.recv(&mut read_buf) => {
                        match result {
                            Ok(n) => {
                                Self::handle_incoming(&read_buf[..n], &params, &registry, &event_tx).await;
                            }
                            Err(e) => break Some(format!("receive error: {e}")),
                        }
                    }
                }
            };

            if let Some(reason) = failure {
                warn!("[Voice] UDP link failed: {}", reason);
                let _ = event_tx
                    .send(LinkEvent::Closed {
                        generation: params.generation,
                        reason,
                    })
                    .await;
            }
            debug!("[Voice] UDP handler stopped");
        });
    }

    async fn handle_outgoing(
        socket: &UdpSocket,
        params: &LinkParams,
        packet: &SocketPacket,
    ) -> Result<(), String> {
        let datagram = match encode_serverbound(&params.crypto, params.player, packet) {
            Ok(datagram) => datagram,
            Err(e) => {
                warn!("[Voice] Dropping unencodable {:?} packet: {}", packet.kind(), e);
                return Ok(());
            }
        };
        socket
            .send(&datagram)
            .await
            .map_err(|e| format!("send error: {e}"))?;
        trace!("[Voice] Sent {:?} ({} bytes)", packet.kind(), datagram.len());
        Ok(())
    }

    async fn handle_incoming(
        datagram: &[u8],
        params: &LinkParams,
        registry: &PacketRegistry,
        event_tx: &Sender<LinkEvent>,
    ) {
        match decode_clientbound(&params.crypto, registry, datagram) {
            Ok(Some(packet)) => {
                trace!("[Voice] Received {:?}", packet.kind());
                let _ = event_tx
                    .send(LinkEvent::Packet {
                        generation: params.generation,
                        packet,
                    })
                    .await;
            }
            Ok(None) => trace!("[Voice] Ignoring foreign datagram ({} bytes)", datagram.len()),
            Err(e) => trace!("[Voice] Dropping undecodable datagram: {}", e),
        }
    }
}

impl Drop for UdpLink {
    fn drop(&mut self) {
        self.send_tx.close();
    }
}
