//! Plugin channel carried over a TCP tunnel to a game-protocol proxy.
//!
//! Every frame is a big-endian `u32` body length followed by the body:
//! `[kind:u8]` then, for payload and register frames, a UTF channel name and
//! (payload only) a length-prefixed byte array.

use std::net::IpAddr;
use std::time::Duration;

use async_channel::{unbounded, Receiver, Sender};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, error, trace};
use voicechat_protocol::io::{ByteBuf, DEFAULT_MAX_UTF_LENGTH};
use voicechat_protocol::ProtocolError;
use voicechat_sdk::{HostEvent, PluginChannel, SdkError};

const CONNECT_TIMEOUT_SECS: u64 = 5;
const READ_BUFFER_SIZE: usize = 4096;
const HEADER_LENGTH: usize = 4;

/// Largest frame body accepted from the proxy.
pub const MAX_FRAME_LENGTH: usize = 1 << 20;

const KIND_LOGIN: u8 = 0;
const KIND_SPAWN: u8 = 1;
const KIND_PAYLOAD: u8 = 2;
const KIND_REGISTER: u8 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelFrame {
    Login,
    Spawn,
    Payload { channel: String, data: Vec<u8> },
    Register { channel: String },
}

impl TunnelFrame {
    /// # Errors
    /// Fails when the channel name is too long or the body exceeds [`MAX_FRAME_LENGTH`].
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut body = ByteBuf::new();
        match self {
            Self::Login => body.write_u8(KIND_LOGIN),
            Self::Spawn => body.write_u8(KIND_SPAWN),
            Self::Payload { channel, data } => {
                body.write_u8(KIND_PAYLOAD);
                body.write_utf(channel, DEFAULT_MAX_UTF_LENGTH)?;
                body.write_byte_array(data);
            }
            Self::Register { channel } => {
                body.write_u8(KIND_REGISTER);
                body.write_utf(channel, DEFAULT_MAX_UTF_LENGTH)?;
            }
        }

        let length = body.writer_index();
        let header = u32::try_from(length)
            .ok()
            .filter(|_| length <= MAX_FRAME_LENGTH)
            .ok_or(ProtocolError::ByteArrayTooLong {
                length,
                max: MAX_FRAME_LENGTH,
            })?;

        let mut frame = Vec::with_capacity(HEADER_LENGTH + length);
        frame.extend_from_slice(&header.to_be_bytes());
        frame.extend_from_slice(body.as_slice());
        Ok(frame)
    }

    /// Decodes the first frame in `buf`, returning it with the bytes consumed,
    /// or `Ok(None)` while the frame is incomplete.
    ///
    /// # Errors
    /// Fails on an oversized length, an unknown kind or a malformed body.
    pub fn decode(buf: &[u8]) -> Result<Option<(Self, usize)>, ProtocolError> {
        if buf.len() < HEADER_LENGTH {
            return Ok(None);
        }
        let mut header = [0u8; HEADER_LENGTH];
        header.copy_from_slice(&buf[..HEADER_LENGTH]);
        let length = u32::from_be_bytes(header) as usize;
        if length > MAX_FRAME_LENGTH {
            return Err(ProtocolError::ByteArrayTooLong {
                length,
                max: MAX_FRAME_LENGTH,
            });
        }
        let total = HEADER_LENGTH + length;
        if buf.len() < total {
            return Ok(None);
        }

        let mut body = ByteBuf::wrap(&buf[HEADER_LENGTH..total]);
        let frame = match body.read_u8()? {
            KIND_LOGIN => Self::Login,
            KIND_SPAWN => Self::Spawn,
            KIND_PAYLOAD => Self::Payload {
                channel: body.read_utf(DEFAULT_MAX_UTF_LENGTH)?,
                data: body.read_byte_array(length)?,
            },
            KIND_REGISTER => Self::Register {
                channel: body.read_utf(DEFAULT_MAX_UTF_LENGTH)?,
            },
            other => return Err(ProtocolError::UnknownPacketKind(other)),
        };
        Ok(Some((frame, total)))
    }

    fn into_host_event(self) -> Option<HostEvent> {
        match self {
            Self::Login => Some(HostEvent::Login),
            Self::Spawn => Some(HostEvent::Spawn),
            Self::Payload { channel, data } => Some(HostEvent::Payload { channel, data }),
            Self::Register { .. } => None,
        }
    }
}

/// [`PluginChannel`] backed by a TCP connection to the proxy.
pub struct TcpPluginChannel {
    send_tx: Sender<TunnelFrame>,
    peer_ip: IpAddr,
}

impl TcpPluginChannel {
    /// Connects and returns the channel plus the stream of host events read from it.
    /// The stream closes when the tunnel does.
    ///
    /// # Errors
    /// Returns [`SdkError::ConnectionFailed`] when the proxy cannot be reached.
    pub async fn connect(addr: &str) -> Result<(Self, Receiver<HostEvent>), SdkError> {
        debug!("[Tunnel] Connecting to {}", addr);
        let socket = tokio::time::timeout(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            TcpStream::connect(addr),
        )
        .await
        .map_err(|_| SdkError::ConnectionFailed("operation timed out".to_string()))?
        .map_err(|e| SdkError::ConnectionFailed(e.to_string()))?;
        let peer_ip = socket.peer_addr()?.ip();

        debug!("[Tunnel] Connected to {}", addr);

        let (send_tx, send_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();
        Self::spawn_handler(socket, send_rx, event_tx);

        Ok((Self { send_tx, peer_ip }, event_rx))
    }

    fn queue(&self, frame: TunnelFrame) -> Result<(), SdkError> {
        self.send_tx
            .try_send(frame)
            .map_err(|_| SdkError::Channel("tunnel closed".to_string()))
    }

    fn spawn_handler(
        mut socket: TcpStream,
        send_rx: Receiver<TunnelFrame>,
        event_tx: Sender<HostEvent>,
    ) {
        tokio::spawn(async move {
            let mut read_buf = [0u8; READ_BUFFER_SIZE];
            let mut accumulator: Vec<u8> = Vec::new();

            loop {
                tokio::select! {
                    result = send_rx.recv() => {
                        let Ok(frame) = result else { break };
                        if let Err(e) = Self::handle_outgoing(&mut socket, &frame).await {
                            error!("[Tunnel] {}", e);
                            break;
                        }
                    }

                    result = socket.read(&mut read_buf) => {
                        match result {
                            Ok(0) => break,
                            Ok(n) => {
                                accumulator.extend_from_slice(&read_buf[..n]);
                                if let Err(e) = Self::drain_frames(&mut accumulator, &event_tx).await {
                                    error!("[Tunnel] {}", e);
                                    break;
                                }
                            }
                            Err(e) => {
                                error!("[Tunnel] Read error: {}", e);
                                break;
                            }
                        }
                    }
                }
            }

            debug!("[Tunnel] Handler stopped");
        });
    }

    async fn handle_outgoing(socket: &mut TcpStream, frame: &TunnelFrame) -> Result<(), String> {
        let bytes = frame
            .encode()
            .map_err(|e| format!("encode error: {e}"))?;
        socket
            .write_all(&bytes)
            .await
            .map_err(|e| format!("write error: {e}"))
    }

    /// Forwards every complete frame in `accumulator` and keeps the remainder.
    async fn drain_frames(
        accumulator: &mut Vec<u8>,
        event_tx: &Sender<HostEvent>,
    ) -> Result<(), ProtocolError> {
        while let Some((frame, size)) = TunnelFrame::decode(accumulator)? {
            accumulator.drain(..size);
            trace!("[Tunnel] Received {:?}", frame);
            if let Some(event) = frame.into_host_event() {
                let _ = event_tx.send(event).await;
            }
        }
        Ok(())
    }
}

impl PluginChannel for TcpPluginChannel {
    fn register_channel(&self, channel: &str) -> Result<(), SdkError> {
        self.queue(TunnelFrame::Register {
            channel: channel.to_string(),
        })
    }

    fn send(&self, channel: &str, data: Vec<u8>) -> Result<(), SdkError> {
        self.queue(TunnelFrame::Payload {
            channel: channel.to_string(),
            data,
        })
    }

    fn peer_ip(&self) -> Option<IpAddr> {
        Some(self.peer_ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn payload_frame_layout() {
        let frame = TunnelFrame::Payload {
            channel: "a:b".into(),
            data: vec![9, 9],
        };
        let bytes = frame.encode().unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 8, 2, 3, b'a', b':', b'b', 2, 9, 9]);
        assert_eq!(TunnelFrame::decode(&bytes).unwrap(), Some((frame, 12)));
    }

    #[test]
    fn partial_frame_waits_for_more() {
        let bytes = TunnelFrame::Spawn.encode().unwrap();
        assert_eq!(TunnelFrame::decode(&bytes[..3]).unwrap(), None);
        assert_eq!(TunnelFrame::decode(&bytes[..4]).unwrap(), None);
        assert_eq!(
            TunnelFrame::decode(&bytes).unwrap(),
            Some((TunnelFrame::Spawn, 5))
        );
    }

    #[test]
    fn oversized_and_unknown_frames_fail() {
        let huge = u32::try_from(MAX_FRAME_LENGTH + 1).unwrap().to_be_bytes();
        assert!(TunnelFrame::decode(&huge).is_err());
        assert_eq!(
            TunnelFrame::decode(&[0, 0, 0, 1, 0x7F]),
            Err(ProtocolError::UnknownPacketKind(0x7F))
        );
    }

    #[tokio::test]
    async fn test_tunnel_delivers_events_and_registrations() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let (connected, accepted) =
            tokio::join!(TcpPluginChannel::connect(&addr), listener.accept());
        let (channel, events) = connected.unwrap();
        let (mut proxy, _) = accepted.unwrap();
        assert_eq!(channel.peer_ip(), Some("127.0.0.1".parse().unwrap()));

        let mut outgoing = TunnelFrame::Login.encode().unwrap();
        outgoing.extend(
            TunnelFrame::Payload {
                channel: "voicechat:secret".into(),
                data: vec![1, 2, 3],
            }
            .encode()
            .unwrap(),
        );
        proxy.write_all(&outgoing).await.unwrap();

        assert_eq!(events.recv().await.unwrap(), HostEvent::Login);
        assert_eq!(
            events.recv().await.unwrap(),
            HostEvent::Payload {
                channel: "voicechat:secret".into(),
                data: vec![1, 2, 3]
            }
        );

        channel.register_channel("voicechat:main").unwrap();
        let expected = TunnelFrame::Register {
            channel: "voicechat:main".into(),
        }
        .encode()
        .unwrap();
        let mut received = vec![0u8; expected.len()];
        proxy.read_exact(&mut received).await.unwrap();
        assert_eq!(received, expected);

        drop(proxy);
        assert!(events.recv().await.is_err());
    }
}
