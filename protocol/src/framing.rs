//! Encrypted UDP datagram framing.
//!
//! Serverbound: `[magic][player uuid][varint len][iv ++ ciphertext]`.
//! Clientbound: `[magic][varint len][iv ++ ciphertext]`.
//! The plaintext is `[kind][payload]` in both directions.

use crate::crypto::SessionCrypto;
use crate::error::ProtocolError;
use crate::io::ByteBuf;
use crate::packet::{PacketRegistry, SocketPacket};
use crate::uuid::Uuid;

pub const MAGIC_BYTE: u8 = 0xFF;

fn seal(crypto: &SessionCrypto, packet: &SocketPacket) -> Result<Vec<u8>, ProtocolError> {
    let mut inner = ByteBuf::new();
    inner.write_u8(packet.kind().as_u8());
    packet.write_payload(&mut inner)?;
    Ok(crypto.encrypt(inner.as_slice()))
}

fn open(
    crypto: &SessionCrypto,
    registry: &PacketRegistry,
    outer: &mut ByteBuf,
) -> Result<Option<SocketPacket>, ProtocolError> {
    let max = outer.readable_bytes();
    let blob = outer.read_byte_array(max)?;
    let mut inner = ByteBuf::from(crypto.decrypt(&blob)?);
    let kind = inner.read_u8()?;
    registry.decode(kind, &mut inner)
}

/// Frames a packet as a client sends it.
///
/// # Errors
/// Propagates payload encoding failures.
pub fn encode_serverbound(
    crypto: &SessionCrypto,
    player: Uuid,
    packet: &SocketPacket,
) -> Result<Vec<u8>, ProtocolError> {
    let blob = seal(crypto, packet)?;
    let mut outer = ByteBuf::with_capacity(1 + 16 + 5 + blob.len());
    outer.write_u8(MAGIC_BYTE);
    outer.write_uuid(player);
    outer.write_byte_array(&blob);
    Ok(outer.into_bytes())
}

/// Frames a packet as a voice server sends it.
///
/// # Errors
/// Propagates payload encoding failures.
pub fn encode_clientbound(
    crypto: &SessionCrypto,
    packet: &SocketPacket,
) -> Result<Vec<u8>, ProtocolError> {
    let blob = seal(crypto, packet)?;
    let mut outer = ByteBuf::with_capacity(1 + 5 + blob.len());
    outer.write_u8(MAGIC_BYTE);
    outer.write_byte_array(&blob);
    Ok(outer.into_bytes())
}

/// Decodes a datagram received from a voice server.
///
/// Returns `Ok(None)` for a foreign magic byte or an unregistered kind.
///
/// # Errors
/// Returns an error for truncated frames, failed decryption, or a malformed payload.
pub fn decode_clientbound(
    crypto: &SessionCrypto,
    registry: &PacketRegistry,
    datagram: &[u8],
) -> Result<Option<SocketPacket>, ProtocolError> {
    let mut outer = ByteBuf::wrap(datagram);
    if outer.read_u8()? != MAGIC_BYTE {
        return Ok(None);
    }
    open(crypto, registry, &mut outer)
}

/// Decodes a datagram received from a client, returning the sender's player id.
///
/// # Errors
/// Same as [`decode_clientbound`].
pub fn decode_serverbound(
    crypto: &SessionCrypto,
    registry: &PacketRegistry,
    datagram: &[u8],
) -> Result<Option<(Uuid, SocketPacket)>, ProtocolError> {
    let mut outer = ByteBuf::wrap(datagram);
    if outer.read_u8()? != MAGIC_BYTE {
        return Ok(None);
    }
    let player = outer.read_uuid()?;
    Ok(open(crypto, registry, &mut outer)?.map(|packet| (player, packet)))
}

/// Reads the player id of a serverbound datagram without decrypting it.
///
/// A server uses this to pick the right session key.
#[must_use]
pub fn peek_player(datagram: &[u8]) -> Option<Uuid> {
    let mut outer = ByteBuf::wrap(datagram);
    if outer.read_u8().ok()? != MAGIC_BYTE {
        return None;
    }
    outer.read_uuid().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{MicPacket, PlayerSoundPacket};
    use crate::packet_id::PacketKind;

    fn crypto() -> SessionCrypto {
        SessionCrypto::new(Uuid::new(0x1122_3344_5566_7788, -0x1122_3344_5566_7788))
    }

    fn player() -> Uuid {
        Uuid::new(42, 43)
    }

    #[test]
    fn serverbound_roundtrip() {
        let packet = SocketPacket::Mic(MicPacket {
            data: vec![1, 2, 3, 4],
            sequence_number: 9,
            whispering: false,
        });
        let datagram = encode_serverbound(&crypto(), player(), &packet).unwrap();
        assert_eq!(datagram[0], MAGIC_BYTE);
        assert_eq!(peek_player(&datagram), Some(player()));

        let decoded =
            decode_serverbound(&crypto(), &PacketRegistry::serverbound(), &datagram).unwrap();
        assert_eq!(decoded, Some((player(), packet)));
    }

    #[test]
    fn clientbound_roundtrip() {
        let packet = SocketPacket::PlayerSound(PlayerSoundPacket {
            channel_id: Uuid::new(1, 1),
            sender: Uuid::new(2, 2),
            data: vec![7; 120],
            sequence_number: 1000,
            distance: 32.0,
            whispering: false,
            category: None,
        });
        let datagram = encode_clientbound(&crypto(), &packet).unwrap();
        let decoded =
            decode_clientbound(&crypto(), &PacketRegistry::clientbound(), &datagram).unwrap();
        assert_eq!(decoded, Some(packet));
    }

    #[test]
    fn serverbound_layout() {
        let datagram =
            encode_serverbound(&crypto(), player(), &SocketPacket::KeepAlive).unwrap();
        // magic + uuid + varint(32) + iv + one padded block
        assert_eq!(datagram.len(), 1 + 16 + 1 + 32);
        assert_eq!(datagram[17], 32);
        assert_eq!(&datagram[1..17], &player().to_bytes());
    }

    #[test]
    fn wrong_magic_is_dropped() {
        let mut datagram = encode_clientbound(&crypto(), &SocketPacket::Ping).unwrap();
        datagram[0] = 0x00;
        assert_eq!(
            decode_clientbound(&crypto(), &PacketRegistry::clientbound(), &datagram),
            Ok(None)
        );
        assert_eq!(peek_player(&datagram), None);
    }

    #[test]
    fn unregistered_kind_is_dropped() {
        let datagram = encode_clientbound(&crypto(), &SocketPacket::ConnectionCheck).unwrap();
        assert_eq!(
            decode_clientbound(&crypto(), &PacketRegistry::clientbound(), &datagram),
            Ok(None)
        );
        let mut registry = PacketRegistry::new();
        registry.register(PacketKind::ConnectionCheck, |_| Ok(SocketPacket::ConnectionCheck));
        assert_eq!(
            decode_clientbound(&crypto(), &registry, &datagram),
            Ok(Some(SocketPacket::ConnectionCheck))
        );
    }

    #[test]
    fn empty_datagram_is_an_error() {
        assert!(matches!(
            decode_clientbound(&crypto(), &PacketRegistry::clientbound(), &[]),
            Err(ProtocolError::Underflow { .. })
        ));
    }

    #[test]
    fn different_secret_does_not_yield_the_packet() {
        let datagram = encode_clientbound(&crypto(), &SocketPacket::KeepAlive).unwrap();
        let other = SessionCrypto::new(Uuid::new(1, 1));
        let decoded = decode_clientbound(&other, &PacketRegistry::clientbound(), &datagram);
        assert_ne!(decoded, Ok(Some(SocketPacket::KeepAlive)));
    }
}
