pub mod crypto;
pub mod error;
pub mod framing;
pub mod handshake;
pub mod io;
pub mod packet;
pub mod packet_id;
pub mod uuid;

pub use crypto::SessionCrypto;
pub use error::ProtocolError;
pub use handshake::{GroupState, HandshakePacket, PlayerState, SecretPacket};
pub use io::ByteBuf;
pub use packet::{
    GroupSoundPacket, Location, LocationSoundPacket, MicPacket, PacketRegistry,
    PlayerSoundPacket, SocketPacket,
};
pub use packet_id::PacketKind;
pub use uuid::Uuid;
