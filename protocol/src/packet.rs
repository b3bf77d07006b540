use std::collections::HashMap;

use crate::error::ProtocolError;
use crate::io::ByteBuf;
use crate::packet_id::PacketKind;
use crate::uuid::Uuid;

pub const WHISPER_MASK: u8 = 0b01;
pub const HAS_CATEGORY_MASK: u8 = 0b10;
pub const CATEGORY_MAX_LENGTH: usize = 16;

/// Outbound microphone frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MicPacket {
    pub data: Vec<u8>,
    pub sequence_number: i64,
    pub whispering: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSoundPacket {
    pub channel_id: Uuid,
    pub sender: Uuid,
    pub data: Vec<u8>,
    pub sequence_number: i64,
    pub distance: f32,
    pub whispering: bool,
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSoundPacket {
    pub channel_id: Uuid,
    pub sender: Uuid,
    pub data: Vec<u8>,
    pub sequence_number: i64,
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationSoundPacket {
    pub channel_id: Uuid,
    pub sender: Uuid,
    pub location: Location,
    pub data: Vec<u8>,
    pub sequence_number: i64,
    pub distance: f32,
    pub category: Option<String>,
}

/// Every payload that travels inside an encrypted datagram.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum SocketPacket {
    Mic(MicPacket),
    PlayerSound(PlayerSoundPacket),
    GroupSound(GroupSoundPacket),
    LocationSound(LocationSoundPacket),
    Authenticate { player: Uuid, secret: Uuid },
    AuthenticateAck,
    Ping,
    KeepAlive,
    ConnectionCheck,
    ConnectionCheckAck,
}

fn flags(whispering: bool, category: Option<&str>) -> u8 {
    let mut flags = 0;
    if whispering {
        flags |= WHISPER_MASK;
    }
    if category.is_some() {
        flags |= HAS_CATEGORY_MASK;
    }
    flags
}

fn write_flags(
    buf: &mut ByteBuf,
    whispering: bool,
    category: Option<&str>,
) -> Result<(), ProtocolError> {
    buf.write_u8(flags(whispering, category));
    if let Some(category) = category {
        buf.write_utf(category, CATEGORY_MAX_LENGTH)?;
    }
    Ok(())
}

/// Reads the flag byte and the category it may announce.
fn read_flags(buf: &mut ByteBuf) -> Result<(u8, Option<String>), ProtocolError> {
    let flags = buf.read_u8()?;
    let category = if flags & HAS_CATEGORY_MASK != 0 {
        Some(buf.read_utf(CATEGORY_MAX_LENGTH)?)
    } else {
        None
    };
    Ok((flags, category))
}

fn read_audio(buf: &mut ByteBuf) -> Result<Vec<u8>, ProtocolError> {
    let max = buf.readable_bytes();
    buf.read_byte_array(max)
}

impl SocketPacket {
    #[must_use]
    pub fn kind(&self) -> PacketKind {
        match self {
            Self::Mic(_) => PacketKind::Mic,
            Self::PlayerSound(_) => PacketKind::PlayerSound,
            Self::GroupSound(_) => PacketKind::GroupSound,
            Self::LocationSound(_) => PacketKind::LocationSound,
            Self::Authenticate { .. } => PacketKind::Authenticate,
            Self::AuthenticateAck => PacketKind::AuthenticateAck,
            Self::Ping => PacketKind::Ping,
            Self::KeepAlive => PacketKind::KeepAlive,
            Self::ConnectionCheck => PacketKind::ConnectionCheck,
            Self::ConnectionCheckAck => PacketKind::ConnectionCheckAck,
        }
    }

    /// Serializes the payload without the kind byte.
    ///
    /// # Errors
    /// Returns [`ProtocolError::StringTooLong`] for a category over the cap.
    pub fn write_payload(&self, buf: &mut ByteBuf) -> Result<(), ProtocolError> {
        match self {
            Self::Mic(mic) => {
                buf.write_byte_array(&mic.data);
                buf.write_i64(mic.sequence_number);
                buf.write_bool(mic.whispering);
            }
            Self::PlayerSound(sound) => {
                buf.write_uuid(sound.channel_id);
                buf.write_uuid(sound.sender);
                buf.write_byte_array(&sound.data);
                buf.write_i64(sound.sequence_number);
                buf.write_f32(sound.distance);
                write_flags(buf, sound.whispering, sound.category.as_deref())?;
            }
            Self::GroupSound(sound) => {
                buf.write_uuid(sound.channel_id);
                buf.write_uuid(sound.sender);
                buf.write_byte_array(&sound.data);
                buf.write_i64(sound.sequence_number);
                write_flags(buf, false, sound.category.as_deref())?;
            }
            Self::LocationSound(sound) => {
                buf.write_uuid(sound.channel_id);
                buf.write_uuid(sound.sender);
                buf.write_f64(sound.location.x);
                buf.write_f64(sound.location.y);
                buf.write_f64(sound.location.z);
                buf.write_byte_array(&sound.data);
                buf.write_i64(sound.sequence_number);
                buf.write_f32(sound.distance);
                write_flags(buf, false, sound.category.as_deref())?;
            }
            Self::Authenticate { player, secret } => {
                buf.write_uuid(*player);
                buf.write_uuid(*secret);
            }
            Self::AuthenticateAck
            | Self::Ping
            | Self::KeepAlive
            | Self::ConnectionCheck
            | Self::ConnectionCheckAck => {}
        }
        Ok(())
    }

    fn decode_mic(buf: &mut ByteBuf) -> Result<Self, ProtocolError> {
        Ok(Self::Mic(MicPacket {
            data: read_audio(buf)?,
            sequence_number: buf.read_i64()?,
            whispering: buf.read_bool()?,
        }))
    }

    fn decode_player_sound(buf: &mut ByteBuf) -> Result<Self, ProtocolError> {
        let channel_id = buf.read_uuid()?;
        let sender = buf.read_uuid()?;
        let data = read_audio(buf)?;
        let sequence_number = buf.read_i64()?;
        let distance = buf.read_f32()?;
        let (flags, category) = read_flags(buf)?;
        Ok(Self::PlayerSound(PlayerSoundPacket {
            channel_id,
            sender,
            data,
            sequence_number,
            distance,
            whispering: flags & WHISPER_MASK != 0,
            category,
        }))
    }

    fn decode_group_sound(buf: &mut ByteBuf) -> Result<Self, ProtocolError> {
        let channel_id = buf.read_uuid()?;
        let sender = buf.read_uuid()?;
        let data = read_audio(buf)?;
        let sequence_number = buf.read_i64()?;
        let (_, category) = read_flags(buf)?;
        Ok(Self::GroupSound(GroupSoundPacket {
            channel_id,
            sender,
            data,
            sequence_number,
            category,
        }))
    }

    fn decode_location_sound(buf: &mut ByteBuf) -> Result<Self, ProtocolError> {
        let channel_id = buf.read_uuid()?;
        let sender = buf.read_uuid()?;
        let location = Location {
            x: buf.read_f64()?,
            y: buf.read_f64()?,
            z: buf.read_f64()?,
        };
        let data = read_audio(buf)?;
        let sequence_number = buf.read_i64()?;
        let distance = buf.read_f32()?;
        let (_, category) = read_flags(buf)?;
        Ok(Self::LocationSound(LocationSoundPacket {
            channel_id,
            sender,
            location,
            data,
            sequence_number,
            distance,
            category,
        }))
    }

    fn decode_authenticate(buf: &mut ByteBuf) -> Result<Self, ProtocolError> {
        Ok(Self::Authenticate {
            player: buf.read_uuid()?,
            secret: buf.read_uuid()?,
        })
    }
}

pub type Decoder = fn(&mut ByteBuf) -> Result<SocketPacket, ProtocolError>;

/// Dispatch table from kind byte to payload decoder.
///
/// Kinds without a registered decoder are dropped by [`PacketRegistry::decode`].
#[derive(Clone, Default)]
pub struct PacketRegistry {
    decoders: HashMap<u8, Decoder>,
}

impl PacketRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: PacketKind, decoder: Decoder) {
        self.decoders.insert(kind.as_u8(), decoder);
    }

    #[must_use]
    pub fn is_registered(&self, kind: PacketKind) -> bool {
        self.decoders.contains_key(&kind.as_u8())
    }

    /// Decoders for what a voice server sends to a client.
    #[must_use]
    pub fn clientbound() -> Self {
        let mut registry = Self::new();
        registry.register(PacketKind::PlayerSound, SocketPacket::decode_player_sound);
        registry.register(PacketKind::GroupSound, SocketPacket::decode_group_sound);
        registry.register(PacketKind::LocationSound, SocketPacket::decode_location_sound);
        registry.register(PacketKind::AuthenticateAck, |_| Ok(SocketPacket::AuthenticateAck));
        registry.register(PacketKind::Ping, |_| Ok(SocketPacket::Ping));
        registry.register(PacketKind::KeepAlive, |_| Ok(SocketPacket::KeepAlive));
        registry.register(PacketKind::ConnectionCheckAck, |_| {
            Ok(SocketPacket::ConnectionCheckAck)
        });
        registry
    }

    /// Decoders for what a client sends to a voice server.
    #[must_use]
    pub fn serverbound() -> Self {
        let mut registry = Self::new();
        registry.register(PacketKind::Mic, SocketPacket::decode_mic);
        registry.register(PacketKind::Authenticate, SocketPacket::decode_authenticate);
        registry.register(PacketKind::Ping, |_| Ok(SocketPacket::Ping));
        registry.register(PacketKind::KeepAlive, |_| Ok(SocketPacket::KeepAlive));
        registry.register(PacketKind::ConnectionCheck, |_| Ok(SocketPacket::ConnectionCheck));
        registry
    }

    /// Decodes the payload for `kind`, or returns `Ok(None)` when the kind is not registered.
    ///
    /// # Errors
    /// Propagates payload decode failures.
    pub fn decode(&self, kind: u8, buf: &mut ByteBuf) -> Result<Option<SocketPacket>, ProtocolError> {
        match self.decoders.get(&kind) {
            Some(decoder) => decoder(buf).map(Some),
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for PacketRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.decoders.keys().copied().collect();
        kinds.sort_unstable();
        f.debug_struct("PacketRegistry").field("kinds", &kinds).finish()
    }
}
