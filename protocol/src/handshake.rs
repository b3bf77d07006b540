//! Messages exchanged on the host's named plugin channels before the UDP
//! session exists.

use crate::error::ProtocolError;
use crate::io::{ByteBuf, DEFAULT_MAX_UTF_LENGTH};
use crate::uuid::Uuid;

pub mod channel {
    pub const REQUEST_SECRET: &str = "voicechat:request_secret";
    pub const SECRET: &str = "voicechat:secret";
    pub const PLAYER_STATE: &str = "voicechat:player_state";
    pub const PLAYER_STATES: &str = "voicechat:player_states";
    pub const SET_GROUP: &str = "voicechat:set_group";
    pub const ADD_GROUP: &str = "voicechat:add_group";
    pub const REMOVE_GROUP: &str = "voicechat:remove_group";
    pub const LEAVE_GROUP: &str = "voicechat:leave_group";
    pub const JOINED_GROUP: &str = "voicechat:joined_group";
    pub const MAIN: &str = "voicechat:main";

    /// Every channel that must be registered with the host before use.
    pub const ALL: [&str; 10] = [
        REQUEST_SECRET,
        SECRET,
        PLAYER_STATE,
        PLAYER_STATES,
        SET_GROUP,
        ADD_GROUP,
        REMOVE_GROUP,
        LEAVE_GROUP,
        JOINED_GROUP,
        MAIN,
    ];
}

pub const GROUP_NAME_MAX_LENGTH: usize = 512;
pub const GROUP_PASSWORD_MAX_LENGTH: usize = 512;

/// Upper bound on preallocation for a snapshot; the count is peer-controlled.
const MAX_PREALLOCATED_STATES: usize = 1024;

/// Session parameters issued by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct SecretPacket {
    pub secret: Uuid,
    pub server_port: i32,
    pub player_uuid: Uuid,
    pub codec: u8,
    pub mtu_size: i32,
    pub voice_chat_distance: f64,
    pub keep_alive: i32,
    pub groups_enabled: bool,
    pub voice_host: String,
    pub allow_recording: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerState {
    pub disabled: bool,
    pub disconnected: bool,
    pub player_uuid: Uuid,
    pub name: String,
    pub group: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupState {
    pub id: Uuid,
    pub name: String,
    pub has_password: bool,
    pub persistent: bool,
    pub hidden: bool,
    pub group_type: i16,
}

#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum HandshakePacket {
    RequestSecret { compatibility_version: i32 },
    Secret(SecretPacket),
    PlayerState(PlayerState),
    PlayerStates(Vec<PlayerState>),
    SetGroup { group: Uuid, password: Option<String> },
    AddGroup(GroupState),
    RemoveGroup { id: Uuid },
    LeaveGroup,
    JoinedGroup { group: Option<Uuid>, wrong_password: bool },
}

fn write_optional_uuid(buf: &mut ByteBuf, value: Option<Uuid>) {
    buf.write_bool(value.is_some());
    if let Some(value) = value {
        buf.write_uuid(value);
    }
}

fn read_optional_uuid(buf: &mut ByteBuf) -> Result<Option<Uuid>, ProtocolError> {
    if buf.read_bool()? {
        Ok(Some(buf.read_uuid()?))
    } else {
        Ok(None)
    }
}

impl PlayerState {
    fn write(&self, buf: &mut ByteBuf) -> Result<(), ProtocolError> {
        buf.write_bool(self.disabled);
        buf.write_bool(self.disconnected);
        buf.write_uuid(self.player_uuid);
        buf.write_utf(&self.name, DEFAULT_MAX_UTF_LENGTH)?;
        write_optional_uuid(buf, self.group);
        Ok(())
    }

    fn read(buf: &mut ByteBuf) -> Result<Self, ProtocolError> {
        Ok(Self {
            disabled: buf.read_bool()?,
            disconnected: buf.read_bool()?,
            player_uuid: buf.read_uuid()?,
            name: buf.read_utf(DEFAULT_MAX_UTF_LENGTH)?,
            group: read_optional_uuid(buf)?,
        })
    }
}

impl GroupState {
    fn write(&self, buf: &mut ByteBuf) -> Result<(), ProtocolError> {
        buf.write_uuid(self.id);
        buf.write_utf(&self.name, GROUP_NAME_MAX_LENGTH)?;
        buf.write_bool(self.has_password);
        buf.write_bool(self.persistent);
        buf.write_bool(self.hidden);
        buf.write_i16(self.group_type);
        Ok(())
    }

    fn read(buf: &mut ByteBuf) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: buf.read_uuid()?,
            name: buf.read_utf(GROUP_NAME_MAX_LENGTH)?,
            has_password: buf.read_bool()?,
            persistent: buf.read_bool()?,
            hidden: buf.read_bool()?,
            group_type: buf.read_i16()?,
        })
    }
}

impl SecretPacket {
    fn write(&self, buf: &mut ByteBuf) -> Result<(), ProtocolError> {
        buf.write_uuid(self.secret);
        buf.write_i32(self.server_port);
        buf.write_uuid(self.player_uuid);
        buf.write_u8(self.codec);
        buf.write_i32(self.mtu_size);
        buf.write_f64(self.voice_chat_distance);
        buf.write_i32(self.keep_alive);
        buf.write_bool(self.groups_enabled);
        buf.write_utf(&self.voice_host, DEFAULT_MAX_UTF_LENGTH)?;
        buf.write_bool(self.allow_recording);
        Ok(())
    }

    fn read(buf: &mut ByteBuf) -> Result<Self, ProtocolError> {
        Ok(Self {
            secret: buf.read_uuid()?,
            server_port: buf.read_i32()?,
            player_uuid: buf.read_uuid()?,
            codec: buf.read_u8()?,
            mtu_size: buf.read_i32()?,
            voice_chat_distance: buf.read_f64()?,
            keep_alive: buf.read_i32()?,
            groups_enabled: buf.read_bool()?,
            voice_host: buf.read_utf(DEFAULT_MAX_UTF_LENGTH)?,
            allow_recording: buf.read_bool()?,
        })
    }
}

impl HandshakePacket {
    /// Name of the plugin channel this packet travels on.
    #[must_use]
    pub fn channel(&self) -> &'static str {
        match self {
            Self::RequestSecret { .. } => channel::REQUEST_SECRET,
            Self::Secret(_) => channel::SECRET,
            Self::PlayerState(_) => channel::PLAYER_STATE,
            Self::PlayerStates(_) => channel::PLAYER_STATES,
            Self::SetGroup { .. } => channel::SET_GROUP,
            Self::AddGroup(_) => channel::ADD_GROUP,
            Self::RemoveGroup { .. } => channel::REMOVE_GROUP,
            Self::LeaveGroup => channel::LEAVE_GROUP,
            Self::JoinedGroup { .. } => channel::JOINED_GROUP,
        }
    }

    /// Encodes the channel payload.
    ///
    /// # Errors
    /// Returns [`ProtocolError::StringTooLong`] when a string field is over its cap.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = ByteBuf::new();
        match self {
            Self::RequestSecret {
                compatibility_version,
            } => buf.write_i32(*compatibility_version),
            Self::Secret(secret) => secret.write(&mut buf)?,
            Self::PlayerState(state) => state.write(&mut buf)?,
            Self::PlayerStates(states) => {
                let count = i32::try_from(states.len()).map_err(|_| {
                    ProtocolError::ByteArrayTooLong {
                        length: states.len(),
                        max: i32::MAX as usize,
                    }
                })?;
                buf.write_i32(count);
                for state in states {
                    state.write(&mut buf)?;
                }
            }
            Self::SetGroup { group, password } => {
                buf.write_uuid(*group);
                buf.write_bool(password.is_some());
                if let Some(password) = password {
                    buf.write_utf(password, GROUP_PASSWORD_MAX_LENGTH)?;
                }
            }
            Self::AddGroup(group) => group.write(&mut buf)?,
            Self::RemoveGroup { id } => buf.write_uuid(*id),
            Self::LeaveGroup => {}
            Self::JoinedGroup {
                group,
                wrong_password,
            } => {
                write_optional_uuid(&mut buf, *group);
                buf.write_bool(*wrong_password);
            }
        }
        Ok(buf.into_bytes())
    }

    /// Decodes a payload received on `channel`.
    ///
    /// # Errors
    /// Returns [`ProtocolError::UnknownChannel`] for channels that carry no
    /// typed payload (including `voicechat:main`), or the underlying decode error.
    pub fn decode(channel: &str, data: &[u8]) -> Result<Self, ProtocolError> {
        let mut buf = ByteBuf::wrap(data);
        let packet = match channel {
            channel::REQUEST_SECRET => Self::RequestSecret {
                compatibility_version: buf.read_i32()?,
            },
            channel::SECRET => Self::Secret(SecretPacket::read(&mut buf)?),
            channel::PLAYER_STATE => Self::PlayerState(PlayerState::read(&mut buf)?),
            channel::PLAYER_STATES => {
                let count = buf.read_i32()?;
                let count =
                    usize::try_from(count).map_err(|_| ProtocolError::NegativeLength(count))?;
                let mut states = Vec::with_capacity(count.min(MAX_PREALLOCATED_STATES));
                for _ in 0..count {
                    states.push(PlayerState::read(&mut buf)?);
                }
                Self::PlayerStates(states)
            }
            channel::SET_GROUP => {
                let group = buf.read_uuid()?;
                let password = if buf.read_bool()? {
                    Some(buf.read_utf(GROUP_PASSWORD_MAX_LENGTH)?)
                } else {
                    None
                };
                Self::SetGroup { group, password }
            }
            channel::ADD_GROUP => Self::AddGroup(GroupState::read(&mut buf)?),
            channel::REMOVE_GROUP => Self::RemoveGroup {
                id: buf.read_uuid()?,
            },
            channel::LEAVE_GROUP => Self::LeaveGroup,
            channel::JOINED_GROUP => Self::JoinedGroup {
                group: read_optional_uuid(&mut buf)?,
                wrong_password: buf.read_bool()?,
            },
            other => return Err(ProtocolError::UnknownChannel(other.to_string())),
        };
        Ok(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(n: i64, name: &str, group: Option<Uuid>) -> PlayerState {
        PlayerState {
            disabled: false,
            disconnected: n % 2 == 0,
            player_uuid: Uuid::new(n, n),
            name: name.into(),
            group,
        }
    }

    fn roundtrip(packet: &HandshakePacket) {
        let bytes = packet.encode().unwrap();
        assert_eq!(&HandshakePacket::decode(packet.channel(), &bytes).unwrap(), packet);
    }

    #[test]
    fn request_secret_is_big_endian_version() {
        let packet = HandshakePacket::RequestSecret {
            compatibility_version: 18,
        };
        assert_eq!(packet.encode().unwrap(), vec![0, 0, 0, 18]);
        assert_eq!(packet.channel(), "voicechat:request_secret");
    }

    #[test]
    fn secret_roundtrip() {
        roundtrip(&HandshakePacket::Secret(SecretPacket {
            secret: Uuid::new(-5, 5),
            server_port: 24454,
            player_uuid: Uuid::new(1, 2),
            codec: 0,
            mtu_size: 1024,
            voice_chat_distance: 48.0,
            keep_alive: 1000,
            groups_enabled: true,
            voice_host: String::new(),
            allow_recording: false,
        }));
    }

    #[test]
    fn secret_truncated_fails() {
        let packet = HandshakePacket::Secret(SecretPacket {
            secret: Uuid::NIL,
            server_port: 1,
            player_uuid: Uuid::NIL,
            codec: 0,
            mtu_size: 0,
            voice_chat_distance: 0.0,
            keep_alive: 0,
            groups_enabled: false,
            voice_host: "voice.example.net:24454".into(),
            allow_recording: true,
        });
        let bytes = packet.encode().unwrap();
        assert!(matches!(
            HandshakePacket::decode(channel::SECRET, &bytes[..bytes.len() - 1]),
            Err(ProtocolError::Underflow { .. })
        ));
    }

    #[test]
    fn player_states_roundtrip() {
        roundtrip(&HandshakePacket::PlayerStates(vec![
            player(1, "alice", None),
            player(2, "bob", Some(Uuid::new(9, 9))),
        ]));
        roundtrip(&HandshakePacket::PlayerStates(vec![]));
    }

    #[test]
    fn player_states_negative_count() {
        assert_eq!(
            HandshakePacket::decode(channel::PLAYER_STATES, &(-1i32).to_be_bytes()),
            Err(ProtocolError::NegativeLength(-1))
        );
    }

    #[test]
    fn player_states_huge_count_fails_without_allocating() {
        assert!(matches!(
            HandshakePacket::decode(channel::PLAYER_STATES, &i32::MAX.to_be_bytes()),
            Err(ProtocolError::Underflow { .. })
        ));
    }

    #[test]
    fn group_messages_roundtrip() {
        roundtrip(&HandshakePacket::AddGroup(GroupState {
            id: Uuid::new(3, 4),
            name: "Builders".into(),
            has_password: true,
            persistent: false,
            hidden: false,
            group_type: 1,
        }));
        roundtrip(&HandshakePacket::RemoveGroup {
            id: Uuid::new(3, 4),
        });
        roundtrip(&HandshakePacket::SetGroup {
            group: Uuid::new(3, 4),
            password: Some("hunter2".into()),
        });
        roundtrip(&HandshakePacket::SetGroup {
            group: Uuid::new(3, 4),
            password: None,
        });
        roundtrip(&HandshakePacket::JoinedGroup {
            group: None,
            wrong_password: true,
        });
        roundtrip(&HandshakePacket::LeaveGroup);
    }

    #[test]
    fn absent_password_is_not_empty_password() {
        let absent = HandshakePacket::SetGroup {
            group: Uuid::NIL,
            password: None,
        };
        let empty = HandshakePacket::SetGroup {
            group: Uuid::NIL,
            password: Some(String::new()),
        };
        assert_ne!(absent.encode().unwrap(), empty.encode().unwrap());
    }

    #[test]
    fn group_name_over_cap() {
        let packet = HandshakePacket::AddGroup(GroupState {
            id: Uuid::NIL,
            name: "g".repeat(GROUP_NAME_MAX_LENGTH + 1),
            has_password: false,
            persistent: false,
            hidden: false,
            group_type: 0,
        });
        assert!(matches!(
            packet.encode(),
            Err(ProtocolError::StringTooLong { .. })
        ));
    }

    #[test]
    fn main_and_unknown_channels_are_rejected() {
        assert_eq!(
            HandshakePacket::decode(channel::MAIN, &[]),
            Err(ProtocolError::UnknownChannel(channel::MAIN.into()))
        );
        assert!(HandshakePacket::decode("minecraft:brand", &[]).is_err());
    }

    #[test]
    fn channel_list_is_complete() {
        assert_eq!(channel::ALL.len(), 10);
        assert!(channel::ALL.iter().all(|c| c.starts_with("voicechat:")));
    }
}
