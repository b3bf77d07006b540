use crate::error::ProtocolError;

macro_rules! packet_kinds {
    ($($name:ident = $val:expr),* $(,)?) => {
        /// Leading byte of a decrypted UDP payload.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum PacketKind { $($name = $val,)* }

        impl PacketKind {
            pub const ALL: &'static [PacketKind] = &[$(PacketKind::$name,)*];

            #[must_use]
            pub const fn as_u8(self) -> u8 { self as u8 }
        }

        impl TryFrom<u8> for PacketKind {
            type Error = ProtocolError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $($val => Ok(Self::$name),)*
                    _ => Err(ProtocolError::UnknownPacketKind(value)),
                }
            }
        }
    };
}

packet_kinds! {
    // Audio
    Mic = 0x01,
    PlayerSound = 0x02,
    GroupSound = 0x03,
    LocationSound = 0x04,

    // Session
    Authenticate = 0x05,
    AuthenticateAck = 0x06,
    Ping = 0x07,
    KeepAlive = 0x08,
    ConnectionCheck = 0x09,
    ConnectionCheckAck = 0x0A,
}
