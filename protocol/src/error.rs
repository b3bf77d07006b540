use thiserror::Error;

/// Protocol encoding and decoding errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("buffer underflow: needed {needed} bytes, {available} available")]
    Underflow { needed: usize, available: usize },

    #[error("VarInt too big")]
    VarIntTooBig,

    #[error("negative length prefix: {0}")]
    NegativeLength(i32),

    #[error("byte array of {length} bytes exceeds allowed {max}")]
    ByteArrayTooLong { length: usize, max: usize },

    #[error("string of length {length} exceeds allowed {max}")]
    StringTooLong { length: usize, max: usize },

    #[error("invalid UTF-8 encoding")]
    InvalidUtf8,

    #[error("invalid UUID string: {0}")]
    InvalidUuid(String),

    #[error("unknown packet kind: 0x{0:02x}")]
    UnknownPacketKind(u8),

    #[error("unknown handshake channel: {0}")]
    UnknownChannel(String),

    #[error("decryption failed")]
    Decryption,
}
