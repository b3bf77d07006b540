use std::fmt;
use std::str::FromStr;

use crate::error::ProtocolError;

/// Positions of the hyphens in the canonical 8-4-4-4-12 form.
const HYPHENS: [usize; 4] = [8, 13, 18, 23];
const CANONICAL_LENGTH: usize = 36;

/// 128-bit identifier stored as two signed 64-bit halves.
///
/// Halves above `2^63` are kept in two's complement, so the value is bit-exact
/// with the wire format and with the canonical string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Uuid {
    most_significant_bits: i64,
    least_significant_bits: i64,
}

impl Uuid {
    pub const NIL: Self = Self::new(0, 0);

    #[must_use]
    pub const fn new(most_significant_bits: i64, least_significant_bits: i64) -> Self {
        Self {
            most_significant_bits,
            least_significant_bits,
        }
    }

    #[must_use]
    pub const fn most_significant_bits(&self) -> i64 {
        self.most_significant_bits
    }

    #[must_use]
    pub const fn least_significant_bits(&self) -> i64 {
        self.least_significant_bits
    }

    /// The halves concatenated big-endian.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[..8].copy_from_slice(&self.most_significant_bits.to_be_bytes());
        out[8..].copy_from_slice(&self.least_significant_bits.to_be_bytes());
        out
    }
}

impl fmt::Display for Uuid {
    #[allow(clippy::cast_sign_loss)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let most = self.most_significant_bits as u64;
        let least = self.least_significant_bits as u64;
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
            most >> 32,
            (most >> 16) & 0xFFFF,
            most & 0xFFFF,
            least >> 48,
            least & 0xFFFF_FFFF_FFFF,
        )
    }
}

impl FromStr for Uuid {
    type Err = ProtocolError;

    #[allow(clippy::cast_possible_wrap)]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProtocolError::InvalidUuid(s.to_string());

        if s.len() != CANONICAL_LENGTH {
            return Err(invalid());
        }
        let well_formed = s.bytes().enumerate().all(|(i, b)| {
            if HYPHENS.contains(&i) {
                b == b'-'
            } else {
                b.is_ascii_hexdigit()
            }
        });
        if !well_formed {
            return Err(invalid());
        }

        let hex: String = s.chars().filter(|c| *c != '-').collect();
        let most = u64::from_str_radix(&hex[..16], 16).map_err(|_| invalid())?;
        let least = u64::from_str_radix(&hex[16..], 16).map_err(|_| invalid())?;
        Ok(Self::new(most as i64, least as i64))
    }
}
