use crate::error::ProtocolError;
use crate::uuid::Uuid;

/// Default character cap for [`ByteBuf::read_utf`] and [`ByteBuf::write_utf`].
pub const DEFAULT_MAX_UTF_LENGTH: usize = 32767;

/// A VarInt carries at most 35 bits of payload.
const MAX_VAR_INT_BYTES: usize = 5;

/// Growable byte buffer with independent read and write cursors.
///
/// The write cursor is always the end of the written region, so
/// `reader_index <= writer_index <= capacity` holds by construction.
/// All multi-byte integers are big-endian.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteBuf {
    data: Vec<u8>,
    reader_index: usize,
    marked_reader_index: Option<usize>,
}

impl ByteBuf {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Wraps already-written bytes; reading starts at the first byte.
    #[inline]
    #[must_use]
    pub fn wrap(bytes: &[u8]) -> Self {
        Self::from(bytes.to_vec())
    }

    #[inline]
    #[must_use]
    pub fn reader_index(&self) -> usize {
        self.reader_index
    }

    #[inline]
    #[must_use]
    pub fn writer_index(&self) -> usize {
        self.data.len()
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    #[inline]
    #[must_use]
    pub fn readable_bytes(&self) -> usize {
        self.data.len() - self.reader_index
    }

    #[inline]
    #[must_use]
    pub fn is_readable(&self, len: usize) -> bool {
        self.readable_bytes() >= len
    }

    /// Grows the backing storage so `len` more bytes fit without reallocating.
    #[inline]
    pub fn ensure_writable(&mut self, len: usize) {
        self.data.reserve(len);
    }

    pub fn mark_reader_index(&mut self) {
        self.marked_reader_index = Some(self.reader_index);
    }

    pub fn reset_reader_index(&mut self) {
        if let Some(index) = self.marked_reader_index {
            self.reader_index = index;
        }
    }

    /// All written bytes, including those already read.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Bytes between the read and write cursors.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.reader_index..]
    }

    #[inline]
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    fn take(&mut self, len: usize) -> Result<&[u8], ProtocolError> {
        let available = self.readable_bytes();
        if len > available {
            return Err(ProtocolError::Underflow {
                needed: len,
                available,
            });
        }
        let start = self.reader_index;
        self.reader_index += len;
        Ok(&self.data[start..start + len])
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take_array::<1>()?[0])
    }

    #[inline]
    pub fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.read_u8()? != 0)
    }

    #[inline]
    pub fn read_i16(&mut self) -> Result<i16, ProtocolError> {
        Ok(i16::from_be_bytes(self.take_array()?))
    }

    #[inline]
    pub fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    #[inline]
    pub fn read_i64(&mut self) -> Result<i64, ProtocolError> {
        Ok(i64::from_be_bytes(self.take_array()?))
    }

    #[inline]
    pub fn read_f32(&mut self) -> Result<f32, ProtocolError> {
        Ok(f32::from_be_bytes(self.take_array()?))
    }

    #[inline]
    pub fn read_f64(&mut self) -> Result<f64, ProtocolError> {
        Ok(f64::from_be_bytes(self.take_array()?))
    }

    /// Reads `len` raw bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, ProtocolError> {
        Ok(self.take(len)?.to_vec())
    }

    /// Reads a VarInt: 7 bits per byte, least significant group first,
    /// high bit set on every byte but the last.
    pub fn read_var_int(&mut self) -> Result<i32, ProtocolError> {
        let mut value: u32 = 0;
        for position in 0..MAX_VAR_INT_BYTES {
            let byte = self.read_u8()?;
            value |= u32::from(byte & 0x7F) << (position * 7);
            if byte & 0x80 == 0 {
                #[allow(clippy::cast_possible_wrap)]
                return Ok(value as i32);
            }
        }
        Err(ProtocolError::VarIntTooBig)
    }

    fn read_length(&mut self) -> Result<usize, ProtocolError> {
        let length = self.read_var_int()?;
        usize::try_from(length).map_err(|_| ProtocolError::NegativeLength(length))
    }

    /// Reads a VarInt-prefixed byte array no longer than `max_length`.
    pub fn read_byte_array(&mut self, max_length: usize) -> Result<Vec<u8>, ProtocolError> {
        let length = self.read_length()?;
        if length > max_length {
            return Err(ProtocolError::ByteArrayTooLong {
                length,
                max: max_length,
            });
        }
        self.read_bytes(length)
    }

    /// Reads a VarInt-prefixed UTF-8 string.
    ///
    /// The encoded form may use at most `4 * max_length` bytes and the decoded
    /// string at most `max_length` UTF-16 code units, as the server counts them.
    pub fn read_utf(&mut self, max_length: usize) -> Result<String, ProtocolError> {
        let length = self.read_length()?;
        let max_bytes = max_length.saturating_mul(4);
        if length > max_bytes {
            return Err(ProtocolError::StringTooLong {
                length,
                max: max_bytes,
            });
        }
        let bytes = self.take(length)?;
        let value = std::str::from_utf8(bytes)
            .map_err(|_| ProtocolError::InvalidUtf8)?
            .to_owned();
        let units = value.encode_utf16().count();
        if units > max_length {
            return Err(ProtocolError::StringTooLong {
                length: units,
                max: max_length,
            });
        }
        Ok(value)
    }

    pub fn read_uuid(&mut self) -> Result<Uuid, ProtocolError> {
        let most = self.read_i64()?;
        let least = self.read_i64()?;
        Ok(Uuid::new(most, least))
    }

    #[inline]
    pub fn write_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    #[inline]
    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(u8::from(value));
    }

    #[inline]
    pub fn write_i16(&mut self, value: i16) {
        self.write_bytes(&value.to_be_bytes());
    }

    #[inline]
    pub fn write_i32(&mut self, value: i32) {
        self.write_bytes(&value.to_be_bytes());
    }

    #[inline]
    pub fn write_i64(&mut self, value: i64) {
        self.write_bytes(&value.to_be_bytes());
    }

    #[inline]
    pub fn write_f32(&mut self, value: f32) {
        self.write_bytes(&value.to_be_bytes());
    }

    #[inline]
    pub fn write_f64(&mut self, value: f64) {
        self.write_bytes(&value.to_be_bytes());
    }

    /// Appends raw bytes with no length prefix.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.ensure_writable(bytes.len());
        self.data.extend_from_slice(bytes);
    }

    pub fn write_var_int(&mut self, value: i32) {
        #[allow(clippy::cast_sign_loss)]
        let mut value = value as u32;
        while value & !0x7F != 0 {
            // Truncation keeps exactly the low 7 bits plus the continuation flag.
            #[allow(clippy::cast_possible_truncation)]
            self.write_u8((value & 0x7F) as u8 | 0x80);
            value >>= 7;
        }
        #[allow(clippy::cast_possible_truncation)]
        self.write_u8(value as u8);
    }

    /// Writes a VarInt length prefix followed by the bytes.
    ///
    /// # Panics
    /// Panics if `bytes` is longer than `i32::MAX`.
    pub fn write_byte_array(&mut self, bytes: &[u8]) {
        self.write_var_int(bytes.len().try_into().expect("byte array too large"));
        self.write_bytes(bytes);
    }

    /// Writes a VarInt-prefixed UTF-8 string whose encoded form is at most
    /// `max_length` bytes.
    ///
    /// # Errors
    /// Returns [`ProtocolError::StringTooLong`] when the encoded string is too long.
    pub fn write_utf(&mut self, value: &str, max_length: usize) -> Result<(), ProtocolError> {
        let bytes = value.as_bytes();
        if bytes.len() > max_length {
            return Err(ProtocolError::StringTooLong {
                length: bytes.len(),
                max: max_length,
            });
        }
        self.write_byte_array(bytes);
        Ok(())
    }

    pub fn write_uuid(&mut self, value: Uuid) {
        self.write_i64(value.most_significant_bits());
        self.write_i64(value.least_significant_bits());
    }
}

impl From<Vec<u8>> for ByteBuf {
    fn from(data: Vec<u8>) -> Self {
        Self {
            data,
            reader_index: 0,
            marked_reader_index: None,
        }
    }
}
