use std::path::Path;

use crate::error::SdkError;

/// Turns an audio file into raw 16-bit signed little-endian PCM.
pub trait Transcoder: Send + Sync {
    fn to_pcm(&self, path: &Path, sample_rate: u32, channels: u16) -> Result<Vec<u8>, SdkError>;
}
