use opus::{Application, Bitrate, Channels};

use crate::config::AudioConfig;
use crate::error::SdkError;

/// Largest packet libopus produces for one frame.
const MAX_OPUS_PACKET: usize = 4000;

/// Compresses one fixed-size frame of 16-bit little-endian PCM.
pub trait FrameEncoder: Send {
    fn encode(&mut self, pcm: &[u8]) -> Result<Vec<u8>, SdkError>;
}

/// Opus encoder tuned for voice.
pub struct OpusFrameEncoder {
    encoder: opus::Encoder,
    samples: Vec<i16>,
}

impl OpusFrameEncoder {
    /// # Errors
    /// Returns [`SdkError::Encoder`] for a sample rate or channel count Opus
    /// does not support.
    pub fn new(audio: &AudioConfig) -> Result<Self, SdkError> {
        let channels = match audio.channels {
            1 => Channels::Mono,
            2 => Channels::Stereo,
            n => return Err(SdkError::Encoder(format!("unsupported channel count {n}"))),
        };
        let mut encoder = opus::Encoder::new(audio.sample_rate, channels, Application::Voip)
            .map_err(|e| SdkError::Encoder(format!("opus error: {e}")))?;
        encoder
            .set_bitrate(Bitrate::Bits(audio.bitrate))
            .map_err(|e| SdkError::Encoder(format!("opus error: {e}")))?;

        Ok(Self {
            encoder,
            samples: Vec::with_capacity(audio.frame_size_bytes() / 2),
        })
    }
}

impl FrameEncoder for OpusFrameEncoder {
    fn encode(&mut self, pcm: &[u8]) -> Result<Vec<u8>, SdkError> {
        self.samples.clear();
        self.samples.extend(
            pcm.chunks_exact(2)
                .map(|pair| i16::from_le_bytes([pair[0], pair[1]])),
        );

        let mut opus_frame = vec![0u8; MAX_OPUS_PACKET];
        let encoded_size = self
            .encoder
            .encode(&self.samples, &mut opus_frame)
            .map_err(|e| SdkError::Encoder(format!("failed to encode Opus frame: {e}")))?;
        opus_frame.truncate(encoded_size);
        Ok(opus_frame)
    }
}
