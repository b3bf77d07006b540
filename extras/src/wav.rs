use std::path::Path;

use hound::{SampleFormat, WavReader};
use voicechat_sdk::{SdkError, Transcoder};

/// Reads 16-bit integer WAV files at the session sample rate.
///
/// The channel count is remixed to the requested layout; resampling is not supported.
#[derive(Debug, Default, Clone, Copy)]
pub struct WavTranscoder;

impl Transcoder for WavTranscoder {
    fn to_pcm(&self, path: &Path, sample_rate: u32, channels: u16) -> Result<Vec<u8>, SdkError> {
        let reader = WavReader::open(path)
            .map_err(|e| SdkError::Transcode(format!("{}: {e}", path.display())))?;
        let spec = reader.spec();

        if spec.sample_rate != sample_rate {
            return Err(SdkError::Transcode(format!(
                "invalid sample rate {} Hz, expected {} Hz",
                spec.sample_rate, sample_rate
            )));
        }
        if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
            return Err(SdkError::Transcode(format!(
                "invalid sample format {:?}/{} bits, expected 16-bit integer",
                spec.sample_format, spec.bits_per_sample
            )));
        }
        if spec.channels == 0 || channels == 0 {
            return Err(SdkError::Transcode("zero channels".to_string()));
        }

        let samples = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| SdkError::Transcode(e.to_string()))?;

        let mixed = remix(&samples, spec.channels, channels);
        Ok(mixed.iter().flat_map(|s| s.to_le_bytes()).collect())
    }
}

/// Averages each interleaved frame down to one sample, then repeats it `to` times.
/// Frames are passed through untouched when the layouts already match.
fn remix(samples: &[i16], from: u16, to: u16) -> Vec<i16> {
    if from == to {
        return samples.to_vec();
    }
    let from = usize::from(from);
    let to = usize::from(to);

    let mut out = Vec::with_capacity(samples.len() / from * to);
    for frame in samples.chunks_exact(from) {
        let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let mono = (sum / from as i32) as i16;
        out.extend(std::iter::repeat(mono).take(to));
    }
    out
}
