use std::time::Duration;

/// Version sent in `voicechat:request_secret`; the server refuses others.
pub const COMPATIBILITY_VERSION: i32 = 18;

pub const SAMPLE_RATE: u32 = 48_000;
pub const CHANNELS: u16 = 1;
pub const FRAME_DURATION_MS: u32 = 20;
pub const OPUS_BITRATE: i32 = 48_000;

/// Receive buffer for a single UDP datagram.
pub const PACKET_BUFFER_SIZE: usize = 4096;

/// Upper bound on how long a paused stream sleeps before re-checking the session.
pub const PAUSE_POLL_INTERVAL_MS: u64 = 100;

/// The session is considered dead after this many keep-alive periods of silence.
pub const KEEP_ALIVE_TIMEOUT_FACTOR: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub frame_duration_ms: u32,
    pub bitrate: i32,
}

impl AudioConfig {
    /// Bytes of 16-bit PCM in one frame.
    #[must_use]
    pub fn frame_size_bytes(&self) -> usize {
        (self.sample_rate / 1000) as usize
            * self.frame_duration_ms as usize
            * usize::from(self.channels)
            * 2
    }

    #[must_use]
    pub fn frame_duration(&self) -> Duration {
        Duration::from_millis(u64::from(self.frame_duration_ms))
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            channels: CHANNELS,
            frame_duration_ms: FRAME_DURATION_MS,
            bitrate: OPUS_BITRATE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceChatConfig {
    pub audio: AudioConfig,
    pub compatibility_version: i32,
    pub pause_poll_interval: Duration,
    pub keep_alive_timeout_factor: u32,
}

impl VoiceChatConfig {
    #[must_use]
    pub fn with_audio(mut self, audio: AudioConfig) -> Self {
        self.audio = audio;
        self
    }

    #[must_use]
    pub fn with_compatibility_version(mut self, version: i32) -> Self {
        self.compatibility_version = version;
        self
    }

    #[must_use]
    pub fn with_pause_poll_interval(mut self, interval: Duration) -> Self {
        self.pause_poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_keep_alive_timeout_factor(mut self, factor: u32) -> Self {
        self.keep_alive_timeout_factor = factor;
        self
    }

    /// Silence after which the server is presumed gone, or `None` when the
    /// server disabled keep-alives.
    #[must_use]
    pub fn keep_alive_timeout(&self, keep_alive_ms: i32) -> Option<Duration> {
        let keep_alive_ms = u64::try_from(keep_alive_ms).ok().filter(|ms| *ms > 0)?;
        if self.keep_alive_timeout_factor == 0 {
            return None;
        }
        Some(Duration::from_millis(
            keep_alive_ms.saturating_mul(u64::from(self.keep_alive_timeout_factor)),
        ))
    }
}

impl Default for VoiceChatConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            compatibility_version: COMPATIBILITY_VERSION,
            pause_poll_interval: Duration::from_millis(PAUSE_POLL_INTERVAL_MS),
            keep_alive_timeout_factor: KEEP_ALIVE_TIMEOUT_FACTOR,
        }
    }
}
