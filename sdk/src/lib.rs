pub mod client;
pub mod config;
pub mod directory;
pub mod error;
pub mod network;
pub mod session;
pub mod voice;

pub use client::VoiceChat;
pub use config::{AudioConfig, VoiceChatConfig};
pub use directory::PresenceDirectory;
pub use error::SdkError;
pub use network::{
    GroupSoundEvent, HostEvent, HostEventSender, LocationSoundEvent, PlayerSoundEvent,
    PluginChannel, VoiceChatEvent,
};
pub use session::SessionState;
pub use voice::{
    AudioStreamer, FrameEncoder, MicSink, OpusFrameEncoder, StreamEnd, StreamOutcome, Transcoder,
};

pub use voicechat_protocol as protocol;
