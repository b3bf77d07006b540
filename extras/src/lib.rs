pub mod config;
pub mod tunnel;
pub mod wav;

pub use tunnel::{TcpPluginChannel, TunnelFrame};
pub use wav::WavTranscoder;
