pub mod encoder;
pub mod streamer;
pub mod transcoder;

pub use encoder::{FrameEncoder, OpusFrameEncoder};
pub use streamer::{AudioStreamer, MicSink, StreamEnd, StreamOutcome};
pub use transcoder::Transcoder;
