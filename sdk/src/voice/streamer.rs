//! Real-time pacing of outbound microphone frames.
//!
//! Frame `i` of a stream is due at `T0 + i * frame_duration`, where `T0` is the
//! stream start. Deadlines never depend on when the previous frame actually
//! went out, so a slow frame is followed by an immediate catch-up instead of a
//! permanent shift. Time spent paused moves `T0` forward.

use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info};
use voicechat_protocol::MicPacket;

use crate::config::AudioConfig;
use crate::error::SdkError;
use crate::voice::encoder::FrameEncoder;

/// Destination for encoded microphone frames.
pub trait MicSink: Send + Sync {
    /// True while the session the stream started on is still connected.
    fn is_connected(&self) -> bool;

    fn send_mic(&self, packet: MicPacket) -> impl Future<Output = Result<(), SdkError>> + Send;

    /// Resolves on the next session state change after the call.
    /// Wakes a paused stream so it can notice a disconnect before the next poll.
    fn session_changed(&self) -> impl Future<Output = ()> + Send {
        std::future::pending()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlaybackState {
    Playing,
    Paused,
    Stopped,
}

/// Why a stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// Every whole frame was sent.
    Completed,
    Stopped,
    /// The session left the connected state mid-stream.
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOutcome {
    pub frames_sent: u32,
    pub end: StreamEnd,
}

/// Paces PCM into sequenced mic packets, one stream at a time.
pub struct AudioStreamer {
    audio: AudioConfig,
    pause_poll: Duration,
    sequence: Arc<AtomicI64>,
    active: Mutex<Option<watch::Sender<PlaybackState>>>,
}

/// Clears the active-stream slot when the stream ends, however it ends.
struct ActiveGuard<'a> {
    slot: &'a Mutex<Option<watch::Sender<PlaybackState>>>,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = None;
        }
    }
}

impl AudioStreamer {
    #[must_use]
    pub fn new(audio: AudioConfig, pause_poll: Duration, sequence: Arc<AtomicI64>) -> Self {
        Self {
            audio,
            pause_poll,
            sequence,
            active: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.lock().is_ok_and(|slot| slot.is_some())
    }

    /// Requests the active stream to end before its next frame.
    pub fn stop(&self) -> bool {
        self.signal(PlaybackState::Stopped)
    }

    pub fn pause(&self) -> bool {
        self.signal(PlaybackState::Paused)
    }

    pub fn resume(&self) -> bool {
        self.signal(PlaybackState::Playing)
    }

    /// Returns true when the signal changed the state of an active stream.
    fn signal(&self, next: PlaybackState) -> bool {
        let Ok(slot) = self.active.lock() else {
            return false;
        };
        let Some(control) = slot.as_ref() else {
            return false;
        };
        control.send_if_modified(|state| {
            if *state == PlaybackState::Stopped || *state == next {
                return false;
            }
            *state = next;
            true
        })
    }

    fn begin(&self) -> Result<(watch::Receiver<PlaybackState>, ActiveGuard<'_>), SdkError> {
        let mut slot = self.active.lock().map_err(|_| SdkError::LockError)?;
        if slot.is_some() {
            return Err(SdkError::StreamAlreadyActive);
        }
        let (control_tx, control_rx) = watch::channel(PlaybackState::Playing);
        *slot = Some(control_tx);
        Ok((control_rx, ActiveGuard { slot: &self.active }))
    }

    /// Sends `pcm` in whole frames at real-time pace.
    ///
    /// A trailing partial frame is not sent.
    ///
    /// # Errors
    /// Returns [`SdkError::StreamAlreadyActive`] immediately when another stream
    /// is running, or the encoder's error if a frame fails to encode.
    pub async fn stream<S, E>(
        &self,
        pcm: &[u8],
        encoder: &mut E,
        sink: &S,
        whispering: bool,
    ) -> Result<StreamOutcome, SdkError>
    where
        S: MicSink,
        E: FrameEncoder + ?Sized,
    {
        let frame_size = self.audio.frame_size_bytes();
        if frame_size == 0 {
            return Err(SdkError::Encoder(format!(
                "audio config {:?} yields empty frames",
                self.audio
            )));
        }
        let (mut control, _guard) = self.begin()?;
        let frame_duration = self.audio.frame_duration();
        let mut frames = pcm.chunks_exact(frame_size);

        info!(
            "[Voice] Streaming {} frames ({} bytes each)",
            pcm.len() / frame_size,
            frame_size
        );

        let mut start = Instant::now();
        let mut sent: u32 = 0;

        let end = loop {
            if !sink.is_connected() {
                break StreamEnd::Disconnected;
            }
            let state = *control.borrow_and_update();
            match state {
                PlaybackState::Stopped => break StreamEnd::Stopped,
                PlaybackState::Paused => {
                    let paused_at = Instant::now();
                    debug!("[Voice] Stream paused after {} frames", sent);
                    if let Some(end) = self.wait_while_paused(&mut control, sink).await {
                        break end;
                    }
                    start += paused_at.elapsed();
                    debug!("[Voice] Stream resumed");
                    continue;
                }
                PlaybackState::Playing => {}
            }

            let Some(frame) = frames.next() else {
                break StreamEnd::Completed;
            };
            let data = encoder.encode(frame)?;
            let sequence_number = self.sequence.fetch_add(1, Ordering::SeqCst);
            let packet = MicPacket {
                data,
                sequence_number,
                whispering,
            };
            if sink.send_mic(packet).await.is_err() {
                break StreamEnd::Disconnected;
            }
            sent += 1;
            if frames.len() == 0 {
                break StreamEnd::Completed;
            }

            sleep_until(start + frame_duration * sent).await;
        };

        info!("[Voice] Stream ended ({:?}) after {} frames", end, sent);
        Ok(StreamOutcome {
            frames_sent: sent,
            end,
        })
    }

    /// Returns `None` once resumed, or how the stream must end.
    async fn wait_while_paused<S: MicSink>(
        &self,
        control: &mut watch::Receiver<PlaybackState>,
        sink: &S,
    ) -> Option<StreamEnd> {
        loop {
            match *control.borrow_and_update() {
                PlaybackState::Playing => return None,
                PlaybackState::Stopped => return Some(StreamEnd::Stopped),
                PlaybackState::Paused => {}
            }
            let session_changed = sink.session_changed();
            if !sink.is_connected() {
                return Some(StreamEnd::Disconnected);
            }
            tokio::select! {
                changed = control.changed() => {
                    if changed.is_err() {
                        return Some(StreamEnd::Stopped);
                    }
                }
                () = session_changed => {}
                () = sleep(self.pause_poll) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    struct Passthrough;

    impl FrameEncoder for Passthrough {
        fn encode(&mut self, pcm: &[u8]) -> Result<Vec<u8>, SdkError> {
            Ok(pcm[..4].to_vec())
        }
    }

    struct RecordingSink {
        base: Instant,
        connected: AtomicBool,
        sent: Mutex<Vec<(u64, i64)>>,
        stall_first: Option<Duration>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                base: Instant::now(),
                connected: AtomicBool::new(true),
                sent: Mutex::new(Vec::new()),
                stall_first: None,
            }
        }

        fn times(&self) -> Vec<u64> {
            self.sent.lock().unwrap().iter().map(|(t, _)| *t).collect()
        }

        fn sequences(&self) -> Vec<i64> {
            self.sent.lock().unwrap().iter().map(|(_, s)| *s).collect()
        }

        fn count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    impl MicSink for RecordingSink {
        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        async fn send_mic(&self, packet: MicPacket) -> Result<(), SdkError> {
            let elapsed = u64::try_from(self.base.elapsed().as_millis()).unwrap();
            let first = {
                let mut sent = self.sent.lock().unwrap();
                sent.push((elapsed, packet.sequence_number));
                sent.len() == 1
            };
            if first {
                if let Some(stall) = self.stall_first {
                    sleep(stall).await;
                }
            }
            Ok(())
        }
    }

    fn streamer(first_sequence: i64) -> AudioStreamer {
        AudioStreamer::new(
            AudioConfig::default(),
            Duration::from_millis(100),
            Arc::new(AtomicI64::new(first_sequence)),
        )
    }

    fn pcm(frames: usize) -> Vec<u8> {
        vec![0u8; AudioConfig::default().frame_size_bytes() * frames]
    }

    #[tokio::test(start_paused = true)]
    async fn three_frames_are_sequenced_and_paced() {
        let streamer = streamer(41);
        let sink = RecordingSink::new();

        let outcome = streamer
            .stream(&pcm(3), &mut Passthrough, &sink, false)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            StreamOutcome {
                frames_sent: 3,
                end: StreamEnd::Completed
            }
        );
        assert_eq!(sink.sequences(), vec![41, 42, 43]);
        assert_eq!(sink.times(), vec![0, 20, 40]);
        assert!(!streamer.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn overrun_does_not_shift_later_deadlines() {
        let streamer = streamer(0);
        let mut sink = RecordingSink::new();
        sink.stall_first = Some(Duration::from_millis(50));

        streamer
            .stream(&pcm(4), &mut Passthrough, &sink, false)
            .await
            .unwrap();

        // Frames 1 and 2 are overdue and go out at once; frame 3 is back on its slot.
        assert_eq!(sink.times(), vec![0, 50, 50, 60]);
        assert_eq!(sink.sequences(), vec![0, 1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn trailing_partial_frame_is_not_sent() {
        let streamer = streamer(0);
        let sink = RecordingSink::new();
        let mut data = pcm(2);
        data.extend_from_slice(&[0u8; 100]);

        let outcome = streamer
            .stream(&data, &mut Passthrough, &sink, false)
            .await
            .unwrap();
        assert_eq!(outcome.frames_sent, 2);
        assert_eq!(outcome.end, StreamEnd::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_then_resume_continues_without_burst() {
        let streamer = streamer(0);
        let sink = RecordingSink::new();
        let data = pcm(5);
        let mut encoder = Passthrough;

        let (outcome, ()) = tokio::join!(
            streamer.stream(&data, &mut encoder, &sink, false),
            async {
                sleep(Duration::from_millis(30)).await;
                assert!(streamer.pause());
                assert!(!streamer.pause());
                sleep(Duration::from_millis(500)).await;
                assert_eq!(sink.count(), 2);
                assert!(streamer.resume());
            }
        );

        let outcome = outcome.unwrap();
        assert_eq!(outcome.frames_sent, 5);
        assert_eq!(sink.sequences(), vec![0, 1, 2, 3, 4]);
        assert_eq!(sink.times(), vec![0, 20, 530, 550, 570]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_after_pause_sends_nothing_more() {
        let streamer = streamer(0);
        let sink = RecordingSink::new();
        let data = pcm(10);
        let mut encoder = Passthrough;

        let (outcome, ()) = tokio::join!(
            streamer.stream(&data, &mut encoder, &sink, false),
            async {
                sleep(Duration::from_millis(30)).await;
                assert!(streamer.pause());
                sleep(Duration::from_millis(250)).await;
                assert!(streamer.stop());
                assert!(!streamer.resume());
            }
        );

        assert_eq!(
            outcome.unwrap(),
            StreamOutcome {
                frames_sent: 2,
                end: StreamEnd::Stopped
            }
        );
        assert_eq!(sink.count(), 2);
        assert!(!streamer.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_ends_stream_within_a_frame() {
        let streamer = streamer(0);
        let sink = RecordingSink::new();
        let data = pcm(10);
        let mut encoder = Passthrough;

        let (outcome, ()) = tokio::join!(
            streamer.stream(&data, &mut encoder, &sink, false),
            async {
                sleep(Duration::from_millis(30)).await;
                sink.connected.store(false, Ordering::SeqCst);
            }
        );

        assert_eq!(
            outcome.unwrap(),
            StreamOutcome {
                frames_sent: 2,
                end: StreamEnd::Disconnected
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn second_stream_is_rejected_immediately() {
        let streamer = streamer(0);
        let sink = RecordingSink::new();
        let other_sink = RecordingSink::new();
        let data = pcm(3);
        let mut encoder = Passthrough;
        let mut other_encoder = Passthrough;

        let (first, ()) = tokio::join!(
            streamer.stream(&data, &mut encoder, &sink, false),
            async {
                sleep(Duration::from_millis(10)).await;
                let second = streamer
                    .stream(&data, &mut other_encoder, &other_sink, false)
                    .await;
                assert!(matches!(second, Err(SdkError::StreamAlreadyActive)));
            }
        );

        assert_eq!(first.unwrap().frames_sent, 3);
        assert_eq!(other_sink.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_after_last_frame_still_completes() {
        let streamer = streamer(0);
        let sink = RecordingSink::new();
        let data = pcm(2);
        let mut encoder = Passthrough;

        let (outcome, ()) = tokio::join!(
            streamer.stream(&data, &mut encoder, &sink, false),
            async {
                sleep(Duration::from_millis(30)).await;
                sink.connected.store(false, Ordering::SeqCst);
            }
        );

        assert_eq!(
            outcome.unwrap(),
            StreamOutcome {
                frames_sent: 2,
                end: StreamEnd::Completed
            }
        );
    }

    /// Sink whose session can change under a paused stream.
    struct SwitchingSink {
        inner: RecordingSink,
        changed: tokio::sync::Notify,
    }

    impl MicSink for SwitchingSink {
        fn is_connected(&self) -> bool {
            self.inner.is_connected()
        }

        async fn send_mic(&self, packet: MicPacket) -> Result<(), SdkError> {
            self.inner.send_mic(packet).await
        }

        fn session_changed(&self) -> impl Future<Output = ()> + Send {
            self.changed.notified()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn session_change_wakes_paused_stream_before_poll() {
        let streamer = AudioStreamer::new(
            AudioConfig::default(),
            Duration::from_secs(60),
            Arc::new(AtomicI64::new(0)),
        );
        let sink = SwitchingSink {
            inner: RecordingSink::new(),
            changed: tokio::sync::Notify::new(),
        };
        let data = pcm(10);
        let mut encoder = Passthrough;

        let ((outcome, ended_at), ()) = tokio::join!(
            async {
                let outcome = streamer.stream(&data, &mut encoder, &sink, false).await;
                (outcome, sink.inner.base.elapsed())
            },
            async {
                sleep(Duration::from_millis(30)).await;
                assert!(streamer.pause());
                sleep(Duration::from_millis(100)).await;
                sink.inner.connected.store(false, Ordering::SeqCst);
                sink.changed.notify_waiters();
            }
        );

        assert_eq!(
            outcome.unwrap(),
            StreamOutcome {
                frames_sent: 2,
                end: StreamEnd::Disconnected
            }
        );
        assert!(ended_at < Duration::from_secs(1));
    }

    #[test]
    fn signals_without_stream_are_ignored() {
        let streamer = streamer(0);
        assert!(!streamer.pause());
        assert!(!streamer.resume());
        assert!(!streamer.stop());
    }
}
