use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use async_channel::{unbounded, Receiver, Sender};
use tracing::info;
use voicechat_protocol::{GroupState, HandshakePacket, MicPacket, PlayerState, SocketPacket, Uuid};

use crate::config::VoiceChatConfig;
use crate::error::SdkError;
use crate::network::{HostEventSender, PluginChannel, VoiceChatEvent};
use crate::session::{send_handshake, Session, SessionInput, SessionState, Shared};
use crate::voice::{
    AudioStreamer, FrameEncoder, MicSink, OpusFrameEncoder, StreamOutcome, Transcoder,
};

/// Voice chat client bound to one host connection.
pub struct VoiceChat<C: PluginChannel> {
    channel: Arc<C>,
    config: VoiceChatConfig,
    shared: Arc<Shared>,
    input_tx: Sender<SessionInput>,
    streamer: AudioStreamer,
}

/// Routes mic packets through the session so they use the current link.
/// Bound to the session that was live when the stream started.
struct SessionSink<'a> {
    shared: &'a Shared,
    input_tx: &'a Sender<SessionInput>,
    epoch: u64,
}

impl MicSink for SessionSink<'_> {
    fn is_connected(&self) -> bool {
        self.shared.epoch() == self.epoch && self.shared.state() == SessionState::Connected
    }

    fn session_changed(&self) -> impl Future<Output = ()> + Send {
        let mut state = self.shared.state.subscribe();
        async move {
            let _ = state.changed().await;
        }
    }

    async fn send_mic(&self, packet: MicPacket) -> Result<(), SdkError> {
        if !self.is_connected() {
            return Err(SdkError::NotConnected);
        }
        self.input_tx
            .send(SessionInput::Transmit(SocketPacket::Mic(packet)))
            .await
            .map_err(|_| SdkError::Disconnected)
    }
}

impl<C: PluginChannel> VoiceChat<C> {
    /// Starts the session task. Must be called inside a Tokio runtime.
    ///
    /// Feed host events through [`VoiceChat::host_sender`]; the task stops once
    /// this value and every host sender are dropped.
    pub fn new(channel: Arc<C>, config: VoiceChatConfig) -> Self {
        let shared = Arc::new(Shared::new());
        let (input_tx, input_rx) = unbounded();
        Session::spawn(channel.clone(), config.clone(), shared.clone(), input_rx);

        let streamer = AudioStreamer::new(
            config.audio,
            config.pause_poll_interval,
            shared.sequence.clone(),
        );

        Self {
            channel,
            config,
            shared,
            input_tx,
            streamer,
        }
    }

    pub fn host_sender(&self) -> HostEventSender {
        HostEventSender::new(self.input_tx.clone())
    }

    /// Subscribe to session events.
    /// All receivers share one queue, so keep a single consumer.
    pub fn event_stream(&self) -> Receiver<VoiceChatEvent> {
        self.shared.events.event_stream()
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Waits until the voice server confirms the connection.
    pub async fn wait_connected(&self) -> Result<(), SdkError> {
        let mut state = self.shared.state.subscribe();
        state
            .wait_for(|state| *state == SessionState::Connected)
            .await
            .map(|_| ())
            .map_err(|_| SdkError::Disconnected)
    }

    pub fn players(&self) -> Result<Vec<PlayerState>, SdkError> {
        let directory = self.shared.directory.read().map_err(|_| SdkError::LockError)?;
        Ok(directory.players().cloned().collect())
    }

    /// Looks a player up by display name. With duplicate names any match may be returned.
    pub fn player(&self, name: &str) -> Result<Option<PlayerState>, SdkError> {
        let directory = self.shared.directory.read().map_err(|_| SdkError::LockError)?;
        Ok(directory
            .find_player_id_by_name(name)
            .and_then(|id| directory.player(&id))
            .cloned())
    }

    pub fn player_name(&self, id: &Uuid) -> Result<Option<String>, SdkError> {
        let directory = self.shared.directory.read().map_err(|_| SdkError::LockError)?;
        Ok(directory.resolve_name(id).map(str::to_owned))
    }

    pub fn groups(&self) -> Result<Vec<GroupState>, SdkError> {
        let directory = self.shared.directory.read().map_err(|_| SdkError::LockError)?;
        Ok(directory.groups().cloned().collect())
    }

    pub fn group(&self, id: &Uuid) -> Result<Option<GroupState>, SdkError> {
        let directory = self.shared.directory.read().map_err(|_| SdkError::LockError)?;
        Ok(directory.group(id).cloned())
    }

    /// Asks the server to move this player into the group called `name`.
    pub fn join_group(&self, name: &str, password: Option<&str>) -> Result<(), SdkError> {
        let id = {
            let directory = self.shared.directory.read().map_err(|_| SdkError::LockError)?;
            directory
                .find_group_by_name(name)
                .map(|group| group.id)
                .ok_or_else(|| SdkError::GroupNotFound(name.to_string()))?
        };
        self.join_group_by_id(id, password)
    }

    pub fn join_group_by_id(&self, id: Uuid, password: Option<&str>) -> Result<(), SdkError> {
        info!("[Handshake] Joining group {}", id);
        send_handshake(
            self.channel.as_ref(),
            &HandshakePacket::SetGroup {
                group: id,
                password: password.map(str::to_owned),
            },
        )
    }

    pub fn leave_group(&self) -> Result<(), SdkError> {
        info!("[Handshake] Leaving group");
        send_handshake(self.channel.as_ref(), &HandshakePacket::LeaveGroup)
    }

    /// Streams raw 16-bit PCM through an Opus encoder built from the audio config.
    pub async fn send_pcm(&self, pcm: &[u8]) -> Result<StreamOutcome, SdkError> {
        self.ensure_can_stream()?;
        let mut encoder = OpusFrameEncoder::new(&self.config.audio)?;
        self.send_pcm_with(pcm, &mut encoder, false).await
    }

    pub async fn send_pcm_with<E>(
        &self,
        pcm: &[u8],
        encoder: &mut E,
        whispering: bool,
    ) -> Result<StreamOutcome, SdkError>
    where
        E: FrameEncoder + ?Sized,
    {
        let epoch = self.shared.epoch();
        self.ensure_can_stream()?;
        let sink = SessionSink {
            shared: &self.shared,
            input_tx: &self.input_tx,
            epoch,
        };
        self.streamer.stream(pcm, encoder, &sink, whispering).await
    }

    /// Transcodes `path` to PCM and streams it. Transcoding runs on the calling task.
    pub async fn send_audio<T>(
        &self,
        transcoder: &T,
        path: impl AsRef<Path>,
    ) -> Result<StreamOutcome, SdkError>
    where
        T: Transcoder + ?Sized,
    {
        self.ensure_can_stream()?;
        let audio = &self.config.audio;
        let pcm = transcoder.to_pcm(path.as_ref(), audio.sample_rate, audio.channels)?;
        info!(
            "[Voice] Transcoded {} to {} bytes of PCM",
            path.as_ref().display(),
            pcm.len()
        );
        self.send_pcm(&pcm).await
    }

    pub fn stop_audio(&self) -> bool {
        self.streamer.stop()
    }

    pub fn pause_audio(&self) -> bool {
        self.streamer.pause()
    }

    pub fn resume_audio(&self) -> bool {
        self.streamer.resume()
    }

    pub fn is_streaming(&self) -> bool {
        self.streamer.is_active()
    }

    fn ensure_can_stream(&self) -> Result<(), SdkError> {
        if !self.is_connected() {
            return Err(SdkError::NotConnected);
        }
        if self.streamer.is_active() {
            return Err(SdkError::StreamAlreadyActive);
        }
        Ok(())
    }
}
