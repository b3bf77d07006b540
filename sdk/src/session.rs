//! The session actor: one task owns the secret, the UDP link and the state
//! machine, and reacts to host events, link events and a liveness deadline.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_channel::{Receiver, Sender};
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, trace, warn};
use voicechat_protocol::handshake::channel;
use voicechat_protocol::{
    HandshakePacket, ProtocolError, SecretPacket, SessionCrypto, SocketPacket, Uuid,
};

use crate::config::VoiceChatConfig;
use crate::directory::PresenceDirectory;
use crate::error::SdkError;
use crate::network::{
    EventHandler, GroupSoundEvent, HostEvent, LinkEvent, LinkParams, LocationSoundEvent,
    PlayerSoundEvent, PluginChannel, UdpLink, VoiceChatEvent,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    SecretRequested,
    SecretReceived,
    UdpConnecting,
    Authenticating,
    Connected,
    Disconnected,
}

#[derive(Debug)]
pub(crate) enum SessionInput {
    Host(HostEvent),
    /// A packet to send over the current link, dropped unless connected.
    Transmit(SocketPacket),
}

/// State readable outside the actor.
pub(crate) struct Shared {
    pub state: watch::Sender<SessionState>,
    /// Bumped whenever the current session ends or is replaced.
    pub epoch: AtomicU64,
    pub sequence: Arc<AtomicI64>,
    pub directory: RwLock<PresenceDirectory>,
    pub events: EventHandler,
}

impl Shared {
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            state,
            epoch: AtomicU64::new(0),
            sequence: Arc::new(AtomicI64::new(0)),
            directory: RwLock::new(PresenceDirectory::new()),
            events: EventHandler::new(),
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn end_epoch(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }
}

/// Key material and identity for the current secret.
struct SessionContext {
    secret: Uuid,
    player: Uuid,
    crypto: SessionCrypto,
    keep_alive_ms: i32,
}

pub(crate) struct Session<C: PluginChannel> {
    channel: Arc<C>,
    config: VoiceChatConfig,
    shared: Arc<Shared>,
    context: Option<SessionContext>,
    link: Option<UdpLink>,
    generation: u64,
    last_heard: Instant,
    link_tx: Sender<LinkEvent>,
}

impl<C: PluginChannel> Session<C> {
    /// Spawns the actor; it runs until every input sender is dropped.
    pub(crate) fn spawn(
        channel: Arc<C>,
        config: VoiceChatConfig,
        shared: Arc<Shared>,
        input_rx: Receiver<SessionInput>,
    ) {
        let (link_tx, link_rx) = async_channel::unbounded();
        let session = Self {
            channel,
            config,
            shared,
            context: None,
            link: None,
            generation: 0,
            last_heard: Instant::now(),
            link_tx,
        };
        tokio::spawn(session.run(input_rx, link_rx));
    }

    async fn run(mut self, input_rx: Receiver<SessionInput>, link_rx: Receiver<LinkEvent>) {
        loop {
            let deadline = self.liveness_deadline();
            tokio::select! {
                input = input_rx.recv() => match input {
                    Ok(SessionInput::Host(event)) => self.handle_host_event(event).await,
                    Ok(SessionInput::Transmit(packet)) => self.transmit_if_connected(packet),
                    Err(_) => break,
                },
                Ok(event) = link_rx.recv() => self.handle_link_event(event),
                () = sleep_until_some(deadline) => {
                    self.disconnect("keep-alive timeout".to_string());
                }
            }
        }

        self.link = None;
        debug!("[Voice] Session task stopped");
    }

    fn set_state(&self, state: SessionState) {
        self.shared.state.send_replace(state);
        debug!("[Voice] Session state: {:?}", state);
    }

    fn liveness_deadline(&self) -> Option<Instant> {
        match self.shared.state() {
            SessionState::Authenticating | SessionState::Connected => {}
            _ => return None,
        }
        let keep_alive_ms = self.context.as_ref()?.keep_alive_ms;
        let timeout = self.config.keep_alive_timeout(keep_alive_ms)?;
        Some(self.last_heard + timeout)
    }

    async fn handle_host_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::Login => self.register_channels(),
            HostEvent::Spawn => self.request_secret(),
            HostEvent::Payload { channel, data } => self.handle_payload(&channel, &data).await,
        }
    }

    fn register_channels(&self) {
        for name in channel::ALL {
            if let Err(e) = self.channel.register_channel(name) {
                warn!("[Handshake] Failed to register {}: {}", name, e);
            }
        }
        debug!("[Handshake] Registered {} channels", channel::ALL.len());
    }

    fn request_secret(&self) {
        let request = HandshakePacket::RequestSecret {
            compatibility_version: self.config.compatibility_version,
        };
        if let Err(e) = send_handshake(self.channel.as_ref(), &request) {
            error!("[Handshake] Failed to request secret: {}", e);
            return;
        }
        if matches!(
            self.shared.state(),
            SessionState::Idle | SessionState::Disconnected
        ) {
            self.set_state(SessionState::SecretRequested);
        }
        info!(
            "[Handshake] Requested secret (compatibility version {})",
            self.config.compatibility_version
        );
    }

    async fn handle_payload(&mut self, channel_name: &str, data: &[u8]) {
        let packet = match HandshakePacket::decode(channel_name, data) {
            Ok(packet) => packet,
            Err(ProtocolError::UnknownChannel(name)) => {
                trace!("[Handshake] Ignoring payload on {}", name);
                return;
            }
            Err(e) => {
                error!("[Handshake] Invalid {} packet: {}", channel_name, e);
                self.disconnect(format!("invalid {channel_name} packet: {e}"));
                return;
            }
        };

        match packet {
            HandshakePacket::Secret(secret) => self.on_secret(secret).await,
            HandshakePacket::PlayerState(state) => {
                trace!("[Handshake] Player state for {}", state.name);
                self.with_directory(|directory| directory.upsert_player(state));
            }
            HandshakePacket::PlayerStates(states) => {
                debug!("[Handshake] Player snapshot with {} entries", states.len());
                self.with_directory(|directory| directory.apply_snapshot(states));
            }
            HandshakePacket::AddGroup(group) => {
                debug!("[Handshake] Group added: {}", group.name);
                self.with_directory(|directory| directory.add_group(group.clone()));
                self.shared.events.emit(VoiceChatEvent::GroupAdded(group));
            }
            HandshakePacket::RemoveGroup { id } => {
                debug!("[Handshake] Group removed: {}", id);
                self.with_directory(|directory| {
                    directory.remove_group(&id);
                });
                self.shared.events.emit(VoiceChatEvent::GroupRemoved { id });
            }
            HandshakePacket::JoinedGroup {
                group,
                wrong_password,
            } => {
                debug!("[Handshake] Joined group {:?}", group);
                self.shared.events.emit(VoiceChatEvent::JoinedGroup {
                    group,
                    wrong_password,
                });
            }
            other => trace!("[Handshake] Ignoring {} payload", other.channel()),
        }
    }

    fn with_directory(&self, update: impl FnOnce(&mut PresenceDirectory)) {
        match self.shared.directory.write() {
            Ok(mut directory) => update(&mut directory),
            Err(_) => error!("[Voice] Presence directory lock poisoned"),
        }
    }

    /// Tears down the previous session and starts a new one from `secret`.
    async fn on_secret(&mut self, secret: SecretPacket) {
        self.shared.end_epoch();
        self.link = None;
        self.generation += 1;
        self.with_directory(PresenceDirectory::clear);
        self.context = Some(SessionContext {
            secret: secret.secret,
            player: secret.player_uuid,
            crypto: SessionCrypto::new(secret.secret),
            keep_alive_ms: secret.keep_alive,
        });
        self.set_state(SessionState::SecretReceived);
        info!("[Handshake] Received secret for player {}", secret.player_uuid);

        let addr = match voice_server_address(
            &secret.voice_host,
            secret.server_port,
            self.channel.peer_ip(),
        ) {
            Ok(addr) => addr,
            Err(e) => {
                self.disconnect(e.to_string());
                return;
            }
        };

        self.set_state(SessionState::UdpConnecting);
        let Some(context) = &self.context else {
            return;
        };
        let params = LinkParams {
            crypto: context.crypto.clone(),
            player: context.player,
            generation: self.generation,
        };
        match UdpLink::connect(&addr, params, self.link_tx.clone()).await {
            Ok(link) => {
                info!("[Voice] Connecting to {} from {}", addr, link.local_addr());
                self.link = Some(link);
                self.last_heard = Instant::now();
                self.set_state(SessionState::Authenticating);
                self.transmit(SocketPacket::Authenticate {
                    player: secret.player_uuid,
                    secret: secret.secret,
                });
            }
            Err(e) => {
                error!("[Voice] {}", e);
                self.disconnect(e.to_string());
            }
        }
    }

    fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Packet { generation, packet } if generation == self.generation => {
                self.last_heard = Instant::now();
                self.handle_packet(packet);
            }
            LinkEvent::Closed { generation, reason } if generation == self.generation => {
                self.disconnect(reason);
            }
            _ => trace!("[Voice] Ignoring event from a replaced link"),
        }
    }

    fn handle_packet(&mut self, packet: SocketPacket) {
        match packet {
            SocketPacket::AuthenticateAck => {
                info!("[Voice] Authenticated, checking connection");
                self.transmit(SocketPacket::ConnectionCheck);
            }
            SocketPacket::ConnectionCheckAck => {
                if self.shared.state() != SessionState::Connected {
                    self.shared.sequence.store(0, Ordering::SeqCst);
                    self.set_state(SessionState::Connected);
                    info!("[Voice] Connected");
                    self.shared.events.emit(VoiceChatEvent::Connected);
                }
            }
            SocketPacket::KeepAlive => self.transmit(SocketPacket::KeepAlive),
            SocketPacket::Ping => self.transmit(SocketPacket::Ping),
            SocketPacket::PlayerSound(sound) => {
                let sender = self.resolve_name(&sound.sender);
                self.shared
                    .events
                    .emit(VoiceChatEvent::PlayerSound(PlayerSoundEvent {
                        channel_id: sound.channel_id,
                        sender_id: sound.sender,
                        sender,
                        data: sound.data,
                        sequence_number: sound.sequence_number,
                        distance: sound.distance,
                        whispering: sound.whispering,
                        category: sound.category,
                    }));
            }
            SocketPacket::LocationSound(sound) => {
                let sender = self.resolve_name(&sound.sender);
                self.shared
                    .events
                    .emit(VoiceChatEvent::LocationSound(LocationSoundEvent {
                        channel_id: sound.channel_id,
                        sender_id: sound.sender,
                        sender,
                        location: sound.location,
                        data: sound.data,
                        sequence_number: sound.sequence_number,
                        distance: sound.distance,
                        category: sound.category,
                    }));
            }
            SocketPacket::GroupSound(sound) => {
                let sender = self.resolve_name(&sound.sender);
                self.shared
                    .events
                    .emit(VoiceChatEvent::GroupSound(GroupSoundEvent {
                        channel_id: sound.channel_id,
                        sender_id: sound.sender,
                        sender,
                        data: sound.data,
                        sequence_number: sound.sequence_number,
                        category: sound.category,
                    }));
            }
            other => trace!("[Voice] Unexpected {:?} from server", other.kind()),
        }
    }

    fn resolve_name(&self, player: &Uuid) -> Option<String> {
        self.shared
            .directory
            .read()
            .ok()?
            .resolve_name(player)
            .map(str::to_owned)
    }

    fn transmit(&self, packet: SocketPacket) {
        let Some(link) = &self.link else {
            debug!("[Voice] No link, dropping {:?}", packet.kind());
            return;
        };
        if let Err(e) = link.send(packet) {
            debug!("[Voice] {}", e);
        }
    }

    fn transmit_if_connected(&self, packet: SocketPacket) {
        if self.shared.state() == SessionState::Connected {
            self.transmit(packet);
        } else {
            trace!("[Voice] Not connected, dropping {:?}", packet.kind());
        }
    }

    fn disconnect(&mut self, reason: String) {
        let had_link = self.link.take().is_some();
        if self.shared.state() == SessionState::Disconnected && !had_link {
            return;
        }
        self.shared.end_epoch();
        if let Some(context) = &self.context {
            debug!(
                "[Voice] Dropping session for player {} (secret {})",
                context.player,
                redact(context.secret)
            );
        }
        self.set_state(SessionState::Disconnected);
        warn!("[Voice] Disconnected: {}", reason);
        self.shared
            .events
            .emit(VoiceChatEvent::Disconnected { reason });
    }
}

fn redact(secret: Uuid) -> String {
    let text = secret.to_string();
    format!("{}…", &text[..8])
}

async fn sleep_until_some(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Encodes `packet` and sends it on its plugin channel.
pub(crate) fn send_handshake<C: PluginChannel + ?Sized>(
    channel: &C,
    packet: &HandshakePacket,
) -> Result<(), SdkError> {
    let data = packet.encode()?;
    trace!("[Handshake] Sending {} ({} bytes)", packet.channel(), data.len());
    channel.send(packet.channel(), data)
}

/// Picks the UDP target for a secret.
///
/// A blank host means the game server's own address. A host with its own port
/// keeps it; otherwise the secret's port is used.
pub(crate) fn voice_server_address(
    voice_host: &str,
    port: i32,
    peer_ip: Option<IpAddr>,
) -> Result<String, SdkError> {
    let port = u16::try_from(port)
        .map_err(|_| SdkError::ConnectionFailed(format!("invalid voice port {port}")))?;
    let host = voice_host.trim();

    if host.is_empty() {
        let ip = peer_ip.ok_or_else(|| {
            SdkError::ConnectionFailed("no voice host and no game server address".to_string())
        })?;
        return Ok(SocketAddr::new(ip, port).to_string());
    }
    if host.parse::<SocketAddr>().is_ok() {
        return Ok(host.to_string());
    }
    let bare = host
        .strip_prefix('[')
        .and_then(|inner| inner.strip_suffix(']'))
        .unwrap_or(host);
    if let Ok(ip) = bare.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port).to_string());
    }
    match host.rsplit_once(':') {
        Some((name, explicit)) if !name.is_empty() && explicit.parse::<u16>().is_ok() => {
            Ok(host.to_string())
        }
        _ => Ok(format!("{host}:{port}")),
    }
}
