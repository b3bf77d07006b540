use async_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::debug;
use voicechat_protocol::{GroupState, Location, Uuid};

/// Undelivered events kept before new ones are dropped.
const EVENT_BUFFER: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSoundEvent {
    pub channel_id: Uuid,
    pub sender_id: Uuid,
    /// Display name from the presence directory, if the sender is known.
    pub sender: Option<String>,
    pub data: Vec<u8>,
    pub sequence_number: i64,
    pub distance: f32,
    pub whispering: bool,
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationSoundEvent {
    pub channel_id: Uuid,
    pub sender_id: Uuid,
    pub sender: Option<String>,
    pub location: Location,
    pub data: Vec<u8>,
    pub sequence_number: i64,
    pub distance: f32,
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSoundEvent {
    pub channel_id: Uuid,
    pub sender_id: Uuid,
    pub sender: Option<String>,
    pub data: Vec<u8>,
    pub sequence_number: i64,
    pub category: Option<String>,
}

/// Events emitted by the voice chat session.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceChatEvent {
    /// The voice server acknowledged the connection check.
    Connected,
    Disconnected { reason: String },
    GroupAdded(GroupState),
    GroupRemoved { id: Uuid },
    JoinedGroup { group: Option<Uuid>, wrong_password: bool },
    PlayerSound(PlayerSoundEvent),
    LocationSound(LocationSoundEvent),
    GroupSound(GroupSoundEvent),
}

/// Fan-out point for session events.
pub(crate) struct EventHandler {
    event_tx: Sender<VoiceChatEvent>,
    event_rx: Receiver<VoiceChatEvent>,
}

impl EventHandler {
    pub(crate) fn new() -> Self {
        let (event_tx, event_rx) = bounded(EVENT_BUFFER);
        Self { event_tx, event_rx }
    }

    /// Receivers share one queue: each event goes to exactly one of them.
    pub(crate) fn event_stream(&self) -> Receiver<VoiceChatEvent> {
        self.event_rx.clone()
    }

    /// Never blocks the session; drops the event when nobody is draining the queue.
    pub(crate) fn emit(&self, event: VoiceChatEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                debug!("[Voice] Event queue full, dropping {:?}", event_name(&event));
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

fn event_name(event: &VoiceChatEvent) -> &'static str {
    match event {
        VoiceChatEvent::Connected => "Connected",
        VoiceChatEvent::Disconnected { .. } => "Disconnected",
        VoiceChatEvent::GroupAdded(_) => "GroupAdded",
        VoiceChatEvent::GroupRemoved { .. } => "GroupRemoved",
        VoiceChatEvent::JoinedGroup { .. } => "JoinedGroup",
        VoiceChatEvent::PlayerSound(_) => "PlayerSound",
        VoiceChatEvent::LocationSound(_) => "LocationSound",
        VoiceChatEvent::GroupSound(_) => "GroupSound",
    }
}
