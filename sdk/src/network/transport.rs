use std::net::IpAddr;

use async_channel::Sender;

use crate::error::SdkError;
use crate::session::SessionInput;

/// Duplex connection to the game host that carries named plugin-channel messages.
///
/// Implementations must not block: queue the payload and return.
pub trait PluginChannel: Send + Sync + 'static {
    /// Announces a channel to the host before any message is sent on it.
    fn register_channel(&self, channel: &str) -> Result<(), SdkError>;

    fn send(&self, channel: &str, data: Vec<u8>) -> Result<(), SdkError>;

    /// Address of the game server, used when the voice host is left blank.
    fn peer_ip(&self) -> Option<IpAddr>;
}

/// Something the host connection observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// Logged in to the game server; plugin channels can be registered.
    Login,
    /// The player entered a world.
    Spawn,
    Payload { channel: String, data: Vec<u8> },
}

/// Feeds host events into the session.
#[derive(Debug, Clone)]
pub struct HostEventSender {
    input_tx: Sender<SessionInput>,
}

impl HostEventSender {
    pub(crate) fn new(input_tx: Sender<SessionInput>) -> Self {
        Self { input_tx }
    }

    /// # Errors
    /// Returns [`SdkError::Disconnected`] once the session task has stopped.
    pub fn send(&self, event: HostEvent) -> Result<(), SdkError> {
        self.input_tx
            .try_send(SessionInput::Host(event))
            .map_err(|_| SdkError::Disconnected)
    }

    /// # Errors
    /// See [`HostEventSender::send`].
    pub fn login(&self) -> Result<(), SdkError> {
        self.send(HostEvent::Login)
    }

    /// # Errors
    /// See [`HostEventSender::send`].
    pub fn spawn(&self) -> Result<(), SdkError> {
        self.send(HostEvent::Spawn)
    }

    /// # Errors
    /// See [`HostEventSender::send`].
    pub fn payload(&self, channel: impl Into<String>, data: Vec<u8>) -> Result<(), SdkError> {
        self.send(HostEvent::Payload {
            channel: channel.into(),
            data,
        })
    }
}
