pub(crate) mod event_handler;
pub(crate) mod transport;
pub(crate) mod udp_client;

pub use event_handler::{GroupSoundEvent, LocationSoundEvent, PlayerSoundEvent, VoiceChatEvent};
pub(crate) use event_handler::EventHandler;
pub use transport::{HostEvent, HostEventSender, PluginChannel};
pub(crate) use udp_client::{LinkEvent, LinkParams, UdpLink};
