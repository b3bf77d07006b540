//! Environment settings for the bundled tools.

use std::env;
use std::time::Duration;

/// Default address of the game-protocol proxy.
pub const DEFAULT_TUNNEL_ADDR: &str = "127.0.0.1:25580";

/// How long the bot waits for the voice server to confirm the session.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Returns the proxy address from `VOICECHAT_TUNNEL_ADDR` or the default.
#[must_use]
pub fn tunnel_addr() -> String {
    env::var("VOICECHAT_TUNNEL_ADDR")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_TUNNEL_ADDR.to_string())
}

/// Returns the group to join from `VOICECHAT_GROUP`, if set.
#[must_use]
pub fn group() -> Option<String> {
    env::var("VOICECHAT_GROUP")
        .ok()
        .filter(|v| !v.trim().is_empty())
}

/// Returns the group password from `VOICECHAT_GROUP_PASSWORD`, if set.
#[must_use]
pub fn group_password() -> Option<String> {
    env::var("VOICECHAT_GROUP_PASSWORD").ok()
}
