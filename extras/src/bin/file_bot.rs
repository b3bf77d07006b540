use std::sync::Arc;

use tokio::time::timeout;
use tracing::{error, info, warn};
use voicechat_extras::{config, TcpPluginChannel, WavTranscoder};
use voicechat_sdk::{StreamEnd, VoiceChat, VoiceChatConfig, VoiceChatEvent};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(debug_assertions)]
    {
        use tracing::Level;
        tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .init();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::fmt::init();
    }

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: file_bot <wav_file>");
        eprintln!("Example: VOICECHAT_GROUP=Music file_bot music.wav");
        std::process::exit(1);
    }
    let wav_file = &args[1];
    let tunnel_addr = config::tunnel_addr();

    info!("File bot starting...");
    info!("Tunnel: {}", tunnel_addr);
    info!("WAV file: {}", wav_file);

    let (channel, host_events) = TcpPluginChannel::connect(&tunnel_addr).await?;
    let chat = VoiceChat::new(Arc::new(channel), VoiceChatConfig::default());

    let host = chat.host_sender();
    tokio::spawn(async move {
        while let Ok(event) = host_events.recv().await {
            if host.send(event).is_err() {
                break;
            }
        }
        warn!("Tunnel closed");
    });

    let events = chat.event_stream();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                VoiceChatEvent::Disconnected { reason } => warn!("Disconnected: {}", reason),
                VoiceChatEvent::JoinedGroup {
                    group,
                    wrong_password,
                } => info!("Joined group {:?} (wrong password: {})", group, wrong_password),
                VoiceChatEvent::GroupAdded(group) => info!("Group available: {}", group.name),
                _ => {}
            }
        }
    });

    info!("Waiting for voice session...");
    timeout(config::CONNECT_TIMEOUT, chat.wait_connected())
        .await
        .map_err(|_| "timed out waiting for the voice server")??;
    info!("Connected!");

    if let Some(group) = config::group() {
        let password = config::group_password();
        if let Err(e) = chat.join_group(&group, password.as_deref()) {
            error!("Failed to join group {}: {}", group, e);
        }
    }

    let outcome = chat.send_audio(&WavTranscoder, wav_file).await?;
    match outcome.end {
        StreamEnd::Completed => info!("Finished streaming {} frames", outcome.frames_sent),
        StreamEnd::Stopped => info!("Stopped after {} frames", outcome.frames_sent),
        StreamEnd::Disconnected => {
            error!("Lost connection after {} frames", outcome.frames_sent);
        }
    }

    Ok(())
}
