use anyhow::Context;
use call_panel::{CallPanel, PanelConfig, RealtimeClient};
use clinic_core::config::{api_url_or_default, resolve_session_path};
use clinic_core::ClientConfig;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Clear screen and move the cursor home.
const CLEAR: &str = "\x1b[2J\x1b[H";

/// Reads an optional environment value, failing on values that do not parse.
fn env_parse<T>(name: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("invalid value for {name}: {raw:?}")),
        _ => Ok(None),
    }
}

fn panel_config() -> anyhow::Result<PanelConfig> {
    let mut config = PanelConfig::default();
    if let Some(size) = env_parse::<usize>("CLINIC_PANEL_HISTORY")? {
        config.history_size = size;
    }
    if let Ok(language) = std::env::var("CLINIC_SPEECH_LANGUAGE") {
        config.language = language;
    }
    if let Some(rate) = env_parse::<f32>("CLINIC_SPEECH_RATE")? {
        config.rate = rate;
    }
    if let Ok(command) = std::env::var("CLINIC_SPEECH_COMMAND") {
        config.speech_command = match command.trim() {
            "" | "none" => None,
            program => Some(program.to_string()),
        };
    }
    if let Some(ms) = env_parse::<u64>("CLINIC_RECONNECT_DELAY_MS")? {
        config.reconnect_delay = Duration::from_millis(ms);
    }
    config.redelivery_window =
        env_parse::<u64>("CLINIC_REDELIVERY_WINDOW_SECS")?.map(Duration::from_secs);
    Ok(config)
}

/// Main entry point for the clinic call panel
///
/// Connects to the real-time call server, shows the current call and the most recent calls,
/// and reads each call aloud. Runs until Ctrl-C.
///
/// # Environment Variables
/// - `CLINIC_API_URL`: backend address (default: "http://localhost:5000")
/// - `CLINIC_WS_URL`: real-time server address (default: the backend address)
/// - `CLINIC_API_KEY`: application key, required
/// - `CLINIC_SPEECH_COMMAND`: TTS program (default: "espeak-ng", "none" for silence)
/// - `CLINIC_SPEECH_LANGUAGE`, `CLINIC_SPEECH_RATE`: voice settings (default: "pt-BR", 0.9)
/// - `CLINIC_PANEL_HISTORY`: number of recent calls shown (default: 5)
/// - `CLINIC_RECONNECT_DELAY_MS`: wait between reconnect attempts (default: 1000)
/// - `CLINIC_REDELIVERY_WINDOW_SECS`: drop repeated calls inside this window (default: off)
///
/// # Returns
/// * `Ok(())` - On Ctrl-C
/// * `Err(anyhow::Error)` - If configuration is invalid
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("call_panel=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let api_url = api_url_or_default(std::env::var("CLINIC_API_URL").ok());
    let ws_url = std::env::var("CLINIC_WS_URL").ok();
    let api_key = std::env::var("CLINIC_API_KEY").unwrap_or_default();
    let session_path =
        resolve_session_path(std::env::var_os("CLINIC_SESSION_FILE").map(PathBuf::from))?;
    let client_config = ClientConfig::new(&api_url, ws_url.as_deref(), &api_key, session_path)?;
    let panel_config = panel_config()?;

    tracing::info!("call panel connecting to {}", client_config.ws_url());

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let client = RealtimeClient::connect(
        client_config.ws_url(),
        panel_config.reconnect_delay,
        move |event| {
            if events_tx.send(event).is_err() {
                tracing::debug!("panel stopped, call event dropped");
            }
        },
    )?;

    let panel = CallPanel::new(&panel_config, panel_config.synthesizer());
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {}", e);
        }
    };
    panel
        .run(events_rx, client.subscribe(), shutdown, |screen| {
            print!("{CLEAR}{screen}");
        })
        .await;

    client.close().await;
    Ok(())
}
