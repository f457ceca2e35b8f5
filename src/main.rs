use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;
use tokio::io::BufReader;
use tokio::sync::mpsc;

use carephone_lib::{
    bridge::{Bridge, BridgeTelecom},
    db::{CallLogStore, Database},
    ports::SignalPlayer,
    settings::SettingsStore,
    voice::SpeechCommand,
    Phone, PhoneDeps,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    let level = if std::env::var("CAREPHONE_DEBUG").as_deref() == Ok("1") {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    info!("carephone starting up...");

    let data_dir = std::env::var_os("CAREPHONE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("carephone-data"));
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create {}", data_dir.display()))?;

    let settings = Arc::new(SettingsStore::load(data_dir.join("settings.json"))?);
    let database = Database::new(data_dir.join("carephone.sqlite3"))?;
    let call_log = CallLogStore::open(database.clone()).await?;

    let (outbox, outbox_rx) = mpsc::unbounded_channel();

    let phone = Phone::start(PhoneDeps {
        telecom: Arc::new(BridgeTelecom::new(outbox.clone())),
        directory: Arc::new(database.clone()),
        call_log: Arc::new(call_log),
        voice: Arc::new(SpeechCommand::system_default()),
        signal: signal_player(),
        settings,
    });

    Bridge::new(phone, Some(database))
        .serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout(), outbox, outbox_rx)
        .await
}

#[cfg(feature = "device-audio")]
fn signal_player() -> Arc<dyn SignalPlayer> {
    Arc::new(carephone_lib::audio::ToneEngine::new())
}

#[cfg(not(feature = "device-audio"))]
fn signal_player() -> Arc<dyn SignalPlayer> {
    Arc::new(carephone_lib::audio::SilentPlayer)
}
