use color_eyre::{eyre::eyre, Result};
use padhub::pad::{PadBackends, PadThread, PadThreadSettings};
use padhub::TomlConfigSource;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

const DEFAULT_SESSION: &str = "default";

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let session = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_SESSION.to_string());

    let config_source = TomlConfigSource::from_default_dir();
    info!(
        "Reading input profiles from {}",
        config_source.dir().display()
    );

    let pad_thread = PadThread::spawn(
        &session,
        Some(PadThreadSettings::default()),
        PadBackends::new(config_source),
    )
    .map_err(|e| eyre!("Failed to start pad thread: {}", e))?;

    for port in 0..padhub::pad::MAX_PORTS {
        if let Some(kind) = pad_thread.bound_handler(port) {
            info!("Port {}: {}", port, kind);
        }
    }

    let mut status_interval = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            _ = status_interval.tick() => {
                let pad_info = pad_thread.info();
                info!(
                    "Connected pads: {}, intercepted: {}",
                    pad_info.now_connect,
                    pad_info.is_intercepted()
                );
            }
        }
    }

    // Joins the pad thread off the async runtime
    tokio::task::spawn_blocking(move || pad_thread.shutdown())
        .await
        .map_err(|e| eyre!("Pad thread shutdown failed: {}", e))?;

    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
