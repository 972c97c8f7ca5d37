use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use hidapi::HidApi;
use spacebridge::config::BridgeConfig;
use spacebridge::device::{list_devices, run_reader, HidOpener, ReaderError, ReaderExit};
use spacebridge::receiver::{run_tick_loop, HeadlessHost, ReceiverError, ReceiverHandle};
use spacebridge::transport::ReaderLink;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

const EXIT_CONFIG: u8 = 2;
const EXIT_DEVICE_UNAVAILABLE: u8 = 3;

#[derive(Debug, Parser)]
#[command(name = "spacebridge", version, about = "SpaceMouse to host motion bridge")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Stream the first supported device to the receiver
    Reader {
        #[arg(long)]
        config: Option<PathBuf>,
        /// Suppress the single-line status display
        #[arg(long)]
        quiet: bool,
    },
    /// Run a receiver against an in-memory host and log every applied pose
    Listen {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// List attached supported devices
    Devices {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Write the default configuration file if none exists
    InitConfig {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    setup()?;
    let cli = Cli::parse();

    match cli.command {
        Command::Reader { config, quiet } => reader(config_path(config), !quiet).await,
        Command::Listen { config } => listen(config_path(config)).await,
        Command::Devices { config } => devices(config_path(config)),
        Command::InitConfig { config } => {
            let path = config_path(config);
            match BridgeConfig::write_default(&path).await {
                Ok(_) => Ok(ExitCode::SUCCESS),
                Err(e) => {
                    error!("{}", e);
                    Ok(ExitCode::from(EXIT_CONFIG))
                }
            }
        }
    }
}

fn config_path(path: Option<PathBuf>) -> PathBuf {
    path.unwrap_or_else(BridgeConfig::default_path)
}

async fn load_config(path: &Path) -> Option<BridgeConfig> {
    match BridgeConfig::load(path).await {
        Ok(config) => Some(config),
        Err(e) => {
            error!("{}", e);
            None
        }
    }
}

/// Cancels `token` on Ctrl-C
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping");
        }
        token.cancel();
    });
}

async fn reader(path: PathBuf, show_status: bool) -> Result<ExitCode> {
    let Some(config) = load_config(&path).await else {
        return Ok(ExitCode::from(EXIT_CONFIG));
    };
    let link = ReaderLink::connect(config.transport.port)?;
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let result = tokio::task::spawn_blocking(move || {
        let mut opener = HidOpener::default();
        run_reader(config, link, &mut opener, cancel, show_status)
    })
    .await
    .map_err(|e| eyre!("Reader task failed: {}", e))?;

    match result {
        Ok(ReaderExit::Cancelled) | Ok(ReaderExit::Shutdown) => Ok(ExitCode::SUCCESS),
        Err(e @ ReaderError::Config(_)) => {
            error!("{}", e);
            Ok(ExitCode::from(EXIT_CONFIG))
        }
        Err(e @ ReaderError::DeviceUnavailable { .. }) => {
            error!("{}", e);
            Ok(ExitCode::from(EXIT_DEVICE_UNAVAILABLE))
        }
        Err(e) => Err(e.into()),
    }
}

async fn listen(path: PathBuf) -> Result<ExitCode> {
    let Some(config) = load_config(&path).await else {
        return Ok(ExitCode::from(EXIT_CONFIG));
    };
    let tick_hz = config.receiver.tick_hz;
    let handle = match ReceiverHandle::start(config) {
        Ok(handle) => handle,
        Err(e @ ReceiverError::Config(_)) => {
            error!("{}", e);
            return Ok(ExitCode::from(EXIT_CONFIG));
        }
        Err(e) => return Err(e.into()),
    };

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());
    let host = tokio::spawn(run_tick_loop(handle, HeadlessHost::default(), tick_hz, cancel))
        .await
        .map_err(|e| eyre!("Tick loop task failed: {}", e))??;

    info!(
        "Receiver stopped: {} view, {} camera, {} followed-object applies, {} hotkey events",
        host.view_applies,
        host.camera_applies,
        host.followed_applies,
        host.hotkeys.len()
    );
    Ok(ExitCode::SUCCESS)
}

fn devices(path: PathBuf) -> Result<ExitCode> {
    info!("Listing devices (config {})", path.display());
    let api = HidApi::new().map_err(|e| eyre!("HID API unavailable: {}", e))?;
    let listings = list_devices(&api);
    if listings.is_empty() {
        println!("No supported devices attached");
        return Ok(ExitCode::from(EXIT_DEVICE_UNAVAILABLE));
    }

    for listing in listings {
        println!(
            "{:04X}:{:04X} {} ({:?}, {} buttons) usage {:#04x}/{:#04x}{} {}",
            listing.vendor_id,
            listing.model.product_id,
            listing.model.name,
            listing.model.variant,
            listing.model.button_count,
            listing.usage_page,
            listing.usage,
            if listing.is_multi_axis() { " [preferred]" } else { "" },
            listing.path
        );
    }
    Ok(ExitCode::SUCCESS)
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
