use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use usbode::config::{AppConfig, ConfigStore, DisplayBackend, DisplayConfig};
use usbode::controller::{ControllerConfig, GadgetController};
use usbode::display::{DisplayRunner, HeadlessDisplay, StatusDisplay};
use usbode::events::UpdateBus;
use usbode::state::AppState;
use usbode::storage::{ImageCatalog, MountStateStore};
use usbode::system::{self, ExitRequest};
use usbode::utils::bind_tcp_listener;
use usbode::{button, console, gadget, web};

/// Time allowed for background work after the main loop returns
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// USBODE command line arguments
#[derive(Parser, Debug)]
#[command(name = "usbode")]
#[command(version, about = "USB Optical Drive Emulator", long_about = None)]
struct CliArgs {
    /// Listen address (overrides database config)
    #[arg(short = 'a', long, value_name = "ADDRESS")]
    address: Option<String>,

    /// HTTP port (overrides database config)
    #[arg(short = 'p', long, value_name = "PORT")]
    http_port: Option<u16>,

    /// Data directory path (default: /etc/usbode)
    #[arg(short = 'd', long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Do not read commands from stdin
    #[arg(long)]
    no_console: bool,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_level, args.verbose);

    // The console's stdin read cannot be interrupted; don't wait on it forever
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(run(args));
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
    result
}

async fn run(args: CliArgs) -> anyhow::Result<()> {
    tracing::info!("Starting USBODE v{}", env!("CARGO_PKG_VERSION"));

    let data_dir = args.data_dir.clone().unwrap_or_else(get_data_dir);
    tracing::info!("Data directory: {}", data_dir.display());
    tokio::fs::create_dir_all(&data_dir).await?;

    let db_path = data_dir.join("usbode.db");
    let config_store = ConfigStore::new(&db_path).await?;
    let config = apply_cli_overrides((*config_store.get()).clone(), &args);

    bootstrap_system(&config).await;

    let helper = gadget::build_helper(&config.gadget);
    let controller = Arc::new(GadgetController::new(
        helper,
        ImageCatalog::new(&config.storage.store_mount),
        MountStateStore::new(&config.storage.mount_state_file),
        UpdateBus::new(),
        ControllerConfig::from_app_config(&config),
    ));

    match controller.initialize().await {
        Ok(mode) => tracing::info!("Gadget initialized in {} mode", mode),
        Err(e) => tracing::error!("Gadget initialization failed: {}", e),
    }

    let (exit_tx, mut exit_rx) = broadcast::channel(8);
    let state = AppState::new(config_store, controller.clone(), exit_tx.clone());

    let cancel = CancellationToken::new();
    let mut tasks = Vec::new();

    if config.console.enabled {
        tasks.push(tokio::spawn(console::run_console(
            controller.clone(),
            exit_tx.clone(),
            config.console.prompt.clone(),
            cancel.child_token(),
        )));
        tracing::info!("Console started");
    }

    if let Some(display) = build_display(&config.display) {
        let runner = DisplayRunner::new(display, controller.clone(), exit_tx.clone(), &config.display);
        tasks.push(tokio::spawn(runner.run(cancel.child_token())));
    }

    if let Some(task) = button::spawn_mode_button(&config.button, controller.clone(), cancel.child_token()) {
        tasks.push(task);
        tracing::info!("Mode button task started");
    }

    let server = serve_web(&config, state.clone());

    let request = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!("Failed to listen for CTRL+C: {}", e);
            }
            tracing::info!("Shutdown signal received");
            ExitRequest::Exit
        }
        request = exit_rx.recv() => request.unwrap_or(ExitRequest::Exit),
        result = server => {
            if let Err(e) = result {
                tracing::error!("HTTP server error: {}", e);
            }
            ExitRequest::Exit
        }
    };

    cleanup(&state, cancel, tasks).await;

    if request == ExitRequest::PowerOff {
        if let Err(e) = system::power_off(config.gadget.helper_timeout()).await {
            tracing::error!("Failed to power off: {}", e);
        }
    }

    tracing::info!("USBODE stopped");
    Ok(())
}

/// Initialize logging with tracing
fn init_logging(level: LogLevel, verbose_count: u8) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "usbode=error,tower_http=error",
        LogLevel::Warn => "usbode=warn,tower_http=warn",
        LogLevel::Info => "usbode=info,tower_http=info",
        LogLevel::Verbose => "usbode=debug,tower_http=info",
        LogLevel::Debug => "usbode=debug,tower_http=debug",
        LogLevel::Trace => "usbode=trace,tower_http=debug",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}

/// Get the application data directory
fn get_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var("USBODE_DATA_DIR") {
        return PathBuf::from(path);
    }
    PathBuf::from("/etc/usbode")
}

fn apply_cli_overrides(mut config: AppConfig, args: &CliArgs) -> AppConfig {
    if let Some(address) = &args.address {
        config.web.bind_address = address.clone();
    }
    if let Some(port) = args.http_port {
        config.web.http_port = port;
    }
    if args.no_console {
        config.console.enabled = false;
    }
    config
}

/// Mount the image store and load the gadget framework
///
/// Both are best-effort: a device set up by hand keeps working without them.
async fn bootstrap_system(config: &AppConfig) {
    let timeout = config.gadget.helper_timeout();
    if config.storage.mount_store_on_start {
        if let Err(e) = system::mount_image_store(&config.storage, timeout).await {
            tracing::warn!("Failed to mount image store: {}", e);
        }
    }
    if config.gadget.load_modules_on_start {
        if let Err(e) = system::load_gadget_framework(timeout).await {
            tracing::warn!("Failed to load gadget framework: {}", e);
        }
    }
}

fn build_display(config: &DisplayConfig) -> Option<Box<dyn StatusDisplay>> {
    match config.backend {
        DisplayBackend::None => None,
        DisplayBackend::Headless => Some(Box::new(HeadlessDisplay::new())),
    }
}

async fn serve_web(config: &AppConfig, state: Arc<AppState>) -> anyhow::Result<()> {
    if !config.web.enabled {
        tracing::info!("Web interface disabled");
        return std::future::pending().await;
    }

    let ip: IpAddr = config
        .web
        .bind_address
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid bind address: {}", config.web.bind_address))?;
    let addr = SocketAddr::new(ip, config.web.http_port);
    let listener = tokio::net::TcpListener::from_std(bind_tcp_listener(addr)?)?;
    tracing::info!("Starting HTTP server on {}", addr);

    axum::serve(listener, web::create_router(state)).await?;
    Ok(())
}

/// Stop front ends, then take the gadget down
async fn cleanup(
    state: &Arc<AppState>,
    cancel: CancellationToken,
    tasks: Vec<tokio::task::JoinHandle<()>>,
) {
    cancel.cancel();
    for task in tasks {
        if tokio::time::timeout(Duration::from_secs(1), task).await.is_err() {
            tracing::debug!("Background task did not stop in time");
        }
    }

    if let Err(e) = state.controller.shutdown().await {
        tracing::warn!("Gadget shutdown incomplete: {}", e);
    }
}
