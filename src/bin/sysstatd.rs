//! sysstat Daemon - Sensor registry and subscription server
//!
//! This binary runs the metrics daemon: it polls the built-in providers on a
//! fixed tick and serves discovery queries and subscriptions over a Unix
//! socket.
//!
//! # Usage
//!
//! ```bash
//! # Start the daemon (foreground)
//! sysstatd start
//!
//! # Start in the background, replacing a running instance
//! sysstatd start -d --replace
//!
//! # Exit once the last subscribed client disconnects
//! sysstatd start --quit-on-last-client
//!
//! # Stop the daemon
//! sysstatd stop
//!
//! # Check daemon status
//! sysstatd status
//! ```

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use sysstat_client::SensorClient;
use sysstatd::config::DaemonConfig;
use sysstatd::daemon::{spawn_daemon, DaemonOptions};
use sysstatd::providers::builtin_providers;
use sysstatd::server::DaemonServer;

/// sysstat daemon - system metrics aggregation
#[derive(Parser, Debug)]
#[command(name = "sysstatd", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Config file (default: <config dir>/sysstat/sysstatd.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the daemon
    Start(StartArgs),
    /// Stop the running daemon
    Stop,
    /// Show daemon status
    Status,
}

#[derive(clap::Args, Debug, Default)]
struct StartArgs {
    /// Run as a background daemon (fork to background)
    #[arg(short = 'd', long)]
    daemon: bool,

    /// Stop a running instance and take over
    #[arg(long)]
    replace: bool,

    /// Exit when the last subscribed client disconnects
    #[arg(long)]
    quit_on_last_client: bool,

    /// Poll period in milliseconds (overrides the config file)
    #[arg(long, value_name = "MS")]
    interval_ms: Option<u64>,
}

fn state_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("sysstat")
}

/// The daemon's PID file under the state directory.
struct PidFile {
    path: PathBuf,
}

impl PidFile {
    fn new() -> Self {
        Self {
            path: state_dir().join("sysstatd.pid"),
        }
    }

    /// PID of a live daemon. A file naming a dead process is removed.
    fn running(&self) -> Option<u32> {
        let pid: u32 = fs::read_to_string(&self.path).ok()?.trim().parse().ok()?;
        if process_alive(pid) {
            Some(pid)
        } else {
            self.remove();
            None
        }
    }

    fn write(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("Failed to create state directory")?;
        }
        fs::write(&self.path, process::id().to_string())
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }

    fn remove(&self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

/// Sends SIGTERM and waits up to five seconds for the process to exit.
fn terminate(pid: u32) -> Result<()> {
    let raw = i32::try_from(pid).context("PID out of range")?;
    if unsafe { libc::kill(raw, libc::SIGTERM) } != 0 {
        bail!("Failed to send SIGTERM to process {pid}");
    }

    for _ in 0..50 {
        if !process_alive(pid) {
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    bail!("Daemon (PID {pid}) did not stop within 5 seconds")
}

fn load_config(path: Option<&Path>) -> Result<DaemonConfig> {
    let mut config = DaemonConfig::load_or_default(path).context("Failed to load config")?;
    config.apply_env();
    Ok(config)
}

fn main() -> Result<()> {
    let args = Args::parse();
    let command = args.command.unwrap_or(Command::Start(StartArgs::default()));
    let mut config = load_config(args.config.as_deref())?;
    let pid_file = PidFile::new();

    match command {
        Command::Start(start) => {
            if let Some(pid) = pid_file.running() {
                if !start.replace {
                    eprintln!("Daemon is already running (PID {pid})");
                    eprintln!("Use 'sysstatd stop' or 'sysstatd start --replace'.");
                    process::exit(1);
                }
                println!("Replacing running daemon (PID {pid})...");
                terminate(pid)?;
            }

            if let Some(ms) = start.interval_ms {
                config.poll_interval_ms = ms;
            }
            config.quit_on_last_client |= start.quit_on_last_client;
            config.validate().context("Invalid options")?;

            if start.daemon {
                daemonize()?;
            }

            pid_file.write()?;
            let result = run_daemon(config);
            pid_file.remove();
            result
        }
        Command::Stop => match pid_file.running() {
            Some(pid) => {
                println!("Stopping daemon (PID {pid})...");
                terminate(pid)?;
                println!("Daemon stopped.");
                Ok(())
            }
            None => {
                println!("Daemon is not running.");
                Ok(())
            }
        },
        Command::Status => {
            let Some(pid) = pid_file.running() else {
                println!("Daemon is not running.");
                process::exit(1);
            };

            println!("Daemon is running (PID {pid})");
            println!("Socket: {}", config.socket_path.display());
            match count_sensors(&config.socket_path) {
                Ok(count) => println!("Sensors: {count}"),
                Err(e) => println!("Socket not answering: {e}"),
            }
            Ok(())
        }
    }
}

fn daemonize() -> Result<()> {
    use daemonize::Daemonize;

    let log_path = state_dir().join("sysstatd.log");

    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(&log_path).context("Failed to create log file for stdout")?;
    let stderr = stdout.try_clone().context("Failed to open log file for stderr")?;

    Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr)
        .start()
        .context("Failed to daemonize")?;

    Ok(())
}

#[tokio::main]
async fn count_sensors(socket_path: &Path) -> Result<usize> {
    let mut client = SensorClient::connect_to(socket_path).await?;
    let count = client.all_sensors().await?.len();
    client.disconnect().await?;
    Ok(count)
}

#[tokio::main]
async fn run_daemon(config: DaemonConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("sysstatd=info".parse()?)
                .add_directive("sysstat_core=info".parse()?)
                .add_directive("sysstat_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        poll_interval_ms = config.poll_interval_ms,
        "sysstat daemon starting"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let options = DaemonOptions {
        poll_interval: Some(config.poll_interval()),
        quit_on_last_client: config.quit_on_last_client,
    };
    let daemon = spawn_daemon(options, cancel_token.clone());

    for provider in builtin_providers(&config.providers) {
        let name = provider.name().to_string();
        match daemon.register_provider(provider).await {
            Ok(containers) => info!(provider = %name, containers, "Provider started"),
            Err(e) => warn!(provider = %name, error = %e, "Provider not registered"),
        }
    }

    let server = DaemonServer::new(&config.socket_path, daemon, cancel_token);

    info!(socket = %config.socket_path.display(), "Starting server");

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("sysstat daemon stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
