//! sysstat CLI - Query the sysstat daemon
//!
//! # Usage
//!
//! ```text
//! sysstat list                          # every sensor with its unit
//! sysstat info cpu/all/usage            # full metadata
//! sysstat get cpu/all/usage disk/all/free
//! sysstat watch cpu/all/usage --count 10
//! ```

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use sysstat_client::{ClientConfig, ClientEvent, SensorClient, DEFAULT_SOCKET_PATH};
use sysstat_core::{SensorInfo, SensorInfoMap, SensorValue};

// ============================================================================
// CLI Arguments
// ============================================================================

/// sysstat - read system metrics from the sysstat daemon
#[derive(Parser, Debug)]
#[command(name = "sysstat")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Daemon socket
    #[arg(long, global = true, env = "SYSSTAT_SOCKET", default_value = DEFAULT_SOCKET_PATH)]
    socket: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every sensor
    List,
    /// Show metadata for sensors
    Info {
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Print current values
    Get {
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Subscribe and print values as they change
    Watch {
        #[arg(required = true)]
        paths: Vec<String>,

        /// Stop after this many frames
        #[arg(long, short = 'n')]
        count: Option<usize>,
    },
}

// ============================================================================
// Formatting
// ============================================================================

fn format_value(value: &SensorValue, info: Option<&SensorInfo>) -> String {
    let unit = info.map(|i| i.unit.symbol()).unwrap_or("");
    let number = match value {
        SensorValue::Double(v) => format!("{v:.2}"),
        other => other.to_string(),
    };
    if unit.is_empty() {
        number
    } else {
        format!("{number} {unit}")
    }
}

fn print_info(path: &str, info: &SensorInfo) {
    println!("{path}");
    println!("  name:  {}", info.name);
    if !info.short_name.is_empty() {
        println!("  short: {}", info.short_name);
    }
    if !info.prefix.is_empty() {
        println!("  prefix: {}", info.prefix);
    }
    if !info.description.is_empty() {
        println!("  description: {}", info.description);
    }
    println!("  type:  {:?}", info.value_type);
    println!("  unit:  {}", info.unit.symbol());
    match (info.min, info.max) {
        (Some(min), Some(max)) => println!("  range: {min} .. {max}"),
        (Some(min), None) => println!("  min:   {min}"),
        (None, Some(max)) => println!("  max:   {max}"),
        (None, None) => {}
    }
}

// ============================================================================
// Commands
// ============================================================================

async fn list(client: &mut SensorClient) -> Result<()> {
    for (path, info) in client.all_sensors().await? {
        println!("{path:<40} {:<24} {}", info.name, info.unit.symbol());
    }
    Ok(())
}

async fn info(client: &mut SensorClient, paths: Vec<String>) -> Result<()> {
    let sensors = client.sensors(paths.clone()).await?;
    for path in &paths {
        match sensors.get(path) {
            Some(info) => print_info(path, info),
            None => eprintln!("{path}: no such sensor"),
        }
    }
    Ok(())
}

async fn get(client: &mut SensorClient, paths: Vec<String>) -> Result<()> {
    let sensors = client.sensors(paths.clone()).await?;
    for entry in client.sensor_data(paths).await? {
        println!("{} = {}", entry.path, format_value(&entry.value, sensors.get(&entry.path)));
    }
    Ok(())
}

async fn watch(client: &mut SensorClient, paths: Vec<String>, count: Option<usize>) -> Result<()> {
    let mut sensors: SensorInfoMap = client.sensors(paths.clone()).await?;
    let accepted = client.subscribe(paths).await?;
    if accepted.is_empty() {
        bail!("None of the requested sensors exist");
    }
    debug!(sensors = accepted.len(), "Subscribed");

    let mut frames = 0;
    while let Some(event) = client.next_event().await? {
        match event {
            ClientEvent::Data { entries, timestamp } => {
                let line: Vec<String> = entries
                    .iter()
                    .map(|e| format!("{}={}", e.path, format_value(&e.value, sensors.get(&e.path))))
                    .collect();
                println!("{} {}", timestamp.format("%H:%M:%S%.3f"), line.join("  "));

                frames += 1;
                if count.is_some_and(|n| frames >= n) {
                    break;
                }
            }
            ClientEvent::MetadataChanged(changed) => sensors.extend(changed),
            ClientEvent::SensorRemoved(path) => {
                eprintln!("{path}: removed");
                sensors.remove(&path);
            }
            ClientEvent::SensorAdded(_) => {}
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let mut client = SensorClient::connect(&ClientConfig {
        socket_path: args.socket,
        client_name: Some("sysstat".to_string()),
        ..Default::default()
    })
    .await?;

    match args.command {
        Command::List => list(&mut client).await?,
        Command::Info { paths } => info(&mut client, paths).await?,
        Command::Get { paths } => get(&mut client, paths).await?,
        Command::Watch { paths, count } => watch(&mut client, paths, count).await?,
    }

    client.disconnect().await?;
    Ok(())
}
