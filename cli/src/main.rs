// homedash: operator CLI for the home device dashboard
//
// Talks to the realtime database over REST and reuses the core's device,
// VAPID, notification and subscription-record logic.

mod config;
mod rtdb;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use colored::*;
use homedash_core::device::{self, DeviceFeed};
use homedash_core::push::record::audit_subscriptions;
use homedash_core::push::vapid::P256_PUBLIC_KEY_LEN;
use homedash_core::push::worker::notification_for;
use homedash_core::store::SUBSCRIPTIONS_ROOT;
use homedash_core::{decode_application_server_key, WorkerConfig};
use serde_json::Value;

use crate::rtdb::RestStore;

#[derive(Parser)]
#[command(name = "homedash")]
#[command(about = "HomeDash: device dashboard and push subscription tooling", long_about = None)]
#[command(version)]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Read and write device records
    Device {
        #[command(subcommand)]
        action: DeviceAction,
    },
    /// Inspect the application-server key
    Vapid {
        #[command(subcommand)]
        action: VapidAction,
    },
    /// Show the notification a push payload would produce
    Push {
        #[command(subcommand)]
        action: PushAction,
    },
    /// Inspect stored push subscriptions
    Subscriptions {
        #[command(subcommand)]
        action: SubscriptionsAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Set { key: String, value: String },
    Get { key: String },
    List,
}

#[derive(Subcommand)]
enum DeviceAction {
    /// Overwrite devices/<name> with a JSON value
    Set { name: String, json: String },
    List,
    Show { name: String },
}

#[derive(Subcommand)]
enum VapidAction {
    /// Decode a key (defaults to the configured one)
    Decode { key: Option<String> },
}

#[derive(Subcommand)]
enum PushAction {
    /// Payload text as an external sender would post it; omit for an empty push
    Preview { payload: Option<String> },
}

#[derive(Subcommand)]
enum SubscriptionsAction {
    /// Check every record under subscriptions/ for a deliverable shape
    Audit,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Config { action } => cmd_config(action).await,
        Commands::Device { action } => cmd_device(action).await,
        Commands::Vapid { action } => cmd_vapid(action).await,
        Commands::Push { action } => cmd_push(action).await,
        Commands::Subscriptions { action } => cmd_subscriptions(action).await,
    }
}

fn open_store() -> Result<RestStore> {
    let config = config::Config::load()?.effective();
    RestStore::from_config(&config.store)
}

async fn cmd_config(action: ConfigAction) -> Result<()> {
    let mut config = config::Config::load()?;

    match action {
        ConfigAction::Set { key, value } => {
            config.set(&key, &value)?;
            println!("{} Set {} = {}", "✓".green(), key.bright_cyan(), value);
        }

        ConfigAction::Get { key } => {
            if !config::KEYS.contains(&key.as_str()) {
                anyhow::bail!("Unknown config key: {}", key);
            }
            match config.get(&key) {
                Some(value) => println!("{} = {}", key.bright_cyan(), value),
                None => println!("{} = {}", key.bright_cyan(), "(unset)".dimmed()),
            }
        }

        ConfigAction::List => {
            println!("{}", "Configuration".bold());
            println!("  {}", config.path().display().to_string().dimmed());
            println!();

            for (key, value) in config.list() {
                println!("  {:<20} {}", key.bright_cyan(), value);
            }
        }
    }

    Ok(())
}

async fn cmd_device(action: DeviceAction) -> Result<()> {
    let store = open_store()?;

    match action {
        DeviceAction::Set { name, json } => {
            let data: Value = serde_json::from_str(&json).context("Device data is not valid JSON")?;
            device::set_device(&store, &name, data).await?;
            println!("{} Updated device {}", "✓".green(), name.bright_cyan());
        }

        DeviceAction::List => {
            let feed = DeviceFeed::listen(&store, None)?;
            let snapshot = feed.snapshot();

            if snapshot.is_empty() {
                println!("{}", "No devices yet.".dimmed());
            } else {
                println!("{} ({} total)", "Devices".bold(), snapshot.len());
                println!();

                for device in snapshot.devices() {
                    println!(
                        "  [{}] {}",
                        device.avatar_letter().bright_yellow(),
                        device.name.bright_cyan()
                    );
                    if let Some(icon) = device.icon() {
                        println!("      icon: {}", icon.dimmed());
                    }
                }
            }
        }

        DeviceAction::Show { name } => {
            let feed = DeviceFeed::listen(&store, None)?;
            let device = feed
                .snapshot()
                .get(&name)
                .with_context(|| format!("No device named {}", name))?;

            println!("{}", device.name.bold());
            println!("{}", device.details());
        }
    }

    Ok(())
}

async fn cmd_vapid(action: VapidAction) -> Result<()> {
    match action {
        VapidAction::Decode { key } => {
            let key = match key {
                Some(key) => key,
                None => config::Config::load()?
                    .effective()
                    .application_server_key()
                    .map(str::to_string)
                    .context("No key given and none configured")?,
            };

            let bytes = decode_application_server_key(&key)?;
            println!("{}", "Application-server key".bold());
            println!("  Length: {} bytes", bytes.len());
            println!("  Hex:    {}", hex::encode(&bytes).bright_yellow());

            if bytes.len() == P256_PUBLIC_KEY_LEN && bytes[0] == 0x04 {
                println!("  {} Uncompressed P-256 public key", "✓".green());
            } else {
                println!(
                    "  {} Not a {}-byte uncompressed P-256 key; browsers will reject it",
                    "!".bright_red(),
                    P256_PUBLIC_KEY_LEN
                );
            }
        }
    }

    Ok(())
}

async fn cmd_push(action: PushAction) -> Result<()> {
    match action {
        PushAction::Preview { payload } => {
            let config = config::Config::load()?.effective();
            let notification = notification_for(payload.as_deref(), &WorkerConfig::from(&config));

            println!("{}", "Notification".bold());
            println!("  Title: {}", notification.title.bright_cyan());
            println!("  Body:  {}", notification.body);
            println!("  Icon:  {}", notification.icon.dimmed());
            println!("  Data:  {}", serde_json::to_string_pretty(&notification.data)?);
            println!("  Click: focuses an open window, else opens {}", config.open_path);
        }
    }

    Ok(())
}

async fn cmd_subscriptions(action: SubscriptionsAction) -> Result<()> {
    match action {
        SubscriptionsAction::Audit => {
            let store = open_store()?;
            let root = store.fetch(SUBSCRIPTIONS_ROOT).await?;
            let results = audit_subscriptions(&root);

            if results.is_empty() {
                println!("{}", "No stored subscriptions.".dimmed());
                return Ok(());
            }

            let deliverable = results.iter().filter(|(_, r)| r.is_ok()).count();
            println!(
                "{} ({} deliverable of {})",
                "Subscriptions".bold(),
                deliverable,
                results.len()
            );
            println!();

            for (key, result) in results {
                match result {
                    Ok(sub) => {
                        let owner = sub.uid.as_deref().unwrap_or("anonymous");
                        println!("  {} {} ({})", "✓".green(), key.bright_cyan(), owner);
                        println!("    {}", sub.endpoint.dimmed());
                        if let Some(created) = sub.created_at.as_deref() {
                            println!("    created {}", format_created(created));
                        }
                    }
                    Err(problem) => {
                        println!("  {} {}: {}", "✗".red(), key.bright_cyan(), problem);
                    }
                }
            }
        }
    }

    Ok(())
}

fn format_created(raw: &str) -> String {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => dt
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        Err(_) => raw.to_string(),
    }
}
