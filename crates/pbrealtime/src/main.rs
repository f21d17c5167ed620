//! `pbrt` - CLI for pbrealtime
//!
//! Lists, watches and toggles the records of a PocketBase collection.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use anyhow::{bail, Context};
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use pbrealtime::cli::{Cli, Command, ConfigCommand, ListCommand, ToggleCommand, WatchCommand};
use pbrealtime::report::default_sink;
use pbrealtime::{init_logging, Config, Record, SyncClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    if let Command::Config(config_cmd) = &cli.command {
        return handle_config(&cli, config_cmd);
    }

    let config = Config::load_from(cli.config.clone()).context("loading configuration")?;
    let mut client = login(&cli, &config).await?;

    match &cli.command {
        Command::List(cmd) => handle_list(&mut client, cmd).await,
        Command::Watch(cmd) => handle_watch(&mut client, cmd).await,
        Command::Toggle(cmd) => handle_toggle(&mut client, cmd).await,
        Command::Config(_) => Ok(()),
    }
}

async fn login(cli: &Cli, config: &Config) -> anyhow::Result<SyncClient> {
    let Some((identity, password)) = cli.credentials(config) else {
        bail!("no credentials: pass --identity/--password or set them in the [auth] section");
    };

    let client = SyncClient::from_config(config, default_sink())?;
    let session = client
        .login(identity, password)
        .await
        .with_context(|| format!("logging in as {identity}"))?;
    info!(user = %session.user_id, "Logged in");
    Ok(client)
}

fn print_records(records: &[Record]) {
    if records.is_empty() {
        println!("(no records)");
    }
    for record in records {
        println!("{record}");
    }
}

async fn handle_list(client: &mut SyncClient, cmd: &ListCommand) -> anyhow::Result<()> {
    let snapshot = client.refresh().await?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&snapshot.items)?);
    } else {
        print_records(&snapshot.items);
        if snapshot.is_truncated() {
            println!(
                "... showing {} of {} records",
                snapshot.items.len(),
                snapshot.total_items
            );
        }
    }
    client.logout().await;
    Ok(())
}

async fn handle_watch(client: &mut SyncClient, cmd: &WatchCommand) -> anyhow::Result<()> {
    let mut changes = client.store().subscribe();
    let mut state = client.start().await?.watch_state();

    client.store().with_records(print_records);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            change = changes.recv() => match change {
                Ok(change) if cmd.changes => println!("{change:?}"),
                Ok(_) => {
                    println!();
                    client.store().with_records(print_records);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Display fell behind");
                    client.store().with_records(print_records);
                }
                Err(RecvError::Closed) => break,
            },
            changed = state.changed() => {
                if changed.is_err() || state.borrow().is_terminal() {
                    break;
                }
                let current = state.borrow().clone();
                info!(state = %current, "Realtime state changed");
            }
        }
    }

    let final_state = client.stop().await;
    client.logout().await;
    info!(state = %final_state, "Stopped");
    if let pbrealtime::SubscriberState::Errored(err) = final_state {
        return Err(err.into());
    }
    Ok(())
}

async fn handle_toggle(client: &mut SyncClient, cmd: &ToggleCommand) -> anyhow::Result<()> {
    client.refresh().await?;
    let record = client
        .store()
        .get(&cmd.id)
        .with_context(|| format!("no record with id {}", cmd.id))?;

    client.toggle(&record).await?;
    println!("{}", record.toggled());
    client.logout().await;
    Ok(())
}

fn handle_config(cli: &Cli, cmd: &ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            let config = Config::load_from(cli.config.clone())?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Server]");
                println!("  Base URL:           {}", config.server.base_url);
                println!("  Collection:         {}", config.server.collection);
                println!("  Auth collection:    {}", config.server.auth_collection);
                println!();
                println!("[Auth]");
                println!(
                    "  Identity:           {}",
                    config.auth.identity.as_deref().unwrap_or("(unset)")
                );
                println!(
                    "  Password:           {}",
                    if config.auth.password.is_some() { "(set)" } else { "(unset)" }
                );
                println!();
                println!("[Realtime]");
                println!("  Change buffer:      {}", config.realtime.change_buffer);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file
                .clone()
                .or_else(|| cli.config.clone())
                .unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
