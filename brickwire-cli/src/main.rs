// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use anyhow::{bail, Context, Result};
use brickwire_cli::app::{print_events, session_json, session_text};
use brickwire_cli::{Config, SourceFile};
use brickwire_emulator::{EmulatedDevice, EmulatorHost};
use brickwire_hub::{ConnectOutcome, EventStream, Hub, HubEvent, RuntimeState};
use clap::{Parser, Subcommand};
use log::{debug, info};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Extra time for the stdin relay to flush before disconnecting
const STDIN_FLUSH_MILLISECONDS: u64 = 200;

#[derive(Parser, Debug)]
#[command(name = "brickwire", version, about = "Run programs on Pybricks hubs")]
struct Cli {
    /// Configuration file, searched for when not given
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print hub state changes and download progress
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Connect and show what the hub reports about itself
    Info {
        #[arg(long)]
        json: bool,
    },
    /// Download a program and show its output until it stops
    Run {
        /// Python source or precompiled .mpy file
        file: PathBuf,
        #[arg(short, long)]
        slot: Option<u8>,
    },
    /// Start the interactive prompt on the hub
    Repl,
    /// Stop the running program
    Stop,
    /// Send text to the running program
    Stdin { text: String },
}

type AppHub = Hub<EmulatorHost>;

/// Forward terminal lines to the hub until stdin closes
fn spawn_stdin_forwarder(hub: AppHub) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => hub.send_stdin(format!("{}\r", line)),
                Ok(None) => break,
                Err(e) => {
                    debug!("Terminal input closed: {}", e);
                    break;
                }
            }
        }
    })
}

/// Wait until the started program ends, Ctrl-C stops it
async fn wait_for_program(hub: &AppHub, events: &mut EventStream) -> Result<()> {
    let mut started = false;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping program");
                hub.stop_user_program().await?;
                return Ok(());
            }
            event = events.recv() => match event {
                Some(HubEvent::RuntimeStateChanged(RuntimeState::Running)) => started = true,
                Some(HubEvent::RuntimeStateChanged(RuntimeState::Idle)) if started => {
                    return Ok(());
                }
                Some(HubEvent::Disconnected) | None => bail!("Lost connection to the hub"),
                _ => {}
            }
        }
    }
}

async fn run_command(hub: &AppHub, config: &Config, command: Commands) -> Result<()> {
    match command {
        Commands::Info { json } => {
            let session = hub.session().await.context("Hub not connected")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&session_json(&session))?);
            } else {
                println!("{}", session_text(&session));
            }
        }
        Commands::Run { file, slot } => {
            let format = hub
                .preferred_file_format()
                .await
                .context("Hub not connected")?;
            let source = SourceFile::new(file, config.compiler.clone());
            let mut events = hub.events();

            hub.download_and_run(&source, format, slot.or(config.hub.default_slot))
                .await
                .with_context(|| format!("Failed to run {}", source.path().display()))?;

            let forwarder = spawn_stdin_forwarder(hub.clone());
            let result = wait_for_program(hub, &mut events).await;
            forwarder.abort();
            result?;
        }
        Commands::Repl => {
            let mut events = hub.events();
            hub.start_repl().await?;

            let forwarder = spawn_stdin_forwarder(hub.clone());
            let result = wait_for_program(hub, &mut events).await;
            forwarder.abort();
            result?;
        }
        Commands::Stop => {
            hub.stop_user_program().await?;
        }
        Commands::Stdin { text } => {
            if hub.runtime_state().await != RuntimeState::Running {
                debug!("No program running, the hub will refuse input");
            }
            hub.send_stdin(text);
            let flush = config.timing.coalesce_window()
                + Duration::from_millis(STDIN_FLUSH_MILLISECONDS);
            tokio::time::sleep(flush).await;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, path) = Config::load(cli.config.as_deref())?;
    config.logging.init();
    info!("Using configuration {}", path.display());

    // no Bluetooth stack is bundled, commands run against the emulated hub
    let device = EmulatedDevice::new(config.emulator.clone());
    let hub = Hub::new(EmulatorHost::new(device), config.hub_settings());
    let printer = tokio::spawn(print_events(hub.events(), cli.verbose));

    match hub.connect().await? {
        ConnectOutcome::Connected => {}
        ConnectOutcome::Cancelled => {
            printer.abort();
            return Ok(());
        }
    }

    let result = run_command(&hub, &config, cli.command).await;
    hub.disconnect().await;
    printer.abort();
    result
}
