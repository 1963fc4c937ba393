//! CanPanel console entry point.
//!
//! Wires together the connection manager, the state store, the command
//! dispatcher, and the sync loop, then serves a minimal line-oriented
//! command prompt until Ctrl-C.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ ConsoleConfig::load_or_default()  -- TOML config, serde defaults
//!  └─ Store::new(PanelState::new(cap))  -- canonical state cell
//!  └─ ConnectionManager::start()        -- socket lifecycle + reconnect loop
//!  └─ run_sync_loop()                   -- the single apply path
//!  └─ stdin command loop
//!       ├─ "disarm", "arm 2", "test", …  -> dispatch(OutboundCommand)
//!       └─ Ctrl-C                        -> disconnect + exit
//! ```
//!
//! The stdin prompt stands in for the presentation layer: it produces the
//! same [`OutboundCommand`] intents a graphical front end would, and the
//! state logger task plays the role of a subscriber re-rendering on every
//! published snapshot.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use canpanel_console::application::dispatch::{CommandDispatcher, FrameSink};
use canpanel_console::application::sync::run_sync_loop;
use canpanel_console::infrastructure::network::{ConnectionConfig, ConnectionManager};
use canpanel_console::infrastructure::storage::config::ConsoleConfig;
use canpanel_console::infrastructure::store::Store;
use canpanel_core::{ArmStatus, OutboundCommand, PanelState, RawFrame, SequenceCounter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (config, config_error) = match ConsoleConfig::load_or_default() {
        Ok(config) => (config, None),
        Err(e) => (ConsoleConfig::default(), Some(e)),
    };

    // Initialise structured logging. RUST_LOG wins over the config file.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.console.log_level.clone())),
        )
        .init();

    if let Some(e) = config_error {
        warn!("config unreadable, using defaults: {e}");
    }

    info!("CanPanel console starting");

    // ── Canonical state ───────────────────────────────────────────────────────
    let store = Arc::new(Store::new(PanelState::new(config.state.past_events_cap)));

    // ── Connection manager ────────────────────────────────────────────────────
    let connection_config = ConnectionConfig {
        panel_addr: config
            .panel
            .address
            .parse()
            .with_context(|| format!("invalid panel address {:?}", config.panel.address))?,
        connect_timeout: Duration::from_millis(config.panel.connect_timeout_ms),
        backoff_initial: Duration::from_millis(config.reconnect.initial_delay_ms),
        backoff_max: Duration::from_millis(config.reconnect.max_delay_ms),
    };
    let connection = Arc::new(ConnectionManager::new(connection_config));
    let events = Arc::clone(&connection).start();

    // ── Dispatch and sync ─────────────────────────────────────────────────────
    let seq = Arc::new(SequenceCounter::new());
    let sink: Arc<dyn FrameSink> = Arc::clone(&connection) as Arc<dyn FrameSink>;
    let dispatcher = Arc::new(CommandDispatcher::new(
        Arc::clone(&store),
        Arc::clone(&sink),
        Arc::clone(&seq),
    ));
    tokio::spawn(run_sync_loop(
        Arc::clone(&store),
        Arc::clone(&dispatcher),
        sink,
        seq,
        events,
    ));

    // ── State change logger (a trivial subscriber) ────────────────────────────
    let mut state_rx = store.subscribe();
    tokio::spawn(async move {
        while state_rx.changed().await.is_ok() {
            let snapshot = Arc::clone(&*state_rx.borrow());
            let arm = match snapshot.status {
                Some(s) if s.arm_status == ArmStatus::Armed => {
                    format!("ARMED (profile {})", s.profile_number)
                }
                Some(s) if s.arm_status == ArmStatus::Disarmed => "DISARMED".to_string(),
                Some(_) => "UNKNOWN".to_string(),
                None => "no status yet".to_string(),
            };
            info!(
                "panel: {:?} | {} | {} profiles | {} events logged",
                snapshot.connection,
                arm,
                snapshot.alarm_profiles.len(),
                snapshot.past_events.len(),
            );
            if let Some(error) = &snapshot.last_error {
                warn!("last error: {error}");
            }
        }
    });

    connection.connect();
    info!("CanPanel console ready; type `help` for commands");

    // ── Command prompt ────────────────────────────────────────────────────────
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line.context("stdin read failed")? else {
                    break; // stdin closed
                };
                handle_line(&dispatcher, line.trim()).await;
            }
        }
    }

    connection.disconnect().await;
    info!("CanPanel console stopped");
    Ok(())
}

/// Maps one prompt line to a dispatch call, mirroring the buttons of the
/// panel's front end.
async fn handle_line(dispatcher: &CommandDispatcher, line: &str) {
    if line.is_empty() {
        return;
    }
    let command = match parse_intent(line) {
        Ok(Some(command)) => command,
        Ok(None) => {
            print_help();
            return;
        }
        Err(e) => {
            warn!("{e}");
            return;
        }
    };
    if let Err(e) = dispatcher.dispatch(command).await {
        warn!("command rejected: {e}");
    }
}

/// Parses a prompt line into an [`OutboundCommand`]; `Ok(None)` means
/// "show the help text".
fn parse_intent(line: &str) -> Result<Option<OutboundCommand>, String> {
    let mut words = line.split_whitespace();
    let verb = words.next().unwrap_or_default();
    let rest: Vec<&str> = words.collect();

    let command = match (verb, rest.as_slice()) {
        ("disarm", []) => OutboundCommand::Disarm,
        ("arm", [index]) => {
            let index: usize = index
                .parse()
                .map_err(|_| format!("`arm` needs a profile number, got {index:?}"))?;
            OutboundCommand::ArmWithProfile(index)
        }
        ("clear", []) => OutboundCommand::ClearData,
        ("test", []) => OutboundCommand::TestAlarm,
        ("attention", []) => OutboundCommand::GetAttention,
        ("garage", []) => OutboundCommand::ToggleGarageDoor,
        ("send", [sender, receiver, message, frame_type]) => OutboundCommand::SendFrameOnce(
            RawFrame::parse(sender, receiver, message, frame_type).map_err(|e| e.to_string())?,
        ),
        ("repeat", [sender, receiver, message, frame_type, interval_ms]) => {
            let interval_ms: u64 = interval_ms
                .parse()
                .map_err(|_| format!("`repeat` needs an interval in ms, got {interval_ms:?}"))?;
            OutboundCommand::SendFrameRepeatedly {
                frame: RawFrame::parse(sender, receiver, message, frame_type)
                    .map_err(|e| e.to_string())?,
                interval: Duration::from_millis(interval_ms),
            }
        }
        ("stop", []) => OutboundCommand::StopSendingFrame,
        ("help", _) => return Ok(None),
        _ => return Err(format!("unrecognised command {line:?}; type `help`")),
    };
    Ok(Some(command))
}

fn print_help() {
    println!(
        "commands:\n\
         \x20 disarm                            disarm the panel\n\
         \x20 arm <profile>                     arm under the given profile index\n\
         \x20 clear                             clear the panel's stored data\n\
         \x20 test                              sound a short alarm test\n\
         \x20 attention                         ring the attention chime on phones\n\
         \x20 garage                            toggle the garage door\n\
         \x20 send <from> <to> <msg> <type>     put one raw frame on the CAN bus (hex bytes)\n\
         \x20 repeat <from> <to> <msg> <type> <ms>  re-send the frame every <ms>\n\
         \x20 stop                              stop the repeating send"
    );
}
