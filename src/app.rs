use anyhow::{Context, Result};
use std::sync::Arc;

use crate::cli::{CliCommand, parse_cli_args, usage_text, version_text};
use crate::config::MonitorSettings;
use crate::monitor::{EventBus, MonitorComponents, NetworkEvent, NetworkMonitor};
use crate::network::list_interfaces;
use crate::shutdown::Shutdown;
use crate::store::MemoryStore;

/// Run the app by parsing CLI-style args and dispatching the command.
pub async fn run<I, S>(args: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let command = parse_cli_args(args)?;
    execute_command(command).await
}

/// Execute a pre-parsed command. This is reusable for non-CLI entrypoints.
pub async fn execute_command(command: CliCommand) -> Result<()> {
    match command {
        CliCommand::Help => {
            println!("{}", usage_text());
            Ok(())
        }
        CliCommand::Version => {
            println!("{}", version_text());
            Ok(())
        }
        CliCommand::Interfaces => handle_interfaces(),
        CliCommand::Scan { interface } => handle_scan(interface).await,
        CliCommand::Monitor {
            interface,
            interval_minutes,
        } => handle_monitor(interface, interval_minutes).await,
    }
}

fn handle_interfaces() -> Result<()> {
    let interfaces = list_interfaces();
    if interfaces.is_empty() {
        println!("No valid IPv4 network interfaces found.");
    } else {
        for interface in interfaces {
            println!("{}", interface);
        }
    }
    Ok(())
}

async fn handle_scan(interface: Option<String>) -> Result<()> {
    crate::log_stderr!("{} - single scan", version_text());

    let store = Arc::new(MemoryStore::with_settings(MonitorSettings::from_env()));
    let components = MonitorComponents::system(interface, store, EventBus::new())?;
    let report = components
        .orchestrator
        .run_session(&Shutdown::new())
        .await
        .context("Scan failed")?;

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to serialize scan report")?
    );
    Ok(())
}

async fn handle_monitor(interface: Option<String>, interval_minutes: Option<u64>) -> Result<()> {
    let mut settings = MonitorSettings::from_env();
    if let Some(minutes) = interval_minutes {
        settings.scan_interval_minutes = minutes;
        settings.auto_scan = true;
    }

    let bus = EventBus::new();
    let mut events = bus.subscribe_channel();
    let store = Arc::new(MemoryStore::with_settings(settings));
    let monitor = NetworkMonitor::new(MonitorComponents::system(interface, store, bus)?);

    monitor.start().await?;
    crate::log_stderr!("Monitoring started. Press Ctrl-C to stop.");

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    crate::log_warn!("Failed to listen for Ctrl-C: {}", e);
                }
                break;
            }
            event = events.recv() => match event {
                Some(event) => print_event(&event)?,
                None => break,
            },
        }
    }

    monitor.stop().await;
    let status = monitor.status().await;
    crate::log_stderr!(
        "Stopped after {} scans ({} of {} devices online)",
        status.scan_count,
        status.devices_online,
        status.devices_total
    );
    Ok(())
}

/// Alerts and scan summaries go to stdout as JSON lines
fn print_event(event: &NetworkEvent) -> Result<()> {
    match event {
        NetworkEvent::AlertRaised { .. }
        | NetworkEvent::ScanCompleted { .. }
        | NetworkEvent::NetworkChanged { .. } => {
            println!(
                "{}",
                serde_json::to_string(event).context("Failed to serialize event")?
            );
        }
        NetworkEvent::MonitoringError { message } => crate::log_warn!("{}", message),
        _ => {}
    }
    Ok(())
}
