use std::fs::OpenOptions;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{error, info, warn};

use stretchsense_rs::ble_client::{SensorClient, SensorClientConfig, SensorHandle};
use stretchsense_rs::error::Error;
use stretchsense_rs::export::to_csv_line;
use stretchsense_rs::registry::Registry;
use stretchsense_rs::sampler::Sampler;
use stretchsense_rs::types::SensorEvent;

/// Cadence of the CSV reporting loop.
const REPORT_INTERVAL: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> Result<()> {
    // ── Logging ───────────────────────────────────────────────────────────────
    // Set RUST_LOG=debug for verbose output, e.g.:
    //   RUST_LOG=stretchsense_rs=debug cargo run
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // ── Arguments ─────────────────────────────────────────────────────────────
    // Single optional flag: --record <path> appends every CSV line to a file.
    let mut record_path = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--record" => match args.next() {
                Some(path) => record_path = Some(path),
                None => anyhow::bail!("--record requires a file path"),
            },
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    let mut record_file = match &record_path {
        Some(path) => {
            info!("Recording CSV lines to {path}");
            Some(OpenOptions::new().create(true).append(true).open(path)?)
        }
        None => None,
    };

    // ── Scan and connect everything in range ──────────────────────────────────
    let registry = Arc::new(Registry::new());
    let client = SensorClient::new(SensorClientConfig::default());

    info!("Scanning for StretchSense circuits …");
    let devices = client.scan_all().await?;
    if devices.is_empty() {
        info!("No StretchSense circuits in range.");
        return Ok(());
    }

    let mut handles: Vec<SensorHandle> = Vec::new();
    for device in devices {
        let name = device.name.clone();
        match client.connect_to(device, &registry).await {
            Ok((mut events, handle)) => {
                info!(
                    "✅  Connected {} ({}) as {}",
                    name,
                    handle.address(),
                    handle.generation()
                );
                // Relay lifecycle events into the log; values flow through
                // the registry, not this channel.
                tokio::spawn(async move {
                    while let Some(event) = events.recv().await {
                        match event {
                            SensorEvent::Connected {
                                address,
                                generation,
                            } => info!("[EVENT] connected {address} ({generation})"),
                            SensorEvent::Disconnected { address } => {
                                info!("[EVENT] disconnected {address}")
                            }
                        }
                    }
                });
                handles.push(handle);
            }
            Err(e) => warn!("Skipping {name}: {e}"),
        }
    }
    if handles.is_empty() {
        anyhow::bail!("no circuit could be connected");
    }

    // ── CSV reporting loop ────────────────────────────────────────────────────
    let mut sampler = Sampler::new();
    let report_registry = Arc::clone(&registry);
    sampler.start(REPORT_INTERVAL, move || {
        let snapshot = report_registry.snapshot();
        if snapshot.is_empty() {
            return Ok(());
        }
        let line = to_csv_line(&snapshot);
        println!("{line}");
        if let Some(file) = record_file.as_mut() {
            writeln!(file, "{line}").map_err(|e| Error::Transport(e.to_string()))?;
        }
        Ok(())
    });

    info!("Streaming started. Press Ctrl-C or type 'q' + Enter to quit.\n");
    info!("Commands (type + Enter):");
    info!("  q         – quit");
    info!("  c         – print one CSV line");
    info!("  l         – list connected channels");
    info!("  d <addr>  – disconnect one device\n");

    // ── Stdin command loop ────────────────────────────────────────────────────
    // Lines are read on a dedicated OS thread (a StdinLock is not Send) and
    // relayed into the async loop below.
    let (line_tx, mut line_rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(l) => {
                    if line_tx.send(l.trim().to_owned()).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    while let Some(line) = line_rx.recv().await {
        if line.is_empty() {
            continue;
        }
        match line.as_str() {
            "q" => {
                info!("Quit requested.");
                break;
            }
            "c" => println!("{}", to_csv_line(&registry.snapshot())),
            "l" => {
                for channel in registry.snapshot() {
                    println!(
                        "{} {} ch{:2}  {:?} pF",
                        channel.address, channel.generation, channel.channel_index, channel.value
                    );
                }
            }
            cmd if cmd.starts_with("d ") => {
                let addr = cmd[2..].trim();
                match handles.iter().position(|h| h.address() == addr) {
                    Some(i) => {
                        let handle = handles.remove(i);
                        if let Err(e) = handle.disconnect().await {
                            error!("Disconnect error: {e}");
                        }
                    }
                    None => warn!("No connected device with address {addr}"),
                }
            }
            cmd => warn!("Unknown command: '{cmd}'"),
        }
    }

    // ── Teardown ──────────────────────────────────────────────────────────────
    sampler.stop();
    for handle in &handles {
        handle.disconnect().await.ok();
    }
    registry.disconnect_all();
    info!("Event loop finished – exiting.");
    Ok(())
}
