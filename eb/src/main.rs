use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tracing::info;

use ecubridge::cli::{Cli, Command};
use ecubridge::config::{Config, SimulationConfig};
use ecubridge::domain::{ConfigSource, EcuRecord, ProgressEvent, StreamKey};
use ecubridge::engine::{OperationParams, Script, ScriptedEngine, ScriptedFactory, Transport};
use ecubridge::events::{BridgeEvent, create_event_bus};
use ecubridge::supervisor::{SubscribeRequest, Supervisor};

fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ecubridge")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Write to the log file; stdout belongs to command output
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::File::create(log_dir.join("ecubridge.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    match cli.command {
        None | Some(Command::Catalog) => print_catalog(),
        Some(Command::Config) => print_config(&config)?,
        Some(Command::Simulate {
            stream,
            stall_after,
            samples,
            period_ms,
            ecu_frame_ms,
            ecu_timeout_ms,
            per_frame,
        }) => {
            let defaults = &config.simulation;
            let simulation = SimulationConfig {
                period_ms: period_ms.unwrap_or(defaults.period_ms),
                samples: samples.unwrap_or(defaults.samples),
                stall_after: stall_after.or(defaults.stall_after),
                ecu_frame_ms: ecu_frame_ms.unwrap_or(defaults.ecu_frame_ms),
                ecu_timeout_ms: ecu_timeout_ms.unwrap_or(defaults.ecu_timeout_ms),
                per_frame: per_frame || defaults.per_frame,
            };
            simulate(&config, stream, &simulation).await?;
        }
    }

    Ok(())
}

fn print_catalog() {
    println!(
        "{:<16} {:<10} {:<16} {}",
        "STREAM".bold(),
        "GROUP".bold(),
        "OPERATION".bold(),
        "TIMING".bold()
    );
    for stream in StreamKey::ALL {
        let timing = match stream.config_source() {
            ConfigSource::EcuRecord => "ecu record",
            ConfigSource::Defaults => "defaults",
        };
        println!(
            "{:<16} {:<10} {:<16} {}",
            stream.as_str().cyan(),
            stream.group().as_str(),
            stream.operation(),
            timing.dimmed()
        );
    }
}

fn print_config(config: &Config) -> Result<()> {
    let yaml = serde_yaml::to_string(config).context("Failed to serialize configuration")?;
    print!("{}", yaml);
    Ok(())
}

fn script_for(simulation: &SimulationConfig) -> Script {
    let period = Duration::from_millis(simulation.period_ms);
    let total = simulation.samples.max(1);
    let emitted = simulation.stall_after.map_or(total, |n| n.min(total));

    let script = Script::new().periodic(period, emitted, |i| {
        let main = ((i + 1) * 99 / total) as i32;
        let sub = ((i * 10) % 100) as i32;
        ProgressEvent::new(main, sub, format!("Block {}", i + 1))
    });

    if simulation.stall_after.is_some() {
        script.stall()
    } else {
        script.then(period, ProgressEvent::new(100, 100, "Done"))
    }
}

async fn simulate(config: &Config, stream: StreamKey, simulation: &SimulationConfig) -> Result<()> {
    info!(%stream, ?simulation, "simulate: called");

    let wait_timeout = match stream.config_source() {
        ConfigSource::EcuRecord => simulation.ecu_timeout_ms.max(0) as u64,
        ConfigSource::Defaults => config.supervisor.default_wait_timeout_ms,
    };
    let limit = (simulation.samples as u64)
        .checked_add(1)
        .and_then(|frames| simulation.period_ms.checked_mul(frames))
        .and_then(|script_length| script_length.checked_add(wait_timeout))
        .and_then(|total| total.checked_add(1000))
        .map(Duration::from_millis)
        .ok_or_else(|| {
            eyre!(
                "Simulation too long: {} samples every {}ms",
                simulation.samples,
                simulation.period_ms
            )
        })?;

    let record = EcuRecord::new("SIM-ECU").with_timing(
        simulation.ecu_timeout_ms,
        simulation.ecu_frame_ms,
        simulation.per_frame,
    );
    let engine = ScriptedEngine::new(vec![record]).with_script(stream, script_for(simulation));
    let factory = ScriptedFactory::new(std::sync::Arc::new(engine));

    let bus = create_event_bus(config.supervisor.event_capacity);
    let mut events = bus.subscribe();

    let supervisor = Supervisor::new(config.supervisor.clone(), bus.clone());
    let handle = supervisor.handle();
    let lane = tokio::spawn(supervisor.run());

    let transport = Transport::UsbSerial {
        device: "simulated".to_string(),
    };
    handle
        .switch_transport(&factory, &transport)
        .await
        .context("Failed to attach simulated engine")?;

    let params = match stream {
        StreamKey::ReadBinData => OperationParams::Companion(0),
        StreamKey::Actuator => OperationParams::Routine(0),
        _ => OperationParams::None,
    };
    handle
        .subscribe(SubscribeRequest::new(stream, 0).with_params(params))
        .await
        .context(format!("Failed to subscribe to {}", stream))?;

    let start = Instant::now();
    loop {
        let remaining = limit.saturating_sub(start.elapsed());
        match tokio::time::timeout(remaining, events.recv()).await {
            Ok(Ok(event)) => {
                print_event(start, &event);
                if event.ends_operation() {
                    break;
                }
            }
            Ok(Err(RecvError::Lagged(skipped))) => {
                println!("{}", format!("... {} events skipped", skipped).dimmed());
            }
            Ok(Err(RecvError::Closed)) => break,
            Err(_) => {
                println!("{}", "No terminal event before the deadline".red());
                break;
            }
        }
    }

    let metrics = handle.metrics().await?;
    println!(
        "{} forwarded={} dropped={} timeouts={} cancellations={}",
        "metrics:".bold(),
        metrics.samples_forwarded,
        metrics.samples_dropped,
        metrics.timeouts,
        metrics.cancellations
    );

    handle.shutdown().await?;
    lane.await.context("Supervisor task failed")?;
    Ok(())
}

fn print_event(start: Instant, event: &BridgeEvent) {
    let offset = format!("{:>6}ms", start.elapsed().as_millis());
    let progress = format!(
        "{:>4} {:>4}  {}",
        event.progress.main_progress, event.progress.sub_progress, event.progress.status
    );
    let progress = if event.progress.is_failure() {
        progress.red()
    } else if event.progress.is_complete() {
        progress.green()
    } else {
        progress.normal()
    };
    println!("{} {:<16} {}", offset.dimmed(), event.name, progress);
}
