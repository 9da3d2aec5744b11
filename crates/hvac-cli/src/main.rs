//! Command-line interface for the HVAC MQTT bridge.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use hvac_model::{build_model, catalog, ModelHandle};
use hvac_mqtt::{MqttBridge, MqttSettings, SimPlant};
use hvac_pipeline::{PipelineConfig, TelemetryAggregator};

/// HVAC MQTT bridge - plant model inference and telemetry reduction.
#[derive(Parser, Debug)]
#[command(name = "hvac-bridge")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Load a plant catalog and print the inferred model.
    Inspect {
        /// Path to the plant description CSV.
        #[arg(short, long)]
        catalog: PathBuf,
    },
    /// Run the bridge: aggregate telemetry and log reduced samples.
    Serve {
        /// Path to the plant description CSV.
        #[arg(short, long)]
        catalog: PathBuf,
        /// MQTT broker host.
        #[arg(long, default_value = "localhost")]
        broker: String,
        /// MQTT broker port.
        #[arg(long, default_value_t = 1883)]
        port: u16,
        /// Seconds between aggregation ticks.
        #[arg(long, default_value_t = 60)]
        period: u64,
        /// Fabricate plant telemetry instead of connecting to a broker.
        #[arg(long)]
        simulate: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    match args.command {
        Command::Inspect { catalog } => inspect(&catalog),
        Command::Serve {
            catalog,
            broker,
            port,
            period,
            simulate,
        } => serve(&catalog, &broker, port, period, simulate).await,
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_model(path: &PathBuf) -> Result<(Arc<ModelHandle>, usize)> {
    let load = catalog::load_path(path)
        .with_context(|| format!("loading catalog {}", path.display()))?;
    for rejected in &load.malformed {
        warn!(%rejected, "rejected catalog row");
    }
    let malformed = load.malformed.len();
    let model = build_model(&load.records).context("inferring plant model")?;
    Ok((Arc::new(ModelHandle::new(model)), malformed))
}

fn inspect(path: &PathBuf) -> Result<()> {
    let (handle, malformed) = load_model(path)?;
    let model = handle.current();

    println!("{} components", model.len());
    for component in model.components() {
        let enable = match component.enable_item() {
            Some(item) => format!("enable via {}", item.name),
            None if component.supports_enable_disable => "no enable item".to_string(),
            None => "always on".to_string(),
        };
        println!(
            "  {:<30} floor {}  {} telemetry, {} commands, {}",
            component.path,
            component.floor,
            component.telemetry.len(),
            component.commands.len(),
            enable,
        );
        for item in component.items() {
            let conflict = if item.schema_conflict { "  [range/limit conflict]" } else { "" };
            println!(
                "      {:<40} {:>9} {:<10} {}{}",
                item.name,
                format!("{:?}", item.direction).to_lowercase(),
                item.data_type.type_name(),
                item.unit,
                conflict,
            );
        }
    }
    if malformed > 0 {
        println!("{malformed} malformed rows rejected (see log)");
    }
    Ok(())
}

async fn serve(
    path: &PathBuf,
    broker: &str,
    port: u16,
    period: u64,
    simulate: bool,
) -> Result<()> {
    if period == 0 {
        bail!("aggregation period must be at least one second");
    }

    let (handle, _) = load_model(path)?;
    info!(components = handle.current().len(), "plant model ready");

    let config = PipelineConfig::default().with_period_secs(period);
    let aggregator = Arc::new(TelemetryAggregator::new(handle.clone(), config));

    // Log every reduced sample; the framework publication layer would hang
    // off this same subscription.
    let mut samples = aggregator.subscribe();
    tokio::spawn(async move {
        while let Ok(sample) = samples.recv().await {
            info!(
                component = %sample.component,
                item = %sample.item,
                value = %sample.value,
                unit = %sample.unit,
                "reduced sample"
            );
        }
    });

    let tick_task = tokio::spawn(aggregator.clone().run());

    let sim_running = Arc::new(AtomicBool::new(true));
    let bridge = if simulate {
        info!("running against the plant simulator");
        tokio::spawn(SimPlant::new(handle).run(
            aggregator.clone(),
            Duration::from_secs(1),
            sim_running.clone(),
        ));
        None
    } else {
        let settings = MqttSettings::new(broker).with_port(port);
        let bridge = MqttBridge::connect(settings, aggregator.clone())
            .await
            .context("connecting to MQTT broker")?;
        Some(bridge)
    };

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutting down");

    sim_running.store(false, Ordering::SeqCst);
    if let Some(bridge) = bridge {
        bridge.disconnect().await;
    }
    aggregator.stop();
    tick_task.abort();

    let counters = aggregator.counters();
    info!(
        unknown_topics = counters.unknown_topics,
        bad_payloads = counters.bad_payloads,
        "final counters"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_serve_args_parse() {
        let args = Args::parse_from([
            "hvac-bridge",
            "serve",
            "--catalog",
            "plant.csv",
            "--period",
            "5",
            "--simulate",
        ]);
        match args.command {
            Command::Serve {
                period, simulate, ..
            } => {
                assert_eq!(period, 5);
                assert!(simulate);
            }
            other => panic!("expected serve, got {other:?}"),
        }
    }
}
