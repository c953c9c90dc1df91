use clap::{Parser, Subcommand};
use hc_config::{Config, build, load_yaml};
use hc_model::{NullSwitch, Switch};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod error;
mod sim;

use error::{AppError, AppResult};
use sim::SimOptions;

#[derive(Parser)]
#[command(name = "hc-cli")]
#[command(about = "Home Climate Control CLI - zone and unit configuration tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration file syntax and structure
    Validate {
        /// Path to the configuration YAML file
        config_path: PathBuf,
    },
    /// List units and their zones
    Zones {
        /// Path to the configuration YAML file
        config_path: PathBuf,
    },
    /// Run a unit against simulated rooms
    Simulate {
        /// Path to the configuration YAML file
        config_path: PathBuf,
        /// Unit to simulate, defaults to the first one
        #[arg(long)]
        unit: Option<String>,
        /// Number of sensor samples per zone
        #[arg(long, default_value_t = 120)]
        steps: usize,
        /// Simulated seconds between samples
        #[arg(long, default_value_t = 60)]
        interval_s: i64,
        /// Initial indoor temperature
        #[arg(long, default_value_t = 18.0)]
        start: f64,
        /// Outdoor temperature
        #[arg(long, default_value_t = 5.0)]
        outdoor: f64,
        /// Degrees per step at full demand
        #[arg(long, default_value_t = 0.3)]
        gain: f64,
        /// Fraction of the indoor/outdoor difference lost per step
        #[arg(long, default_value_t = 0.01)]
        loss: f64,
        /// Print JSON lines instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> AppResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { config_path } => cmd_validate(&config_path),
        Commands::Zones { config_path } => cmd_zones(&config_path),
        Commands::Simulate {
            config_path,
            unit,
            steps,
            interval_s,
            start,
            outdoor,
            gain,
            loss,
            json,
        } => {
            if interval_s <= 0 {
                return Err(AppError::InvalidArg {
                    what: "interval must be positive",
                });
            }
            let options = SimOptions {
                steps,
                interval: chrono::Duration::seconds(interval_s),
                start,
                outdoor,
                gain,
                loss,
                json,
            };
            cmd_simulate(&config_path, unit.as_deref(), &options).await
        }
    }
}

fn cmd_validate(config_path: &Path) -> AppResult<()> {
    println!("Validating configuration: {}", config_path.display());
    let config = load_yaml(config_path)?;
    // Building catches what only the model checks.
    let mut switches = |address: &str| Box::new(NullSwitch::new(address)) as Box<dyn Switch>;
    build(&config, &mut switches)?;
    println!(
        "✓ Configuration is valid ({} units, {} zones)",
        config.units.len(),
        config.zones().count()
    );
    Ok(())
}

fn cmd_zones(config_path: &Path) -> AppResult<()> {
    let config = load_yaml(config_path)?;
    print_zones(&config);
    Ok(())
}

fn print_zones(config: &Config) {
    if config.units.is_empty() {
        println!("No units found in configuration");
        return;
    }
    for unit in &config.units {
        println!(
            "{} - {} {:?} via {}",
            unit.name,
            unit.mode,
            unit.kind,
            unit.device.address()
        );
        for zone in &unit.zones {
            let mut flags = Vec::new();
            if !zone.enabled {
                flags.push("disabled".to_string());
            }
            if !zone.voting {
                flags.push(format!("non-voting, dump priority {}", zone.dump_priority));
            }
            if zone.hold {
                flags.push("hold".to_string());
            }
            if zone.economizer.is_some() {
                flags.push("economizer".to_string());
            }
            println!("  {} @ {:.1}{}", zone.name, zone.setpoint, if flags.is_empty() {
                String::new()
            } else {
                format!(" ({})", flags.join(", "))
            });
        }
    }
}

async fn cmd_simulate(config_path: &Path, unit: Option<&str>, options: &SimOptions) -> AppResult<()> {
    let config = load_yaml(config_path)?;

    let mut relays = Vec::new();
    let mut switches = |address: &str| {
        let switch = NullSwitch::new(address);
        relays.push(switch.clone());
        Box::new(switch) as Box<dyn Switch>
    };
    let mut plans = build(&config, &mut switches)?;

    let index = match unit {
        Some(name) => plans
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| AppError::UnknownUnit { name: name.to_string() })?,
        None => 0,
    };
    if index >= plans.len() {
        return Err(AppError::InvalidArg {
            what: "configuration has no units",
        });
    }
    let plan = plans.swap_remove(index);
    println!("Simulating unit: {} ({} zones)", plan.name, plan.zones.len());

    let summary = sim::simulate(plan, options).await?;

    println!("✓ Simulation completed");
    println!("  Steps: {}", options.steps);
    println!("  Commands: {}", summary.commands);
    println!("  Running steps: {}", summary.running_steps);
    for (zone, state) in &summary.final_states {
        println!("  {zone}: {state:?}");
    }
    for relay in &relays {
        if let Ok(Some(on)) = relay.state() {
            println!("  {}: {}", relay.address(), if on { "on" } else { "off" });
        }
    }
    Ok(())
}
