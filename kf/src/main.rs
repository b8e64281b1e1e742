use clap::Parser;
use colored::*;
use eyre::{Context, Result, bail};
use tracing::{debug, info};

use keyfetch::cli::{Cli, Command};
use keyfetch::config::{Config, DemoConfig};
use keyfetch::scenario::{self, Scenario};

fn parse_level(s: &str) -> Option<tracing::Level> {
    match s.to_uppercase().as_str() {
        "TRACE" => Some(tracing::Level::TRACE),
        "DEBUG" => Some(tracing::Level::DEBUG),
        "INFO" => Some(tracing::Level::INFO),
        "WARN" | "WARNING" => Some(tracing::Level::WARN),
        "ERROR" => Some(tracing::Level::ERROR),
        _ => None,
    }
}

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => parse_level(s).unwrap_or_else(|| {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
            tracing::Level::INFO
        }),
        None => tracing::Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .try_init()
        .map_err(|e| eyre::eyre!("{}", e))?;

    debug!(?level, "Logging initialized");
    Ok(())
}

async fn cmd_demo(scenario: Option<Scenario>, demo: DemoConfig) -> Result<()> {
    let selected: Vec<Scenario> = match scenario {
        Some(s) => vec![s],
        None => Scenario::all().to_vec(),
    };

    let mut failed = Vec::new();
    for scenario in selected {
        println!("{} {}", "▶".cyan(), scenario.name().bold());
        let report = scenario::run(scenario, &demo).await;
        for line in &report.lines {
            println!("  {}", line);
        }
        if report.passed {
            println!("{} {}", "✓".green(), scenario.description());
        } else {
            println!("{} {}", "✗".red(), scenario.description());
            failed.push(scenario.name());
        }
    }

    if !failed.is_empty() {
        bail!("Scenarios failed: {}", failed.join(", "));
    }
    Ok(())
}

fn cmd_scenarios() {
    for scenario in Scenario::all() {
        println!("{:<10} {}", scenario.name().yellow(), scenario.description());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref()).context("Failed to setup logging")?;
    info!("kf starting");

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Demo {
            scenario,
            delay_ms,
            consumers,
            key,
        } => {
            let defaults = config.demo;
            let demo = DemoConfig {
                delay_ms: delay_ms.unwrap_or(defaults.delay_ms),
                consumers: consumers.unwrap_or(defaults.consumers),
                key: key.unwrap_or(defaults.key),
            };
            cmd_demo(scenario, demo).await?;
        }
        Command::Scenarios => cmd_scenarios(),
        Command::Config => print!("{}", config.to_yaml()?),
    }

    Ok(())
}
