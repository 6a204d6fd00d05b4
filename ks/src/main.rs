use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tracing::{debug, info};

use keyset::KeySet;
use keyset::cli::{Cli, Command};
use keyset::config::Config;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Priority: CLI --log-level > config file > default (WARN)
    let level = match cli_log_level.or(config_log_level).map(|s| s.to_uppercase()) {
        Some(s) => match s.as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to WARN", s);
                tracing::Level::WARN
            }
        },
        None => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .try_init()
        .map_err(|e| eyre::eyre!("Failed to install tracing subscriber: {}", e))?;

    debug!(?level, "Logging initialized");
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref()).context("Failed to setup logging")?;

    let path = cli.file.clone().unwrap_or_else(|| config.store_path().to_path_buf());
    let set = KeySet::open(&path).context(format!("Failed to open key set at {}", path.display()))?;

    info!(path = %path.display(), "keyset starting");

    match cli.command {
        Command::List { long } => {
            let entries = set.entries()?;
            if entries.is_empty() {
                println!("No keys stored");
            } else if long {
                for entry in entries {
                    let added = chrono::DateTime::from_timestamp_millis(entry.added_at)
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| entry.added_at.to_string());
                    println!("{} {}", entry.key, added.dimmed());
                }
            } else {
                for key in set.load()? {
                    println!("{}", key);
                }
            }
        }
        Command::Add { keys } => {
            let written = set.append_batch(&keys)?;
            println!(
                "{} Added {} of {} key(s) to {}",
                "✓".green(),
                written,
                keys.len(),
                path.display().to_string().cyan()
            );
        }
        Command::Contains { key } => {
            if set.contains(&key)? {
                println!("{} {}", "✓".green(), key);
            } else {
                println!("{} {}", "✗".red(), key);
                std::process::exit(1);
            }
        }
        Command::Count => {
            println!("{}", set.len()?);
        }
        Command::Clear { yes } => {
            if !yes {
                return Err(eyre::eyre!("Refusing to clear {} without --yes", path.display()));
            }
            set.clear()?;
            println!("{} Cleared {}", "✓".green(), path.display());
        }
    }

    Ok(())
}
