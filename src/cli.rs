// CLI module - command-line argument parsing and handlers
//
// Subcommands:
// - (none):  run the HTTP service
// - ingest:  drive the chunked job boundary over a local NDJSON dataset
// - score:   generate behavioral scores for one user
// - prompt:  print the composed system prompt for a user
// - config:  configuration management (--show, --reset, --path)

use crate::config::{Config, VERSION};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Persona - behavioral profiling pipeline and adaptive prompt service
#[derive(Parser)]
#[command(name = "persona")]
#[command(version = VERSION)]
#[command(about = "Behavioral profiling pipeline and adaptive prompt service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ingest a newline-delimited JSON dataset through the chunked job boundary
    Ingest {
        /// Path to the NDJSON dataset (one record per line)
        #[arg(long)]
        file: PathBuf,

        /// Job name recorded on the job row (defaults to the file name)
        #[arg(long)]
        job_name: Option<String>,

        /// Records per chunk (defaults to the configured chunk size)
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Generate behavioral scores for one user
    Score {
        /// User id to score
        #[arg(long)]
        user: String,
    },

    /// Print the composed system prompt for a user
    Prompt {
        /// User id to compose for
        #[arg(long)]
        user: String,
    },

    /// Manage configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Reset config file to defaults
        #[arg(long)]
        reset: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

/// Handle the config subcommand. Returns true if it was handled (exit after).
pub fn handle_config(show: bool, reset: bool, path: bool) -> bool {
    if path {
        handle_config_path();
    } else if show {
        handle_config_show();
    } else if reset {
        handle_config_reset();
    } else {
        println!("Usage: persona config [--show|--reset|--path]");
        println!();
        println!("Options:");
        println!("  --show    Display effective configuration");
        println!("  --reset   Reset config file to defaults");
        println!("  --path    Show config file path");
    }
    true
}

fn handle_config_path() {
    match Config::config_path() {
        Some(path) => println!("{}", path.display()),
        None => {
            eprintln!("Error: Could not determine config path");
            std::process::exit(1);
        }
    }
}

fn handle_config_show() {
    let config = Config::from_env();

    println!("# Effective configuration (env > file > defaults)");
    println!();
    print!("{}", config.to_toml());

    println!();
    if let Some(path) = Config::config_path() {
        if path.exists() {
            println!("# Source: {}", path.display());
        } else {
            println!("# Source: defaults (no config file)");
        }
    }
}

fn handle_config_reset() {
    let Some(path) = Config::config_path() else {
        eprintln!("Error: Could not determine config path");
        std::process::exit(1);
    };

    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            eprintln!("Error creating directory: {e}");
            std::process::exit(1);
        }
    }

    if let Err(e) = std::fs::write(&path, Config::default().to_toml()) {
        eprintln!("Error writing config: {e}");
        std::process::exit(1);
    }

    println!("Config reset to defaults: {}", path.display());
}
