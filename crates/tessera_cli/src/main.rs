//! tessera CLI
//!
//! Command-line tools for exercising the transaction manager.
//!
//! # Commands
//!
//! - `simulate` - Drive one transaction over staged objects in real time
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// tessera command-line tools.
#[derive(Parser)]
#[command(name = "tessera")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit one transaction over N staged objects and run it to completion
    Simulate {
        /// Number of staged objects in the transaction
        #[arg(short, long, default_value = "3")]
        objects: usize,

        /// Commit timeout in milliseconds
        #[arg(short, long, default_value = "100")]
        timeout_ms: u64,

        /// Index of an object that never acknowledges (repeatable)
        #[arg(long)]
        stall: Vec<usize>,

        /// Index of an object destroyed before the transaction commits (repeatable)
        #[arg(long)]
        cancel: Vec<usize>,

        /// Delay before objects acknowledge their change, in milliseconds
        #[arg(short, long, default_value = "0")]
        ack_delay_ms: u64,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Simulate {
            objects,
            timeout_ms,
            stall,
            cancel,
            ack_delay_ms,
            format,
        } => {
            let options = commands::simulate::SimulateOptions {
                objects,
                timeout_ms,
                stall,
                cancel,
                ack_delay_ms,
            };
            commands::simulate::run(&options, &format)?;
        }
        Commands::Version => {
            println!("tessera CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("tessera core v{}", tessera_core::VERSION);
        }
    }

    Ok(())
}
