//! Covermix node binary.
//!
//! # Usage
//!
//! ```bash
//! # Seed a key directory (one contact by default)
//! covermix-node keygen --dir keys
//!
//! # Run the full demo pipeline with freshly generated keys
//! covermix-node demo
//!
//! # Run against seeded key files, stop after a minute
//! covermix-node demo --keys keys --run-for-secs 60
//! ```

use std::{path::PathBuf, time::Duration};

use clap::{Parser, Subcommand};
use covermix_core::{Environment, MixConfig};
use covermix_node::{DemoConfig, KeyDir, NodeError, SystemEnv, run_demo};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Covermix dead-drop messaging node
#[derive(Parser, Debug)]
#[command(name = "covermix-node")]
#[command(about = "Metadata-resistant dead-drop messaging pipeline")]
#[command(version)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate and persist a full key set as hex files
    Keygen {
        /// Directory to write key files into
        #[arg(long, default_value = "keys")]
        dir: PathBuf,

        /// Number of contact key pairs to generate
        #[arg(long, default_value = "1")]
        contacts: u32,
    },

    /// Run relay, mixer, and both agents in one process
    Demo {
        /// Seconds between cycles for every loop
        #[arg(long, default_value = "2")]
        period_secs: u64,

        /// Messages the source sends, one per cycle
        #[arg(long, default_value = "Hello World!")]
        message: Vec<String>,

        /// Buffered envelopes required before a batch drains
        #[arg(long, default_value = "2")]
        input_threshold: usize,

        /// Exact size of every emitted batch
        #[arg(long, default_value = "4")]
        output_threshold: usize,

        /// Stop automatically after this many seconds
        #[arg(long)]
        run_for_secs: Option<u64>,

        /// Load keys from a seeded directory instead of generating fresh
        #[arg(long)]
        keys: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), NodeError> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    match args.command {
        Command::Keygen { dir, contacts } => {
            let env = SystemEnv::new();
            KeyDir::new(dir).seed(&mut env.rng(), contacts)?;
            Ok(())
        },

        Command::Demo {
            period_secs,
            message,
            input_threshold,
            output_threshold,
            run_for_secs,
            keys,
        } => {
            tracing::info!("covermix demo starting");

            let config = DemoConfig {
                period: Duration::from_secs(period_secs),
                mix: MixConfig {
                    input_threshold,
                    output_threshold,
                    fetch_count: input_threshold,
                },
                messages: message,
                run_for: run_for_secs.map(Duration::from_secs),
                key_dir: keys,
            };

            run_demo(config).await
        },
    }
}
