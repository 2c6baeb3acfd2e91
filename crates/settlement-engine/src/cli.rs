//! CLI arguments for the `settlement-engine` binary.

use {
    clap::{Parser, Subcommand},
    std::path::PathBuf,
};

/// Run the marketplace settlement engine
#[derive(Parser, Debug)]
#[command(version)]
pub struct Args {
    /// The log filter.
    #[arg(long, env, default_value = "info")]
    pub log: String,

    /// Path to the engine configuration file. This file should be in TOML
    /// format; built-in defaults apply when omitted.
    #[clap(long, env)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Settle one auction request against a market file and print the
    /// settlement record as JSON.
    Solve {
        /// JSON file with the seller assets to register.
        #[clap(long)]
        market: PathBuf,

        /// JSON file with the buyer's auction request.
        #[clap(long)]
        request: PathBuf,
    },
    /// Replay recorded settlements through the price-grid estimators and
    /// print the recommended prices.
    Calibrate {
        /// JSON file with previously produced settlement records.
        #[clap(long)]
        history: PathBuf,

        /// Number of discretized candidate prices.
        #[clap(long, default_value = "20")]
        experts: usize,

        /// Multiplicative-weights learning rate.
        #[clap(long, default_value = "0.1")]
        learning_rate: f64,

        /// Exploration strength of the confidence-bound estimator.
        #[clap(long, default_value = "2.0")]
        confidence: f64,
    },
}
