//! CLI command definitions

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "tendermesh")]
#[command(about = "TenderMesh - combinatorial procurement via bilateral negotiation", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the full system with the rotating demand generator
    Run {
        /// Path to the properties configuration file
        #[arg(short, long)]
        config: Option<String>,

        /// Seconds between generated demands
        #[arg(short, long, default_value = "10")]
        period: u64,

        /// Seller identifiers to negotiate with
        #[arg(short, long, value_delimiter = ',', default_value = "s1,s2,s3")]
        sellers: Vec<String>,
    },

    /// Execute a single procurement run for one demand
    Once {
        /// Path to the properties configuration file
        #[arg(short, long)]
        config: Option<String>,

        /// Demand string, e.g. "P1,P1,P3"
        #[arg(short, long)]
        demand: String,

        /// Seller identifiers to negotiate with
        #[arg(short, long, value_delimiter = ',', default_value = "s1,s2,s3")]
        sellers: Vec<String>,
    },

    /// Print the bundle catalog
    Bundles,
}
