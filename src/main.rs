//! TenderMesh CLI binary

use clap::Parser;
use tendermesh::cli::{Cli, Commands, TenderMeshApp};
use tendermesh::config::ConfigStore;
use tendermesh::demand::ProductSpace;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            period,
            sellers,
        } => {
            let config = load_config(config.as_deref())?;
            tracing::info!("Starting TenderMesh with {} seller(s)", sellers.len());
            let app = TenderMeshApp::new(config, &sellers).await?;
            app.run_event_loop(std::time::Duration::from_secs(period.max(1)))
                .await;
        }

        Commands::Once {
            config,
            demand,
            sellers,
        } => {
            let config = load_config(config.as_deref())?;
            let app = TenderMeshApp::new(config, &sellers).await?;
            let solution = app.run_once(&demand).await;
            println!("Demand: {}", demand);
            match solution {
                tendermesh::solver::Solution::Selected {
                    outcomes,
                    total_utility,
                } => {
                    println!("Winning set ({} outcome(s)):", outcomes.len());
                    for outcome in &outcomes {
                        println!("  {}", outcome);
                    }
                    println!("Total utility: {:.3}", total_utility);
                }
                tendermesh::solver::Solution::NoSolution => {
                    println!("No combination of bids satisfies the demand");
                }
            }
        }

        Commands::Bundles => {
            let space = ProductSpace::reference();
            let catalog = tendermesh::catalog::Catalog::reference(&space)?;
            for bundle in catalog.bundles() {
                println!(
                    "{}  (synergy {:.2}..{:.2})",
                    bundle,
                    bundle.synergy_min(),
                    bundle.synergy_max()
                );
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&str>) -> tendermesh::Result<ConfigStore> {
    match path {
        Some(path) => ConfigStore::from_file(path),
        None => Ok(ConfigStore::new()),
    }
}
