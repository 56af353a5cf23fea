//! TenderMesh application wiring
//!
//! Builds the full in-process system: message router, catalog service,
//! one persistent seller task per supplier, and the orchestrator.
//! Sellers without a configured portfolio fall back to the reference
//! assignment so a bare `tendermesh run` demonstrates the whole flow.

use crate::catalog::{Catalog, CatalogService};
use crate::config::ConfigStore;
use crate::demand::{DemandGenerator, ProductSpace};
use crate::error::Result;
use crate::orchestrator::Orchestrator;
use crate::protocol::{MessageRouter, RouterHandle};
use crate::session::SellerSession;
use crate::solver::Solution;
use crate::types::{PartyId, SellerId};
use std::sync::Arc;
use std::time::Duration;

/// Fallback portfolios for the reference sellers, used when
/// `seller.<id>.bundles` is not configured.
const REFERENCE_PORTFOLIOS: [(&str, &str); 3] =
    [("s1", "b-p1p2"), ("s2", "b-p3p4"), ("s3", "b-p1p3")];

/// Fully wired TenderMesh system
pub struct TenderMeshApp {
    router: RouterHandle,
    config: ConfigStore,
    space: ProductSpace,
    catalog: Arc<Catalog>,
    sellers: Vec<SellerId>,
}

impl TenderMeshApp {
    /// Wire router, catalog and seller tasks for the given suppliers.
    pub async fn new(config: ConfigStore, seller_names: &[String]) -> Result<Self> {
        let space = ProductSpace::reference();
        let router = MessageRouter::spawn();
        let catalog = Arc::new(Catalog::reference(&space)?);
        CatalogService::spawn(catalog.clone(), router.clone()).await;

        let shared = Arc::new(config.clone());
        let mut sellers = Vec::with_capacity(seller_names.len());
        for name in seller_names {
            let seller = SellerId::new(name.clone());
            let mut portfolio = catalog.portfolio_for(&seller, &config);
            if portfolio.is_empty() {
                portfolio = Self::reference_portfolio(&catalog, &seller);
            }
            if portfolio.is_empty() {
                tracing::warn!("Seller {} has no bundles to offer, skipping", seller);
                continue;
            }
            let mailbox = router.register(PartyId::seller(&seller)).await;
            let session = SellerSession::new(
                seller.clone(),
                mailbox,
                router.sender(),
                shared.clone(),
                portfolio,
            );
            tokio::spawn(session.run());
            sellers.push(seller);
        }

        Ok(Self {
            router,
            config,
            space,
            catalog,
            sellers,
        })
    }

    fn reference_portfolio(catalog: &Catalog, seller: &SellerId) -> Vec<crate::model::Bundle> {
        REFERENCE_PORTFOLIOS
            .iter()
            .find(|(name, _)| *name == seller.as_str())
            .and_then(|(_, bundle_id)| catalog.get(bundle_id).cloned())
            .into_iter()
            .collect()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Execute one procurement run for a single demand string.
    pub async fn run_once(&self, demand: &str) -> Solution {
        let mut orchestrator = Orchestrator::new(
            self.router.clone(),
            self.space.clone(),
            self.sellers.clone(),
            self.config.clone(),
        )
        .await;
        orchestrator.execute_run(demand).await
    }

    /// Run the orchestrator command loop with the rotating demand
    /// generator. Runs until interrupted.
    pub async fn run_event_loop(self, demand_period: Duration) {
        let orchestrator = Orchestrator::new(
            self.router.clone(),
            self.space.clone(),
            self.sellers.clone(),
            self.config.clone(),
        )
        .await;

        let generator = DemandGenerator::new(
            DemandGenerator::reference_scenarios(),
            demand_period,
            self.router.sender(),
        );
        tokio::spawn(generator.run());

        orchestrator.run().await;
    }
}
