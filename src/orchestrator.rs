//! Procurement run orchestration
//!
//! Owns the end-to-end lifecycle: demand intake, advisory catalog
//! fetch, one parallel buyer session per seller, outcome collection
//! under a global timeout, winner determination, and reset for the
//! next demand. Demands arriving mid-run queue behind the current run
//! and are processed strictly in arrival order.

use crate::config::{ConfigStore, DEFAULT_GLOBAL_TIMEOUT_FACTOR};
use crate::demand::ProductSpace;
use crate::eval::Evaluator;
use crate::model::Outcome;
use crate::protocol::{
    Message, Payload, Performative, RouterHandle, PROTOCOL_DEFINE_TASK, PROTOCOL_GET_BUNDLES,
    PROTOCOL_REPORT_RESULT, PROTOCOL_SET_CONFIG,
};
use crate::session::{BuyerSession, PartyPrefs};
use crate::solver::{self, Solution};
use crate::types::{PartyId, ReplyToken, Role, SellerId};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Central coordinator for procurement runs
pub struct Orchestrator {
    space: ProductSpace,
    sellers: Vec<SellerId>,
    router: RouterHandle,
    mailbox: mpsc::Receiver<Message>,
    config: ConfigStore,
    pending_config: Option<serde_json::Value>,
    pending_demands: VecDeque<String>,
}

impl Orchestrator {
    pub async fn new(
        router: RouterHandle,
        space: ProductSpace,
        sellers: Vec<SellerId>,
        config: ConfigStore,
    ) -> Self {
        let mailbox = router.register(PartyId::orchestrator()).await;
        Self {
            space,
            sellers,
            router,
            mailbox,
            config,
            pending_config: None,
            pending_demands: VecDeque::new(),
        }
    }

    /// Command loop: serve demands and configuration updates until the
    /// router shuts down.
    pub async fn run(mut self) {
        tracing::info!(
            "Orchestrator ready ({} seller(s), products: {:?})",
            self.sellers.len(),
            self.space.products().len()
        );
        loop {
            // Queued demands first, strictly in arrival order.
            if let Some(demand) = self.pending_demands.pop_front() {
                self.execute_run(&demand).await;
                continue;
            }
            match self.mailbox.recv().await {
                Some(msg) => self.handle_command(msg),
                None => {
                    tracing::info!("Orchestrator: mailbox closed, stopping");
                    return;
                }
            }
        }
    }

    fn handle_command(&mut self, msg: Message) {
        if msg.has_protocol(PROTOCOL_DEFINE_TASK) {
            match msg.text() {
                Some(demand) => {
                    tracing::info!("Orchestrator: received demand '{}'", demand);
                    self.pending_demands.push_back(demand.to_string());
                }
                None => tracing::warn!("Orchestrator: demand message without text content"),
            }
        } else if msg.has_protocol(PROTOCOL_SET_CONFIG) {
            match msg.text().map(serde_json::from_str::<serde_json::Value>) {
                Some(Ok(doc)) => {
                    tracing::info!("Orchestrator: configuration update staged for next run");
                    self.pending_config = Some(doc);
                }
                _ => tracing::warn!("Orchestrator: unreadable configuration document, ignoring"),
            }
        } else {
            tracing::debug!("Orchestrator: ignoring {}", msg);
        }
    }

    /// Execute one full procurement run for a demand string.
    pub async fn execute_run(&mut self, demand_raw: &str) -> Solution {
        // Staged reconfiguration applies at the start of the run.
        if let Some(doc) = self.pending_config.take() {
            self.config.apply_document(&doc);
        }

        let demand = self.space.parse_demand(demand_raw);
        tracing::info!(
            "=== Run start: demand [{}] ===",
            self.space.format_demand(&demand)
        );

        self.fetch_catalog().await;

        let config = Arc::new(self.config.clone());
        let prefs = PartyPrefs::buyer(&config);
        let global_timeout = self.global_timeout(&prefs);
        let evaluator = Arc::new(Evaluator::new(Role::Buyer, None, config.clone()));
        let (abort_tx, abort_rx) = watch::channel(false);

        let mut buyer_parties = Vec::with_capacity(self.sellers.len());
        for seller in &self.sellers {
            let party = PartyId::buyer_for(seller);
            let mailbox = self.router.register(party.clone()).await;
            let session = BuyerSession::new(
                party.clone(),
                seller.clone(),
                mailbox,
                self.router.sender(),
                prefs.clone(),
                evaluator.clone(),
                abort_rx.clone(),
            );
            tracing::info!("Orchestrator: spawning {} for seller {}", party, seller);
            tokio::spawn(session.run());
            buyer_parties.push(party);
        }

        let outcomes = self.collect_outcomes(global_timeout, &abort_tx).await;

        for party in &buyer_parties {
            self.router.unregister(party).await;
        }

        let solution = solver::solve(&outcomes, &demand, &self.space);
        match &solution {
            Solution::Selected {
                outcomes,
                total_utility,
            } => {
                tracing::info!("--- Optimal solution ({} outcome(s)) ---", outcomes.len());
                for outcome in outcomes {
                    tracing::info!("-> {}", outcome);
                }
                tracing::info!("Total maximized utility: {:.3}", total_utility);
            }
            Solution::NoSolution => {
                tracing::info!("No combination of bids could satisfy the demand");
            }
        }
        tracing::info!("=== Run complete ===");
        solution
    }

    /// Advisory catalog fetch; absence of a catalog provider is not an
    /// error.
    async fn fetch_catalog(&mut self) {
        let token = ReplyToken::generate("req-bundles");
        let request = Message::new(
            Performative::Request,
            PartyId::orchestrator(),
            PartyId::catalog(),
            Payload::Text("generate-bundles".to_string()),
        )
        .with_protocol(PROTOCOL_GET_BUNDLES)
        .with_reply_with(token);
        if self.router.sender().send(request).await.is_err() {
            return;
        }

        let deadline = tokio::time::Instant::now() + Duration::from_millis(500);
        loop {
            let timed = tokio::time::timeout_at(deadline, self.mailbox.recv()).await;
            match timed {
                Ok(Some(msg)) => {
                    if msg.has_protocol(PROTOCOL_GET_BUNDLES) {
                        if let Payload::Bundles(bundles) = &msg.payload {
                            tracing::info!(
                                "Orchestrator: catalog lists {} candidate bundle(s)",
                                bundles.len()
                            );
                        }
                        return;
                    }
                    // Not the catalog reply; commands queue as usual.
                    self.handle_command(msg);
                }
                Ok(None) => return,
                Err(_) => {
                    tracing::warn!("Orchestrator: no catalog reply, proceeding without it");
                    return;
                }
            }
        }
    }

    /// Collect session reports until every seller has reported or the
    /// global timeout elapses; stragglers are aborted and counted as
    /// failures.
    async fn collect_outcomes(
        &mut self,
        global_timeout: Duration,
        abort_tx: &watch::Sender<bool>,
    ) -> Vec<Outcome> {
        let expected = self.sellers.len();
        let mut finished = 0usize;
        let mut outcomes = Vec::new();
        let deadline = tokio::time::Instant::now() + global_timeout;

        while finished < expected {
            match tokio::time::timeout_at(deadline, self.mailbox.recv()).await {
                Ok(Some(msg)) => {
                    if msg.has_protocol(PROTOCOL_REPORT_RESULT) {
                        finished += 1;
                        match msg.payload {
                            Payload::Outcome(outcome) => {
                                tracing::info!(
                                    "Orchestrator: result {}/{}: {}",
                                    finished,
                                    expected,
                                    outcome
                                );
                                outcomes.push(outcome);
                            }
                            _ => {
                                tracing::info!(
                                    "Orchestrator: failure notice {}/{} from {}",
                                    finished,
                                    expected,
                                    msg.sender
                                );
                            }
                        }
                    } else {
                        // Demands and config updates queue behind the run.
                        self.handle_command(msg);
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        "Orchestrator: global timeout, treating {} running session(s) as failed",
                        expected - finished
                    );
                    let _ = abort_tx.send(true);
                    break;
                }
            }
        }
        tracing::info!(
            "Orchestrator: all negotiations concluded ({} success(es))",
            outcomes.len()
        );
        outcomes
    }

    fn global_timeout(&self, prefs: &PartyPrefs) -> Duration {
        let factor = self
            .config
            .get_f64_or("negotiation.globalTimeoutFactor", DEFAULT_GLOBAL_TIMEOUT_FACTOR)
            .max(1.0);
        prefs
            .wait_timeout
            .mul_f64(prefs.max_rounds.max(1) as f64 * factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, CatalogService};
    use crate::protocol::MessageRouter;
    use crate::session::SellerSession;

    /// Wire a full in-process system: router, catalog, persistent
    /// sellers with the given portfolios, and an orchestrator.
    async fn setup(
        config_entries: &[(&str, &str)],
        portfolios: &[(&str, &[&str])],
    ) -> Orchestrator {
        let mut config = ConfigStore::from_entries(
            [
                ("negotiation.maxRounds", "10"),
                ("negotiation.waitTimeoutSecs", "2"),
                ("negotiation.globalTimeoutFactor", "2"),
                ("params.price", "10,100"),
                ("params.delivery", "1,30"),
                ("seller.params.price", "10,100"),
                ("seller.params.delivery", "1,30"),
                ("buyer.acceptanceThreshold", "0.5"),
                ("seller.acceptanceThreshold", "0.4"),
            ]
            .into_iter(),
        );
        for (key, value) in config_entries {
            config.set(*key, *value);
        }

        let space = ProductSpace::reference();
        let router = MessageRouter::spawn();
        let catalog = Arc::new(Catalog::reference(&space).unwrap());
        CatalogService::spawn(catalog.clone(), router.clone()).await;

        let shared = Arc::new(config.clone());
        let mut sellers = Vec::new();
        for (seller_name, bundle_ids) in portfolios {
            let seller = SellerId::new(*seller_name);
            let portfolio: Vec<_> = bundle_ids
                .iter()
                .map(|id| catalog.get(id).expect("bundle in catalog").clone())
                .collect();
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

        Orchestrator::new(router, space, sellers, config).await
    }

    #[tokio::test]
    async fn test_singleton_demand_single_supplier() {
        let mut orchestrator = setup(&[], &[("s1", &["b-p1"])]).await;
        let solution = orchestrator.execute_run("P1").await;

        let outcomes = solution.outcomes();
        assert_eq!(outcomes.len(), 1, "expected exactly one winning outcome");
        let outcome = &outcomes[0];
        assert_eq!(outcome.seller().as_str(), "s1");
        let crate::model::IssueValue::Number(price) =
            outcome.bid().issue("price").unwrap().value()
        else {
            panic!("price must be numeric");
        };
        assert!((10.0..=100.0).contains(&price), "price {} out of range", price);
        assert!(outcome.utility() > 0.0 && outcome.utility() <= 1.0);
    }

    #[tokio::test]
    async fn test_multi_bundle_seller_combo_dominates() {
        // The seller prices the combo bundle inside a lower interval,
        // so its offers for it land deeper in the buyer's preferred
        // region than the singleton offers; the seller's threshold is
        // high enough that agreement is reached on seller proposals.
        let mut orchestrator = setup(
            &[
                ("seller.acceptanceThreshold", "0.7"),
                ("params.buyer.b-p1p2.price", "10,100"),
                ("params.seller.s1.b-p1p2.price", "10,60"),
            ],
            &[("s1", &["b-p1", "b-p2", "b-p1p2"])],
        )
        .await;
        let solution = orchestrator.execute_run("P1,P2").await;

        // One seller, so at most one outcome; the combo both covers the
        // demand alone and carries the highest buyer utility.
        let outcomes = solution.outcomes();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].bid().bundle_id(), "b-p1p2");
    }

    #[tokio::test]
    async fn test_coverage_requires_two_sellers() {
        let mut orchestrator = setup(&[], &[("s1", &["b-p1"]), ("s3", &["b-p3"])]).await;
        let solution = orchestrator.execute_run("P1,P3").await;

        let outcomes = solution.outcomes();
        assert_eq!(outcomes.len(), 2);
        let total: f64 = outcomes.iter().map(Outcome::utility).sum();
        assert!((solution.total_utility() - total).abs() < 1e-12);
        let mut sellers: Vec<&str> = outcomes.iter().map(|o| o.seller().as_str()).collect();
        sellers.sort();
        assert_eq!(sellers, vec!["s1", "s3"]);
    }

    #[tokio::test]
    async fn test_uncovered_demand_yields_no_solution() {
        let mut orchestrator = setup(&[], &[("s1", &["b-p1"])]).await;
        let solution = orchestrator.execute_run("P1,P4").await;
        assert_eq!(solution, Solution::NoSolution);
    }

    #[tokio::test]
    async fn test_deadline_exhaustion_fails_within_round_three() {
        // T=2 with unreachable thresholds on both sides: each concedes
        // once, then the deadline ends the session without agreement.
        let mut orchestrator = setup(
            &[
                ("negotiation.maxRounds", "2"),
                ("buyer.acceptanceThreshold", "0.99"),
                ("seller.acceptanceThreshold", "0.99"),
            ],
            &[("s1", &["b-p1"])],
        )
        .await;
        let solution = orchestrator.execute_run("P1").await;
        assert_eq!(solution, Solution::NoSolution);
    }

    #[tokio::test]
    async fn test_unresponsive_seller_times_out_and_run_completes() {
        // s2 is declared but never spawned: the buyer session waits,
        // times out, and the run still completes with s1's outcome.
        let mut orchestrator = setup(
            &[("negotiation.waitTimeoutSecs", "0.3")],
            &[("s1", &["b-p1"])],
        )
        .await;
        orchestrator.sellers.push(SellerId::new("s2"));

        let solution = orchestrator.execute_run("P1").await;
        let outcomes = solution.outcomes();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].seller().as_str(), "s1");
    }

    #[tokio::test]
    async fn test_empty_demand_returns_empty_selection() {
        let mut orchestrator = setup(&[], &[("s1", &["b-p1"])]).await;
        let solution = orchestrator.execute_run("").await;
        assert_eq!(
            solution,
            Solution::Selected {
                outcomes: vec![],
                total_utility: 0.0
            }
        );
    }

    #[tokio::test]
    async fn test_staged_config_applies_at_next_run() {
        let mut orchestrator = setup(&[], &[("s1", &["b-p1"])]).await;

        // A baseline run succeeds with the initial configuration.
        let baseline = orchestrator.execute_run("P1").await;
        assert_eq!(baseline.outcomes().len(), 1);

        // Stage a one-round deadline: the buyer's first evaluation
        // already exceeds it, so the next run must fail.
        let doc = serde_json::json!({
            "negotiation": { "maxRounds": 1 }
        });
        let msg = Message::new(
            Performative::Request,
            PartyId::new("httpbridge"),
            PartyId::orchestrator(),
            Payload::Text(doc.to_string()),
        )
        .with_protocol(PROTOCOL_SET_CONFIG);
        orchestrator.handle_command(msg);

        let solution = orchestrator.execute_run("P1").await;
        assert_eq!(solution, Solution::NoSolution);
    }
}
