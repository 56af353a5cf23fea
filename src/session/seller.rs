//! Seller-side bilateral negotiation session
//!
//! A persistent task serving one negotiation at a time: wait for a
//! call-for-proposal, open with one bid per offered bundle at the
//! seller's own extreme, then alternate between evaluating buyer
//! counters and conceding until agreement or deadline. After each
//! negotiation the task returns to waiting for the next request.

use crate::config::ConfigStore;
use crate::eval::{Concessor, Evaluator};
use crate::model::{Bid, Bundle, Grade, Issue, IssueKind, IssueValue, Proposal};
use crate::protocol::{Message, MessageSender, Payload, Performative};
use crate::session::{await_correlated, PartyPrefs, WaitResult};
use crate::types::{ConversationId, PartyId, ReplyToken, SellerId};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Seller FSM states for one negotiation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SellerState {
    SendInitialOffer,
    WaitForResponse,
    EvaluateCounter,
    AcceptCounter,
    MakeNewProposal,
    End,
}

/// A persistent seller task and its portfolio
pub struct SellerSession {
    seller: SellerId,
    mailbox: mpsc::Receiver<Message>,
    net: MessageSender,
    prefs: PartyPrefs,
    evaluator: Arc<Evaluator>,
    concessor: Concessor,
    config: Arc<ConfigStore>,
    portfolio: Vec<Bundle>,

    // Per-negotiation state, reset between requests
    conversation: Option<ConversationId>,
    buyer: Option<PartyId>,
    round: u32,
    last_reply_with: Option<ReplyToken>,
    received: Option<Message>,
}

impl SellerSession {
    pub fn new(
        seller: SellerId,
        mailbox: mpsc::Receiver<Message>,
        net: MessageSender,
        config: Arc<ConfigStore>,
        portfolio: Vec<Bundle>,
    ) -> Self {
        let prefs = PartyPrefs::seller(&config, &seller);
        let evaluator = Arc::new(Evaluator::new(
            crate::types::Role::Seller,
            Some(seller.clone()),
            config.clone(),
        ));
        Self {
            seller,
            mailbox,
            net,
            prefs,
            evaluator,
            concessor: Concessor::new(),
            config,
            portfolio,
            conversation: None,
            buyer: None,
            round: 0,
            last_reply_with: None,
            received: None,
        }
    }

    /// Serve negotiations until the mailbox closes.
    pub async fn run(mut self) {
        tracing::info!("Seller {} ready ({} bundle(s) on offer)", self.seller, self.portfolio.len());
        loop {
            match self.wait_for_request().await {
                Some(()) => self.negotiate().await,
                None => {
                    tracing::info!("Seller {}: mailbox closed, stopping", self.seller);
                    return;
                }
            }
            self.reset();
        }
    }

    fn reset(&mut self) {
        self.conversation = None;
        self.buyer = None;
        self.round = 0;
        self.last_reply_with = None;
        self.received = None;
    }

    /// Block until a call-for-proposal arrives. Other traffic is
    /// ignored here; there is no timeout between negotiations.
    async fn wait_for_request(&mut self) -> Option<()> {
        loop {
            let msg = self.mailbox.recv().await?;
            if msg.performative != Performative::Request {
                tracing::debug!("Seller {}: ignoring {} while idle", self.seller, msg);
                continue;
            }
            let Some(conversation) = msg.conversation.clone() else {
                tracing::debug!("Seller {}: request without conversation id, ignoring", self.seller);
                continue;
            };
            self.round = 1;
            self.conversation = Some(conversation);
            self.buyer = Some(msg.sender.clone());
            self.received = Some(msg);
            tracing::info!(
                "Seller {} [R{}]: received negotiation request from {}",
                self.seller,
                self.round,
                self.buyer.as_ref().map(|b| b.0.as_str()).unwrap_or("?")
            );
            return Some(());
        }
    }

    async fn negotiate(&mut self) {
        let mut state = SellerState::SendInitialOffer;
        while state != SellerState::End {
            state = match state {
                SellerState::SendInitialOffer => self.send_initial_offer().await,
                SellerState::WaitForResponse => self.wait_for_response().await,
                SellerState::EvaluateCounter => self.evaluate_counter(),
                SellerState::AcceptCounter => self.accept_counter().await,
                SellerState::MakeNewProposal => self.make_new_proposal().await,
                SellerState::End => SellerState::End,
            };
        }
        tracing::info!("Seller {}: negotiation finished", self.seller);
    }

    fn end(&mut self, reason: &str) -> SellerState {
        tracing::info!("Seller {} [R{}]: {}", self.seller, self.round, reason);
        SellerState::End
    }

    /// One bid per offered bundle, each at this seller's worst-for-buyer
    /// extreme: cost issues at their bundle-specific maximum, qualitative
    /// issues at the grade the seller's own fuzzy table values highest.
    /// `seller.initial.*` configuration overrides win when parseable.
    async fn send_initial_offer(&mut self) -> SellerState {
        let Some(request) = self.received.clone() else {
            return self.end("initial-offer state without a request");
        };

        let mut bids = Vec::with_capacity(self.portfolio.len());
        for bundle in &self.portfolio {
            match self.initial_bid(bundle) {
                Ok(bid) => bids.push(bid),
                Err(e) => {
                    tracing::error!(
                        "Seller {}: could not build initial bid for {}: {}",
                        self.seller,
                        bundle.id(),
                        e
                    );
                }
            }
        }
        let proposal = match Proposal::new(bids) {
            Ok(p) => p,
            Err(e) => return self.end(&format!("empty portfolio, cannot open ({})", e)),
        };

        let token = ReplyToken::generate("prop");
        let mut msg = request.reply(Performative::Propose, Payload::Proposal(proposal.clone()));
        msg.reply_with = Some(token.clone());

        tracing::info!(
            "Seller {} [R{}]: sending initial proposal with {} bid(s)",
            self.seller,
            self.round,
            proposal.len()
        );
        match self.net.send(msg).await {
            Ok(()) => {
                self.last_reply_with = Some(token);
                SellerState::WaitForResponse
            }
            Err(e) => self.end(&format!("failed to send initial proposal: {}", e)),
        }
    }

    fn initial_bid(&self, bundle: &Bundle) -> crate::error::Result<Bid> {
        let effective = self
            .evaluator
            .effective_params(bundle, &self.prefs.issue_params);
        let best_grade = self.evaluator.tfn().best_grade();

        let mut issues = Vec::with_capacity(self.prefs.issue_params.len());
        for (name, kind) in crate::model::RECOGNISED_ISSUES {
            let value = match kind {
                IssueKind::Qualitative => {
                    IssueValue::Linguistic(self.initial_grade(name).unwrap_or(best_grade))
                }
                IssueKind::Cost => IssueValue::Number(
                    self.initial_number(name)
                        .unwrap_or_else(|| effective.get(name).map(|p| p.max()).unwrap_or(0.0)),
                ),
                IssueKind::Benefit => IssueValue::Number(
                    self.initial_number(name)
                        .unwrap_or_else(|| effective.get(name).map(|p| p.min()).unwrap_or(0.0)),
                ),
            };
            issues.push(Issue::new(name, value));
        }
        Bid::for_bundle(bundle.clone(), issues)
    }

    fn initial_number(&self, issue: &str) -> Option<f64> {
        let scoped = format!("seller.{}.initial.{}", self.seller, issue);
        let shared = format!("seller.initial.{}", issue);
        self.config
            .get_str(&scoped)
            .or_else(|| self.config.get_str(&shared))
            .and_then(|raw| raw.trim().parse::<f64>().ok())
    }

    fn initial_grade(&self, issue: &str) -> Option<Grade> {
        let scoped = format!("seller.{}.initial.{}", self.seller, issue);
        let shared = format!("seller.initial.{}", issue);
        self.config
            .get_str(&scoped)
            .or_else(|| self.config.get_str(&shared))
            .and_then(Grade::parse)
    }

    async fn wait_for_response(&mut self) -> SellerState {
        let (Some(buyer), Some(conversation)) = (self.buyer.clone(), self.conversation.clone())
        else {
            return self.end("wait state without a counterparty");
        };
        // Sellers are not subject to run aborts; only the timeout applies.
        let (_guard, mut never_abort) = watch::channel(false);

        let result = await_correlated(
            &mut self.mailbox,
            &buyer,
            &conversation,
            self.last_reply_with.as_ref(),
            self.prefs.wait_timeout,
            &mut never_abort,
        )
        .await;

        match result {
            WaitResult::Message(msg) => match msg.performative {
                Performative::Accept => {
                    self.end("buyer accepted our offer")
                }
                Performative::Propose => {
                    self.received = Some(msg);
                    SellerState::EvaluateCounter
                }
                other => self.end(&format!("unexpected performative {:?}", other)),
            },
            WaitResult::Timeout => self.end("timeout waiting for buyer response"),
            WaitResult::Aborted => self.end("wait aborted"),
        }
    }

    fn evaluate_counter(&mut self) -> SellerState {
        self.round += 1;
        if self.round > self.prefs.max_rounds {
            return self.end(&format!(
                "deadline reached ({}/{})",
                self.round, self.prefs.max_rounds
            ));
        }

        let Some(proposal) = self.received.as_ref().and_then(|m| m.proposal()).cloned() else {
            return self.end("unreadable counter-proposal content");
        };
        if proposal.is_empty() {
            return self.end("received empty counter-proposal");
        }

        let mut all_acceptable = true;
        for bid in proposal.bids() {
            let utility = self.evaluator.utility(
                bid,
                &self.prefs.weights,
                &self.prefs.issue_params,
                self.prefs.risk_beta,
            );
            tracing::debug!(
                "Seller {} [R{}]: bid {} counter utility {:.4} (threshold {:.4})",
                self.seller,
                self.round,
                bid.bundle_id(),
                utility,
                self.prefs.acceptance_threshold
            );
            if utility < self.prefs.acceptance_threshold {
                all_acceptable = false;
            }
        }

        if all_acceptable {
            SellerState::AcceptCounter
        } else {
            SellerState::MakeNewProposal
        }
    }

    async fn accept_counter(&mut self) -> SellerState {
        let Some(received) = self.received.clone() else {
            return self.end("accept state without a counter in hand");
        };
        let Some(proposal) = received.proposal().cloned() else {
            return self.end("accept state without readable content");
        };
        tracing::info!(
            "Seller {} [R{}]: accepting buyer counter ({} bid(s))",
            self.seller,
            self.round,
            proposal.len()
        );
        let accept = received.reply(Performative::Accept, Payload::Proposal(proposal));
        if let Err(e) = self.net.send(accept).await {
            return self.end(&format!("failed to send acceptance: {}", e));
        }
        self.end("accepted buyer counter-offer")
    }

    async fn make_new_proposal(&mut self) -> SellerState {
        let Some(received) = self.received.clone() else {
            return self.end("counter state without a received proposal");
        };
        let Some(proposal) = received.proposal().cloned() else {
            return self.end("counter state without readable content");
        };

        let mut new_bids = Vec::with_capacity(proposal.len());
        for bid in proposal.bids() {
            let effective = self
                .evaluator
                .effective_params(bid.bundle(), &self.prefs.issue_params);
            match self.concessor.counter_bid(
                bid,
                self.round,
                self.prefs.max_rounds,
                self.prefs.gamma,
                self.prefs.discount_rate,
                &effective,
                self.prefs.role,
            ) {
                Ok(counter) => new_bids.push(counter),
                Err(e) => return self.end(&format!("counter generation failed: {}", e)),
            }
        }
        let new_proposal = match Proposal::new(new_bids) {
            Ok(p) => p,
            Err(e) => return self.end(&format!("could not build new proposal: {}", e)),
        };

        let token = ReplyToken::generate("prop");
        let mut msg = received.reply(Performative::Propose, Payload::Proposal(new_proposal));
        msg.reply_with = Some(token.clone());

        tracing::info!(
            "Seller {} [R{}]: sending new proposal",
            self.seller,
            self.round
        );
        match self.net.send(msg).await {
            Ok(()) => {
                self.last_reply_with = Some(token);
                SellerState::WaitForResponse
            }
            Err(e) => self.end(&format!("failed to send new proposal: {}", e)),
        }
    }
}
