//! Buyer-side bilateral negotiation session
//!
//! Drives one buyer↔seller dialogue: send the call-for-proposal, then
//! alternate between evaluating the seller's proposals and countering
//! until every bid in a proposal is acceptable, the round budget runs
//! out, or a wait times out. Whatever happens, a report reaches the
//! orchestrator so its completion count advances.

use crate::eval::{Concessor, Evaluator};
use crate::model::{Bid, Outcome, Proposal};
use crate::protocol::{
    Message, MessageSender, Payload, Performative, PROTOCOL_REPORT_RESULT,
};
use crate::session::{await_correlated, PartyPrefs, SessionReport, WaitResult};
use crate::types::{ConversationId, PartyId, ReplyToken, SellerId};
use tokio::sync::{mpsc, watch};

/// Buyer FSM states
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BuyerState {
    SendRequest,
    WaitForProposal,
    EvaluateProposal,
    MakeCounterOffer,
    AcceptOffer,
    End,
}

/// One buyer-side session, owning its state exclusively
pub struct BuyerSession {
    party: PartyId,
    seller: SellerId,
    seller_party: PartyId,
    conversation: ConversationId,
    mailbox: mpsc::Receiver<Message>,
    net: MessageSender,
    prefs: PartyPrefs,
    evaluator: std::sync::Arc<Evaluator>,
    concessor: Concessor,
    abort: watch::Receiver<bool>,

    round: u32,
    last_reply_with: Option<ReplyToken>,
    received: Option<Message>,
    pending_counters: Vec<Bid>,
    last_sent_counters: Vec<Bid>,
    accepted: Option<(Bid, f64)>,
    failure_reason: Option<String>,
}

impl BuyerSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        party: PartyId,
        seller: SellerId,
        mailbox: mpsc::Receiver<Message>,
        net: MessageSender,
        prefs: PartyPrefs,
        evaluator: std::sync::Arc<Evaluator>,
        abort: watch::Receiver<bool>,
    ) -> Self {
        let conversation = ConversationId::for_seller(&seller);
        let seller_party = PartyId::seller(&seller);
        Self {
            party,
            seller,
            seller_party,
            conversation,
            mailbox,
            net,
            prefs,
            evaluator,
            concessor: Concessor::new(),
            abort,
            round: 0,
            last_reply_with: None,
            received: None,
            pending_counters: Vec::new(),
            last_sent_counters: Vec::new(),
            accepted: None,
            failure_reason: None,
        }
    }

    /// Drive the FSM to completion, report to the orchestrator, and
    /// return the report.
    pub async fn run(mut self) -> SessionReport {
        let mut state = BuyerState::SendRequest;
        while state != BuyerState::End {
            state = match state {
                BuyerState::SendRequest => self.send_request().await,
                BuyerState::WaitForProposal => self.wait_for_proposal().await,
                BuyerState::EvaluateProposal => self.evaluate_proposal(),
                BuyerState::MakeCounterOffer => self.make_counter_offer().await,
                BuyerState::AcceptOffer => self.accept_offer().await,
                BuyerState::End => BuyerState::End,
            };
        }
        self.report().await
    }

    fn fail(&mut self, reason: impl Into<String>) -> BuyerState {
        let reason = reason.into();
        tracing::warn!(
            "{} [R{}]: negotiation with {} failed: {}",
            self.party,
            self.round,
            self.seller,
            reason
        );
        self.failure_reason = Some(reason);
        BuyerState::End
    }

    async fn send_request(&mut self) -> BuyerState {
        self.round = 1;
        let token = ReplyToken::generate("req");
        tracing::info!(
            "{} [R{}]: sending call for proposal to {}",
            self.party,
            self.round,
            self.seller
        );
        let cfp = Message::new(
            Performative::Request,
            self.party.clone(),
            self.seller_party.clone(),
            Payload::Text("send-proposal".to_string()),
        )
        .with_conversation(self.conversation.clone())
        .with_reply_with(token.clone());

        match self.net.send(cfp).await {
            Ok(()) => {
                self.last_reply_with = Some(token);
                BuyerState::WaitForProposal
            }
            Err(e) => self.fail(format!("failed to send request: {}", e)),
        }
    }

    async fn wait_for_proposal(&mut self) -> BuyerState {
        let result = await_correlated(
            &mut self.mailbox,
            &self.seller_party,
            &self.conversation,
            self.last_reply_with.as_ref(),
            self.prefs.wait_timeout,
            &mut self.abort,
        )
        .await;

        match result {
            WaitResult::Message(msg) => match msg.performative {
                Performative::Propose => {
                    self.received = Some(msg);
                    BuyerState::EvaluateProposal
                }
                Performative::Accept => self.handle_seller_acceptance(msg),
                other => self.fail(format!("unexpected performative {:?}", other)),
            },
            WaitResult::Timeout => self.fail("timeout waiting for proposal"),
            WaitResult::Aborted => self.fail("run aborted by orchestrator"),
        }
    }

    /// The seller accepted our last counter-proposal. Tie the
    /// acceptance back to what we sent (or to the echoed content).
    fn handle_seller_acceptance(&mut self, msg: Message) -> BuyerState {
        tracing::info!("{}: seller {} accepted our counter-offer", self.party, self.seller);
        let accepted_bids: Vec<Bid> = match msg.proposal() {
            Some(p) => p.bids().to_vec(),
            None => self.last_sent_counters.clone(),
        };
        match self.pick_best(&accepted_bids) {
            Some(best) => {
                self.accepted = Some(best);
                BuyerState::End
            }
            None => self.fail("acceptance received but no bid to tie it to"),
        }
    }

    fn evaluate_proposal(&mut self) -> BuyerState {
        self.round += 1;
        if self.round > self.prefs.max_rounds {
            return self.fail(format!(
                "deadline reached ({}/{})",
                self.round, self.prefs.max_rounds
            ));
        }

        let Some(proposal) = self.received.as_ref().and_then(|m| m.proposal()).cloned() else {
            return self.fail("unreadable proposal content");
        };
        if proposal.is_empty() {
            return self.fail("received empty proposal");
        }

        let mut all_acceptable = true;
        let mut counters = Vec::with_capacity(proposal.len());
        let mut best_accepted: Option<(Bid, f64)> = None;

        for bid in proposal.bids() {
            let utility = self.utility(bid);
            let effective = self
                .evaluator
                .effective_params(bid.bundle(), &self.prefs.issue_params);
            let hypothetical = self.concessor.counter_bid(
                bid,
                self.round + 1,
                self.prefs.max_rounds,
                self.prefs.gamma,
                self.prefs.discount_rate,
                &effective,
                self.prefs.role,
            );
            let counter = match hypothetical {
                Ok(counter) => counter,
                Err(e) => return self.fail(format!("counter generation failed: {}", e)),
            };
            let next_utility = self.utility(&counter);

            tracing::info!(
                "{} [R{}]: bid {} utility {:.4} (threshold {:.4}, next own {:.4})",
                self.party,
                self.round,
                bid.bundle_id(),
                utility,
                self.prefs.acceptance_threshold,
                next_utility
            );

            // Accept only what is both good enough and no worse than
            // our own upcoming concession.
            if utility >= self.prefs.acceptance_threshold && utility >= next_utility {
                if best_accepted.as_ref().map_or(true, |(_, u)| utility > *u) {
                    best_accepted = Some((bid.clone(), utility));
                }
            } else {
                all_acceptable = false;
            }
            counters.push(counter);
        }

        if all_acceptable {
            // All-or-nothing: the whole proposal is acceptable.
            self.accepted = best_accepted;
            BuyerState::AcceptOffer
        } else {
            self.pending_counters = counters;
            BuyerState::MakeCounterOffer
        }
    }

    async fn make_counter_offer(&mut self) -> BuyerState {
        let Some(received) = self.received.clone() else {
            return self.fail("counter state entered without a received proposal");
        };
        let counters = std::mem::take(&mut self.pending_counters);
        let proposal = match Proposal::new(counters.clone()) {
            Ok(p) => p,
            Err(e) => return self.fail(format!("could not build counter-proposal: {}", e)),
        };
        self.last_sent_counters = counters;

        let token = ReplyToken::generate("prop");
        let mut msg = received.reply(Performative::Propose, Payload::Proposal(proposal));
        msg.reply_with = Some(token.clone());

        tracing::info!(
            "{} [R{}]: sending counter-proposal with {} bid(s)",
            self.party,
            self.round,
            self.last_sent_counters.len()
        );
        match self.net.send(msg).await {
            Ok(()) => {
                self.last_reply_with = Some(token);
                BuyerState::WaitForProposal
            }
            Err(e) => self.fail(format!("failed to send counter-proposal: {}", e)),
        }
    }

    async fn accept_offer(&mut self) -> BuyerState {
        let Some(received) = self.received.clone() else {
            return self.fail("accept state entered without a received proposal");
        };
        let Some(proposal) = received.proposal().cloned() else {
            return self.fail("accept state entered without readable content");
        };
        tracing::info!(
            "{}: accepting proposal from {} ({} bid(s))",
            self.party,
            self.seller,
            proposal.len()
        );
        let accept = received.reply(Performative::Accept, Payload::Proposal(proposal));
        if let Err(e) = self.net.send(accept).await {
            return self.fail(format!("failed to send acceptance: {}", e));
        }
        BuyerState::End
    }

    /// Report the terminal outcome to the orchestrator.
    async fn report(mut self) -> SessionReport {
        let report = match self.accepted.take() {
            Some((bid, utility)) => {
                SessionReport::Success(Outcome::new(bid, utility, self.seller.clone()))
            }
            None => SessionReport::Failure {
                seller: self.seller.clone(),
                reason: self
                    .failure_reason
                    .take()
                    .unwrap_or_else(|| "negotiation ended without agreement".to_string()),
            },
        };

        let payload = match &report {
            SessionReport::Success(outcome) => {
                tracing::info!("{}: reporting success: {}", self.party, outcome);
                Payload::Outcome(outcome.clone())
            }
            SessionReport::Failure { reason, .. } => {
                tracing::info!("{}: reporting failure ({})", self.party, reason);
                Payload::Text("NegotiationFailed".to_string())
            }
        };
        let inform = Message::new(
            Performative::Inform,
            self.party.clone(),
            PartyId::orchestrator(),
            payload,
        )
        .with_conversation(self.conversation.clone())
        .with_protocol(PROTOCOL_REPORT_RESULT);

        if let Err(e) = self.net.send(inform).await {
            tracing::error!("{}: could not report outcome: {}", self.party, e);
        }
        report
    }

    fn utility(&self, bid: &Bid) -> f64 {
        self.evaluator.utility(
            bid,
            &self.prefs.weights,
            &self.prefs.issue_params,
            self.prefs.risk_beta,
        )
    }

    fn pick_best(&self, bids: &[Bid]) -> Option<(Bid, f64)> {
        bids.iter()
            .map(|b| (b.clone(), self.utility(b)))
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigStore;
    use crate::model::bid::{standard_issues, Grade};
    use crate::model::Bundle;
    use crate::protocol::MessageRouter;
    use crate::types::Role;
    use std::sync::Arc;

    struct Harness {
        buyer: tokio::task::JoinHandle<SessionReport>,
        seller_rx: tokio::sync::mpsc::Receiver<Message>,
        net: MessageSender,
        _router: crate::protocol::RouterHandle,
        _abort: watch::Sender<bool>,
    }

    fn test_config() -> ConfigStore {
        ConfigStore::from_entries([
            ("negotiation.maxRounds", "10"),
            ("negotiation.waitTimeoutSecs", "1"),
            ("buyer.acceptanceThreshold", "0.5"),
            ("params.price", "10,100"),
            ("params.delivery", "1,30"),
        ])
    }

    async fn spawn_buyer(config: ConfigStore) -> Harness {
        let seller = SellerId::new("s1");
        let router = MessageRouter::spawn();
        let config = Arc::new(config);

        let seller_rx = router.register(PartyId::seller(&seller)).await;
        let party = PartyId::buyer_for(&seller);
        let mailbox = router.register(party.clone()).await;
        let prefs = PartyPrefs::buyer(&config);
        let evaluator = Arc::new(Evaluator::new(Role::Buyer, None, config));
        let (abort_tx, abort_rx) = watch::channel(false);

        let session = BuyerSession::new(
            party,
            seller,
            mailbox,
            router.sender(),
            prefs,
            evaluator,
            abort_rx,
        );
        Harness {
            buyer: tokio::spawn(session.run()),
            seller_rx,
            net: router.sender(),
            _router: router,
            _abort: abort_tx,
        }
    }

    fn seller_bid(price: f64) -> Bid {
        let bundle = Bundle::builder("b-p1").item("P1", 1000).build().unwrap();
        Bid::for_bundle(
            bundle,
            standard_issues(price, 5.0, Grade::VeryGood, Grade::VeryGood),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_buyer_accepts_excellent_first_offer() {
        let mut h = spawn_buyer(test_config()).await;

        // Receive the CFP.
        let cfp = h.seller_rx.recv().await.expect("cfp");
        assert_eq!(cfp.performative, Performative::Request);
        assert!(cfp.reply_with.is_some());

        // Respond with an offer the buyer cannot refuse.
        let proposal = Proposal::single(seller_bid(10.0));
        let mut offer = cfp.reply(Performative::Propose, Payload::Proposal(proposal));
        offer.reply_with = Some(ReplyToken::generate("prop"));
        h.net.send(offer).await.unwrap();

        // Buyer should send ACCEPT back and report success.
        let accept = h.seller_rx.recv().await.expect("accept");
        assert_eq!(accept.performative, Performative::Accept);

        let report = h.buyer.await.unwrap();
        match report {
            SessionReport::Success(outcome) => {
                assert_eq!(outcome.seller(), &SellerId::new("s1"));
                assert!(outcome.utility() >= 0.5);
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_buyer_counters_poor_offer() {
        let mut h = spawn_buyer(test_config()).await;

        let cfp = h.seller_rx.recv().await.expect("cfp");
        let poor = Bid::for_bundle(
            Bundle::builder("b-p1").item("P1", 1000).build().unwrap(),
            standard_issues(100.0, 30.0, Grade::VeryPoor, Grade::VeryPoor),
        )
        .unwrap();
        let mut offer = cfp.reply(
            Performative::Propose,
            Payload::Proposal(Proposal::single(poor)),
        );
        let offer_token = ReplyToken::generate("prop");
        offer.reply_with = Some(offer_token.clone());
        h.net.send(offer).await.unwrap();

        // Buyer counters instead of accepting.
        let counter = h.seller_rx.recv().await.expect("counter");
        assert_eq!(counter.performative, Performative::Propose);
        assert_eq!(counter.in_reply_to, Some(offer_token));
        let counter_proposal = counter.proposal().expect("counter proposal").clone();
        assert_eq!(counter_proposal.len(), 1);

        // Accept the buyer's counter; session ends successfully.
        let accept = counter.reply(Performative::Accept, Payload::Proposal(counter_proposal));
        h.net.send(accept).await.unwrap();

        let report = h.buyer.await.unwrap();
        assert!(matches!(report, SessionReport::Success(_)));
    }

    #[tokio::test]
    async fn test_buyer_times_out_without_seller() {
        let h = spawn_buyer(test_config()).await;
        let report = h.buyer.await.unwrap();
        match report {
            SessionReport::Failure { reason, .. } => {
                assert!(reason.contains("timeout"), "unexpected reason: {}", reason)
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stale_reply_token_is_ignored() {
        let mut h = spawn_buyer(test_config()).await;

        let cfp = h.seller_rx.recv().await.expect("cfp");
        // Reply with a wrong in-reply-to token: must be ignored, so the
        // buyer times out instead of evaluating.
        let mut offer = cfp.reply(
            Performative::Propose,
            Payload::Proposal(Proposal::single(seller_bid(10.0))),
        );
        offer.in_reply_to = Some(ReplyToken::generate("bogus"));
        offer.reply_with = Some(ReplyToken::generate("prop"));
        h.net.send(offer).await.unwrap();

        let report = h.buyer.await.unwrap();
        assert!(matches!(report, SessionReport::Failure { .. }));
    }
}
