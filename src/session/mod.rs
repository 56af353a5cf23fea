//! Bilateral negotiation sessions
//!
//! One buyer-side and one seller-side finite state machine per
//! negotiation. Sessions own their state exclusively and talk only
//! through the message router; inbound traffic is filtered on
//! (sender, conversation id, in-reply-to) so stale or foreign messages
//! are ignored without touching session state.

pub mod buyer;
pub mod prefs;
pub mod seller;

pub use buyer::BuyerSession;
pub use prefs::PartyPrefs;
pub use seller::SellerSession;

use crate::protocol::Message;
use crate::types::{ConversationId, PartyId, ReplyToken};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// What a bilateral session reports back to the orchestrator
#[derive(Clone, Debug, PartialEq)]
pub enum SessionReport {
    Success(crate::model::Outcome),
    Failure {
        seller: crate::types::SellerId,
        reason: String,
    },
}

/// Result of waiting in a wait-state
#[derive(Debug)]
pub enum WaitResult {
    /// A message passing the correlation filter
    Message(Message),
    /// The wall-clock timeout elapsed
    Timeout,
    /// The orchestrator aborted the run
    Aborted,
}

/// Wait for the next correlated message.
///
/// Messages failing the (sender, conversation, in-reply-to) filter are
/// dropped and the wait continues against the original deadline.
/// Timeouts and aborts are first-class outcomes, not errors.
pub async fn await_correlated(
    mailbox: &mut mpsc::Receiver<Message>,
    expected_sender: &PartyId,
    conversation: &ConversationId,
    in_reply_to: Option<&ReplyToken>,
    wait: Duration,
    abort: &mut watch::Receiver<bool>,
) -> WaitResult {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        tokio::select! {
            maybe = mailbox.recv() => {
                match maybe {
                    Some(msg) => {
                        if correlates(&msg, expected_sender, conversation, in_reply_to) {
                            return WaitResult::Message(msg);
                        }
                        tracing::debug!(
                            "Dropping uncorrelated message {} (expected sender {}, conv {})",
                            msg,
                            expected_sender,
                            conversation
                        );
                    }
                    None => return WaitResult::Timeout,
                }
            }
            _ = tokio::time::sleep_until(deadline) => {
                return WaitResult::Timeout;
            }
            changed = abort.changed() => {
                if changed.is_err() || *abort.borrow() {
                    return WaitResult::Aborted;
                }
            }
        }
    }
}

fn correlates(
    msg: &Message,
    expected_sender: &PartyId,
    conversation: &ConversationId,
    in_reply_to: Option<&ReplyToken>,
) -> bool {
    if &msg.sender != expected_sender {
        return false;
    }
    if msg.conversation.as_ref() != Some(conversation) {
        return false;
    }
    match in_reply_to {
        Some(token) => msg.in_reply_to.as_ref() == Some(token),
        None => true,
    }
}
