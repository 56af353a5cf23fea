//! Wire message envelope
//!
//! Every message carries a performative, sender and receiver addresses,
//! a conversation id, reply correlation tokens, an optional protocol
//! tag for dispatch, and a typed payload.

use crate::model::{Bundle, Outcome, Proposal};
use crate::types::{ConversationId, PartyId, ReplyToken};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol identifier for demand definition messages
pub const PROTOCOL_DEFINE_TASK: &str = "define-task-protocol";
/// Protocol identifier for catalog requests
pub const PROTOCOL_GET_BUNDLES: &str = "get-bundles-protocol";
/// Protocol identifier for session outcome reports
pub const PROTOCOL_REPORT_RESULT: &str = "report-negotiation-result";
/// Protocol identifier for live reconfiguration documents
pub const PROTOCOL_SET_CONFIG: &str = "set-config-protocol";

/// Speech act of a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Performative {
    Request,
    Propose,
    Accept,
    Inform,
}

/// Typed message content
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Proposal(Proposal),
    Outcome(Outcome),
    Bundles(Vec<Bundle>),
    Text(String),
}

/// A routed message between two parties
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub performative: Performative,
    pub sender: PartyId,
    pub receiver: PartyId,
    pub conversation: Option<ConversationId>,
    pub reply_with: Option<ReplyToken>,
    pub in_reply_to: Option<ReplyToken>,
    pub protocol: Option<String>,
    pub payload: Payload,
}

impl Message {
    pub fn new(
        performative: Performative,
        sender: PartyId,
        receiver: PartyId,
        payload: Payload,
    ) -> Self {
        Self {
            performative,
            sender,
            receiver,
            conversation: None,
            reply_with: None,
            in_reply_to: None,
            protocol: None,
            payload,
        }
    }

    pub fn with_conversation(mut self, conversation: ConversationId) -> Self {
        self.conversation = Some(conversation);
        self
    }

    pub fn with_reply_with(mut self, token: ReplyToken) -> Self {
        self.reply_with = Some(token);
        self
    }

    pub fn with_in_reply_to(mut self, token: ReplyToken) -> Self {
        self.in_reply_to = Some(token);
        self
    }

    pub fn with_protocol(mut self, protocol: &str) -> Self {
        self.protocol = Some(protocol.to_string());
        self
    }

    /// True when this message carries the given protocol tag
    pub fn has_protocol(&self, protocol: &str) -> bool {
        self.protocol.as_deref() == Some(protocol)
    }

    /// Skeleton reply: swapped addresses, same conversation and
    /// protocol, in-reply-to set to this message's reply-with.
    pub fn reply(&self, performative: Performative, payload: Payload) -> Self {
        let mut msg = Message::new(
            performative,
            self.receiver.clone(),
            self.sender.clone(),
            payload,
        );
        msg.conversation = self.conversation.clone();
        msg.in_reply_to = self.reply_with.clone();
        msg.protocol = self.protocol.clone();
        msg
    }

    pub fn proposal(&self) -> Option<&Proposal> {
        match &self.payload {
            Payload::Proposal(p) => Some(p),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.payload {
            Payload::Text(t) => Some(t),
            _ => None,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} {} -> {} (conv={})",
            self.performative,
            self.sender,
            self.receiver,
            self.conversation
                .as_ref()
                .map(|c| c.0.as_str())
                .unwrap_or("-")
        )
    }
}
