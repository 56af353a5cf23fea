//! Core identifier types used throughout TenderMesh

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Short product symbol (e.g. "P1")
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductId(pub String);

impl ProductId {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Supplier identifier (e.g. "s1")
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SellerId(pub String);

impl SellerId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SellerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Addressable party on the message router
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartyId(pub String);

impl PartyId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The orchestrator's well-known address
    pub fn orchestrator() -> Self {
        Self("orchestrator".to_string())
    }

    /// The catalog provider's well-known address
    pub fn catalog() -> Self {
        Self("catalog".to_string())
    }

    /// Address of the seller task for a supplier
    pub fn seller(id: &SellerId) -> Self {
        Self(id.0.clone())
    }

    /// Fresh address for a buyer session negotiating with `seller`
    pub fn buyer_for(seller: &SellerId) -> Self {
        Self(format!("buyer_for_{}_{}", seller.0, now_millis()))
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Conversation identifier, fixed per bilateral session
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    /// Generate a new conversation id for a negotiation with `seller`
    pub fn for_seller(seller: &SellerId) -> Self {
        Self(format!("neg-{}-{}", seller.0, now_millis()))
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reply correlation token, fresh per outbound message
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplyToken(pub String);

impl ReplyToken {
    /// Generate a fresh token with a short random suffix
    pub fn generate(prefix: &str) -> Self {
        use rand::RngCore;
        let mut nonce = [0u8; 4];
        rand::thread_rng().fill_bytes(&mut nonce);
        Self(format!("{}-{}-{}", prefix, now_millis(), hex::encode(nonce)))
    }
}

impl fmt::Display for ReplyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Negotiating party role
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Buyer,
    Seller,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Buyer => write!(f, "buyer"),
            Role::Seller => write!(f, "seller"),
        }
    }
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_id_per_seller() {
        let seller = SellerId::new("s1");
        let id = ConversationId::for_seller(&seller);
        assert!(id.0.starts_with("neg-s1-"));
    }

    #[test]
    fn test_reply_tokens_unique() {
        let t1 = ReplyToken::generate("prop");
        let t2 = ReplyToken::generate("prop");
        assert_ne!(t1, t2);
        assert!(t1.0.starts_with("prop-"));
    }

    #[test]
    fn test_party_addresses() {
        let seller = SellerId::new("s2");
        assert_eq!(PartyId::seller(&seller).0, "s2");
        assert!(PartyId::buyer_for(&seller).0.starts_with("buyer_for_s2_"));
        assert_eq!(PartyId::orchestrator().0, "orchestrator");
    }

    #[test]
    fn test_serialization() {
        let seller = SellerId::new("s3");
        let json = serde_json::to_string(&seller).unwrap();
        let back: SellerId = serde_json::from_str(&json).unwrap();
        assert_eq!(seller, back);
    }
}
