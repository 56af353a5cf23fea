//! Proposals exchanged between parties and terminal outcomes

use crate::error::{Result, TenderMeshError};
use crate::model::Bid;
use crate::types::SellerId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// An immutable ordered list of bids, possibly spanning different
/// bundles. Non-empty; each bundle id appears at most once.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    bids: Vec<Bid>,
}

impl Proposal {
    pub fn new(bids: Vec<Bid>) -> Result<Self> {
        if bids.is_empty() {
            return Err(TenderMeshError::InvalidProposal(
                "a proposal must contain at least one bid".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for bid in &bids {
            if !seen.insert(bid.bundle_id().to_string()) {
                return Err(TenderMeshError::InvalidProposal(format!(
                    "bundle {} appears more than once",
                    bid.bundle_id()
                )));
            }
        }
        Ok(Self { bids })
    }

    pub fn single(bid: Bid) -> Self {
        Self { bids: vec![bid] }
    }

    pub fn bids(&self) -> &[Bid] {
        &self.bids
    }

    pub fn len(&self) -> usize {
        self.bids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty()
    }

    pub fn bundle_ids(&self) -> Vec<&str> {
        self.bids.iter().map(Bid::bundle_id).collect()
    }

    pub fn bid_for_bundle(&self, bundle_id: &str) -> Option<&Bid> {
        self.bids.iter().find(|b| b.bundle_id() == bundle_id)
    }

    pub fn total_quantity(&self) -> u32 {
        self.bids.iter().map(Bid::total_quantity).sum()
    }

    /// Quantity per bundle id within this proposal
    pub fn quantity_per_bundle(&self) -> BTreeMap<String, u32> {
        let mut map = BTreeMap::new();
        for bid in &self.bids {
            *map.entry(bid.bundle_id().to_string()).or_insert(0) += bid.total_quantity();
        }
        map
    }
}

impl fmt::Display for Proposal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Proposal[{} bid(s):", self.bids.len())?;
        for bid in &self.bids {
            write!(f, " {}", bid)?;
        }
        write!(f, "]")
    }
}

/// Terminal record of a successful bilateral session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    bid: Bid,
    utility: f64,
    seller: SellerId,
}

impl Outcome {
    pub fn new(bid: Bid, utility: f64, seller: SellerId) -> Self {
        Self {
            bid,
            utility,
            seller,
        }
    }

    pub fn bid(&self) -> &Bid {
        &self.bid
    }

    pub fn utility(&self) -> f64 {
        self.utility
    }

    pub fn seller(&self) -> &SellerId {
        &self.seller
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Outcome {{ seller={}, utility={:.4}, bundle={} }}",
            self.seller,
            self.utility,
            self.bid.bundle_id()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::bid::{standard_issues, Grade};
    use crate::model::Bundle;

    fn bid(bundle_id: &str) -> Bid {
        let bundle = Bundle::builder(bundle_id).item("P1", 10).build().unwrap();
        Bid::for_bundle(
            bundle,
            standard_issues(50.0, 5.0, Grade::Good, Grade::Medium),
        )
        .unwrap()
    }

    #[test]
    fn test_proposal_rejects_empty() {
        assert!(Proposal::new(vec![]).is_err());
    }

    #[test]
    fn test_proposal_rejects_duplicate_bundles() {
        assert!(Proposal::new(vec![bid("b-1"), bid("b-1")]).is_err());
        assert!(Proposal::new(vec![bid("b-1"), bid("b-2")]).is_ok());
    }

    #[test]
    fn test_proposal_serialization_round_trip() {
        let proposal = Proposal::new(vec![bid("b-1"), bid("b-2")]).unwrap();
        let json = serde_json::to_string(&proposal).unwrap();
        let back: Proposal = serde_json::from_str(&json).unwrap();
        assert_eq!(proposal, back);
    }

    #[test]
    fn test_quantity_per_bundle() {
        let proposal = Proposal::new(vec![bid("b-1"), bid("b-2")]).unwrap();
        let map = proposal.quantity_per_bundle();
        assert_eq!(map.get("b-1"), Some(&10));
        assert_eq!(map.get("b-2"), Some(&10));
        assert_eq!(proposal.total_quantity(), 20);
    }
}
