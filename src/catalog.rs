//! Bundle catalog and seller portfolio resolution
//!
//! The catalog lists candidate bundles for a run and answers
//! `get-bundles-protocol` requests. Portfolios map each seller to the
//! subset of bundles it offers, resolved from `seller.<id>.bundles`
//! configuration against the catalog.

use crate::config::ConfigStore;
use crate::demand::ProductSpace;
use crate::error::Result;
use crate::model::Bundle;
use crate::protocol::{Message, Payload, Performative, RouterHandle, PROTOCOL_GET_BUNDLES};
use crate::types::{PartyId, SellerId};
use std::sync::Arc;

/// Immutable bundle catalog for a run
#[derive(Clone, Debug)]
pub struct Catalog {
    bundles: Vec<Bundle>,
}

impl Catalog {
    pub fn new(bundles: Vec<Bundle>) -> Self {
        Self { bundles }
    }

    /// The reference catalog: one singleton bundle per product plus
    /// every two-product combination with synergy bounds.
    pub fn reference(space: &ProductSpace) -> Result<Self> {
        let mut bundles = Vec::new();
        let products = space.products();
        for product in products {
            let id = format!("b-{}", product.as_str().to_lowercase());
            bundles.push(
                Bundle::builder(id)
                    .item(product.as_str(), reference_quantity(product.as_str()))
                    .build()?,
            );
        }
        for (i, first) in products.iter().enumerate() {
            for second in products.iter().skip(i + 1) {
                let id = format!(
                    "b-{}{}",
                    first.as_str().to_lowercase(),
                    second.as_str().to_lowercase()
                );
                bundles.push(
                    Bundle::builder(id)
                        .item(first.as_str(), reference_quantity(first.as_str()))
                        .item(second.as_str(), reference_quantity(second.as_str()))
                        .synergy_bounds(0.2, 0.8)
                        .build()?,
                );
            }
        }
        Ok(Self { bundles })
    }

    pub fn bundles(&self) -> &[Bundle] {
        &self.bundles
    }

    pub fn get(&self, id: &str) -> Option<&Bundle> {
        self.bundles.iter().find(|b| b.id() == id)
    }

    /// Bundles offered by `seller`, from the comma-separated
    /// `seller.<id>.bundles` key. Unknown bundle ids are logged and
    /// skipped; an absent key yields an empty portfolio.
    pub fn portfolio_for(&self, seller: &SellerId, config: &ConfigStore) -> Vec<Bundle> {
        let key = format!("seller.{}.bundles", seller);
        let Some(raw) = config.get_str(&key) else {
            tracing::warn!("No portfolio configured for seller {} ('{}')", seller, key);
            return Vec::new();
        };
        let mut portfolio = Vec::new();
        for token in raw.split(',') {
            let id = token.trim();
            if id.is_empty() {
                continue;
            }
            match self.get(id) {
                Some(bundle) => portfolio.push(bundle.clone()),
                None => tracing::warn!(
                    "Seller {} references unknown bundle '{}', skipping",
                    seller,
                    id
                ),
            }
        }
        portfolio
    }
}

fn reference_quantity(product: &str) -> u32 {
    // P3/P4 class products ship in larger lots in the reference data.
    match product {
        "P3" | "P4" => 2000,
        _ => 1000,
    }
}

/// Task answering catalog requests on the `catalog` address
pub struct CatalogService;

impl CatalogService {
    pub async fn spawn(catalog: Arc<Catalog>, router: RouterHandle) {
        let mut mailbox = router.register(PartyId::catalog()).await;
        let net = router.sender();
        tokio::spawn(async move {
            while let Some(msg) = mailbox.recv().await {
                if msg.performative != Performative::Request
                    || !msg.has_protocol(PROTOCOL_GET_BUNDLES)
                {
                    tracing::debug!("Catalog: ignoring {}", msg);
                    continue;
                }
                tracing::info!(
                    "Catalog: sending {} bundle(s) to {}",
                    catalog.bundles().len(),
                    msg.sender
                );
                let reply = msg.reply(
                    Performative::Inform,
                    Payload::Bundles(catalog.bundles().to_vec()),
                );
                if net.send(reply).await.is_err() {
                    return;
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MessageRouter;
    use crate::types::ReplyToken;

    #[test]
    fn test_reference_catalog_shape() {
        let space = ProductSpace::reference();
        let catalog = Catalog::reference(&space).unwrap();
        // 4 singletons + C(4,2) = 6 pairs
        assert_eq!(catalog.bundles().len(), 10);
        assert!(catalog.get("b-p1").is_some());
        assert!(catalog.get("b-p1p2").is_some());
        assert!(catalog.get("b-p2p1").is_none());

        let pair = catalog.get("b-p3p4").unwrap();
        assert_eq!(pair.coverage(&space), vec![0, 0, 2000, 2000]);
    }

    #[test]
    fn test_portfolio_resolution() {
        let space = ProductSpace::reference();
        let catalog = Catalog::reference(&space).unwrap();
        let config = ConfigStore::from_entries([("seller.s1.bundles", "b-p1, b-p1p2, b-nope")]);
        let portfolio = catalog.portfolio_for(&SellerId::new("s1"), &config);
        assert_eq!(portfolio.len(), 2);
        assert_eq!(portfolio[0].id(), "b-p1");

        let empty = catalog.portfolio_for(&SellerId::new("s9"), &config);
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_catalog_service_answers_requests() {
        let space = ProductSpace::reference();
        let catalog = Arc::new(Catalog::reference(&space).unwrap());
        let router = MessageRouter::spawn();
        CatalogService::spawn(catalog, router.clone()).await;

        let mut mailbox = router.register(PartyId::new("asker")).await;
        let request = Message::new(
            Performative::Request,
            PartyId::new("asker"),
            PartyId::catalog(),
            Payload::Text("generate-bundles".to_string()),
        )
        .with_protocol(PROTOCOL_GET_BUNDLES)
        .with_reply_with(ReplyToken::generate("req"));
        router.sender().send(request).await.unwrap();

        let reply = mailbox.recv().await.unwrap();
        assert_eq!(reply.performative, Performative::Inform);
        assert!(reply.has_protocol(PROTOCOL_GET_BUNDLES));
        match reply.payload {
            Payload::Bundles(bundles) => assert_eq!(bundles.len(), 10),
            other => panic!("expected bundles, got {:?}", other),
        }
    }
}
