//! Demand vectors and the scenario generator
//!
//! A demand string like `"P1,P1,P3"` is parsed into an integer vector
//! indexed in the canonical product order; repetition signifies
//! quantity. Unknown symbols are logged and ignored.

use crate::protocol::{Message, MessageSender, Payload, Performative, PROTOCOL_DEFINE_TASK};
use crate::types::{PartyId, ProductId};
use std::time::Duration;

/// Canonical ordered product universe for a run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProductSpace {
    products: Vec<ProductId>,
}

impl ProductSpace {
    pub fn new(symbols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            products: symbols.into_iter().map(ProductId::new).collect(),
        }
    }

    /// The reference scenario's four products
    pub fn reference() -> Self {
        Self::new(["P1", "P2", "P3", "P4"])
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn products(&self) -> &[ProductId] {
        &self.products
    }

    /// Case-sensitive index lookup in canonical order
    pub fn index_of(&self, symbol: &str) -> Option<usize> {
        self.products.iter().position(|p| p.as_str() == symbol)
    }

    /// Parse a comma-separated demand string into a quantity vector.
    pub fn parse_demand(&self, raw: &str) -> Vec<u32> {
        let mut demand = vec![0u32; self.products.len()];
        for token in raw.split(',') {
            let symbol = token.trim();
            if symbol.is_empty() {
                continue;
            }
            match self.index_of(symbol) {
                Some(idx) => demand[idx] += 1,
                None => tracing::warn!("Unknown product symbol '{}' in demand, ignoring", symbol),
            }
        }
        demand
    }

    /// Render a demand vector back to its symbol list, for logging
    pub fn format_demand(&self, demand: &[u32]) -> String {
        let parts: Vec<String> = self
            .products
            .iter()
            .zip(demand)
            .map(|(p, q)| format!("{}={}", p, q))
            .collect();
        parts.join(", ")
    }
}

/// Cycles through demand scenarios on a timer, feeding the
/// orchestrator's inbox via `define-task-protocol` requests.
pub struct DemandGenerator {
    scenarios: Vec<String>,
    period: Duration,
    sender: MessageSender,
}

impl DemandGenerator {
    pub fn new(scenarios: Vec<String>, period: Duration, sender: MessageSender) -> Self {
        Self {
            scenarios,
            period,
            sender,
        }
    }

    /// The reference rotation used by the demo runner
    pub fn reference_scenarios() -> Vec<String> {
        ["P1,P3", "P1", "P3", "P2", "P1,P2"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    /// Emit one scenario per tick, cycling forever. Runs until the
    /// router shuts down.
    pub async fn run(self) {
        if self.scenarios.is_empty() {
            tracing::warn!("Demand generator started with no scenarios, exiting");
            return;
        }
        let mut interval = tokio::time::interval(self.period);
        let mut index = 0usize;
        loop {
            interval.tick().await;
            let demand = self.scenarios[index % self.scenarios.len()].clone();
            index += 1;
            tracing::info!("Demand generator: sending demand '{}'", demand);
            let msg = Message::new(
                Performative::Request,
                PartyId::new("demand-generator"),
                PartyId::orchestrator(),
                Payload::Text(demand),
            )
            .with_protocol(PROTOCOL_DEFINE_TASK);
            if self.sender.send(msg).await.is_err() {
                tracing::info!("Demand generator: router closed, stopping");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_demand_counts_repetition() {
        let space = ProductSpace::reference();
        assert_eq!(space.parse_demand("P1,P1,P3"), vec![2, 0, 1, 0]);
    }

    #[test]
    fn test_parse_demand_ignores_unknown_symbols() {
        let space = ProductSpace::reference();
        assert_eq!(space.parse_demand("P1, P9 ,P4"), vec![1, 0, 0, 1]);
    }

    #[test]
    fn test_parse_demand_is_case_sensitive() {
        let space = ProductSpace::reference();
        assert_eq!(space.parse_demand("p1,P2"), vec![0, 1, 0, 0]);
    }

    #[test]
    fn test_empty_demand() {
        let space = ProductSpace::reference();
        assert_eq!(space.parse_demand(""), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_index_of() {
        let space = ProductSpace::reference();
        assert_eq!(space.index_of("P3"), Some(2));
        assert_eq!(space.index_of("P5"), None);
    }
}
