//! Per-party negotiation preferences loaded from configuration

use crate::config::{
    ConfigStore, DEFAULT_ACCEPTANCE_THRESHOLD, DEFAULT_DISCOUNT_RATE, DEFAULT_GAMMA,
    DEFAULT_ISSUE_WEIGHT, DEFAULT_MAX_ROUNDS, DEFAULT_RISK_BETA, DEFAULT_WAIT_TIMEOUT_SECS,
};
use crate::model::{IssueKind, IssueParams};
use crate::types::{Role, SellerId};
use std::collections::HashMap;
use std::time::Duration;

/// Reference global interval for the price issue
const DEFAULT_PRICE_RANGE: (f64, f64) = (10.0, 100.0);
/// Reference global interval for the delivery issue (days)
const DEFAULT_DELIVERY_RANGE: (f64, f64) = (1.0, 30.0);

/// Everything a session needs to evaluate and concede
#[derive(Clone, Debug)]
pub struct PartyPrefs {
    pub role: Role,
    pub acceptance_threshold: f64,
    pub risk_beta: f64,
    pub gamma: f64,
    pub max_rounds: u32,
    pub discount_rate: f64,
    pub wait_timeout: Duration,
    pub weights: HashMap<String, f64>,
    pub issue_params: HashMap<String, IssueParams>,
}

impl PartyPrefs {
    /// Buyer preferences from the `buyer.*` / `weights.*` / `params.*`
    /// namespaces.
    pub fn buyer(config: &ConfigStore) -> Self {
        let weights = HashMap::from([
            (
                "price".to_string(),
                config.get_f64_or("weights.price", DEFAULT_ISSUE_WEIGHT),
            ),
            (
                "quality".to_string(),
                config.get_f64_or("weights.quality", DEFAULT_ISSUE_WEIGHT),
            ),
            (
                "delivery".to_string(),
                config.get_f64_or("weights.delivery", DEFAULT_ISSUE_WEIGHT),
            ),
            (
                "service".to_string(),
                config.get_f64_or("weights.service", DEFAULT_ISSUE_WEIGHT),
            ),
        ]);

        Self {
            role: Role::Buyer,
            acceptance_threshold: config
                .get_f64_or("buyer.acceptanceThreshold", DEFAULT_ACCEPTANCE_THRESHOLD),
            risk_beta: config.get_f64_or("buyer.riskBeta", DEFAULT_RISK_BETA),
            gamma: config.get_f64_or("buyer.gamma", DEFAULT_GAMMA),
            max_rounds: config.get_u32_or("negotiation.maxRounds", DEFAULT_MAX_ROUNDS),
            discount_rate: config.get_f64_or("negotiation.discountRate", DEFAULT_DISCOUNT_RATE),
            wait_timeout: wait_timeout(config),
            weights,
            issue_params: issue_params(config, &["params."]),
        }
    }

    /// Seller preferences, with the per-seller override chain
    /// `seller.<id>.<suffix>` falling back to `seller.<suffix>`.
    pub fn seller(config: &ConfigStore, seller: &SellerId) -> Self {
        let scoped = |suffix: &str| format!("seller.{}.{}", seller, suffix);
        let shared = |suffix: &str| format!("seller.{}", suffix);
        let get = |suffix: &str, default: f64| {
            config
                .get_str(&scoped(suffix))
                .map(|_| config.get_f64_or(&scoped(suffix), default))
                .unwrap_or_else(|| config.get_f64_or(&shared(suffix), default))
        };

        let weights = ["price", "quality", "delivery", "service"]
            .into_iter()
            .map(|issue| {
                (
                    issue.to_string(),
                    get(&format!("weights.{}", issue), DEFAULT_ISSUE_WEIGHT),
                )
            })
            .collect();

        let prefixes = [format!("seller.{}.params.", seller), "seller.params.".to_string()];
        let prefix_refs: Vec<&str> = prefixes.iter().map(String::as_str).collect();

        Self {
            role: Role::Seller,
            acceptance_threshold: get("acceptanceThreshold", DEFAULT_ACCEPTANCE_THRESHOLD),
            risk_beta: get("riskBeta", DEFAULT_RISK_BETA),
            gamma: get("gamma", DEFAULT_GAMMA),
            max_rounds: config.get_u32_or("negotiation.maxRounds", DEFAULT_MAX_ROUNDS),
            discount_rate: config.get_f64_or("negotiation.discountRate", DEFAULT_DISCOUNT_RATE),
            wait_timeout: wait_timeout(config),
            weights,
            issue_params: issue_params(config, &prefix_refs),
        }
    }
}

fn wait_timeout(config: &ConfigStore) -> Duration {
    let secs = config.get_f64_or(
        "negotiation.waitTimeoutSecs",
        DEFAULT_WAIT_TIMEOUT_SECS as f64,
    );
    Duration::from_secs_f64(secs.max(0.0))
}

/// Quantitative ranges from `<prefix><issue>` keys (first prefix that
/// has the key wins); qualitative issues are fixed.
fn issue_params(config: &ConfigStore, prefixes: &[&str]) -> HashMap<String, IssueParams> {
    let mut params = HashMap::new();
    for (issue, default) in [
        ("price", DEFAULT_PRICE_RANGE),
        ("delivery", DEFAULT_DELIVERY_RANGE),
    ] {
        let range = prefixes
            .iter()
            .find_map(|prefix| config.get_range(&format!("{}{}", prefix, issue)))
            .unwrap_or_else(|| {
                tracing::debug!(
                    "No configured range for issue '{}', using default {:?}",
                    issue,
                    default
                );
                default
            });
        params.insert(
            issue.to_string(),
            IssueParams::new(range.0, range.1, IssueKind::Cost),
        );
    }
    params.insert("quality".to_string(), IssueParams::qualitative());
    params.insert("service".to_string(), IssueParams::qualitative());
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buyer_defaults() {
        let prefs = PartyPrefs::buyer(&ConfigStore::new());
        assert_eq!(prefs.role, Role::Buyer);
        assert_eq!(prefs.acceptance_threshold, 0.5);
        assert_eq!(prefs.max_rounds, 10);
        assert_eq!(prefs.wait_timeout, Duration::from_secs(15));
        assert_eq!(prefs.weights["price"], 0.25);
        assert_eq!(prefs.issue_params["price"].min(), 10.0);
        assert_eq!(prefs.issue_params["quality"].kind(), IssueKind::Qualitative);
    }

    #[test]
    fn test_buyer_configured_values() {
        let config = ConfigStore::from_entries([
            ("buyer.acceptanceThreshold", "0.7"),
            ("weights.price", "0.5"),
            ("params.price", "20,200"),
            ("negotiation.maxRounds", "4"),
            ("negotiation.waitTimeoutSecs", "0.5"),
        ]);
        let prefs = PartyPrefs::buyer(&config);
        assert_eq!(prefs.acceptance_threshold, 0.7);
        assert_eq!(prefs.weights["price"], 0.5);
        assert_eq!(prefs.issue_params["price"].max(), 200.0);
        assert_eq!(prefs.max_rounds, 4);
        assert_eq!(prefs.wait_timeout, Duration::from_millis(500));
    }

    #[test]
    fn test_seller_override_chain() {
        let config = ConfigStore::from_entries([
            ("seller.acceptanceThreshold", "0.4"),
            ("seller.s2.acceptanceThreshold", "0.6"),
            ("seller.params.price", "15,150"),
            ("seller.s2.params.price", "30,60"),
        ]);
        let s1 = PartyPrefs::seller(&config, &SellerId::new("s1"));
        assert_eq!(s1.acceptance_threshold, 0.4);
        assert_eq!(s1.issue_params["price"].max(), 150.0);

        let s2 = PartyPrefs::seller(&config, &SellerId::new("s2"));
        assert_eq!(s2.acceptance_threshold, 0.6);
        assert_eq!(s2.issue_params["price"].min(), 30.0);
    }
}
