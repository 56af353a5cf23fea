//! Flat-keyed configuration store
//!
//! Numeric parameters are looked up by dotted name (`buyer.riskBeta`,
//! `params.price`, `tfn.seller.very_good`). Missing or malformed values
//! fall back to documented defaults with a warning; only an unreadable
//! config file at startup is fatal.

use crate::error::{Result, TenderMeshError};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// Default negotiation deadline in rounds (`negotiation.maxRounds`)
pub const DEFAULT_MAX_ROUNDS: u32 = 10;
/// Default reservation floor b_k (`negotiation.discountRate`)
pub const DEFAULT_DISCOUNT_RATE: f64 = 0.2;
/// Default acceptance threshold for either side
pub const DEFAULT_ACCEPTANCE_THRESHOLD: f64 = 0.5;
/// Default risk posture (neutral)
pub const DEFAULT_RISK_BETA: f64 = 1.0;
/// Default concession posture
pub const DEFAULT_GAMMA: f64 = 1.0;
/// Default per-issue weight when a weight key is absent
pub const DEFAULT_ISSUE_WEIGHT: f64 = 0.25;
/// Default wait-state timeout in seconds (`negotiation.waitTimeoutSecs`)
pub const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 15;
/// Default global-timeout safety factor (`negotiation.globalTimeoutFactor`)
pub const DEFAULT_GLOBAL_TIMEOUT_FACTOR: f64 = 2.0;

/// Flat key-value configuration store
#[derive(Clone, Debug, Default)]
pub struct ConfigStore {
    entries: HashMap<String, String>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a properties-style file (`key = value`, `#` comments).
    ///
    /// This is the one fatal failure in the system: a config path that
    /// cannot be read aborts startup.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| TenderMeshError::ConfigUnreadable(format!("{}: {}", path.display(), e)))?;
        Ok(Self::from_properties(&raw))
    }

    /// Parse properties-style text. Malformed lines are skipped with a warning.
    pub fn from_properties(raw: &str) -> Self {
        let mut store = Self::new();
        for (lineno, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match line.split_once('=') {
                Some((key, value)) => {
                    store.set(key.trim(), value.trim());
                }
                None => {
                    tracing::warn!("Config line {} has no '=', skipping: {}", lineno + 1, line);
                }
            }
        }
        store
    }

    pub fn from_entries<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut store = Self::new();
        for (k, v) in entries {
            store.set(k, v);
        }
        store
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Float lookup with documented default; warns on missing or malformed.
    pub fn get_f64_or(&self, key: &str, default: f64) -> f64 {
        match self.entries.get(key) {
            Some(raw) => match raw.trim().parse::<f64>() {
                Ok(v) => v,
                Err(_) => {
                    tracing::warn!(
                        "Config '{}' is not a number ('{}'), using default {}",
                        key,
                        raw,
                        default
                    );
                    default
                }
            },
            None => default,
        }
    }

    /// Integer lookup with documented default; warns on malformed.
    pub fn get_u32_or(&self, key: &str, default: u32) -> u32 {
        match self.entries.get(key) {
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(v) => v,
                Err(_) => {
                    tracing::warn!(
                        "Config '{}' is not an integer ('{}'), using default {}",
                        key,
                        raw,
                        default
                    );
                    default
                }
            },
            None => default,
        }
    }

    /// Parse a `"min,max"` pair. Returns None when the key is absent or malformed.
    pub fn get_range(&self, key: &str) -> Option<(f64, f64)> {
        let raw = self.entries.get(key)?;
        match parse_pair(raw) {
            Some(pair) => Some(pair),
            None => {
                tracing::warn!("Config '{}' is not a 'min,max' pair: '{}'", key, raw);
                None
            }
        }
    }

    /// Parse an `"a,b,c"` triangular fuzzy number. None when absent or malformed.
    pub fn get_tfn(&self, key: &str) -> Option<[f64; 3]> {
        let raw = self.entries.get(key)?;
        let parts: Vec<f64> = raw
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .ok()?;
        if parts.len() == 3 {
            Some([parts[0], parts[1], parts[2]])
        } else {
            tracing::warn!("Config '{}' is not an 'a,b,c' triple: '{}'", key, raw);
            None
        }
    }

    /// Flatten a nested reconfiguration document into the store.
    ///
    /// Sections become key prefixes: `{"buyer": {"gamma": 0.5}}` sets
    /// `buyer.gamma = 0.5`. Scalars are rendered back to their flat
    /// string form so the normal getters apply.
    pub fn apply_document(&mut self, doc: &serde_json::Value) {
        let mut flat = Vec::new();
        flatten_value("", doc, &mut flat);
        for (key, value) in flat {
            tracing::info!("Config update: {} = {}", key, value);
            self.set(key, value);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for ConfigStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.entries.keys().collect();
        keys.sort();
        for key in keys {
            writeln!(f, "{} = {}", key, self.entries[key])?;
        }
        Ok(())
    }
}

fn parse_pair(raw: &str) -> Option<(f64, f64)> {
    let (a, b) = raw.split_once(',')?;
    let min = a.trim().parse::<f64>().ok()?;
    let max = b.trim().parse::<f64>().ok()?;
    Some((min, max))
}

fn flatten_value(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, String)>) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, child) in map {
                let full = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_value(&full, child, out);
            }
        }
        serde_json::Value::Null => {}
        serde_json::Value::String(s) => out.push((prefix.to_string(), s.clone())),
        other => out.push((prefix.to_string(), other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_properties_parsing() {
        let cfg = ConfigStore::from_properties(
            "# reference scenario\n\
             negotiation.maxRounds = 10\n\
             params.price = 10, 100\n\
             bogus line without equals\n\
             buyer.gamma=0.8\n",
        );
        assert_eq!(cfg.get_u32_or("negotiation.maxRounds", 1), 10);
        assert_eq!(cfg.get_range("params.price"), Some((10.0, 100.0)));
        assert_eq!(cfg.get_f64_or("buyer.gamma", 1.0), 0.8);
    }

    #[test]
    fn test_defaults_on_missing_and_malformed() {
        let cfg = ConfigStore::from_entries([("buyer.riskBeta", "not-a-number")]);
        assert_eq!(cfg.get_f64_or("buyer.riskBeta", DEFAULT_RISK_BETA), 1.0);
        assert_eq!(
            cfg.get_f64_or("buyer.acceptanceThreshold", DEFAULT_ACCEPTANCE_THRESHOLD),
            0.5
        );
        assert_eq!(cfg.get_range("params.delivery"), None);
    }

    #[test]
    fn test_tfn_parsing() {
        let cfg = ConfigStore::from_entries([
            ("tfn.buyer.good", "0.5, 0.7, 0.9"),
            ("tfn.buyer.bad", "0.5, 0.7"),
        ]);
        assert_eq!(cfg.get_tfn("tfn.buyer.good"), Some([0.5, 0.7, 0.9]));
        assert_eq!(cfg.get_tfn("tfn.buyer.bad"), None);
    }

    #[test]
    fn test_apply_document_flattens_sections() {
        let mut cfg = ConfigStore::new();
        let doc = serde_json::json!({
            "negotiation": { "maxRounds": 6, "discountRate": 0.3 },
            "buyer": { "acceptanceThreshold": 0.6 },
            "weights": { "price": 0.4, "quality": 0.3 }
        });
        cfg.apply_document(&doc);
        assert_eq!(cfg.get_u32_or("negotiation.maxRounds", 0), 6);
        assert_eq!(cfg.get_f64_or("negotiation.discountRate", 0.0), 0.3);
        assert_eq!(cfg.get_f64_or("buyer.acceptanceThreshold", 0.0), 0.6);
        assert_eq!(cfg.get_f64_or("weights.price", 0.0), 0.4);
    }

    #[test]
    fn test_unreadable_file_is_fatal() {
        let result = ConfigStore::from_file("/nonexistent/tendermesh.properties");
        assert!(matches!(
            result.unwrap_err(),
            TenderMeshError::ConfigUnreadable(_)
        ));
    }
}
