//! Bid utility evaluation
//!
//! Computes `U(party, bid)` in [0, 1] as the weighted aggregate of
//! per-issue utilities. Qualitative issues go through a per-role
//! triangular-fuzzy table; quantitative issues are normalised against a
//! `[min, max]` interval and shaped by the party's risk posture.
//! Bundle-specific intervals are derived lazily from the party's global
//! interval and the bundle's synergy bounds, and memoised.

use crate::config::ConfigStore;
use crate::model::{Bid, Bundle, Grade, Issue, IssueKind, IssueParams, IssueValue};
use crate::types::{Role, SellerId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Utility floor for quantitative normalisation
const V_MIN: f64 = 0.1;
const RANGE_EPSILON: f64 = 1e-9;

/// Per-role triangular fuzzy number table for the five linguistic grades
#[derive(Clone, Debug)]
pub struct TfnTable {
    map: HashMap<Grade, [f64; 3]>,
}

impl TfnTable {
    /// Load the table for `role` from `tfn.<role>.<grade>` keys.
    /// Missing or malformed entries fall back to the reference table
    /// with a warning.
    pub fn from_config(config: &ConfigStore, role: Role) -> Self {
        let defaults = Self::reference(role);
        let mut map = HashMap::new();
        for grade in Grade::ALL {
            let key = format!("tfn.{}.{}", role, grade.key());
            match config.get_tfn(&key) {
                Some(tfn) => {
                    map.insert(grade, tfn);
                }
                None => {
                    if config.get_str(&key).is_some() {
                        tracing::warn!("Malformed TFN for '{}', using reference value", key);
                    }
                    map.insert(grade, defaults.map[&grade]);
                }
            }
        }
        Self { map }
    }

    /// Reference tables. The seller table is the buyer table mirrored:
    /// a low grade is cheap to provide and therefore worth most to the
    /// seller.
    pub fn reference(role: Role) -> Self {
        let buyer: [(Grade, [f64; 3]); 5] = [
            (Grade::VeryPoor, [0.0, 0.0, 0.25]),
            (Grade::Poor, [0.0, 0.25, 0.5]),
            (Grade::Medium, [0.25, 0.5, 0.75]),
            (Grade::Good, [0.5, 0.75, 1.0]),
            (Grade::VeryGood, [0.75, 1.0, 1.0]),
        ];
        let map = match role {
            Role::Buyer => buyer.into_iter().collect(),
            Role::Seller => buyer
                .into_iter()
                .map(|(g, [a, b, c])| (g, [1.0 - c, 1.0 - b, 1.0 - a]))
                .collect(),
        };
        Self { map }
    }

    /// Defuzzify a grade: `(a + 4b + c) / 6`
    pub fn defuzzified(&self, grade: Grade) -> f64 {
        let [a, b, c] = self.map[&grade];
        (a + 4.0 * b + c) / 6.0
    }

    /// The grade this table values highest
    pub fn best_grade(&self) -> Grade {
        let mut best = Grade::VeryPoor;
        let mut best_value = f64::NEG_INFINITY;
        for grade in Grade::ALL {
            let value = self.defuzzified(grade);
            if value > best_value {
                best_value = value;
                best = grade;
            }
        }
        best
    }
}

/// Utility evaluator for one party.
///
/// Pure apart from the read-through bundle-parameter cache; writes are
/// serialised behind the lock and entries are immutable once published.
pub struct Evaluator {
    role: Role,
    /// Seller whose config namespace scopes per-bundle overrides
    scope: Option<SellerId>,
    tfn: TfnTable,
    config: Arc<ConfigStore>,
    bundle_params: RwLock<HashMap<String, HashMap<String, IssueParams>>>,
}

impl Evaluator {
    pub fn new(role: Role, scope: Option<SellerId>, config: Arc<ConfigStore>) -> Self {
        let tfn = TfnTable::from_config(&config, role);
        Self {
            role,
            scope,
            tfn,
            config,
            bundle_params: RwLock::new(HashMap::new()),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn tfn(&self) -> &TfnTable {
        &self.tfn
    }

    /// Weighted aggregate utility of `bid`, clamped to [0, 1].
    ///
    /// Issues without parameters are skipped (contribute 0). Weights
    /// are applied as-is, without renormalisation.
    pub fn utility(
        &self,
        bid: &Bid,
        weights: &HashMap<String, f64>,
        global_params: &HashMap<String, IssueParams>,
        risk_beta: f64,
    ) -> f64 {
        let effective = self.effective_params(bid.bundle(), global_params);
        let mut total = 0.0;
        for issue in bid.issues() {
            let name = issue.canonical_name();
            let weight = weights.get(&name).copied().unwrap_or(0.0);
            if weight.abs() < 1e-9 {
                continue;
            }
            let Some(params) = effective.get(&name) else {
                tracing::debug!(
                    "No issue parameters for '{}' on bundle {}, skipping",
                    name,
                    bid.bundle_id()
                );
                continue;
            };
            total += weight * self.normalize_issue(issue, params, risk_beta);
        }
        total.clamp(0.0, 1.0)
    }

    /// Bundle-aware parameters for every issue, derived on first use
    /// and cached by bundle id.
    pub fn effective_params(
        &self,
        bundle: &Bundle,
        global_params: &HashMap<String, IssueParams>,
    ) -> HashMap<String, IssueParams> {
        if let Some(cached) = self
            .bundle_params
            .read()
            .ok()
            .and_then(|cache| cache.get(bundle.id()).cloned())
        {
            return cached;
        }

        let derived = self.derive_bundle_params(bundle, global_params);
        if let Ok(mut cache) = self.bundle_params.write() {
            // First writer wins; a concurrent derivation is identical.
            cache
                .entry(bundle.id().to_string())
                .or_insert_with(|| derived.clone());
        }
        tracing::debug!(
            "Derived issue parameters for bundle {} ({} issues)",
            bundle.id(),
            derived.len()
        );
        derived
    }

    /// Manual override of a bundle's parameters
    pub fn set_bundle_params(&self, bundle_id: &str, params: HashMap<String, IssueParams>) {
        if let Ok(mut cache) = self.bundle_params.write() {
            cache.insert(bundle_id.to_string(), params);
        }
    }

    pub fn clear_bundle_params(&self, bundle_id: &str) {
        if let Ok(mut cache) = self.bundle_params.write() {
            cache.remove(bundle_id);
        }
    }

    /// Precedence per issue: explicit config entry, then bundle
    /// metadata `params.<issue>`, then synergy rescaling of the global
    /// interval. Qualitative issues are bundle-independent.
    fn derive_bundle_params(
        &self,
        bundle: &Bundle,
        global_params: &HashMap<String, IssueParams>,
    ) -> HashMap<String, IssueParams> {
        let mut derived = HashMap::new();
        for (name, global) in global_params {
            let name = name.trim().to_lowercase();
            if global.kind() == IssueKind::Qualitative {
                derived.insert(name, *global);
                continue;
            }

            if let Some((min, max)) = self.config.get_range(&self.synergy_key(bundle.id(), &name))
            {
                derived.insert(name, IssueParams::new(min, max, global.kind()));
                continue;
            }

            if let Some(raw) = bundle.metadata().get(&format!("params.{}", name)) {
                if let Some((min, max)) = parse_pair(raw) {
                    derived.insert(name, IssueParams::new(min, max, global.kind()));
                    continue;
                }
                tracing::warn!(
                    "Bundle {} metadata params.{} is not 'min,max': '{}'",
                    bundle.id(),
                    name,
                    raw
                );
            }

            let range = global.range();
            if range.abs() < 1e-12 {
                derived.insert(name, *global);
            } else {
                let bmin = global.min() + bundle.synergy_min() * range;
                let bmax = global.min() + bundle.synergy_max() * range;
                derived.insert(name, IssueParams::new(bmin, bmax, global.kind()));
            }
        }
        derived
    }

    fn synergy_key(&self, bundle_id: &str, issue: &str) -> String {
        match &self.scope {
            Some(seller) => format!("params.seller.{}.{}.{}", seller, bundle_id, issue),
            None => format!("params.buyer.{}.{}", bundle_id, issue),
        }
    }

    fn normalize_issue(&self, issue: &Issue, params: &IssueParams, risk_beta: f64) -> f64 {
        match (params.kind(), issue.value()) {
            (IssueKind::Qualitative, IssueValue::Linguistic(grade)) => self.tfn.defuzzified(grade),
            (IssueKind::Qualitative, IssueValue::Number(_)) => 0.0,
            (_, IssueValue::Linguistic(_)) => 0.0,
            (_, IssueValue::Number(value)) => normalize_quantitative(value, params, risk_beta),
        }
    }
}

/// Normalise a quantitative value into [v_min, 1] under the party's
/// risk posture.
pub(crate) fn normalize_quantitative(value: f64, params: &IssueParams, risk_beta: f64) -> f64 {
    let min = params.min();
    let max = params.max();
    let range = max - min;

    if range.abs() < RANGE_EPSILON {
        // Degenerate interval: full marks at the best side, floor otherwise.
        let at_best = match params.kind() {
            IssueKind::Cost => value <= min,
            _ => value >= min,
        };
        return if at_best { 1.0 } else { V_MIN };
    }

    let value = value.clamp(min, max);
    let ratio = match params.kind() {
        IssueKind::Cost => (max - value) / range,
        _ => (value - min) / range,
    }
    .clamp(0.0, 1.0);

    let beta = if risk_beta <= 0.0 { 1.0 } else { risk_beta };

    if (beta - 1.0).abs() < f64::EPSILON {
        V_MIN + (1.0 - V_MIN) * ratio
    } else if beta < 1.0 {
        if ratio == 0.0 {
            V_MIN
        } else {
            V_MIN + (1.0 - V_MIN) * ratio.powf(1.0 / beta)
        }
    } else if ratio == 1.0 {
        1.0
    } else {
        (V_MIN.ln() * (1.0 - ratio).powf(beta)).exp()
    }
}

fn parse_pair(raw: &str) -> Option<(f64, f64)> {
    let (a, b) = raw.split_once(',')?;
    Some((a.trim().parse().ok()?, b.trim().parse().ok()?))
}
