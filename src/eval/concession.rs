//! Counter-bid generation under time-dependent concession tactics

use crate::error::Result;
use crate::model::{Bid, Grade, Issue, IssueKind, IssueParams, IssueValue};
use crate::types::Role;
use std::collections::HashMap;

const MIN_B_K: f64 = 0.001;
const MAX_B_K: f64 = 0.999;
const MIN_GAMMA: f64 = 0.001;

/// Generates the next counter-bid from a reference bid, round index and
/// party role. Stateless.
#[derive(Clone, Copy, Debug, Default)]
pub struct Concessor;

impl Concessor {
    pub fn new() -> Self {
        Self
    }

    /// Concession rate α(t) for round `t` of `t_max`.
    ///
    /// α grows from b_k at t=1 to 1 at t=t_max; polynomial for γ ≤ 1,
    /// exponential for γ > 1. Out-of-range inputs are clamped rather
    /// than rejected.
    pub fn rate(&self, round: u32, max_rounds: u32, gamma: f64, b_k: f64) -> f64 {
        let t = round.clamp(1, max_rounds.max(1));
        let time_ratio = if max_rounds <= 1 {
            1.0
        } else {
            (t - 1) as f64 / (max_rounds - 1) as f64
        };

        let b_k = b_k.clamp(MIN_B_K, MAX_B_K);
        let gamma = gamma.max(MIN_GAMMA);

        if gamma <= 1.0 {
            b_k + (1.0 - b_k) * time_ratio.powf(1.0 / gamma)
        } else if time_ratio == 1.0 {
            1.0
        } else {
            (b_k.ln() * (1.0 - time_ratio).powf(gamma)).exp()
        }
    }

    /// Build the counter-bid for `round`, moving every issue toward the
    /// counterparty by α(round). Bundle and quantities are copied
    /// verbatim from the reference bid; issues without parameters keep
    /// their prior value.
    #[allow(clippy::too_many_arguments)]
    pub fn counter_bid(
        &self,
        reference: &Bid,
        round: u32,
        max_rounds: u32,
        gamma: f64,
        b_k: f64,
        issue_params: &HashMap<String, IssueParams>,
        role: Role,
    ) -> Result<Bid> {
        let alpha = self.rate(round, max_rounds, gamma, b_k);
        let mut counter_issues = Vec::with_capacity(reference.issues().len());

        for issue in reference.issues() {
            let name = issue.canonical_name();
            let Some(params) = issue_params.get(&name) else {
                tracing::debug!(
                    "No parameters for issue '{}', keeping prior value {}",
                    name,
                    issue.value()
                );
                counter_issues.push(issue.clone());
                continue;
            };

            let new_value = match params.kind() {
                IssueKind::Qualitative => {
                    IssueValue::Linguistic(qualitative_target(alpha, role))
                }
                kind => IssueValue::Number(quantitative_target(alpha, params, kind, role)),
            };
            counter_issues.push(Issue::new(issue.name(), new_value));
        }

        Bid::new(
            reference.bundle().clone(),
            counter_issues,
            reference.quantities().to_vec(),
        )
    }
}

/// New quantitative value: the conceding party walks from its own best
/// extreme toward the counterparty's as α grows.
fn quantitative_target(alpha: f64, params: &IssueParams, kind: IssueKind, role: Role) -> f64 {
    let min = params.min();
    let max = params.max();
    let range = max - min;
    if range.abs() < 1e-9 {
        return min;
    }

    let value = match (role, kind) {
        (Role::Buyer, IssueKind::Benefit) => max - alpha * range,
        (Role::Buyer, _) => min + alpha * range,
        (Role::Seller, IssueKind::Benefit) => min + alpha * range,
        (Role::Seller, _) => max - alpha * range,
    };
    value.clamp(min, max)
}

/// Map α to a linguistic grade. The buyer starts at its best (target
/// 1−α); the seller starts at its own best (target α).
fn qualitative_target(alpha: f64, role: Role) -> Grade {
    let target = match role {
        Role::Buyer => 1.0 - alpha,
        Role::Seller => alpha,
    };
    if target < 0.1 {
        Grade::VeryPoor
    } else if target < 0.3 {
        Grade::Poor
    } else if target < 0.7 {
        Grade::Medium
    } else if target < 0.9 {
        Grade::Good
    } else {
        Grade::VeryGood
    }
}
