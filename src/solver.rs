//! Winner determination
//!
//! Selects the subset of negotiation outcomes that covers the demand
//! vector componentwise at maximum total utility, using each seller at
//! most once. Branch-and-bound over outcomes sorted by utility
//! descending, with an upper bound capped at one outcome per unused
//! seller.

use crate::demand::ProductSpace;
use crate::model::Outcome;
use crate::types::SellerId;
use std::collections::HashSet;

/// Result of winner determination
#[derive(Clone, Debug, PartialEq)]
pub enum Solution {
    /// Optimal demand-covering subset; empty with zero utility when the
    /// demand itself was all-zero.
    Selected {
        outcomes: Vec<Outcome>,
        total_utility: f64,
    },
    /// No subset of the outcomes covers the demand
    NoSolution,
}

impl Solution {
    pub fn total_utility(&self) -> f64 {
        match self {
            Solution::Selected { total_utility, .. } => *total_utility,
            Solution::NoSolution => 0.0,
        }
    }

    pub fn outcomes(&self) -> &[Outcome] {
        match self {
            Solution::Selected { outcomes, .. } => outcomes,
            Solution::NoSolution => &[],
        }
    }
}

struct Candidate {
    outcome: Outcome,
    coverage: Vec<u32>,
}

struct Search<'a> {
    candidates: &'a [Candidate],
    demand: &'a [u32],
    best_utility: f64,
    best: Option<Vec<usize>>,
}

/// Solve the winner-determination problem for `outcomes` against
/// `demand` (indexed in the canonical order of `space`).
pub fn solve(outcomes: &[Outcome], demand: &[u32], space: &ProductSpace) -> Solution {
    if demand.iter().all(|&d| d == 0) {
        return Solution::Selected {
            outcomes: Vec::new(),
            total_utility: 0.0,
        };
    }
    if outcomes.is_empty() {
        return Solution::NoSolution;
    }

    let mut candidates: Vec<Candidate> = outcomes
        .iter()
        .map(|o| Candidate {
            coverage: o.bid().bundle().coverage(space),
            outcome: o.clone(),
        })
        .collect();
    // Deterministic order: utility descending, then seller and bundle
    // id ascending so ties resolve to the earlier supplier.
    candidates.sort_by(|a, b| {
        b.outcome
            .utility()
            .partial_cmp(&a.outcome.utility())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.outcome.seller().cmp(b.outcome.seller()))
            .then_with(|| a.outcome.bid().bundle_id().cmp(b.outcome.bid().bundle_id()))
    });

    let mut search = Search {
        candidates: &candidates,
        demand,
        best_utility: 0.0,
        best: None,
    };
    let mut chosen = Vec::new();
    let mut used = HashSet::new();
    let mut covered = vec![0u32; demand.len()];
    search.branch(0, &mut chosen, 0.0, &mut used, &mut covered);

    match search.best {
        Some(indices) => {
            let selected: Vec<Outcome> = indices
                .iter()
                .map(|&i| candidates[i].outcome.clone())
                .collect();
            let total_utility = selected.iter().map(Outcome::utility).sum();
            Solution::Selected {
                outcomes: selected,
                total_utility,
            }
        }
        None => Solution::NoSolution,
    }
}

impl<'a> Search<'a> {
    fn branch(
        &mut self,
        index: usize,
        chosen: &mut Vec<usize>,
        utility: f64,
        used: &mut HashSet<SellerId>,
        covered: &mut Vec<u32>,
    ) {
        // Bound: best achievable from here caps one outcome per seller
        // not yet used. Prune when it cannot beat the incumbent.
        let bound = utility + self.suffix_bound(index, used);
        if self.best.is_some() && bound <= self.best_utility {
            return;
        }

        if index == self.candidates.len() {
            let feasible = self
                .demand
                .iter()
                .zip(covered.iter())
                .all(|(d, c)| c >= d);
            if feasible && (self.best.is_none() || utility > self.best_utility) {
                self.best_utility = utility;
                self.best = Some(chosen.clone());
            }
            return;
        }

        let candidate = &self.candidates[index];
        let seller = candidate.outcome.seller().clone();

        // Include first for earlier pruning.
        if !used.contains(&seller) {
            chosen.push(index);
            used.insert(seller.clone());
            for (c, add) in covered.iter_mut().zip(&candidate.coverage) {
                *c += add;
            }
            self.branch(
                index + 1,
                chosen,
                utility + candidate.outcome.utility(),
                used,
                covered,
            );
            for (c, add) in covered.iter_mut().zip(&candidate.coverage) {
                *c -= add;
            }
            used.remove(&seller);
            chosen.pop();
        }

        self.branch(index + 1, chosen, utility, used, covered);
    }

    fn suffix_bound(&self, index: usize, used: &HashSet<SellerId>) -> f64 {
        let mut counted: HashSet<&SellerId> = HashSet::new();
        let mut bound = 0.0;
        for candidate in &self.candidates[index..] {
            let seller = candidate.outcome.seller();
            if used.contains(seller) || counted.contains(seller) {
                continue;
            }
            // Sorted descending: the first outcome seen per seller is
            // that seller's best in the suffix.
            counted.insert(seller);
            bound += candidate.outcome.utility();
        }
        bound
    }
}
