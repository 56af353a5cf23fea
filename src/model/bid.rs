//! Bids and negotiation issues

use crate::error::{Result, TenderMeshError};
use crate::model::Bundle;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The issues recognised in the reference scenario, in canonical order
pub const RECOGNISED_ISSUES: [(&str, IssueKind); 4] = [
    ("price", IssueKind::Cost),
    ("delivery", IssueKind::Cost),
    ("quality", IssueKind::Qualitative),
    ("service", IssueKind::Qualitative),
];

/// How an issue's value relates to a party's satisfaction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueKind {
    /// Lower is better (price, delivery time)
    Cost,
    /// Higher is better
    Benefit,
    /// One of five linguistic grades
    Qualitative,
}

/// Linguistic grade for qualitative issues
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grade {
    VeryPoor,
    Poor,
    Medium,
    Good,
    VeryGood,
}

impl Grade {
    pub const ALL: [Grade; 5] = [
        Grade::VeryPoor,
        Grade::Poor,
        Grade::Medium,
        Grade::Good,
        Grade::VeryGood,
    ];

    /// Parse a grade, accepting spaces or underscores, any case.
    pub fn parse(raw: &str) -> Option<Grade> {
        match raw.trim().to_lowercase().replace('_', " ").as_str() {
            "very poor" | "verypoor" => Some(Grade::VeryPoor),
            "poor" => Some(Grade::Poor),
            "medium" => Some(Grade::Medium),
            "good" => Some(Grade::Good),
            "very good" | "verygood" => Some(Grade::VeryGood),
            _ => None,
        }
    }

    /// Human label, matching the configuration key spelling
    pub fn key(&self) -> &'static str {
        match self {
            Grade::VeryPoor => "very_poor",
            Grade::Poor => "poor",
            Grade::Medium => "medium",
            Grade::Good => "good",
            Grade::VeryGood => "very_good",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grade::VeryPoor => write!(f, "very poor"),
            Grade::Poor => write!(f, "poor"),
            Grade::Medium => write!(f, "medium"),
            Grade::Good => write!(f, "good"),
            Grade::VeryGood => write!(f, "very good"),
        }
    }
}

/// A concrete issue value: numeric or linguistic
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum IssueValue {
    Number(f64),
    Linguistic(Grade),
}

impl fmt::Display for IssueValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueValue::Number(v) => write!(f, "{:.2}", v),
            IssueValue::Linguistic(g) => write!(f, "{}", g),
        }
    }
}

/// A named negotiation dimension with its current value
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    name: String,
    value: IssueValue,
}

impl Issue {
    pub fn new(name: impl Into<String>, value: IssueValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Canonical lowercase name used for weight and parameter lookups
    pub fn canonical_name(&self) -> String {
        self.name.trim().to_lowercase()
    }

    pub fn value(&self) -> IssueValue {
        self.value
    }
}

/// Normalisation interval and kind for a quantitative issue.
/// Construction swaps an out-of-order interval rather than rejecting it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct IssueParams {
    min: f64,
    max: f64,
    kind: IssueKind,
}

impl IssueParams {
    pub fn new(min: f64, max: f64, kind: IssueKind) -> Self {
        if kind != IssueKind::Qualitative && min > max {
            Self {
                min: max,
                max: min,
                kind,
            }
        } else {
            Self { min, max, kind }
        }
    }

    pub fn qualitative() -> Self {
        Self::new(0.0, 1.0, IssueKind::Qualitative)
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn kind(&self) -> IssueKind {
        self.kind
    }

    pub fn range(&self) -> f64 {
        self.max - self.min
    }
}

/// A concrete offer: one bundle, one value per recognised issue, and a
/// quantity vector aligned to the bundle's item order. Immutable after
/// creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    bundle: Bundle,
    issues: Vec<Issue>,
    quantities: Vec<u32>,
}

impl Bid {
    pub fn new(bundle: Bundle, issues: Vec<Issue>, quantities: Vec<u32>) -> Result<Self> {
        if quantities.len() != bundle.items().len() {
            return Err(TenderMeshError::InvalidBid(format!(
                "quantities length {} does not match bundle {} item count {}",
                quantities.len(),
                bundle.id(),
                bundle.items().len()
            )));
        }
        for (name, _) in RECOGNISED_ISSUES {
            let count = issues
                .iter()
                .filter(|i| i.canonical_name() == name)
                .count();
            if count != 1 {
                return Err(TenderMeshError::InvalidBid(format!(
                    "issue '{}' appears {} times, expected exactly once",
                    name, count
                )));
            }
        }
        if issues.len() != RECOGNISED_ISSUES.len() {
            return Err(TenderMeshError::InvalidBid(format!(
                "expected {} issues, got {}",
                RECOGNISED_ISSUES.len(),
                issues.len()
            )));
        }
        Ok(Self {
            bundle,
            issues,
            quantities,
        })
    }

    /// A bid on `bundle` with quantities copied from the bundle items
    pub fn for_bundle(bundle: Bundle, issues: Vec<Issue>) -> Result<Self> {
        let quantities = bundle.items().iter().map(|i| i.quantity()).collect();
        Self::new(bundle, issues, quantities)
    }

    pub fn bundle(&self) -> &Bundle {
        &self.bundle
    }

    pub fn bundle_id(&self) -> &str {
        self.bundle.id()
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn issue(&self, name: &str) -> Option<&Issue> {
        let canonical = name.trim().to_lowercase();
        self.issues.iter().find(|i| i.canonical_name() == canonical)
    }

    pub fn quantities(&self) -> &[u32] {
        &self.quantities
    }

    pub fn total_quantity(&self) -> u32 {
        self.quantities.iter().sum()
    }
}

impl fmt::Display for Bid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bid {{ bundle={}, issues=[", self.bundle_id())?;
        for (i, issue) in self.issues.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", issue.name(), issue.value())?;
        }
        write!(f, "] }}")
    }
}

/// Build the canonical issue list from per-issue values
pub fn standard_issues(
    price: f64,
    delivery: f64,
    quality: Grade,
    service: Grade,
) -> Vec<Issue> {
    vec![
        Issue::new("price", IssueValue::Number(price)),
        Issue::new("delivery", IssueValue::Number(delivery)),
        Issue::new("quality", IssueValue::Linguistic(quality)),
        Issue::new("service", IssueValue::Linguistic(service)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle() -> Bundle {
        Bundle::builder("b-p1")
            .item("P1", 1000)
            .build()
            .unwrap()
    }

    #[test]
    fn test_grade_parsing_variants() {
        assert_eq!(Grade::parse("very poor"), Some(Grade::VeryPoor));
        assert_eq!(Grade::parse("VERY_GOOD"), Some(Grade::VeryGood));
        assert_eq!(Grade::parse("  Medium "), Some(Grade::Medium));
        assert_eq!(Grade::parse("excellent"), None);
    }

    #[test]
    fn test_issue_params_swaps_inverted_interval() {
        let p = IssueParams::new(100.0, 10.0, IssueKind::Cost);
        assert_eq!(p.min(), 10.0);
        assert_eq!(p.max(), 100.0);
    }

    #[test]
    fn test_bid_requires_all_recognised_issues() {
        let issues = vec![
            Issue::new("price", IssueValue::Number(50.0)),
            Issue::new("delivery", IssueValue::Number(5.0)),
        ];
        assert!(Bid::for_bundle(bundle(), issues).is_err());

        let full = standard_issues(50.0, 5.0, Grade::Good, Grade::Medium);
        let bid = Bid::for_bundle(bundle(), full).unwrap();
        assert_eq!(bid.quantities(), &[1000]);
    }

    #[test]
    fn test_bid_rejects_duplicate_issue() {
        let issues = vec![
            Issue::new("Price", IssueValue::Number(50.0)),
            Issue::new("price", IssueValue::Number(60.0)),
            Issue::new("quality", IssueValue::Linguistic(Grade::Good)),
            Issue::new("service", IssueValue::Linguistic(Grade::Good)),
        ];
        assert!(Bid::for_bundle(bundle(), issues).is_err());
    }

    #[test]
    fn test_bid_quantity_alignment() {
        let two = Bundle::builder("b-2")
            .item("P1", 10)
            .item("P2", 20)
            .build()
            .unwrap();
        let issues = standard_issues(50.0, 5.0, Grade::Good, Grade::Medium);
        assert!(Bid::new(two.clone(), issues.clone(), vec![10]).is_err());
        let bid = Bid::new(two, issues, vec![10, 20]).unwrap();
        assert_eq!(bid.total_quantity(), 30);
    }

    #[test]
    fn test_issue_lookup_is_case_insensitive() {
        let bid = Bid::for_bundle(
            bundle(),
            standard_issues(42.0, 3.0, Grade::Good, Grade::Medium),
        )
        .unwrap();
        let issue = bid.issue("PRICE").unwrap();
        assert_eq!(issue.value(), IssueValue::Number(42.0));
    }
}
