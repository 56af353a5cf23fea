//! Product bundles offered by suppliers

use crate::demand::ProductSpace;
use crate::error::{Result, TenderMeshError};
use crate::types::ProductId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One line of a bundle: a product and its offered quantity
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    product: ProductId,
    quantity: u32,
}

impl Item {
    pub fn new(product: ProductId, quantity: u32) -> Result<Self> {
        if quantity == 0 {
            return Err(TenderMeshError::InvalidBundle(format!(
                "item {} has zero quantity",
                product
            )));
        }
        Ok(Self { product, quantity })
    }

    pub fn product(&self) -> &ProductId {
        &self.product
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }
}

/// An immutable, catalog-time product bundle.
///
/// Identity is the opaque `id` string alone; two bundles are equal iff
/// their ids are equal. Synergy bounds contract a party's global issue
/// interval to a bundle-specific one during evaluation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Bundle {
    id: String,
    name: String,
    items: Vec<Item>,
    synergy_min: f64,
    synergy_max: f64,
    issue_weights: BTreeMap<String, f64>,
    metadata: BTreeMap<String, String>,
}

impl Bundle {
    pub fn builder(id: impl Into<String>) -> BundleBuilder {
        BundleBuilder::new(id)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn synergy_min(&self) -> f64 {
        self.synergy_min
    }

    pub fn synergy_max(&self) -> f64 {
        self.synergy_max
    }

    pub fn issue_weights(&self) -> &BTreeMap<String, f64> {
        &self.issue_weights
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn total_quantity(&self) -> u32 {
        self.items.iter().map(Item::quantity).sum()
    }

    /// Quantity supplied per product, in the canonical order of `space`.
    /// Products outside the space are ignored.
    pub fn coverage(&self, space: &ProductSpace) -> Vec<u32> {
        let mut vec = vec![0u32; space.len()];
        for item in &self.items {
            if let Some(idx) = space.index_of(item.product.as_str()) {
                vec[idx] += item.quantity;
            }
        }
        vec
    }

    /// Weighted aggregate of per-issue feature values using this
    /// bundle's own issue weights (normalised by their sum).
    pub fn weighted_score(&self, feature_values: &BTreeMap<String, f64>) -> f64 {
        let sum_w: f64 = self.issue_weights.values().sum();
        if sum_w == 0.0 {
            return 0.0;
        }
        let acc: f64 = self
            .issue_weights
            .iter()
            .map(|(issue, w)| w * feature_values.get(issue).copied().unwrap_or(0.0))
            .sum();
        acc / sum_w
    }
}

impl PartialEq for Bundle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Bundle {}

impl std::hash::Hash for Bundle {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Bundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let products: Vec<&str> = self.items.iter().map(|i| i.product.as_str()).collect();
        write!(f, "{} [{}]", self.id, products.join("+"))
    }
}

/// Validating builder for [`Bundle`]
pub struct BundleBuilder {
    id: String,
    name: Option<String>,
    items: Vec<Item>,
    synergy_min: f64,
    synergy_max: f64,
    issue_weights: BTreeMap<String, f64>,
    metadata: BTreeMap<String, String>,
    item_error: Option<TenderMeshError>,
}

impl BundleBuilder {
    fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            items: Vec::new(),
            synergy_min: 0.0,
            synergy_max: 1.0,
            issue_weights: BTreeMap::new(),
            metadata: BTreeMap::new(),
            item_error: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn item(mut self, product: impl Into<String>, quantity: u32) -> Self {
        match Item::new(ProductId::new(product), quantity) {
            Ok(item) => self.items.push(item),
            Err(e) => self.item_error = Some(e),
        }
        self
    }

    pub fn synergy_bounds(mut self, min: f64, max: f64) -> Self {
        self.synergy_min = min;
        self.synergy_max = max;
        self
    }

    pub fn issue_weight(mut self, issue: impl Into<String>, weight: f64) -> Self {
        self.issue_weights.insert(issue.into(), weight);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Result<Bundle> {
        if let Some(err) = self.item_error {
            return Err(err);
        }
        if self.id.is_empty() {
            return Err(TenderMeshError::InvalidBundle("empty id".to_string()));
        }
        if self.items.is_empty() {
            return Err(TenderMeshError::InvalidBundle(format!(
                "bundle {} must have at least one item",
                self.id
            )));
        }
        if !(0.0..=1.0).contains(&self.synergy_min)
            || !(0.0..=1.0).contains(&self.synergy_max)
            || self.synergy_min > self.synergy_max
        {
            return Err(TenderMeshError::InvalidBundle(format!(
                "bundle {} synergy bounds out of order: ({}, {})",
                self.id, self.synergy_min, self.synergy_max
            )));
        }
        if self.issue_weights.values().any(|w| *w < 0.0) {
            return Err(TenderMeshError::InvalidBundle(format!(
                "bundle {} has a negative issue weight",
                self.id
            )));
        }
        let name = self.name.unwrap_or_else(|| self.id.clone());
        Ok(Bundle {
            id: self.id,
            name,
            items: self.items,
            synergy_min: self.synergy_min,
            synergy_max: self.synergy_max,
            issue_weights: self.issue_weights,
            metadata: self.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demand::ProductSpace;

    fn p1p2_bundle() -> Bundle {
        Bundle::builder("b-p1p2")
            .item("P1", 1000)
            .item("P2", 1000)
            .synergy_bounds(0.2, 0.8)
            .issue_weight("price", 0.7)
            .issue_weight("delivery", 0.3)
            .build()
            .unwrap()
    }

    #[test]
    fn test_identity_is_id_only() {
        let a = p1p2_bundle();
        let b = Bundle::builder("b-p1p2").item("P3", 5).build().unwrap();
        assert_eq!(a, b);
        let c = Bundle::builder("b-other").item("P1", 1000).build().unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_coverage_follows_canonical_order() {
        let space = ProductSpace::reference();
        let bundle = p1p2_bundle();
        assert_eq!(bundle.coverage(&space), vec![1000, 1000, 0, 0]);
    }

    #[test]
    fn test_coverage_ignores_unknown_products() {
        let space = ProductSpace::reference();
        let bundle = Bundle::builder("b-x")
            .item("P3", 2000)
            .item("PX", 7)
            .build()
            .unwrap();
        assert_eq!(bundle.coverage(&space), vec![0, 0, 2000, 0]);
    }

    #[test]
    fn test_builder_rejects_invalid() {
        assert!(Bundle::builder("b-1").build().is_err());
        assert!(Bundle::builder("b-1").item("P1", 0).build().is_err());
        assert!(Bundle::builder("b-1")
            .item("P1", 1)
            .synergy_bounds(0.9, 0.1)
            .build()
            .is_err());
        assert!(Bundle::builder("b-1")
            .item("P1", 1)
            .issue_weight("price", -0.5)
            .build()
            .is_err());
    }

    #[test]
    fn test_weighted_score_normalises() {
        let bundle = p1p2_bundle();
        let features = BTreeMap::from([
            ("price".to_string(), 1.0),
            ("delivery".to_string(), 0.0),
        ]);
        assert!((bundle.weighted_score(&features) - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_serialization_round_trip() {
        let bundle = p1p2_bundle();
        let json = serde_json::to_string(&bundle).unwrap();
        let back: Bundle = serde_json::from_str(&json).unwrap();
        assert_eq!(bundle, back);
        assert_eq!(back.items().len(), 2);
    }
}
