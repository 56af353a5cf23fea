//! Shared negotiation data model

pub mod bid;
pub mod bundle;
pub mod proposal;

pub use bid::{Bid, Grade, Issue, IssueKind, IssueParams, IssueValue, RECOGNISED_ISSUES};
pub use bundle::{Bundle, BundleBuilder, Item};
pub use proposal::{Outcome, Proposal};
