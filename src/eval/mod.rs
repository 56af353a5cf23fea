//! Utility evaluation and concession generation

pub mod concession;
pub mod evaluator;

pub use concession::Concessor;
pub use evaluator::{Evaluator, TfnTable};
