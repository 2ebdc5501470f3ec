//! Output evaluation against declarative success criteria.

pub mod evaluator;
