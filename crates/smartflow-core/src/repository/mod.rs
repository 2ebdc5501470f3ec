//! Repository trait definitions (ports).
//!
//! These traits define the storage interface that the infrastructure layer
//! implements. Uses native async fn in traits (Rust 2024 edition, no
//! async_trait macro).

pub mod state;
