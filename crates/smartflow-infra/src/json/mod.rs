//! Flat-file JSON storage layer.

pub mod state;
