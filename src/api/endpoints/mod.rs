//! API endpoint handlers.

pub mod health;
pub mod labeling;
pub mod stats;
