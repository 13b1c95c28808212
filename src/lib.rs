//! Clash Purity - IP reputation annotator for Clash profiles
//!
//! Drives the Clash control API to switch egress node-by-node, scrapes the
//! ippure.com reputation page through a headless Chrome session, and writes
//! quality annotations back into node names and group references.

pub mod check;
pub mod clash;
pub mod profile;
pub mod runner;
pub mod settings;

pub use check::{CheckOutcome, IpChecker, ProbeConfig, QualityReport};
pub use clash::ClashController;
pub use runner::Runner;
pub use settings::Settings;

/// Application result type
pub type Result<T> = anyhow::Result<T>;
