//! IP quality checking
//!
//! This module provides functionality for:
//! - Probing the reputation page for the current egress IP
//! - Mapping percentage scores into severity tier glyphs
//! - Modelling complete/partial/failed readings

pub mod models;
pub mod probe;
pub mod score;

pub use models::{CheckOutcome, QualityReport, ERROR_DISPLAY, UNKNOWN};
pub use probe::{IpChecker, ProbeConfig};
pub use score::tier_for;
