//! Typo Sniper
//!
//! Detects domains that impersonate a set of monitored brand domains
//! ("typosquats"): candidate lookalikes are generated per seed, probed
//! against the DNS for registration, enriched with WHOIS and threat
//! intelligence, scored, and emitted as structured reports.
//!
//! # Architecture
//!
//! The crate is divided into two main modules:
//! * `scan` - the detection and enrichment pipeline
//! * `export` - report writers over the record schema

/// Detection and enrichment pipeline
pub mod scan;

/// Report writers consuming the ordered record sequence
pub mod export;
