//! Typosquat detection and enrichment pipeline.
//!
//! The pipeline runs in two phases per seed: candidate generation plus
//! DNS probing, then concurrent enrichment of everything registered.
//! All orchestration lives in `scanner`; the remaining modules are
//! leaves it composes.
//!
//! # Module Structure
//!
//! * `permutation` - candidate lookalike generation with fuzzer tagging
//! * `resolver` - DNS registration probe (A/AAAA/MX/NS)
//! * `whois` - WHOIS client and normalization
//! * `enrich` - URLScan, certificate transparency and HTTP probe
//! * `risk` - advisory risk scoring
//! * `ml` - optional post-enrichment ML hook
//! * `record` - the record schema, ordering and filtering
//! * `scanner` - concurrency, rate limiting and ordered emission
//! * `cache` - file-backed TTL cache with single-flight
//! * `config` - layered configuration (YAML, environment, CLI)
//! * `secrets` - ordered credential resolution

/// File-backed TTL cache with per-key single-flight
pub mod cache;

/// Layered scan configuration
pub mod config;

/// Threat-intel enrichers
pub mod enrich;

/// Error taxonomy
pub mod errors;

/// Optional post-enrichment ML hook
pub mod ml;

/// Candidate lookalike generation
pub mod permutation;

/// Phonetic codes for the sound-alike fuzzer
pub mod phonetic;

/// Provider token buckets
pub mod rate_limit;

/// The record schema, emission ordering and filtering
pub mod record;

/// DNS registration probe
pub mod resolver;

/// Shared retry combinator
pub mod retry;

/// Advisory risk scoring
pub mod risk;

/// Scan orchestration
pub mod scanner;

/// Ordered credential resolution
pub mod secrets;

/// Versioned data tables (TLDs, keywords, confusables)
pub mod tables;

/// WHOIS client and normalization
pub mod whois;
