//! # swarm-verifier
//!
//! Verification pipeline for parsed predictions. Workers claim one eligible
//! prediction at a time and drive it through slice validation, duplicate
//! detection, timeframe extraction, maturity gating, filter validation and
//! verdict generation, recording exactly one terminal outcome per prediction.
//!
//! The retroactive deduplicator ([`retroactive`]) applies the same duplicate
//! clustering as a batch pass over whole conversations.

pub mod config;
pub mod error;
pub mod reasoning;
pub mod retroactive;
pub mod services;
pub mod stages;
pub mod store;
pub mod workflow;

pub use error::{VerifierError, VerifierResult};
