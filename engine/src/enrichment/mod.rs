//! Context Enrichment Adapters
//!
//! Three independent, stateless capabilities that enrich call sessions:
//! internet search, domain availability lookup, and voice analysis. Each
//! wraps one external provider (voice analysis is purely local) and degrades
//! gracefully — a missing credential or provider failure produces the
//! adapter's documented fallback, never an error for the caller.

pub mod domain;
pub mod search;
pub mod voice;
