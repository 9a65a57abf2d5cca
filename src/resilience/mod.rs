//! Resilience helpers.
//!
//! # Design Decisions
//! - Nothing here retries client requests: a 502 or 504 is surfaced as-is
//! - Backoff only paces worker respawns after a crash

pub mod backoff;
