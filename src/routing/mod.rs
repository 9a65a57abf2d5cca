//! Routing subsystem (runs inside each worker).
//!
//! # Data Flow
//! ```text
//! RequestEnvelope.path
//!     → router.rs (rule lookup in declaration order)
//!     → matcher.rs (exact or prefix match)
//!     → Return: RuleId or NoMatch
//!     → router.rs next_upstream (per-rule round-robin)
//!     → upstream id, resolved against ServerConfig.upstreams
//! ```
//!
//! # Design Decisions
//! - Rules compiled at worker startup from its own config copy
//! - Deterministic: same input sequence always yields the same upstreams
//! - First match wins (declaration order, no specificity ranking)

pub mod matcher;
pub mod router;

pub use router::{Router, RuleId};
