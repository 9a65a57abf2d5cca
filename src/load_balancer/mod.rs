//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Front process:  dispatch → RoundRobin over worker handles
//! Worker process: rule matched → RoundRobin over the rule's upstream ids
//! ```
//!
//! # Design Decisions
//! - One cursor per owner: the dispatcher owns the worker cursor, each rule
//!   owns its upstream cursor
//! - Cursors are per process and never synchronized; distribution across
//!   workers is approximate, not globally fair

pub mod round_robin;

pub use round_robin::RoundRobin;
