//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, or YAML / JSON by extension)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → ServerConfig copied into every worker at spawn (JSON env var)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; workers get their own copy
//! - Validation separates syntactic (serde) from semantic checks
//! - A validation failure stops startup before any socket is opened

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{ObservabilityConfig, ProxyConfig, RuleConfig, ServerConfig, UpstreamConfig};
pub use validation::{validate_config, ValidationError};
