//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (rules reference existing upstreams)
//! - Validate value ranges (port, worker count)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before any socket is bound or worker spawned

use std::collections::HashSet;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("server.listen must be a non-zero port")]
    InvalidPort,

    #[error("server.workers must be at least 1")]
    NoWorkers,

    #[error("duplicate upstream id {0:?}")]
    DuplicateUpstream(String),

    #[error("upstream {id:?} must use an http:// URL with a host, got {url}")]
    UnsupportedUrl { id: String, url: String },

    #[error("rule #{index} has an empty path")]
    EmptyRulePath { index: usize },

    #[error("rule {path:?} lists no upstreams")]
    EmptyRuleUpstreams { path: String },

    #[error("rule {path:?} references unknown upstream {id:?}")]
    UnknownUpstream { path: String, id: String },
}

/// Validate a parsed configuration, collecting every error.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let server = &config.server;
    let mut errors = Vec::new();

    if server.listen == 0 {
        errors.push(ValidationError::InvalidPort);
    }
    if server.workers == Some(0) {
        errors.push(ValidationError::NoWorkers);
    }

    let mut ids = HashSet::new();
    for upstream in &server.upstreams {
        if !ids.insert(upstream.id.as_str()) {
            errors.push(ValidationError::DuplicateUpstream(upstream.id.clone()));
        }
        if upstream.url.scheme() != "http" || upstream.url.host_str().is_none() {
            errors.push(ValidationError::UnsupportedUrl {
                id: upstream.id.clone(),
                url: upstream.url.to_string(),
            });
        }
    }

    for (index, rule) in server.rules.iter().enumerate() {
        if rule.path.is_empty() {
            errors.push(ValidationError::EmptyRulePath { index });
        }
        if rule.upstreams.is_empty() {
            errors.push(ValidationError::EmptyRuleUpstreams { path: rule.path.clone() });
        }
        for id in &rule.upstreams {
            if !ids.contains(id.as_str()) {
                errors.push(ValidationError::UnknownUpstream {
                    path: rule.path.clone(),
                    id: id.clone(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{ObservabilityConfig, RuleConfig, ServerConfig, UpstreamConfig};

    fn config() -> ProxyConfig {
        ProxyConfig {
            server: ServerConfig {
                listen: 8080,
                workers: Some(2),
                upstreams: vec![UpstreamConfig {
                    id: "u1".into(),
                    url: "http://127.0.0.1:9000".parse().unwrap(),
                }],
                rules: vec![RuleConfig {
                    path: "/".into(),
                    upstreams: vec!["u1".into()],
                }],
            },
            observability: ObservabilityConfig::default(),
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate_config(&config()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = config();
        config.server.listen = 0;
        config.server.workers = Some(0);
        config.server.upstreams.push(UpstreamConfig {
            id: "u1".into(),
            url: "https://secure.example".parse().unwrap(),
        });
        config.server.rules.push(RuleConfig {
            path: "/api".into(),
            upstreams: vec!["missing".into()],
        });
        config.server.rules.push(RuleConfig {
            path: String::new(),
            upstreams: Vec::new(),
        });

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 7);
        assert!(errors.contains(&ValidationError::DuplicateUpstream("u1".into())));
        assert!(errors.contains(&ValidationError::UnknownUpstream {
            path: "/api".into(),
            id: "missing".into(),
        }));
        assert!(errors.contains(&ValidationError::EmptyRulePath { index: 2 }));
    }
}
