//! Rule lookup and upstream rotation.
//!
//! # Responsibilities
//! - Store the rule table in declaration order
//! - Find the first rule matching a path
//! - Rotate through a matched rule's upstream ids
//!
//! # Design Decisions
//! - First match wins; declaration order is the only tie-break
//! - One round-robin cursor per rule, living as long as the worker
//! - Explicit no-match rather than a silent default

use crate::config::RuleConfig;
use crate::load_balancer::RoundRobin;
use crate::routing::matcher::PathMatcher;

/// Position of a rule in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleId(usize);

impl RuleId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A compiled rule with its own upstream cursor.
#[derive(Debug)]
pub struct Rule {
    matcher: PathMatcher,
    upstream_ids: Vec<String>,
    cursor: RoundRobin,
}

impl Rule {
    pub fn pattern(&self) -> &str {
        self.matcher.pattern()
    }
}

/// Per-worker rule router.
#[derive(Debug)]
pub struct Router {
    rules: Vec<Rule>,
}

impl Router {
    /// Compile rules, keeping declaration order.
    pub fn from_config(rules: &[RuleConfig]) -> Self {
        let rules = rules
            .iter()
            .map(|rule| Rule {
                matcher: PathMatcher::new(rule.path.clone()),
                upstream_ids: rule.upstreams.clone(),
                cursor: RoundRobin::new(),
            })
            .collect();
        Self { rules }
    }

    /// Find the first rule whose pattern matches `path`.
    pub fn match_path(&self, path: &str) -> Option<RuleId> {
        self.rules
            .iter()
            .position(|rule| rule.matcher.matches(path))
            .map(RuleId)
    }

    /// Return the rule's next upstream id and advance its cursor.
    pub fn next_upstream(&mut self, id: RuleId) -> Option<&str> {
        let rule = self.rules.get_mut(id.0)?;
        let index = rule.cursor.next_index(rule.upstream_ids.len())?;
        Some(rule.upstream_ids[index].as_str())
    }

    pub fn rule(&self, id: RuleId) -> Option<&Rule> {
        self.rules.get(id.0)
    }
}
