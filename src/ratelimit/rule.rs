//! Rate limit rule data model and lookup keys.

use serde::{Deserialize, Serialize};

/// A configured rate limit rule for one (identity, resource) pair.
///
/// `ceiling` is the maximum number of requests per hour. It is carried as a
/// signed integer so that non-positive values survive deserialization and are
/// rejected during rule validation rather than at the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateRule {
    /// The caller credential the rule applies to
    pub identity: String,
    /// The downstream resource the rule applies to
    pub resource: String,
    /// Maximum allowed requests per hour
    pub ceiling: i64,
}

/// A key that uniquely identifies the (identity, resource) pair a rule or
/// bucket belongs to.
///
/// The key is a structured tuple rather than a joined string, so no delimiter
/// choice can collide with field contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleKey {
    /// The caller credential
    pub identity: String,
    /// The requested resource
    pub resource: String,
}

impl RuleKey {
    /// Create a new rule key from an identity and a resource.
    pub fn new(identity: &str, resource: &str) -> Self {
        Self {
            identity: identity.to_string(),
            resource: resource.to_string(),
        }
    }
}

impl std::fmt::Display for RuleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}|{}", self.identity, self.resource)
    }
}
