//! Core admission engine implementation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::registry::ResourceValidator;

use super::bucket::TokenBucket;
use super::clock::{Clock, SystemClock};
use super::rule::{RateRule, RuleKey};

/// The admission engine that decides whether a request may proceed.
///
/// The engine owns both the active rule set and the per-key bucket store.
/// Both maps live behind a single mutex and are only read or updated
/// together, so a check observes either the fully-old or the fully-new rule
/// set, never a mix.
pub struct AdmissionEngine {
    /// Active rules and bucket state, guarded together
    state: Mutex<EngineState>,
    /// Oracle for resource identifiers, consulted during rule updates
    registry: Arc<dyn ResourceValidator>,
    /// Time source for bucket refills
    clock: Box<dyn Clock>,
}

struct EngineState {
    /// Active hourly ceilings indexed by rule key
    rules: HashMap<RuleKey, i64>,
    /// Token buckets for rule keys that have been checked at least once
    buckets: HashMap<RuleKey, TokenBucket>,
}

impl AdmissionEngine {
    /// Create a new engine with no active rules.
    pub fn new(registry: Arc<dyn ResourceValidator>) -> Self {
        Self::with_clock(registry, Box::new(SystemClock))
    }

    /// Create a new engine with an explicit time source.
    pub fn with_clock(registry: Arc<dyn ResourceValidator>, clock: Box<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(EngineState {
                rules: HashMap::new(),
                buckets: HashMap::new(),
            }),
            registry,
            clock,
        }
    }

    /// Validate candidate rules and replace the active rule set.
    ///
    /// Rules naming an unknown identity, an unresolvable resource, or a
    /// non-positive ceiling are logged and skipped; the update itself always
    /// succeeds. When duplicate keys appear in the input, the last one wins.
    /// After the replacement, buckets whose key no longer has a rule are
    /// dropped.
    pub fn update(&self, candidates: &[RateRule], valid_identities: &[String]) {
        let valid: HashSet<&str> = valid_identities.iter().map(String::as_str).collect();

        let mut fresh: HashMap<RuleKey, i64> = HashMap::new();
        for rule in candidates {
            if !valid.contains(rule.identity.as_str()) {
                warn!(identity = %rule.identity, "ignoring rule for unknown identity");
                continue;
            }
            if rule.ceiling <= 0 {
                warn!(
                    identity = %rule.identity,
                    resource = %rule.resource,
                    ceiling = rule.ceiling,
                    "ignoring rule with non-positive ceiling"
                );
                continue;
            }
            if !self.registry.resolve(&rule.resource) {
                warn!(resource = %rule.resource, "ignoring rule for unknown resource");
                continue;
            }

            fresh.insert(RuleKey::new(&rule.identity, &rule.resource), rule.ceiling);
        }

        let mut state = self.state.lock();
        state.rules = fresh;

        // Drop buckets for removed rules
        let EngineState { rules, buckets } = &mut *state;
        buckets.retain(|key, _| rules.contains_key(key));

        info!(active_rules = rules.len(), "rate limit rules updated");
    }

    /// Check whether a request under the given identity, for the given
    /// resource, is allowed.
    ///
    /// Returns `true` to admit the request. A pair with no active rule is
    /// always admitted; absence of a rule means unlimited.
    pub fn check(&self, identity: &str, resource: &str) -> bool {
        let key = RuleKey::new(identity, resource);

        let mut state = self.state.lock();
        let Some(&ceiling) = state.rules.get(&key) else {
            return true;
        };

        trace!(key = %key, ceiling = ceiling, "checking admission");

        let now = self.clock.now();
        let bucket = state
            .buckets
            .entry(key.clone())
            .and_modify(|bucket| bucket.set_ceiling(ceiling))
            .or_insert_with(|| {
                debug!(key = %key, ceiling = ceiling, "creating bucket");
                TokenBucket::new(ceiling, now)
            });

        // Refill on every check, allowed or denied, so recovery tracks
        // elapsed time rather than call outcome.
        bucket.refill(now);

        let allowed = bucket.try_consume();
        if !allowed {
            debug!(key = %key, "request denied, bucket exhausted");
        }
        allowed
    }

    /// Get the number of active rules.
    pub fn rule_count(&self) -> usize {
        self.state.lock().rules.len()
    }

    /// Get the number of live buckets.
    pub fn bucket_count(&self) -> usize {
        self.state.lock().buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::test_support::ManualClock;
    use crate::registry::StaticResourceRegistry;
    use std::time::Duration;

    fn test_registry(resources: &[&str]) -> Arc<StaticResourceRegistry> {
        Arc::new(StaticResourceRegistry::new(
            resources.iter().map(|r| r.to_string()),
        ))
    }

    fn test_engine(resources: &[&str]) -> (AdmissionEngine, ManualClock) {
        let clock = ManualClock::new();
        let engine = AdmissionEngine::with_clock(test_registry(resources), Box::new(clock.clone()));
        (engine, clock)
    }

    fn rule(identity: &str, resource: &str, ceiling: i64) -> RateRule {
        RateRule {
            identity: identity.to_string(),
            resource: resource.to_string(),
            ceiling,
        }
    }

    #[test]
    fn test_no_rule_allows_unconditionally() {
        let (engine, _clock) = test_engine(&["model-x"]);

        for _ in 0..1000 {
            assert!(engine.check("caller-a", "model-x"));
        }
        assert_eq!(engine.bucket_count(), 0);
    }

    #[test]
    fn test_burst_then_exhaust() {
        let (engine, _clock) = test_engine(&["model-x"]);
        engine.update(&[rule("caller-a", "model-x", 5)], &["caller-a".to_string()]);

        for _ in 0..5 {
            assert!(engine.check("caller-a", "model-x"));
        }
        assert!(!engine.check("caller-a", "model-x"));
    }

    #[test]
    fn test_refill_grants_one_token_per_second_at_3600() {
        let (engine, clock) = test_engine(&["model-x"]);
        engine.update(
            &[rule("caller-a", "model-x", 3600)],
            &["caller-a".to_string()],
        );

        for _ in 0..3600 {
            assert!(engine.check("caller-a", "model-x"));
        }
        assert!(!engine.check("caller-a", "model-x"));

        clock.advance(Duration::from_secs(1));
        assert!(engine.check("caller-a", "model-x"));
        assert!(!engine.check("caller-a", "model-x"));
    }

    #[test]
    fn test_idle_bucket_caps_at_ceiling() {
        let (engine, clock) = test_engine(&["model-x"]);
        engine.update(&[rule("caller-a", "model-x", 10)], &["caller-a".to_string()]);

        // Create the bucket, then leave it idle far longer than one window
        assert!(engine.check("caller-a", "model-x"));
        clock.advance(Duration::from_secs(48 * 3600));

        for _ in 0..10 {
            assert!(engine.check("caller-a", "model-x"));
        }
        assert!(!engine.check("caller-a", "model-x"));
    }

    #[test]
    fn test_update_replaces_rules_atomically() {
        let (engine, _clock) = test_engine(&["model-x", "model-y"]);
        let identities = vec!["caller-a".to_string()];

        engine.update(&[rule("caller-a", "model-x", 1)], &identities);
        assert!(engine.check("caller-a", "model-x"));
        assert!(!engine.check("caller-a", "model-x"));

        // The replacement set no longer covers model-x
        engine.update(&[rule("caller-a", "model-y", 1)], &identities);
        assert!(engine.check("caller-a", "model-x"));
    }

    #[test]
    fn test_update_rejects_invalid_rules() {
        let (engine, _clock) = test_engine(&["model-x"]);
        let identities = vec!["caller-a".to_string(), "caller-b".to_string()];

        engine.update(
            &[
                rule("unknown", "model-x", 10),
                rule("caller-a", "unknown-model", 10),
                rule("caller-b", "model-x", 0),
                rule("caller-b", "model-x", -3),
            ],
            &identities,
        );
        assert_eq!(engine.rule_count(), 0);
    }

    #[test]
    fn test_duplicate_rules_last_write_wins() {
        let (engine, _clock) = test_engine(&["model-x"]);
        engine.update(
            &[
                rule("caller-a", "model-x", 1),
                rule("caller-a", "model-x", 3),
            ],
            &["caller-a".to_string()],
        );
        assert_eq!(engine.rule_count(), 1);

        for _ in 0..3 {
            assert!(engine.check("caller-a", "model-x"));
        }
        assert!(!engine.check("caller-a", "model-x"));
    }

    #[test]
    fn test_update_sweeps_orphaned_buckets() {
        let (engine, _clock) = test_engine(&["model-x", "model-y"]);
        let identities = vec!["caller-a".to_string()];

        engine.update(
            &[
                rule("caller-a", "model-x", 5),
                rule("caller-a", "model-y", 5),
            ],
            &identities,
        );
        engine.check("caller-a", "model-x");
        engine.check("caller-a", "model-y");
        assert_eq!(engine.bucket_count(), 2);

        engine.update(&[rule("caller-a", "model-y", 5)], &identities);
        assert_eq!(engine.bucket_count(), 1);

        // Re-adding the rule starts over with a fresh full-burst bucket
        engine.update(&[rule("caller-a", "model-x", 2)], &identities);
        assert!(engine.check("caller-a", "model-x"));
        assert!(engine.check("caller-a", "model-x"));
        assert!(!engine.check("caller-a", "model-x"));
    }

    #[test]
    fn test_ceiling_change_applies_to_live_bucket() {
        let (engine, clock) = test_engine(&["model-x"]);
        let identities = vec!["caller-a".to_string()];

        engine.update(&[rule("caller-a", "model-x", 2)], &identities);
        assert!(engine.check("caller-a", "model-x"));
        assert!(engine.check("caller-a", "model-x"));
        assert!(!engine.check("caller-a", "model-x"));

        // Raising the ceiling keeps the drained bucket but changes its
        // refill rate: 7200/hour refills two tokens per second.
        engine.update(&[rule("caller-a", "model-x", 7200)], &identities);
        assert!(!engine.check("caller-a", "model-x"));

        clock.advance(Duration::from_secs(1));
        assert!(engine.check("caller-a", "model-x"));
        assert!(engine.check("caller-a", "model-x"));
        assert!(!engine.check("caller-a", "model-x"));
    }

    #[test]
    fn test_concurrent_checks_consume_exactly_once_each() {
        const CALLERS: usize = 32;

        let (engine, _clock) = test_engine(&["model-x"]);
        engine.update(
            &[rule("caller-a", "model-x", CALLERS as i64)],
            &["caller-a".to_string()],
        );

        let allowed = std::sync::atomic::AtomicUsize::new(0);
        std::thread::scope(|scope| {
            for _ in 0..CALLERS {
                scope.spawn(|| {
                    if engine.check("caller-a", "model-x") {
                        allowed.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(allowed.load(std::sync::atomic::Ordering::SeqCst), CALLERS);
        assert!(!engine.check("caller-a", "model-x"));
    }
}
