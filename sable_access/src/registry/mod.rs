//! The write side of the engine.
//!
//! [`RuleRegistry`] owns rule ids, builds generations, and publishes them for
//! the [`MatchEngine`] handles it gives out.

use crate::engine::MatchEngine;
use crate::errors::*;
use crate::generation::*;
use crate::id::*;
use crate::rule::*;
use crate::utils::now;

use arc_swap::ArcSwap;
use std::sync::Arc;

mod load;
pub use load::*;

mod report;
pub use report::*;

/// Owner of all rules and the generation currently in force.
///
/// Changes made outside a rehash are applied to a copy of the published
/// generation, which then replaces it. A rehash instead builds a fresh
/// generation between [`begin_generation`](Self::begin_generation) and
/// [`commit_generation`](Self::commit_generation), invisible to readers until
/// it is committed.
#[derive(Debug)]
pub struct RuleRegistry {
    published: Arc<ArcSwap<Generation>>,
    ids: RuleIdGenerator,
    pending: Option<Generation>,
    /// Rules no longer in force, held until reaped
    retired: Vec<Arc<Rule>>,
}

impl RuleRegistry {
    pub fn new(settings: GenerationSettings) -> Self {
        let mut ids = RuleIdGenerator::new();
        let generation = Generation::new(ids.next_generation(), settings);

        Self {
            published: Arc::new(ArcSwap::from_pointee(generation)),
            ids,
            pending: None,
            retired: Vec::new(),
        }
    }

    /// A lookup handle that always sees the latest published generation
    pub fn engine(&self) -> MatchEngine {
        MatchEngine::new(Arc::clone(&self.published))
    }

    /// The generation currently in force
    pub fn current(&self) -> Arc<Generation> {
        self.published.load_full()
    }

    pub fn is_building(&self) -> bool {
        self.pending.is_some()
    }

    /// Start building a replacement generation. Registrations made until the
    /// generation is committed or discarded go into it.
    pub fn begin_generation(&mut self, settings: GenerationSettings) -> RegistrationResult<GenerationId> {
        if self.pending.is_some() {
            return Err(RegistrationError::GenerationInProgress);
        }

        let id = self.ids.next_generation();
        self.pending = Some(Generation::new(id, settings));
        tracing::debug!(generation = %id, "Building new generation");
        Ok(id)
    }

    /// Publish the generation being built. Every rule of the generation it
    /// replaces is retired.
    pub fn commit_generation(&mut self) -> RegistrationResult<GenerationId> {
        let mut generation = self
            .pending
            .take()
            .ok_or(RegistrationError::NoPendingGeneration)?;

        let pruned = generation.expire(now());
        let id = generation.id();
        let rules = generation.rules().len();

        let previous = self.published.swap(Arc::new(generation));
        for rule in previous.rules().iter() {
            self.retire(Arc::clone(rule));
        }
        for rule in pruned {
            self.retire(rule);
        }

        tracing::info!(generation = %id, rules, "Committed new generation");
        Ok(id)
    }

    /// Throw away the generation being built, leaving the current one in
    /// force.
    pub fn discard_generation(&mut self) -> RegistrationResult<GenerationId> {
        let generation = self
            .pending
            .take()
            .ok_or(RegistrationError::NoPendingGeneration)?;

        for rule in generation.rules().iter() {
            rule.mark_illegal();
        }

        tracing::info!(generation = %generation.id(), "Discarded generation");
        Ok(generation.id())
    }

    /// Apply a change to the pending generation, or else to a copy of the
    /// published one which is then published in its place.
    fn modify<T>(
        &mut self,
        f: impl FnOnce(&mut Generation) -> RegistrationResult<T>,
    ) -> RegistrationResult<T> {
        if let Some(pending) = self.pending.as_mut() {
            return f(pending);
        }
        self.modify_published(f)
    }

    /// Apply a change to a copy of the published generation and publish it,
    /// whether or not a rehash is in progress.
    fn modify_published<T>(
        &mut self,
        f: impl FnOnce(&mut Generation) -> RegistrationResult<T>,
    ) -> RegistrationResult<T> {
        let mut generation = self.published.load().successor(self.ids.next_generation());
        let result = f(&mut generation)?;
        self.published.store(Arc::new(generation));
        Ok(result)
    }

    /// Define or replace a connection class
    pub fn define_class(&mut self, class: ConnectionClass) {
        let _ = self.modify(|generation| {
            generation.define_class(class);
            Ok(())
        });
    }

    /// Change the switches of the current (or pending) generation
    pub fn update_settings(&mut self, settings: GenerationSettings) {
        let _ = self.modify(|generation| {
            generation.set_settings(settings);
            Ok(())
        });
    }

    /// Validate and store a rule.
    pub fn register(&mut self, spec: RuleSpec) -> RegistrationResult<RuleId> {
        let rule = spec.compile(self.ids.next_rule(), self.ids.next_precedence())?;
        let rule = self.modify(|generation| generation.insert(rule))?;

        tracing::debug!(
            rule = %rule.id(),
            category = %rule.category(),
            mask = %rule.mask_text(),
            "Registered rule"
        );
        Ok(rule.id())
    }

    /// Remove a rule. It stops matching immediately, and is kept alive only
    /// for as long as connections are attached to it.
    pub fn unregister(&mut self, id: RuleId) -> RegistrationResult<Arc<Rule>> {
        let rule = self.modify(|generation| {
            generation
                .remove(id)
                .ok_or(RegistrationError::NoSuchRule(id))
        })?;

        tracing::debug!(rule = %id, mask = %rule.mask_text(), "Unregistered rule");
        self.retire(Arc::clone(&rule));
        Ok(rule)
    }

    /// Remove every temporary rule that has expired as of `now` from both the
    /// published generation and any generation being built, returning the
    /// removed rules.
    pub fn expire(&mut self, now: i64) -> Vec<Arc<Rule>> {
        let has_expired = self
            .published
            .load()
            .rules()
            .iter()
            .any(|rule| rule.is_expired(now));

        let mut expired = Vec::new();
        if has_expired {
            if let Ok(removed) = self.modify_published(|generation| Ok(generation.expire(now))) {
                expired = removed;
            }
        }
        if let Some(pending) = self.pending.as_mut() {
            expired.extend(pending.expire(now));
        }

        for rule in &expired {
            tracing::info!(rule = %rule.id(), mask = %rule.mask_text(), "Temporary rule expired");
            self.retire(Arc::clone(rule));
        }
        expired
    }

    fn retire(&mut self, rule: Arc<Rule>) {
        rule.mark_illegal();
        self.retired.push(rule);
    }

    /// Release retired rules with no remaining connections. A rule still
    /// reachable from an older generation snapshot or an unattached
    /// [`Admission`](crate::decision::Admission) can yet be attached, and is
    /// kept. Returns the number released.
    pub fn reap(&mut self) -> usize {
        let before = self.retired.len();
        self.retired
            .retain(|rule| rule.connections() > 0 || Arc::strong_count(rule) > 1);
        let reaped = before - self.retired.len();

        if reaped > 0 {
            tracing::debug!(reaped, remaining = self.retired.len(), "Reaped retired rules");
        }
        reaped
    }

    /// Retired rules not yet released by [`reap`](Self::reap)
    pub fn retired(&self) -> &[Arc<Rule>] {
        &self.retired
    }

    /// Look up a rule in force by category and mask
    pub fn find(&self, category: RuleCategory, mask: &str) -> Option<RuleId> {
        self.published
            .load()
            .find(category, mask)
            .map(|rule| rule.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn registration_publishes_immediately() {
        let mut registry = RuleRegistry::new(Default::default());
        let engine = registry.engine();
        let before = engine.generation().id();

        let id = registry
            .register(RuleSpec::new(RuleCategory::Client, "*@*"))
            .unwrap();
        assert_ne!(engine.generation().id(), before);
        assert!(engine.generation().rule(id).is_some());
    }

    #[test]
    fn pending_generation_is_invisible_until_committed() {
        let mut registry = RuleRegistry::new(Default::default());
        let engine = registry.engine();

        registry.begin_generation(Default::default()).unwrap();
        assert_eq!(
            registry.begin_generation(Default::default()),
            Err(RegistrationError::GenerationInProgress)
        );
        let id = registry
            .register(RuleSpec::new(RuleCategory::Client, "*@*"))
            .unwrap();
        assert!(engine.generation().rule(id).is_none());

        registry.commit_generation().unwrap();
        assert!(engine.generation().rule(id).is_some());
        assert_eq!(
            registry.commit_generation(),
            Err(RegistrationError::NoPendingGeneration)
        );
    }

    #[test]
    fn discarded_generation_leaves_current_in_force() {
        let mut registry = RuleRegistry::new(Default::default());
        let kept = registry
            .register(RuleSpec::new(RuleCategory::Client, "*@*"))
            .unwrap();

        registry.begin_generation(Default::default()).unwrap();
        registry
            .register(RuleSpec::new(RuleCategory::Kill, "*@*"))
            .unwrap();
        registry.discard_generation().unwrap();

        let current = registry.current();
        assert_eq!(current.rules().len(), 1);
        assert!(current.rule(kept).is_some());
        assert!(!current.rule(kept).unwrap().is_illegal());
    }

    #[test]
    fn failed_registration_changes_nothing() {
        let mut registry = RuleRegistry::new(Default::default());
        let before = registry.current().id();
        assert!(registry
            .register(RuleSpec::new(RuleCategory::Deny, "*.example.com"))
            .is_err());
        assert_eq!(registry.current().id(), before);
    }

    #[test]
    fn unregister_unknown_rule() {
        let mut registry = RuleRegistry::new(Default::default());
        assert_eq!(
            registry.unregister(RuleId::new(42)).unwrap_err(),
            RegistrationError::NoSuchRule(RuleId::new(42))
        );
    }

    #[test]
    fn expire_removes_from_published_generation() {
        let mut registry = RuleRegistry::new(Default::default());
        let id = registry
            .register(RuleSpec::new(RuleCategory::Kill, "*@bad.example").expires_at(100))
            .unwrap();

        assert!(registry.expire(50).is_empty());
        let expired = registry.expire(100);
        assert_eq!(expired.len(), 1);
        assert!(expired[0].is_illegal());
        assert!(registry.current().rule(id).is_none());
    }

    #[test]
    fn expire_prunes_published_generation_during_rehash() {
        let mut registry = RuleRegistry::new(Default::default());
        let id = registry
            .register(RuleSpec::new(RuleCategory::Kill, "*@bad.example").expires_at(100))
            .unwrap();

        registry.begin_generation(Default::default()).unwrap();
        registry
            .register(RuleSpec::new(RuleCategory::Kill, "*@worse.example").expires_at(100))
            .unwrap();

        let expired = registry.expire(100);
        assert_eq!(expired.len(), 2);
        assert!(registry.current().rule(id).is_none());
        assert!(registry.is_building());

        registry.commit_generation().unwrap();
        assert!(registry.current().rules().is_empty());
    }

    #[test]
    fn retired_rule_reachable_from_snapshot_is_kept_until_released() {
        let mut registry = RuleRegistry::new(Default::default());
        let engine = registry.engine();
        let id = registry
            .register(RuleSpec::new(RuleCategory::Client, "*@*"))
            .unwrap();
        let snapshot = engine.generation();

        registry.unregister(id).unwrap();
        assert_eq!(registry.retired().len(), 1);
        assert_eq!(registry.reap(), 0);

        let rule = Arc::clone(snapshot.rule(id).unwrap());
        drop(snapshot);
        rule.attach();
        drop(rule);
        assert_eq!(registry.reap(), 0);
        assert_eq!(registry.retired()[0].connections(), 1);

        registry.retired()[0].detach();
        assert_eq!(registry.reap(), 1);
        assert!(registry.retired().is_empty());
    }
}
