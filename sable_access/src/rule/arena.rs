use super::Rule;
use crate::id::RuleId;

use std::collections::HashMap;
use std::sync::Arc;

/// Owns every rule of a generation, indexed by id.
///
/// The lookup structures hold only [`RuleId`]s and resolve them here. Rules
/// are shared between a generation and the copies made from it, so a rule
/// carried over unchanged keeps its connection count.
#[derive(Debug, Clone, Default)]
pub struct RuleArena {
    rules: HashMap<RuleId, Arc<Rule>>,
}

impl RuleArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: RuleId) -> Option<&Arc<Rule>> {
        self.rules.get(&id)
    }

    pub fn contains(&self, id: RuleId) -> bool {
        self.rules.contains_key(&id)
    }

    pub(crate) fn insert(&mut self, rule: Arc<Rule>) {
        self.rules.insert(rule.id(), rule);
    }

    pub(crate) fn remove(&mut self, id: RuleId) -> Option<Arc<Rule>> {
        self.rules.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Rule>> {
        self.rules.values()
    }
}
