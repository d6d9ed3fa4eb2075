//! Defines the identifier types handed out by the rule registry

use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Stable identifier of a registered rule. Tries and lists refer to rules only
/// by this id; the rule itself lives in the generation's arena.
#[derive(Debug, Eq, PartialEq, Ord, PartialOrd, Clone, Copy, Hash, Serialize, Deserialize)]
pub struct RuleId(u64);

impl RuleId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }
}

impl Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Tie-break ordering between otherwise equal rules.
///
/// Values are assigned from a decreasing counter, so a higher precedence means
/// the rule was registered earlier, and wins.
#[derive(Debug, Eq, PartialEq, Ord, PartialOrd, Clone, Copy, Hash, Serialize, Deserialize)]
pub struct Precedence(u64);

impl Precedence {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Identifies one published (or pending) set of rules
#[derive(Debug, Eq, PartialEq, Ord, PartialOrd, Clone, Copy, Hash, Serialize, Deserialize)]
pub struct GenerationId(u64);

impl GenerationId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }
}

impl Display for GenerationId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "gen-{}", self.0)
    }
}

/// Hands out rule ids, precedence values and generation ids.
///
/// Ids are never reused, even across generations.
#[derive(Debug)]
pub struct RuleIdGenerator {
    next_rule: u64,
    next_precedence: u64,
    next_generation: u64,
}

impl RuleIdGenerator {
    pub fn new() -> Self {
        Self {
            next_rule: 1,
            next_precedence: u64::MAX,
            next_generation: 1,
        }
    }

    pub fn next_rule(&mut self) -> RuleId {
        let id = RuleId(self.next_rule);
        self.next_rule += 1;
        id
    }

    pub fn next_precedence(&mut self) -> Precedence {
        let precedence = Precedence(self.next_precedence);
        self.next_precedence = self.next_precedence.saturating_sub(1);
        precedence
    }

    pub fn next_generation(&mut self) -> GenerationId {
        let id = GenerationId(self.next_generation);
        self.next_generation += 1;
        id
    }
}

impl Default for RuleIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
