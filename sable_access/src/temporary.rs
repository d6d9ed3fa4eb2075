//! Expiring Kill and GlobalKill rules.
//!
//! Temporary kills are searched before any persistent rule, in registration
//! order. An entry past its expiry time is never matched, but stays in the
//! list until the registry prunes it.

use crate::candidate::Side;
use crate::id::RuleId;
use crate::rule::{Rule, RuleArena};

use std::net::IpAddr;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct TemporaryList {
    entries: Vec<RuleId>,
}

impl TemporaryList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, rule: RuleId) {
        self.entries.push(rule);
    }

    pub fn remove(&mut self, rule: RuleId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|&r| r != rule);
        self.entries.len() != before
    }

    /// The first live temporary ban for `side` matching the client. Address
    /// masks are matched against `ip`, everything else against the host text.
    pub fn lookup<'a>(
        &self,
        arena: &'a RuleArena,
        side: Side,
        folded_host: &str,
        folded_user: &str,
        ip: &IpAddr,
        now: i64,
    ) -> Option<&'a Arc<Rule>> {
        self.entries
            .iter()
            .filter_map(|&id| arena.get(id))
            .filter(|rule| !rule.is_expired(now))
            .find(|rule| {
                rule.role(side).is_some()
                    && rule.matches_user(folded_user)
                    && (rule.matches_host(folded_host) || rule.matches_ip(ip))
            })
    }
}
