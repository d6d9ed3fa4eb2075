//! Linear rule lists for host masks the label trie can't index.
//!
//! Masks such as `irc?.example.com` or `foo*.example.com` can only be matched
//! by trying each one in turn, and the bare `*` mask matches every host. Both
//! kinds are kept in registration order, and searched after the trie.

use crate::candidate::*;
use crate::id::RuleId;
use crate::rule::{HostMask, Rule, RuleArena};

/// Rules searched by scanning, in registration order
#[derive(Debug, Clone, Default)]
pub struct PatternList {
    entries: Vec<RuleId>,
}

impl PatternList {
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

    pub fn iter(&self) -> impl Iterator<Item = RuleId> + '_ {
        self.entries.iter().copied()
    }

    /// The first rule in list order that plays a part for `side` and matches
    /// the given casefolded host and username.
    pub fn first_match<'a>(
        &self,
        arena: &'a RuleArena,
        side: Side,
        folded_host: &str,
        folded_user: &str,
    ) -> Option<&'a Rule> {
        self.entries
            .iter()
            .filter_map(|&id| arena.get(id))
            .find(|rule| {
                rule.role(side).is_some()
                    && rule.matches_host(folded_host)
                    && rule.matches_user(folded_user)
            })
            .map(|rule| &**rule)
    }
}

/// The unsortable and wildcard-only lists for one group of categories
#[derive(Debug, Clone, Default)]
pub struct FallbackLists {
    unsortable: PatternList,
    wildcard: PatternList,
}

impl FallbackLists {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unsortable(&self) -> &PatternList {
        &self.unsortable
    }

    pub fn wildcard(&self) -> &PatternList {
        &self.wildcard
    }

    pub fn len(&self) -> usize {
        self.unsortable.len() + self.wildcard.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unsortable.is_empty() && self.wildcard.is_empty()
    }

    fn list_for(&mut self, rule: &Rule) -> Option<&mut PatternList> {
        match rule.host_mask() {
            HostMask::Unsortable(_) => Some(&mut self.unsortable),
            HostMask::WildcardOnly => Some(&mut self.wildcard),
            HostMask::Cidr(_) | HostMask::Labels(_) => None,
        }
    }

    /// Add a rule, if its host mask belongs in one of the lists.
    pub fn insert(&mut self, rule: &Rule) -> bool {
        match self.list_for(rule) {
            Some(list) => {
                list.insert(rule.id());
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, rule: &Rule) -> bool {
        self.list_for(rule)
            .map_or(false, |list| list.remove(rule.id()))
    }

    /// Offer the first match from each list.
    ///
    /// A match with a specific username stands level with the trie's found
    /// candidate; one for any username is a wild candidate, and ranks below
    /// every wild candidate the trie produced.
    pub fn lookup(
        &self,
        arena: &RuleArena,
        side: Side,
        folded_host: &str,
        folded_user: &str,
        candidates: &mut CandidateSet,
    ) {
        for list in [&self.unsortable, &self.wildcard] {
            let Some(rule) = list.first_match(arena, side, folded_host, folded_user) else {
                continue;
            };
            let Some(candidate) = Candidate::for_rule(rule, side) else {
                continue;
            };

            if rule.user().is_wildcard_only() {
                candidates.offer_wild(candidate);
            } else {
                candidates.offer_ranked(candidate);
            }
        }
    }
}
