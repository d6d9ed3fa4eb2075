//! Candidate collection and the override rules that pick one winner.
//!
//! A lookup for one [`Side`] of a decision walks the label trie from the most
//! specific level to the least specific, and then the fallback lists. Along the
//! way it collects at most one *found* candidate (an entry with a specific
//! username pattern) and every *wild* candidate (entries for `*@...`). The
//! winner is then settled as follows:
//!
//! 1. the found candidate if there is one, otherwise the most specific wild
//!    candidate;
//! 2. if that winner is a ban and any wild candidate, at any level, is an
//!    exemption, the exemption wins instead.
//!
//! An exemption that is itself the found candidate therefore beats any wild
//! ban, and a wildcard exemption reaches down to override more specific bans.

use crate::id::*;
use crate::rule::Rule;

/// Which half of the decision a lookup is resolving
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Looking for the Client rule that admits a connection
    Client,
    /// Looking for a local Kill, or an exemption from one
    Kill,
    /// Looking for a GlobalKill, or an exemption from one
    GlobalKill,
}

impl Side {
    pub const ALL: [Side; 3] = [Side::Client, Side::Kill, Side::GlobalKill];

    pub(crate) fn index(&self) -> usize {
        match self {
            Side::Client => 0,
            Side::Kill => 1,
            Side::GlobalKill => 2,
        }
    }
}

/// The part a rule plays for one side of a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Grant,
    Ban,
    Exempt,
}

/// A rule offered as a possible answer for one side of a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub rule: RuleId,
    pub role: Role,
    pub precedence: Precedence,
}

impl Candidate {
    pub fn for_rule(rule: &Rule, side: Side) -> Option<Self> {
        rule.role(side).map(|role| Self {
            rule: rule.id(),
            role,
            precedence: rule.precedence(),
        })
    }
}

/// Candidates collected during one lookup
#[derive(Debug, Default)]
pub struct CandidateSet {
    found: Option<Candidate>,
    wilds: Vec<Candidate>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a specific-user candidate from the label trie. Only the first
    /// (most specific) one offered is kept; less specific levels are not
    /// consulted once a level has produced one.
    pub fn offer_found(&mut self, candidate: Candidate) {
        if self.found.is_none() {
            self.found = Some(candidate);
        }
    }

    /// Offer a candidate with no structural specificity, such as a fallback
    /// list match or a Client address rule. It stands level with the trie's
    /// candidate, and the earlier registered of the two wins.
    pub fn offer_ranked(&mut self, candidate: Candidate) {
        match self.found {
            Some(existing) if existing.precedence >= candidate.precedence => {}
            _ => self.found = Some(candidate),
        }
    }

    /// Offer a wildcard-user candidate. These are kept from every level, most
    /// specific first, since an exemption among them can override a ban.
    pub fn offer_wild(&mut self, candidate: Candidate) {
        self.wilds.push(candidate);
    }

    /// Apply the override rules and return the winning candidate.
    pub fn settle(self) -> Option<Candidate> {
        let best = self.found.or_else(|| self.wilds.first().copied())?;

        if best.role == Role::Ban {
            if let Some(exemption) = self.wilds.iter().find(|c| c.role == Role::Exempt) {
                tracing::trace!(
                    "Wildcard exemption {} overrides ban {}",
                    exemption.rule,
                    best.rule
                );
                return Some(*exemption);
            }
        }

        Some(best)
    }
}
