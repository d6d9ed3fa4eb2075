//! The decision entry points.
//!
//! [`MatchEngine`] is a cheap, cloneable handle onto the registry's currently
//! published [`Generation`]. Each call loads the generation once and works
//! against that snapshot, so a rehash landing mid-lookup is never observed.

use crate::candidate::*;
use crate::decision::*;
use crate::generation::Generation;
use crate::mask::LabelPath;
use crate::rule::*;
use crate::utils::{canonical_ip, now};

use arc_swap::ArcSwap;
use std::net::IpAddr;
use std::sync::Arc;

#[derive(Clone)]
pub struct MatchEngine {
    generation: Arc<ArcSwap<Generation>>,
}

impl std::fmt::Debug for MatchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("MatchEngine")
            .field("generation", &self.generation.load().id())
            .finish()
    }
}

/// One client being checked against one generation
struct Query<'a> {
    generation: &'a Generation,
    host: String,
    labels: LabelPath,
    user: String,
    ip: IpAddr,
    now: i64,
}

impl<'a> Query<'a> {
    fn rule(&self, candidate: Candidate) -> Option<Arc<Rule>> {
        self.generation.rule(candidate.rule).cloned()
    }

    /// Trie and fallback-list candidates for one side
    fn candidates(&self, side: Side, categories: &[RuleCategory]) -> CandidateSet {
        let generation = self.generation;
        let mut candidates = CandidateSet::new();

        generation
            .hosts()
            .lookup(&self.labels, &self.user, side, &mut candidates);
        for &category in categories {
            generation.lists(category).lookup(
                generation.rules(),
                side,
                &self.host,
                &self.user,
                &mut candidates,
            );
        }

        candidates
    }

    /// The address rule of `category` with the longest prefix containing the
    /// client's address, among live rules matching the username and `accept`
    fn cidr_by(&self, category: RuleCategory, accept: impl Fn(&Rule) -> bool) -> Option<Arc<Rule>> {
        let generation = self.generation;
        generation
            .cidrs()
            .get(category)
            .lookup_longest_by(self.ip, |id| {
                generation.rule(id).map_or(false, |r| {
                    !r.is_expired(self.now) && r.matches_user(&self.user) && accept(&**r)
                })
            })
            .and_then(|m| generation.rule(m.rule).cloned())
    }

    fn cidr(&self, category: RuleCategory) -> Option<Arc<Rule>> {
        self.cidr_by(category, |_| true)
    }

    /// The Client rule that admits the connection. An address rule stands
    /// level with the host trie's found candidate.
    fn client(&self) -> Option<Arc<Rule>> {
        let mut candidates = self.candidates(Side::Client, &[RuleCategory::Client]);
        if let Some(candidate) = self
            .cidr(RuleCategory::Client)
            .and_then(|rule| Candidate::for_rule(&rule, Side::Client))
        {
            candidates.offer_ranked(candidate);
        }

        candidates.settle().and_then(|candidate| self.rule(candidate))
    }

    /// The ban that applies for a kill side, unless the client is exempt
    fn ban(&self, side: Side, category: RuleCategory) -> Option<Arc<Rule>> {
        let settled = self
            .candidates(side, &[category, RuleCategory::Client])
            .settle();

        if let Some(exemption) = settled.filter(|c| c.role == Role::Exempt) {
            tracing::trace!(rule = %exemption.rule, ?side, "Client is exempt");
            return None;
        }
        if let Some(exemption) = self.cidr_by(RuleCategory::Client, |r| r.role(side) == Some(Role::Exempt)) {
            tracing::trace!(rule = %exemption.id(), ?side, "Client is exempt by address");
            return None;
        }

        let generation = self.generation;
        if let Some(temporary) = generation.temporary().lookup(
            generation.rules(),
            side,
            &self.host,
            &self.user,
            &self.ip,
            self.now,
        ) {
            return Some(Arc::clone(temporary));
        }

        match settled {
            Some(candidate) if candidate.role == Role::Ban => self.rule(candidate),
            _ => self.cidr(category),
        }
    }
}

fn resolve_ip_in(generation: &Generation, ip: IpAddr, now: i64) -> IpDecision {
    let live = |id| generation.rule(id).map_or(false, |r: &Arc<Rule>| !r.is_expired(now));

    let Some(deny) = generation
        .cidrs()
        .get(RuleCategory::Deny)
        .lookup_longest_by(ip, live)
    else {
        return IpDecision::Accept { exemption: None };
    };

    let exemption = generation
        .cidrs()
        .get(RuleCategory::ExemptDeny)
        .lookup_longest_by(ip, live)
        .filter(|exempt| exempt.depth >= deny.depth);

    match exemption {
        Some(exempt) => {
            tracing::trace!(deny = %deny.rule, exemption = %exempt.rule, "Deny overridden");
            IpDecision::Accept {
                exemption: generation.rule(exempt.rule).cloned(),
            }
        }
        None => match generation.rule(deny.rule) {
            Some(rule) => IpDecision::Deny(Rejection::new(Arc::clone(rule))),
            None => IpDecision::Accept { exemption: None },
        },
    }
}

impl MatchEngine {
    pub(crate) fn new(generation: Arc<ArcSwap<Generation>>) -> Self {
        Self { generation }
    }

    /// The generation lookups are currently answered from
    pub fn generation(&self) -> Arc<Generation> {
        self.generation.load_full()
    }

    /// Check a bare address against the Deny and ExemptDeny rules.
    pub fn resolve_ip(&self, ip: IpAddr) -> IpDecision {
        self.resolve_ip_at(ip, now())
    }

    #[tracing::instrument(skip(self))]
    pub fn resolve_ip_at(&self, ip: IpAddr, now: i64) -> IpDecision {
        let generation = self.generation.load();
        let decision = resolve_ip_in(&generation, canonical_ip(ip), now);
        tracing::debug!(accepted = decision.is_accepted(), "IP decision");
        decision
    }

    /// Full check of a connection whose identity is known. Without a
    /// hostname, host masks are matched against the textual address.
    pub fn resolve(&self, host: Option<&str>, user: &str, ip: IpAddr) -> AccessDecision {
        self.resolve_at(host, user, ip, now())
    }

    #[tracing::instrument(skip(self))]
    pub fn resolve_at(&self, host: Option<&str>, user: &str, ip: IpAddr, now: i64) -> AccessDecision {
        let generation = self.generation.load();
        let decision = Self::decide(&generation, host, user, canonical_ip(ip), now);

        match decision.rule() {
            Some(rule) => tracing::debug!(
                decision = decision.kind(),
                rule = %rule.id(),
                mask = %rule.mask_text(),
                "Access decision"
            ),
            None => tracing::debug!(decision = decision.kind(), "Access decision"),
        }
        decision
    }

    fn decide(generation: &Generation, host: Option<&str>, user: &str, ip: IpAddr, now: i64) -> AccessDecision {
        if let IpDecision::Deny(rejection) = resolve_ip_in(generation, ip, now) {
            return AccessDecision::Deny(rejection);
        }

        let host = match host {
            Some(host) => host.to_ascii_lowercase(),
            None => ip.to_string(),
        };
        let query = Query {
            generation,
            labels: LabelPath::from_hostname(&host),
            host,
            user: user.to_ascii_lowercase(),
            ip,
            now,
        };

        let Some(client) = query.client() else {
            return AccessDecision::NoMatch;
        };
        let admission = Admission::new(Arc::clone(&client), generation.class_for(&client));

        if client.flags().contains(RuleFlags::KILL_EXEMPT) {
            return AccessDecision::Admit(admission);
        }

        if let Some(kill) = query.ban(Side::Kill, RuleCategory::Kill) {
            return AccessDecision::Kill(Rejection::new(kill));
        }

        if generation.enforces(Side::GlobalKill) && !client.flags().contains(RuleFlags::GLINE_EXEMPT) {
            if let Some(gline) = query.ban(Side::GlobalKill, RuleCategory::GlobalKill) {
                return AccessDecision::GlobalKill(Rejection::new(gline));
            }
        }

        AccessDecision::Admit(admission)
    }
}
