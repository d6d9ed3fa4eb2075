use sable_access::prelude::*;
use std::net::IpAddr;

pub fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

pub fn empty_registry() -> RuleRegistry {
    RuleRegistry::new(GenerationSettings::default())
}

pub fn register(registry: &mut RuleRegistry, category: RuleCategory, mask: &str) -> RuleId {
    registry.register(RuleSpec::new(category, mask)).unwrap()
}

/// The kind of a decision and the mask of the rule behind it, for comparing
/// outcomes
pub fn outcome(decision: &AccessDecision) -> (&'static str, Option<String>) {
    (decision.kind(), decision.rule().map(|rule| rule.mask_text()))
}

/// A fixed set of connections to probe a rule set with
pub fn probes() -> Vec<(Option<&'static str>, &'static str, IpAddr)> {
    vec![
        (Some("shell.example.com"), "root", ip("10.1.2.3")),
        (Some("shell.example.com"), "bob", ip("10.1.2.3")),
        (Some("irc.example.com"), "evil", ip("192.0.2.10")),
        (Some("irc1.example.org"), "alice", ip("198.51.100.1")),
        (None, "nobody", ip("203.0.113.9")),
        (Some("host.example.net"), "~user", ip("2001:db8::1")),
    ]
}

pub fn probe_outcomes(engine: &MatchEngine, now: i64) -> Vec<(&'static str, Option<String>)> {
    probes()
        .into_iter()
        .map(|(host, user, ip)| outcome(&engine.resolve_at(host, user, ip, now)))
        .collect()
}
