//! The rule model: what a registered access rule is, and how a registration
//! request is validated and compiled into one.

use crate::candidate::{Role, Side};
use crate::errors::*;
use crate::id::*;
use crate::mask::{self, LabelPath, Shape};
use crate::types::Pattern;

use bitflags::bitflags;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

mod arena;
pub use arena::*;

mod class;
pub use class::*;

/// The kinds of administrative rule
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RuleCategory {
    /// Grants a matching client permission to connect, under a connection class
    Client,
    /// Rejects a matching client (locally enforced)
    Kill,
    /// Rejects a raw IP address before its identity is known
    Deny,
    /// Overrides Deny matches for addresses, and Kill/GlobalKill matches for
    /// host masks
    #[serde(rename = "exempt")]
    #[strum(serialize = "exempt")]
    ExemptDeny,
    /// Network-wide kill, enforced only while global kills are enabled
    #[serde(rename = "gline")]
    #[strum(serialize = "gline")]
    GlobalKill,
}

impl RuleCategory {
    /// Whether rules of this category may carry an expiry time
    pub fn can_expire(&self) -> bool {
        matches!(self, Self::Kill | Self::GlobalKill | Self::Deny)
    }
}

bitflags! {
    /// Attribute flags carried by a rule
    #[derive(Default, Serialize, Deserialize)]
    pub struct RuleFlags : u32
    {
        /// Matching clients are exempt from Kill and GlobalKill rules
        const KILL_EXEMPT = 0x01;
        /// Matching clients are exempt from GlobalKill rules
        const GLINE_EXEMPT = 0x02;
        /// Clients must have a verified ident response
        const NEED_IDENT = 0x04;
        /// Don't prefix unverified usernames with `~`
        const NO_TILDE = 0x08;
        /// The rule expires at a fixed time
        const TEMPORARY = 0x10;
    }
}

/// Where a rule's host mask is stored
#[derive(Debug, Clone, PartialEq)]
pub enum HostMask {
    Cidr(IpNet),
    Labels(LabelPath),
    Unsortable(Pattern),
    WildcardOnly,
}

/// A registration request, as handed over by the config loader or an
/// operator command.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSpec {
    pub category: RuleCategory,
    pub user: String,
    pub host: String,
    pub reason: String,
    pub class: Option<String>,
    pub flags: RuleFlags,
    pub expires: Option<i64>,
}

impl RuleSpec {
    /// Build a spec from a `user@host` mask. A mask without `@` applies to
    /// any username.
    pub fn new(category: RuleCategory, mask: &str) -> Self {
        let (user, host) = match mask.rsplit_once('@') {
            Some((user, host)) => (user, host),
            None => ("*", mask),
        };
        Self {
            category,
            user: user.trim().to_string(),
            host: host.trim().to_string(),
            reason: String::new(),
            class: None,
            flags: RuleFlags::empty(),
            expires: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    pub fn with_flags(mut self, flags: RuleFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn expires_at(mut self, timestamp: i64) -> Self {
        self.expires = Some(timestamp);
        self.flags |= RuleFlags::TEMPORARY;
        self
    }

    /// The normalised `user@host` text of this spec
    pub fn mask(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// Validate the request and compile its masks.
    pub(crate) fn compile(self, id: RuleId, precedence: Precedence) -> RegistrationResult<Rule> {
        if self.host.is_empty() || self.user.is_empty() {
            return Err(RegistrationError::EmptyPattern);
        }

        let mask = match mask::parse_cidr(&self.host)? {
            Some(net) => HostMask::Cidr(net),
            None if self.category == RuleCategory::Deny => {
                return Err(RegistrationError::NotAnAddress {
                    category: self.category,
                    mask: self.host,
                });
            }
            None => match mask::classify(&self.host) {
                Shape::WildcardOnly => HostMask::WildcardOnly,
                Shape::Sortable(path) => HostMask::Labels(path),
                Shape::Unsortable => HostMask::Unsortable(Pattern::new(&self.host)),
            },
        };

        let mut flags = self.flags;
        match self.expires {
            Some(_) if !self.category.can_expire() => {
                return Err(RegistrationError::NotTemporary(self.category))
            }
            Some(_) => flags |= RuleFlags::TEMPORARY,
            None if flags.contains(RuleFlags::TEMPORARY) => {
                return Err(RegistrationError::MissingExpiry)
            }
            None => {}
        }

        let class = match self.category {
            RuleCategory::Client => self.class,
            _ => None,
        };

        Ok(Rule {
            id,
            category: self.category,
            host_pattern: Pattern::new(&self.host),
            host: self.host,
            user: Pattern::new(&self.user),
            user_text: self.user,
            mask,
            reason: self.reason,
            class,
            flags,
            expires: self.expires,
            precedence,
            connections: AtomicUsize::new(0),
            illegal: AtomicBool::new(false),
        })
    }
}

/// A registered rule.
///
/// Immutable once registered, apart from the count of live connections
/// attached to it and the flag marking it as no longer part of any published
/// generation.
#[derive(Debug)]
pub struct Rule {
    id: RuleId,
    category: RuleCategory,
    host: String,
    host_pattern: Pattern,
    user_text: String,
    user: Pattern,
    mask: HostMask,
    reason: String,
    class: Option<String>,
    flags: RuleFlags,
    expires: Option<i64>,
    precedence: Precedence,

    connections: AtomicUsize,
    illegal: AtomicBool,
}

impl Rule {
    pub fn id(&self) -> RuleId {
        self.id
    }

    pub fn category(&self) -> RuleCategory {
        self.category
    }

    /// The host mask as it was registered
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn host_pattern(&self) -> &Pattern {
        &self.host_pattern
    }

    pub fn user(&self) -> &Pattern {
        &self.user
    }

    pub fn host_mask(&self) -> &HostMask {
        &self.mask
    }

    /// `user@host`, exactly as registered
    pub fn mask_text(&self) -> String {
        format!("{}@{}", self.user_text, self.host)
    }

    pub fn cidr(&self) -> Option<&IpNet> {
        match &self.mask {
            HostMask::Cidr(net) => Some(net),
            _ => None,
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn class_name(&self) -> Option<&str> {
        self.class.as_deref()
    }

    pub fn flags(&self) -> RuleFlags {
        self.flags
    }

    pub fn expires(&self) -> Option<i64> {
        self.expires
    }

    pub fn is_temporary(&self) -> bool {
        self.expires.is_some()
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expires.map_or(false, |expires| expires <= now)
    }

    pub fn precedence(&self) -> Precedence {
        self.precedence
    }

    /// Whether the host mask matches a casefolded host string. Address masks
    /// never match textually; they are matched with [`Rule::matches_ip`].
    pub fn matches_host(&self, folded_host: &str) -> bool {
        match &self.mask {
            HostMask::Cidr(_) => false,
            HostMask::WildcardOnly => true,
            HostMask::Labels(_) | HostMask::Unsortable(_) => {
                self.host_pattern.matches_folded(folded_host)
            }
        }
    }

    pub fn matches_ip(&self, ip: &IpAddr) -> bool {
        match &self.mask {
            HostMask::Cidr(net) => net.contains(ip),
            _ => false,
        }
    }

    /// Whether the username matches; `folded_user` must already be casefolded
    pub fn matches_user(&self, folded_user: &str) -> bool {
        self.user.matches_folded(folded_user)
    }

    /// The part this rule plays when resolving the given side of a decision,
    /// if any.
    pub fn role(&self, side: Side) -> Option<Role> {
        use RuleCategory::*;

        match (side, self.category) {
            (Side::Client, Client) => Some(Role::Grant),
            (Side::Kill, Kill) | (Side::GlobalKill, GlobalKill) => Some(Role::Ban),
            (Side::Kill | Side::GlobalKill, ExemptDeny) => Some(Role::Exempt),
            (Side::Kill, Client) if self.flags.contains(RuleFlags::KILL_EXEMPT) => {
                Some(Role::Exempt)
            }
            (Side::GlobalKill, Client)
                if self
                    .flags
                    .intersects(RuleFlags::KILL_EXEMPT | RuleFlags::GLINE_EXEMPT) =>
            {
                Some(Role::Exempt)
            }
            _ => None,
        }
    }

    /// Number of live connections admitted under this rule
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::Acquire)
    }

    pub(crate) fn attach(&self) {
        self.connections.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn detach(&self) {
        self.connections.fetch_sub(1, Ordering::AcqRel);
    }

    /// Whether the rule has been removed from the published rule set
    pub fn is_illegal(&self) -> bool {
        self.illegal.load(Ordering::Acquire)
    }

    pub(crate) fn mark_illegal(&self) {
        self.illegal.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(spec: RuleSpec) -> RegistrationResult<Rule> {
        let mut ids = RuleIdGenerator::new();
        spec.compile(ids.next_rule(), ids.next_precedence())
    }

    #[test]
    fn mask_without_user_applies_to_everyone() {
        let spec = RuleSpec::new(RuleCategory::Kill, "bad.example.com");
        assert_eq!(spec.user, "*");
        assert_eq!(spec.host, "bad.example.com");
        assert_eq!(spec.mask(), "*@bad.example.com");
    }

    #[test]
    fn deny_requires_an_address() {
        let err = compile(RuleSpec::new(RuleCategory::Deny, "*.example.com")).unwrap_err();
        assert!(matches!(err, RegistrationError::NotAnAddress { .. }));

        let rule = compile(RuleSpec::new(RuleCategory::Deny, "10.0.0.0/8")).unwrap();
        assert!(rule.cidr().is_some());
    }

    #[test]
    fn empty_patterns_are_rejected() {
        assert_eq!(
            compile(RuleSpec::new(RuleCategory::Kill, "@host")).unwrap_err(),
            RegistrationError::EmptyPattern
        );
        assert_eq!(
            compile(RuleSpec::new(RuleCategory::Kill, "user@")).unwrap_err(),
            RegistrationError::EmptyPattern
        );
    }

    #[test]
    fn expiry_rules() {
        let spec = RuleSpec::new(RuleCategory::Client, "*@*").expires_at(100);
        assert_eq!(
            compile(spec).unwrap_err(),
            RegistrationError::NotTemporary(RuleCategory::Client)
        );

        let spec = RuleSpec::new(RuleCategory::Kill, "*@*").with_flags(RuleFlags::TEMPORARY);
        assert_eq!(compile(spec).unwrap_err(), RegistrationError::MissingExpiry);

        let rule = compile(RuleSpec::new(RuleCategory::Kill, "*@*").expires_at(100)).unwrap();
        assert!(rule.is_temporary());
        assert!(rule.is_expired(100));
        assert!(!rule.is_expired(99));
    }

    #[test]
    fn roles_per_side() {
        let exempt_client = compile(
            RuleSpec::new(RuleCategory::Client, "*@*.example.com")
                .with_flags(RuleFlags::KILL_EXEMPT),
        )
        .unwrap();
        assert_eq!(exempt_client.role(Side::Client), Some(Role::Grant));
        assert_eq!(exempt_client.role(Side::Kill), Some(Role::Exempt));
        assert_eq!(exempt_client.role(Side::GlobalKill), Some(Role::Exempt));

        let gline_exempt = compile(
            RuleSpec::new(RuleCategory::Client, "*@*").with_flags(RuleFlags::GLINE_EXEMPT),
        )
        .unwrap();
        assert_eq!(gline_exempt.role(Side::Kill), None);
        assert_eq!(gline_exempt.role(Side::GlobalKill), Some(Role::Exempt));

        let kill = compile(RuleSpec::new(RuleCategory::Kill, "root@*")).unwrap();
        assert_eq!(kill.role(Side::Client), None);
        assert_eq!(kill.role(Side::Kill), Some(Role::Ban));
        assert_eq!(kill.role(Side::GlobalKill), None);
    }

    #[test]
    fn class_is_only_kept_for_client_rules() {
        let rule = compile(RuleSpec::new(RuleCategory::Kill, "*@*").with_class("users")).unwrap();
        assert_eq!(rule.class_name(), None);
    }
}
