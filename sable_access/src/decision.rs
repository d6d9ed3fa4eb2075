//! Outcomes of the matching engine.

use crate::rule::*;

use std::sync::Arc;

/// A connection admitted under a Client rule
#[derive(Debug, Clone)]
pub struct Admission {
    rule: Arc<Rule>,
    class: Arc<ConnectionClass>,
}

impl Admission {
    pub(crate) fn new(rule: Arc<Rule>, class: Arc<ConnectionClass>) -> Self {
        Self { rule, class }
    }

    /// The Client rule the connection matched
    pub fn rule(&self) -> &Arc<Rule> {
        &self.rule
    }

    pub fn class(&self) -> &Arc<ConnectionClass> {
        &self.class
    }

    pub fn flags(&self) -> RuleFlags {
        self.rule.flags()
    }

    /// Record a live connection against the admitting rule. The count is
    /// released when the returned guard is dropped.
    pub fn attach(&self) -> AttachedRule {
        self.rule.attach();
        AttachedRule {
            rule: Arc::clone(&self.rule),
        }
    }
}

/// Holds a live connection's reference on the rule that admitted it
#[derive(Debug)]
pub struct AttachedRule {
    rule: Arc<Rule>,
}

impl AttachedRule {
    pub fn rule(&self) -> &Arc<Rule> {
        &self.rule
    }
}

impl Drop for AttachedRule {
    fn drop(&mut self) {
        self.rule.detach();
    }
}

/// The rule responsible for turning a connection away
#[derive(Debug, Clone)]
pub struct Rejection {
    rule: Arc<Rule>,
}

impl Rejection {
    pub(crate) fn new(rule: Arc<Rule>) -> Self {
        Self { rule }
    }

    pub fn rule(&self) -> &Arc<Rule> {
        &self.rule
    }

    pub fn reason(&self) -> &str {
        self.rule.reason()
    }

    pub fn expires(&self) -> Option<i64> {
        self.rule.expires()
    }
}

/// Result of the address-only check made when a connection is accepted
#[derive(Debug, Clone)]
pub enum IpDecision {
    /// No Deny rule applies. `exemption` is the ExemptDeny rule that
    /// overrode one, if any.
    Accept { exemption: Option<Arc<Rule>> },
    Deny(Rejection),
}

impl IpDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accept { .. })
    }
}

/// Result of a full access check
#[derive(Debug, Clone)]
pub enum AccessDecision {
    Admit(Admission),
    Kill(Rejection),
    GlobalKill(Rejection),
    Deny(Rejection),
    /// No Client rule matches the connection
    NoMatch,
}

impl AccessDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admit(_))
    }

    pub fn admission(&self) -> Option<&Admission> {
        match self {
            Self::Admit(admission) => Some(admission),
            _ => None,
        }
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Kill(r) | Self::GlobalKill(r) | Self::Deny(r) => Some(r),
            Self::Admit(_) | Self::NoMatch => None,
        }
    }

    /// The rule behind the decision, if one was matched
    pub fn rule(&self) -> Option<&Arc<Rule>> {
        match self {
            Self::Admit(admission) => Some(admission.rule()),
            Self::Kill(r) | Self::GlobalKill(r) | Self::Deny(r) => Some(r.rule()),
            Self::NoMatch => None,
        }
    }

    /// Short name of the outcome, for logs and operator output
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Admit(_) => "admit",
            Self::Kill(_) => "kill",
            Self::GlobalKill(_) => "gline",
            Self::Deny(_) => "deny",
            Self::NoMatch => "no_match",
        }
    }
}
