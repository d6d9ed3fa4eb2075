//! Defines errors returned by the registration side of the engine.
//!
//! Lookups have no error type: every lookup ends in one of the
//! [`AccessDecision`](crate::decision::AccessDecision) outcomes.

use crate::id::RuleId;
use crate::rule::RuleCategory;
use thiserror::Error;

/// Reasons a rule can be refused at load or rehash time
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistrationError {
    #[error("Empty host or user pattern")]
    EmptyPattern,
    #[error("Malformed CIDR mask {0}")]
    MalformedCidr(String),
    #[error("A {category} rule must match an IP address or range, not {mask}")]
    NotAnAddress { category: RuleCategory, mask: String },
    #[error("Temporary rule has no expiry time")]
    MissingExpiry,
    #[error("{0} rules cannot be temporary")]
    NotTemporary(RuleCategory),
    #[error("No such connection class {0}")]
    UnknownClass(String),
    #[error("{mask} is already registered as {existing_category} (rule {existing})")]
    ConflictingCategory {
        existing: RuleId,
        existing_category: RuleCategory,
        mask: String,
    },
    #[error("Rule limit of {0} reached")]
    CapacityExceeded(usize),
    #[error("No such rule {0}")]
    NoSuchRule(RuleId),
    #[error("No generation is being built")]
    NoPendingGeneration,
    #[error("A generation is already being built")]
    GenerationInProgress,
}

/// Convenience definition of a Result type used when registering rules.
pub type RegistrationResult<T> = std::result::Result<T, RegistrationError>;
