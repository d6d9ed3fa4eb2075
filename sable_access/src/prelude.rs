//! Collects commonly-used names for convenient import

pub use crate::{
    config::{AccessConfig, ConfigError, FlagName, RuleEntry},
    decision::*,
    engine::MatchEngine,
    errors::*,
    generation::{Generation, GenerationSettings},
    id::*,
    registry::*,
    rule::{ConnectionClass, Rule, RuleCategory, RuleFlags, RuleSpec},
    types::Pattern,
};
