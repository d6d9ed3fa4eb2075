//! Rule file definitions.
//!
//! The engine itself is agnostic to file syntax; this module defines the JSON
//! rule file used by the server binary and its tests, and turns its entries
//! into [`RuleSpec`]s.

use crate::generation::GenerationSettings;
use crate::rule::*;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::{fs::File, io::BufReader, path::Path, path::PathBuf};

/// Attribute flags as they are named in a rule file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagName {
    KillExempt,
    GlineExempt,
    NeedIdent,
    NoTilde,
}

impl FlagName {
    pub fn flag(&self) -> RuleFlags {
        match self {
            Self::KillExempt => RuleFlags::KILL_EXEMPT,
            Self::GlineExempt => RuleFlags::GLINE_EXEMPT,
            Self::NeedIdent => RuleFlags::NEED_IDENT,
            Self::NoTilde => RuleFlags::NO_TILDE,
        }
    }
}

/// A single rule as written in a rule file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleEntry {
    pub category: RuleCategory,
    /// `user@host`, or a bare host mask applying to any username
    pub mask: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub flags: Vec<FlagName>,
    /// Lifetime in seconds, for temporary rules
    #[serde(default)]
    pub duration: Option<i64>,
}

impl RuleEntry {
    pub fn new(category: RuleCategory, mask: impl Into<String>) -> Self {
        Self {
            category,
            mask: mask.into(),
            reason: String::new(),
            class: None,
            flags: Vec::new(),
            duration: None,
        }
    }

    /// Build the registration request for this entry. Durations are counted
    /// from `now`.
    pub fn to_spec(&self, now: i64) -> RuleSpec {
        let flags = self
            .flags
            .iter()
            .fold(RuleFlags::empty(), |flags, name| flags | name.flag());

        let mut spec = RuleSpec::new(self.category, &self.mask)
            .with_reason(self.reason.clone())
            .with_flags(flags);
        if let Some(class) = &self.class {
            spec = spec.with_class(class.clone());
        }
        if let Some(duration) = self.duration {
            spec = spec.expires_at(now.saturating_add(duration));
        }
        spec
    }
}

fn default_global_kills() -> bool {
    true
}

/// Contents of a rule file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessConfig {
    #[serde(default = "default_global_kills")]
    pub global_kills: bool,
    #[serde(default)]
    pub max_rules: Option<usize>,
    #[serde(default)]
    pub classes: Vec<ConnectionClass>,
    #[serde(default)]
    pub rules: Vec<RuleEntry>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            global_kills: default_global_kills(),
            max_rules: None,
            classes: Vec::new(),
            rules: Vec::new(),
        }
    }
}

/// Errors that could happen when loading a rule file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error on {1}: {0}")]
    IoError(std::io::Error, PathBuf),
    #[error("JSON parse error in {1}: {0}")]
    JsonError(serde_json::Error, PathBuf),
}

impl AccessConfig {
    /// Load a rule file from a given file path
    pub fn load_file<P: AsRef<Path> + Copy>(filename: P) -> Result<Self, ConfigError> {
        let file = File::open(filename)
            .map_err(|e| ConfigError::IoError(e, filename.as_ref().to_owned()))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader)
            .map_err(|e| ConfigError::JsonError(e, filename.as_ref().to_owned()))
    }

    pub fn settings(&self) -> GenerationSettings {
        GenerationSettings {
            global_kills: self.global_kills,
            max_rules: self.max_rules,
        }
    }
}
