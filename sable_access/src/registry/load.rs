use super::RuleRegistry;
use crate::config::AccessConfig;
use crate::errors::*;
use crate::id::RuleId;
use crate::utils::now;

/// A rule that could not be loaded
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRule {
    /// Position of the entry in the rule file
    pub index: usize,
    pub mask: String,
    pub error: RegistrationError,
}

/// Outcome of loading a set of rules
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub loaded: Vec<RuleId>,
    pub skipped: Vec<SkippedRule>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }

    /// The capacity limit that stopped the load, if one did
    pub fn capacity_exceeded(&self) -> Option<usize> {
        self.skipped.iter().find_map(|skipped| match skipped.error {
            RegistrationError::CapacityExceeded(max) => Some(max),
            _ => None,
        })
    }
}

impl RuleRegistry {
    /// Define the classes and register the rules of a rule file, into the
    /// pending generation if one is being built. A rule that fails to
    /// register is logged and skipped; the rest still load.
    pub fn load(&mut self, config: &AccessConfig) -> LoadReport {
        let now = now();
        let mut report = LoadReport::default();

        for class in &config.classes {
            self.define_class(class.clone());
        }

        for (index, entry) in config.rules.iter().enumerate() {
            match self.register(entry.to_spec(now)) {
                Ok(id) => report.loaded.push(id),
                Err(error) => {
                    tracing::warn!(index, mask = %entry.mask, "Skipping rule: {}", error);
                    let stop = matches!(error, RegistrationError::CapacityExceeded(_));
                    report.skipped.push(SkippedRule {
                        index,
                        mask: entry.mask.clone(),
                        error,
                    });
                    if stop {
                        break;
                    }
                }
            }
        }

        report
    }

    /// Replace every rule with the contents of a rule file.
    ///
    /// The new generation is only published if every rule fit; on
    /// [`RegistrationError::CapacityExceeded`] it is discarded and the
    /// current rules stay in force. Other per-rule failures are reported but
    /// don't prevent the commit.
    pub fn rehash(&mut self, config: &AccessConfig) -> RegistrationResult<LoadReport> {
        self.begin_generation(config.settings())?;
        let report = self.load(config);

        if let Some(max) = report.capacity_exceeded() {
            tracing::error!(max, "Rule limit reached during rehash, keeping current rules");
            self.discard_generation()?;
            return Err(RegistrationError::CapacityExceeded(max));
        }

        self.commit_generation()?;
        tracing::info!(
            loaded = report.loaded.len(),
            skipped = report.skipped.len(),
            "Rehash complete"
        );
        Ok(report)
    }
}
