use super::RuleRegistry;
use crate::generation::StorageCounts;
use crate::id::*;
use crate::rule::*;

use itertools::Itertools;
use serde::Serialize;
use strum::IntoEnumIterator;

/// A registered rule, as shown to an administrator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleSummary {
    pub id: RuleId,
    pub category: RuleCategory,
    pub mask: String,
    pub reason: String,
    pub precedence: Precedence,
    pub expires: Option<i64>,
    pub flags: RuleFlags,
    pub connections: usize,
}

impl From<&Rule> for RuleSummary {
    fn from(rule: &Rule) -> Self {
        Self {
            id: rule.id(),
            category: rule.category(),
            mask: rule.mask_text(),
            reason: rule.reason().to_string(),
            precedence: rule.precedence(),
            expires: rule.expires(),
            flags: rule.flags(),
            connections: rule.connections(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCount {
    pub category: RuleCategory,
    pub rules: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistryStats {
    pub generation: GenerationId,
    pub rules: usize,
    pub by_category: Vec<CategoryCount>,
    pub storage: StorageCounts,
    pub classes: usize,
    /// Live connections attached to rules in force
    pub attached: usize,
    /// Rules no longer in force, kept for their live connections
    pub retired: usize,
}

impl RuleRegistry {
    /// Every rule in force, earliest registered first
    pub fn rules(&self) -> Vec<RuleSummary> {
        self.current()
            .rules()
            .iter()
            .sorted_by(|a, b| b.precedence().cmp(&a.precedence()))
            .map(|rule| RuleSummary::from(&**rule))
            .collect()
    }

    pub fn stats(&self) -> RegistryStats {
        let generation = self.current();

        RegistryStats {
            generation: generation.id(),
            rules: generation.rules().len(),
            by_category: RuleCategory::iter()
                .map(|category| CategoryCount {
                    category,
                    rules: generation
                        .rules()
                        .iter()
                        .filter(|rule| rule.category() == category)
                        .count(),
                })
                .collect(),
            storage: generation.storage(),
            classes: generation.classes().count(),
            attached: generation.rules().iter().map(|rule| rule.connections()).sum(),
            retired: self.retired().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn listing_is_in_registration_order() {
        let mut registry = RuleRegistry::new(Default::default());
        let masks = ["*@*.example.com", "Root@Shell.Example.com", "*@10.0.0.0/8"];
        registry.register(RuleSpec::new(RuleCategory::Client, masks[0])).unwrap();
        registry
            .register(RuleSpec::new(RuleCategory::Kill, masks[1]).with_reason("no shells"))
            .unwrap();
        registry.register(RuleSpec::new(RuleCategory::Deny, masks[2])).unwrap();

        let listed: Vec<_> = registry.rules().into_iter().map(|s| s.mask).collect();
        assert_eq!(listed, masks);
    }

    #[test]
    fn stats_count_by_category() {
        let mut registry = RuleRegistry::new(Default::default());
        registry.register(RuleSpec::new(RuleCategory::Client, "*@*")).unwrap();
        registry.register(RuleSpec::new(RuleCategory::Kill, "a@*")).unwrap();
        registry.register(RuleSpec::new(RuleCategory::Kill, "b@*")).unwrap();

        let stats = registry.stats();
        assert_eq!(stats.rules, 3);
        assert_eq!(stats.storage.wildcard, 3);
        assert_eq!(stats.classes, 1);
        let kills = stats
            .by_category
            .iter()
            .find(|c| c.category == RuleCategory::Kill)
            .unwrap();
        assert_eq!(kills.rules, 2);
        assert_eq!(stats.by_category.len(), 5);
    }
}
