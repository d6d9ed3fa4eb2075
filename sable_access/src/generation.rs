//! A complete, self-contained set of rules and the structures indexing them.
//!
//! Readers only ever see a published [`Generation`] through an `Arc`, and a
//! published generation is never modified. Every change, whether a single
//! registration or a full rehash, builds a new generation and swaps it in.

use crate::candidate::Side;
use crate::cidr_trie::CidrTrie;
use crate::errors::*;
use crate::fallback::FallbackLists;
use crate::id::*;
use crate::label_trie::HostLabelTrie;
use crate::rule::*;
use crate::temporary::TemporaryList;

use std::collections::HashMap;
use std::sync::Arc;

/// Administrative switches that apply to a whole generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationSettings {
    /// Whether GlobalKill rules are enforced
    pub global_kills: bool,
    /// Maximum number of rules the generation will accept
    pub max_rules: Option<usize>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            global_kills: true,
            max_rules: None,
        }
    }
}

/// One address trie per rule category
#[derive(Debug, Clone, Default)]
pub struct CidrTries {
    client: CidrTrie,
    kill: CidrTrie,
    deny: CidrTrie,
    exempt_deny: CidrTrie,
    global_kill: CidrTrie,
}

impl CidrTries {
    pub fn get(&self, category: RuleCategory) -> &CidrTrie {
        match category {
            RuleCategory::Client => &self.client,
            RuleCategory::Kill => &self.kill,
            RuleCategory::Deny => &self.deny,
            RuleCategory::ExemptDeny => &self.exempt_deny,
            RuleCategory::GlobalKill => &self.global_kill,
        }
    }

    fn get_mut(&mut self, category: RuleCategory) -> &mut CidrTrie {
        match category {
            RuleCategory::Client => &mut self.client,
            RuleCategory::Kill => &mut self.kill,
            RuleCategory::Deny => &mut self.deny,
            RuleCategory::ExemptDeny => &mut self.exempt_deny,
            RuleCategory::GlobalKill => &mut self.global_kill,
        }
    }

    pub fn len(&self) -> usize {
        self.client.len()
            + self.kill.len()
            + self.deny.len()
            + self.exempt_deny.len()
            + self.global_kill.len()
    }
}

/// Where a rule has been stored within a generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Cidr,
    Labels,
    ClientList,
    KillList,
    Temporary,
}

#[derive(Debug, Clone)]
pub struct Generation {
    id: GenerationId,
    settings: GenerationSettings,
    rules: RuleArena,
    classes: HashMap<String, Arc<ConnectionClass>>,

    cidrs: CidrTries,
    hosts: HostLabelTrie,
    client_lists: FallbackLists,
    kill_lists: FallbackLists,
    temporary: TemporaryList,
}

impl Generation {
    /// An empty generation, holding only the default connection class
    pub fn new(id: GenerationId, settings: GenerationSettings) -> Self {
        let mut classes = HashMap::new();
        classes.insert(
            ConnectionClass::DEFAULT_NAME.to_string(),
            Arc::new(ConnectionClass::default()),
        );

        Self {
            id,
            settings,
            rules: RuleArena::new(),
            classes,
            cidrs: CidrTries::default(),
            hosts: HostLabelTrie::new(),
            client_lists: FallbackLists::new(),
            kill_lists: FallbackLists::new(),
            temporary: TemporaryList::new(),
        }
    }

    /// A copy of this generation under a new id, sharing its rules
    pub(crate) fn successor(&self, id: GenerationId) -> Self {
        Self { id, ..self.clone() }
    }

    pub fn id(&self) -> GenerationId {
        self.id
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    pub(crate) fn set_settings(&mut self, settings: GenerationSettings) {
        self.settings = settings;
    }

    pub fn rules(&self) -> &RuleArena {
        &self.rules
    }

    pub fn rule(&self, id: RuleId) -> Option<&Arc<Rule>> {
        self.rules.get(id)
    }

    pub fn classes(&self) -> impl Iterator<Item = &Arc<ConnectionClass>> {
        self.classes.values()
    }

    pub fn class(&self, name: &str) -> Option<&Arc<ConnectionClass>> {
        self.classes.get(name)
    }

    /// The class a Client rule admits under
    pub fn class_for(&self, rule: &Rule) -> Arc<ConnectionClass> {
        rule.class_name()
            .and_then(|name| self.classes.get(name))
            .or_else(|| self.classes.get(ConnectionClass::DEFAULT_NAME))
            .cloned()
            .unwrap_or_default()
    }

    /// Define or replace a connection class
    pub(crate) fn define_class(&mut self, class: ConnectionClass) {
        self.classes.insert(class.name.clone(), Arc::new(class));
    }

    pub fn cidrs(&self) -> &CidrTries {
        &self.cidrs
    }

    pub fn hosts(&self) -> &HostLabelTrie {
        &self.hosts
    }

    /// The fallback lists searched for the given category's rules
    pub fn lists(&self, category: RuleCategory) -> &FallbackLists {
        match category {
            RuleCategory::Client => &self.client_lists,
            RuleCategory::Kill
            | RuleCategory::GlobalKill
            | RuleCategory::Deny
            | RuleCategory::ExemptDeny => &self.kill_lists,
        }
    }

    pub fn temporary(&self) -> &TemporaryList {
        &self.temporary
    }

    /// Find a rule of the given category whose normalised mask matches
    /// `mask`, ignoring case.
    pub fn find(&self, category: RuleCategory, mask: &str) -> Option<&Arc<Rule>> {
        let wanted = RuleSpec::new(category, mask).mask();
        self.rules
            .iter()
            .filter(|rule| rule.category() == category)
            .filter(|rule| rule.mask_text().eq_ignore_ascii_case(&wanted))
            .max_by_key(|rule| rule.precedence())
    }

    fn placement(rule: &Rule) -> Placement {
        if rule.is_temporary() && matches!(rule.category(), RuleCategory::Kill | RuleCategory::GlobalKill) {
            return Placement::Temporary;
        }
        match (rule.host_mask(), rule.category()) {
            (HostMask::Cidr(_), _) => Placement::Cidr,
            (HostMask::Labels(_), _) => Placement::Labels,
            (_, RuleCategory::Client) => Placement::ClientList,
            (_, _) => Placement::KillList,
        }
    }

    fn check_conflicts(&self, rule: &Rule) -> RegistrationResult<()> {
        let opposite = match rule.category() {
            RuleCategory::Deny => RuleCategory::ExemptDeny,
            RuleCategory::ExemptDeny => RuleCategory::Deny,
            _ => return Ok(()),
        };
        let Some(net) = rule.cidr() else {
            return Ok(());
        };

        match self
            .rules
            .iter()
            .find(|r| r.category() == opposite && r.cidr() == Some(net))
        {
            Some(existing) => Err(RegistrationError::ConflictingCategory {
                existing: existing.id(),
                existing_category: opposite,
                mask: rule.mask_text(),
            }),
            None => Ok(()),
        }
    }

    /// Add a compiled rule, routing it to the structure its mask and category
    /// call for.
    pub(crate) fn insert(&mut self, rule: Rule) -> RegistrationResult<Arc<Rule>> {
        if let Some(max) = self.settings.max_rules {
            if self.rules.len() >= max {
                return Err(RegistrationError::CapacityExceeded(max));
            }
        }

        if rule.category() == RuleCategory::Client {
            let class = rule.class_name().unwrap_or(ConnectionClass::DEFAULT_NAME);
            if !self.classes.contains_key(class) {
                return Err(RegistrationError::UnknownClass(class.to_string()));
            }
        }

        self.check_conflicts(&rule)?;

        let rule = Arc::new(rule);
        let id = rule.id();
        self.rules.insert(Arc::clone(&rule));

        match (Self::placement(&rule), rule.host_mask()) {
            (Placement::Temporary, _) => self.temporary.insert(id),
            (Placement::Cidr, HostMask::Cidr(net)) => self.cidrs.get_mut(rule.category()).insert(net, id),
            (Placement::Labels, HostMask::Labels(path)) => {
                self.hosts.insert(path, rule.user(), id, &self.rules)
            }
            (Placement::ClientList, _) => {
                self.client_lists.insert(&rule);
            }
            (Placement::KillList, _) => {
                self.kill_lists.insert(&rule);
            }
            (_, _) => {}
        }

        tracing::trace!(rule = %id, placement = ?Self::placement(&rule), "Stored rule");
        Ok(rule)
    }

    /// Remove a rule from the generation, returning it if it was present.
    pub(crate) fn remove(&mut self, id: RuleId) -> Option<Arc<Rule>> {
        let rule = Arc::clone(self.rules.get(id)?);

        let removed = match (Self::placement(&rule), rule.host_mask()) {
            (Placement::Temporary, _) => self.temporary.remove(id),
            (Placement::Cidr, HostMask::Cidr(net)) => self.cidrs.get_mut(rule.category()).remove(net, id),
            (Placement::Labels, HostMask::Labels(path)) => {
                self.hosts.remove(path, rule.user(), id, &self.rules)
            }
            (Placement::ClientList, _) => self.client_lists.remove(&rule),
            (Placement::KillList, _) => self.kill_lists.remove(&rule),
            (_, _) => false,
        };
        if !removed {
            tracing::warn!(rule = %id, "Rule was missing from its lookup structure");
        }

        self.rules.remove(id)
    }

    /// Remove every temporary rule whose expiry time has passed.
    pub(crate) fn expire(&mut self, now: i64) -> Vec<Arc<Rule>> {
        let expired: Vec<RuleId> = self
            .rules
            .iter()
            .filter(|rule| rule.is_expired(now))
            .map(|rule| rule.id())
            .collect();

        expired.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    /// Number of rules held in each kind of lookup structure
    pub fn storage(&self) -> StorageCounts {
        StorageCounts {
            cidr: self.cidrs.len(),
            labels: self.hosts.len(),
            unsortable: self.client_lists.unsortable().len() + self.kill_lists.unsortable().len(),
            wildcard: self.client_lists.wildcard().len() + self.kill_lists.wildcard().len(),
            temporary: self.temporary.len(),
        }
    }

    /// Whether this generation enforces rules for the given side
    pub fn enforces(&self, side: Side) -> bool {
        match side {
            Side::GlobalKill => self.settings.global_kills,
            Side::Client | Side::Kill => true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct StorageCounts {
    pub cidr: usize,
    pub labels: usize,
    pub unsortable: usize,
    pub wildcard: usize,
    pub temporary: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct Builder {
        ids: RuleIdGenerator,
        generation: Generation,
    }

    impl Builder {
        fn new(settings: GenerationSettings) -> Self {
            let mut ids = RuleIdGenerator::new();
            let generation = Generation::new(ids.next_generation(), settings);
            Self { ids, generation }
        }

        fn add(&mut self, spec: RuleSpec) -> RegistrationResult<RuleId> {
            let rule = spec.compile(self.ids.next_rule(), self.ids.next_precedence())?;
            self.generation.insert(rule).map(|r| r.id())
        }
    }

    #[test]
    fn rules_are_routed_by_shape() {
        let mut b = Builder::new(Default::default());
        b.add(RuleSpec::new(RuleCategory::Deny, "10.0.0.0/8")).unwrap();
        b.add(RuleSpec::new(RuleCategory::Client, "*@*.example.com")).unwrap();
        b.add(RuleSpec::new(RuleCategory::Client, "*@irc?.example.com")).unwrap();
        b.add(RuleSpec::new(RuleCategory::Kill, "*@*")).unwrap();
        b.add(RuleSpec::new(RuleCategory::Kill, "*@bad.example.com").expires_at(500)).unwrap();

        assert_eq!(
            b.generation.storage(),
            StorageCounts {
                cidr: 1,
                labels: 1,
                unsortable: 1,
                wildcard: 1,
                temporary: 1,
            }
        );
        assert_eq!(b.generation.cidrs().get(RuleCategory::Deny).len(), 1);
        assert_eq!(b.generation.lists(RuleCategory::Client).len(), 1);
        assert_eq!(b.generation.lists(RuleCategory::Kill).len(), 1);
    }

    #[test]
    fn removal_undoes_routing() {
        let mut b = Builder::new(Default::default());
        let ids: Vec<_> = [
            RuleSpec::new(RuleCategory::Deny, "10.0.0.0/8"),
            RuleSpec::new(RuleCategory::Client, "*@*.example.com"),
            RuleSpec::new(RuleCategory::Client, "*@irc?.example.com"),
            RuleSpec::new(RuleCategory::Kill, "*@*").expires_at(10),
        ]
        .into_iter()
        .map(|spec| b.add(spec).unwrap())
        .collect();

        for id in ids {
            assert!(b.generation.remove(id).is_some());
            assert!(b.generation.remove(id).is_none());
        }
        assert_eq!(b.generation.storage(), StorageCounts::default());
        assert!(b.generation.rules().is_empty());
    }

    #[test]
    fn capacity_is_enforced() {
        let mut b = Builder::new(GenerationSettings {
            global_kills: true,
            max_rules: Some(1),
        });
        b.add(RuleSpec::new(RuleCategory::Client, "*@*")).unwrap();
        assert_eq!(
            b.add(RuleSpec::new(RuleCategory::Client, "*@*")),
            Err(RegistrationError::CapacityExceeded(1))
        );
    }

    #[test]
    fn client_rules_need_a_known_class() {
        let mut b = Builder::new(Default::default());
        assert_eq!(
            b.add(RuleSpec::new(RuleCategory::Client, "*@*").with_class("opers")),
            Err(RegistrationError::UnknownClass("opers".to_string()))
        );

        b.generation.define_class(ConnectionClass::named("opers"));
        let id = b
            .add(RuleSpec::new(RuleCategory::Client, "*@*").with_class("opers"))
            .unwrap();
        let rule = b.generation.rule(id).unwrap().clone();
        assert_eq!(b.generation.class_for(&rule).name, "opers");
    }

    #[test]
    fn deny_and_exemption_cannot_share_a_prefix() {
        let mut b = Builder::new(Default::default());
        let deny = b.add(RuleSpec::new(RuleCategory::Deny, "192.0.2.0/24")).unwrap();
        let err = b
            .add(RuleSpec::new(RuleCategory::ExemptDeny, "192.0.2.0/24"))
            .unwrap_err();
        assert!(matches!(
            err,
            RegistrationError::ConflictingCategory { existing, existing_category: RuleCategory::Deny, .. }
                if existing == deny
        ));

        b.add(RuleSpec::new(RuleCategory::ExemptDeny, "192.0.2.0/25")).unwrap();
    }

    #[test]
    fn expiry_prunes_only_expired_rules() {
        let mut b = Builder::new(Default::default());
        let short = b.add(RuleSpec::new(RuleCategory::Kill, "*@a.example").expires_at(100)).unwrap();
        let long = b.add(RuleSpec::new(RuleCategory::Deny, "192.0.2.1").expires_at(300)).unwrap();
        let persistent = b.add(RuleSpec::new(RuleCategory::Kill, "*@b.example")).unwrap();

        let expired: Vec<_> = b.generation.expire(200).iter().map(|r| r.id()).collect();
        assert_eq!(expired, vec![short]);
        assert!(b.generation.rule(long).is_some());
        assert!(b.generation.rule(persistent).is_some());
        assert_eq!(b.generation.temporary().len(), 0);
    }

    #[test]
    fn find_by_mask() {
        let mut b = Builder::new(Default::default());
        let id = b.add(RuleSpec::new(RuleCategory::Kill, "Root@Shell.Example.com")).unwrap();
        assert_eq!(
            b.generation
                .find(RuleCategory::Kill, "root@shell.example.com")
                .map(|r| r.id()),
            Some(id)
        );
        assert!(b.generation.find(RuleCategory::Client, "root@shell.example.com").is_none());

        let bare = b.add(RuleSpec::new(RuleCategory::GlobalKill, "spam.example.net")).unwrap();
        assert_eq!(
            b.generation.find(RuleCategory::GlobalKill, "*@spam.example.net").map(|r| r.id()),
            Some(bare)
        );
    }
}
