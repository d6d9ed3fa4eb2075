//! Hostname rules indexed by domain label.
//!
//! Each level of the trie corresponds to one label of a hostname, starting
//! from the top-level domain. A host mask `*.example.com` is stored under
//! `com` → `example` → `*`, the `*` label living in a slot of its own so it
//! can never collide with a literal label.
//!
//! At the node where a mask ends, rules are grouped by username pattern. All
//! rules sharing one `(host mask, user mask)` pair share one entry, and the
//! entry caches what it means for each [`Side`] of a decision: which Client
//! rule it grants under, and whether it bans or exempts.

use crate::candidate::*;
use crate::id::RuleId;
use crate::mask::{LabelPath, WILDCARD_LABEL};
use crate::rule::{Rule, RuleArena};
use crate::types::Pattern;

use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct UserEntry {
    user: Pattern,
    /// Every rule registered for this user/host pair, oldest first
    rules: Vec<RuleId>,
    /// Effective candidate for each side, indexed by [`Side::index`]
    verdicts: [Option<Candidate>; 3],
}

impl UserEntry {
    fn new(user: Pattern) -> Self {
        Self {
            user,
            rules: Vec::new(),
            verdicts: [None; 3],
        }
    }

    fn verdict(&self, side: Side) -> Option<Candidate> {
        self.verdicts[side.index()]
    }

    /// Recompute the cached verdicts after the rule list has changed.
    ///
    /// For the Client side the first registered Client rule stands, and later
    /// duplicates are shadowed. For the kill sides an exemption anywhere in
    /// the list takes over the entry; otherwise the ban is the first one
    /// registered, replaced by each later ban that isn't redundant (one with
    /// the same reason is).
    fn refresh(&mut self, arena: &RuleArena) {
        for side in Side::ALL {
            let mut grant: Option<&Arc<Rule>> = None;
            let mut exemption: Option<&Arc<Rule>> = None;
            let mut ban: Option<&Arc<Rule>> = None;

            for rule in self.rules.iter().filter_map(|&id| arena.get(id)) {
                match rule.role(side) {
                    Some(Role::Grant) => {
                        grant.get_or_insert(rule);
                    }
                    Some(Role::Exempt) => {
                        exemption.get_or_insert(rule);
                    }
                    Some(Role::Ban) => match ban {
                        Some(existing) if existing.reason() == rule.reason() => {}
                        _ => ban = Some(rule),
                    },
                    None => {}
                }
            }

            self.verdicts[side.index()] = exemption
                .or(ban)
                .or(grant)
                .and_then(|rule| Candidate::for_rule(rule, side));
        }
    }
}

#[derive(Debug, Clone, Default)]
struct LabelNode {
    children: HashMap<String, LabelNode>,
    wild_child: Option<Box<LabelNode>>,
    /// Entries for masks ending at this node, with a specific username pattern
    users: Vec<UserEntry>,
    /// The entry for `*@<this node>`
    wild_user: Option<UserEntry>,
}

impl LabelNode {
    fn is_empty(&self) -> bool {
        self.children.is_empty()
            && self.wild_child.is_none()
            && self.users.is_empty()
            && self.wild_user.is_none()
    }

    fn entry_mut(&mut self, user: &Pattern) -> &mut UserEntry {
        if user.is_wildcard_only() {
            return self
                .wild_user
                .get_or_insert_with(|| UserEntry::new(user.clone()));
        }

        let index = match self.users.iter().position(|e| e.user == *user) {
            Some(index) => index,
            None => {
                self.users.push(UserEntry::new(user.clone()));
                self.users.len() - 1
            }
        };
        &mut self.users[index]
    }

    /// Remove `rule` from the entry for `user`, dropping the entry if that
    /// leaves it empty.
    fn remove_entry_rule(&mut self, user: &Pattern, rule: RuleId, arena: &RuleArena) -> bool {
        if user.is_wildcard_only() {
            let Some(entry) = self.wild_user.as_mut() else {
                return false;
            };
            let removed = remove_rule(entry, rule, arena);
            if entry.rules.is_empty() {
                self.wild_user = None;
            }
            return removed;
        }

        let Some(index) = self.users.iter().position(|e| e.user == *user) else {
            return false;
        };
        let removed = remove_rule(&mut self.users[index], rule, arena);
        if self.users[index].rules.is_empty() {
            self.users.remove(index);
        }
        removed
    }

    /// The best entry for a specific username: a literal match on the whole
    /// username first, then the first matching glob in registration order.
    fn best_user_match(&self, folded_user: &str, side: Side) -> Option<Candidate> {
        let mut glob_match = None;

        for entry in &self.users {
            let Some(verdict) = entry.verdict(side) else {
                continue;
            };
            if !entry.user.has_wildcards() {
                if entry.user == *folded_user {
                    return Some(verdict);
                }
            } else if glob_match.is_none() && entry.user.matches_folded(folded_user) {
                glob_match = Some(verdict);
            }
        }

        glob_match
    }

    fn offer_entries(&self, folded_user: &str, side: Side, candidates: &mut CandidateSet) {
        if let Some(found) = self.best_user_match(folded_user, side) {
            candidates.offer_found(found);
        }
        if let Some(wild) = self.wild_user.as_ref().and_then(|e| e.verdict(side)) {
            candidates.offer_wild(wild);
        }
    }
}

fn remove_rule(entry: &mut UserEntry, rule: RuleId, arena: &RuleArena) -> bool {
    let Some(index) = entry.rules.iter().position(|&r| r == rule) else {
        return false;
    };
    entry.rules.remove(index);
    entry.refresh(arena);
    true
}

/// The hostname rule trie
#[derive(Debug, Clone, Default)]
pub struct HostLabelTrie {
    root: LabelNode,
    rules: usize,
}

impl HostLabelTrie {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules == 0
    }

    /// Store a rule under its host mask's label path and its username
    /// pattern. The rule must already be present in `arena`.
    pub fn insert(&mut self, path: &LabelPath, user: &Pattern, rule: RuleId, arena: &RuleArena) {
        let mut node = &mut self.root;
        for label in path.labels() {
            node = if label == WILDCARD_LABEL {
                &mut **node.wild_child.get_or_insert_with(Default::default)
            } else {
                node.children.entry(label.clone()).or_default()
            };
        }

        let entry = node.entry_mut(user);
        entry.rules.push(rule);
        entry.refresh(arena);
        self.rules += 1;
    }

    /// Remove a rule previously stored with [`insert`](Self::insert), pruning
    /// any nodes left empty.
    pub fn remove(&mut self, path: &LabelPath, user: &Pattern, rule: RuleId, arena: &RuleArena) -> bool {
        let removed = Self::remove_from(&mut self.root, path.labels(), user, rule, arena);
        if removed {
            self.rules -= 1;
        }
        removed
    }

    fn remove_from(
        node: &mut LabelNode,
        labels: &[String],
        user: &Pattern,
        rule: RuleId,
        arena: &RuleArena,
    ) -> bool {
        let Some((label, rest)) = labels.split_first() else {
            return node.remove_entry_rule(user, rule, arena);
        };

        if label == WILDCARD_LABEL {
            let Some(child) = node.wild_child.as_deref_mut() else {
                return false;
            };
            let removed = Self::remove_from(child, rest, user, rule, arena);
            if child.is_empty() {
                node.wild_child = None;
            }
            removed
        } else {
            let Some(child) = node.children.get_mut(label) else {
                return false;
            };
            let removed = Self::remove_from(child, rest, user, rule, arena);
            if child.is_empty() {
                node.children.remove(label);
            }
            removed
        }
    }

    /// Collect candidates for a concrete hostname and username.
    ///
    /// The exact-label path is followed as deep as it goes; levels are then
    /// offered from the deepest up. At the level where the hostname runs out,
    /// the node's own entries apply; at every shallower level, the entries
    /// under that level's `*` label apply, since `*` stands for one or more
    /// leading labels.
    pub fn lookup(&self, host: &LabelPath, folded_user: &str, side: Side, candidates: &mut CandidateSet) {
        let labels = host.labels();
        let mut levels = Vec::with_capacity(labels.len() + 1);
        let mut node = &self.root;
        levels.push(node);

        for label in labels {
            match node.children.get(label) {
                Some(child) => {
                    node = child;
                    levels.push(node);
                }
                None => break,
            }
        }

        for (depth, level) in levels.iter().enumerate().rev() {
            if depth == labels.len() {
                level.offer_entries(folded_user, side, candidates);
            } else if let Some(wild) = &level.wild_child {
                tracing::trace!(depth, "Consulting wildcard label");
                wild.offer_entries(folded_user, side, candidates);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::RuleIdGenerator;
    use crate::mask::{classify, Shape};
    use crate::rule::*;

    struct Fixture {
        ids: RuleIdGenerator,
        arena: RuleArena,
        trie: HostLabelTrie,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                ids: RuleIdGenerator::new(),
                arena: RuleArena::new(),
                trie: HostLabelTrie::new(),
            }
        }

        fn add(&mut self, spec: RuleSpec) -> RuleId {
            let rule = spec
                .compile(self.ids.next_rule(), self.ids.next_precedence())
                .unwrap();
            let id = rule.id();
            let HostMask::Labels(path) = rule.host_mask().clone() else {
                panic!("not a label mask");
            };
            let user = rule.user().clone();
            self.arena.insert(Arc::new(rule));
            self.trie.insert(&path, &user, id, &self.arena);
            id
        }

        fn remove(&mut self, id: RuleId) -> bool {
            let rule = self.arena.get(id).unwrap().clone();
            let HostMask::Labels(path) = rule.host_mask() else {
                panic!("not a label mask");
            };
            let removed = self.trie.remove(path, rule.user(), id, &self.arena);
            self.arena.remove(id);
            removed
        }

        fn lookup(&self, host: &str, user: &str, side: Side) -> Option<Candidate> {
            let mut set = CandidateSet::new();
            self.trie.lookup(
                &LabelPath::from_hostname(host),
                &user.to_ascii_lowercase(),
                side,
                &mut set,
            );
            set.settle()
        }
    }

    fn client(mask: &str) -> RuleSpec {
        RuleSpec::new(RuleCategory::Client, mask)
    }

    fn kill(mask: &str, reason: &str) -> RuleSpec {
        RuleSpec::new(RuleCategory::Kill, mask).with_reason(reason)
    }

    #[test]
    fn more_specific_host_wins() {
        let mut f = Fixture::new();
        let wide = f.add(client("*@*.example.com"));
        let narrow = f.add(client("*@irc.example.com"));

        assert_eq!(f.lookup("irc.example.com", "bob", Side::Client).unwrap().rule, narrow);
        assert_eq!(f.lookup("www.example.com", "bob", Side::Client).unwrap().rule, wide);
        assert_eq!(f.lookup("a.b.example.com", "bob", Side::Client).unwrap().rule, wide);
        assert_eq!(f.lookup("example.com", "bob", Side::Client), None);
    }

    #[test]
    fn specific_user_beats_wildcard_user() {
        let mut f = Fixture::new();
        let any = f.add(client("*@irc.example.com"));
        let bob = f.add(client("bob@irc.example.com"));
        let globbed = f.add(client("a*@irc.example.com"));

        assert_eq!(f.lookup("irc.example.com", "bob", Side::Client).unwrap().rule, bob);
        assert_eq!(f.lookup("irc.example.com", "alice", Side::Client).unwrap().rule, globbed);
        assert_eq!(f.lookup("irc.example.com", "carol", Side::Client).unwrap().rule, any);
    }

    #[test]
    fn literal_user_match_beats_earlier_glob() {
        let mut f = Fixture::new();
        f.add(client("b*@irc.example.com"));
        let bob = f.add(client("bob@irc.example.com"));

        assert_eq!(f.lookup("irc.example.com", "BOB", Side::Client).unwrap().rule, bob);
    }

    #[test]
    fn wildcard_label_is_separate_from_literal_star() {
        let mut f = Fixture::new();
        let suffix = f.add(client("*@*.example.com"));
        assert_eq!(classify("*.example.com"), Shape::Sortable(LabelPath::from_hostname("*.example.com")));
        assert_eq!(f.lookup("*.example.com", "x", Side::Client).unwrap().rule, suffix);
        assert_eq!(f.lookup("mail.example.com", "x", Side::Client).unwrap().rule, suffix);
    }

    #[test]
    fn specific_kill_found_below_client_wildcard() {
        let mut f = Fixture::new();
        f.add(client("*@*.example.com"));
        let root_kill = f.add(kill("root@shell.example.com", "no shells"));

        let found = f.lookup("shell.example.com", "root", Side::Kill).unwrap();
        assert_eq!(found.rule, root_kill);
        assert_eq!(found.role, Role::Ban);
        assert_eq!(f.lookup("shell.example.com", "bob", Side::Kill), None);
    }

    #[test]
    fn wildcard_exemption_reaches_specific_kill() {
        let mut f = Fixture::new();
        let exempt = f.add(client("*@*.example.com").with_flags(RuleFlags::KILL_EXEMPT));
        f.add(kill("evil@host.example.com", "go away"));

        let found = f.lookup("host.example.com", "evil", Side::Kill).unwrap();
        assert_eq!(found.rule, exempt);
        assert_eq!(found.role, Role::Exempt);
    }

    #[test]
    fn exemption_takes_over_colliding_kill() {
        let mut f = Fixture::new();
        let banned = f.add(kill("bob@host.example.com", "spam"));
        let exempt = f.add(RuleSpec::new(RuleCategory::ExemptDeny, "bob@host.example.com"));

        let found = f.lookup("host.example.com", "bob", Side::Kill).unwrap();
        assert_eq!(found.rule, exempt);
        assert_eq!(found.role, Role::Exempt);

        assert!(f.remove(exempt));
        assert_eq!(f.lookup("host.example.com", "bob", Side::Kill).unwrap().rule, banned);
    }

    #[test]
    fn duplicate_client_keeps_first() {
        let mut f = Fixture::new();
        let first = f.add(client("*@irc.example.com").with_class("one"));
        let second = f.add(client("*@irc.example.com").with_class("two"));

        assert_eq!(f.lookup("irc.example.com", "x", Side::Client).unwrap().rule, first);
        assert!(f.remove(first));
        assert_eq!(f.lookup("irc.example.com", "x", Side::Client).unwrap().rule, second);
    }

    #[test]
    fn duplicate_kill_replaces_unless_redundant() {
        let mut f = Fixture::new();
        let first = f.add(kill("x@host.example.com", "spam"));
        f.add(kill("x@host.example.com", "spam"));
        assert_eq!(f.lookup("host.example.com", "x", Side::Kill).unwrap().rule, first);

        let replacement = f.add(kill("x@host.example.com", "worse spam"));
        assert_eq!(f.lookup("host.example.com", "x", Side::Kill).unwrap().rule, replacement);
    }

    #[test]
    fn removal_prunes_and_restores() {
        let mut f = Fixture::new();
        let wide = f.add(client("*@*.example.com"));
        let narrow = f.add(client("bob@irc.example.com"));

        assert!(f.remove(narrow));
        assert!(!f.trie.root.children["com"].children["example"]
            .children
            .contains_key("irc"));
        assert_eq!(f.lookup("irc.example.com", "bob", Side::Client).unwrap().rule, wide);

        assert!(f.remove(wide));
        assert!(f.trie.root.is_empty());
        assert!(f.trie.is_empty());
    }

    #[test]
    fn sides_are_independent() {
        let mut f = Fixture::new();
        f.add(kill("*@*.example.com", "closed"));
        assert_eq!(f.lookup("irc.example.com", "bob", Side::Client), None);
        assert_eq!(f.lookup("irc.example.com", "bob", Side::GlobalKill), None);
        assert!(f.lookup("irc.example.com", "bob", Side::Kill).is_some());
    }
}
