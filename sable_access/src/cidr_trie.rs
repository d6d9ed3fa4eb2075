//! Longest-prefix matching over address ranges.
//!
//! A path-compressed binary (patricia) trie over 128-bit keys. IPv4 prefixes
//! are stored as IPv4-mapped IPv6 (`::ffff:a.b.c.d`, prefix length + 96), so a
//! single trie holds both families without them ever overlapping.

use crate::id::RuleId;

use ipnet::IpNet;
use std::net::IpAddr;

const KEY_BITS: u8 = 128;
const V4_MAPPED_PREFIX: u128 = 0xffff_u128 << 32;
const V4_MAPPED_LEN: u8 = 96;

/// A longest-prefix match result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CidrMatch {
    pub rule: RuleId,
    /// Depth of the matching prefix in the 128-bit key space. Comparable
    /// between any two matches for the same address.
    pub depth: u8,
}

#[derive(Debug, Clone)]
struct CidrNode {
    bits: u128,
    len: u8,
    children: [Option<Box<CidrNode>>; 2],
    /// Rules registered at exactly this prefix, oldest first. The newest rule
    /// accepted by the caller is the effective one.
    rules: Vec<RuleId>,
}

impl CidrNode {
    fn new(bits: u128, len: u8) -> Self {
        Self {
            bits,
            len,
            children: [None, None],
            rules: Vec::new(),
        }
    }
}

/// Address-prefix trie for the rules of one category
#[derive(Debug, Clone, Default)]
pub struct CidrTrie {
    root: Option<Box<CidrNode>>,
    rules: usize,
}

fn mask(len: u8) -> u128 {
    if len == 0 {
        0
    } else {
        u128::MAX << (KEY_BITS - len)
    }
}

/// The bit at `index`, counting from the most significant. `index` < 128.
fn bit_at(key: u128, index: u8) -> usize {
    ((key >> (KEY_BITS - 1 - index)) & 1) as usize
}

fn common_prefix_len(a: u128, b: u128, limit: u8) -> u8 {
    ((a ^ b).leading_zeros() as u8).min(limit)
}

fn address_key(addr: IpAddr) -> u128 {
    match addr {
        IpAddr::V4(v4) => V4_MAPPED_PREFIX | u128::from(u32::from(v4)),
        IpAddr::V6(v6) => u128::from(v6),
    }
}

fn prefix_key(net: &IpNet) -> (u128, u8) {
    match net {
        IpNet::V4(v4) => (
            address_key(IpAddr::V4(v4.network())),
            v4.prefix_len() + V4_MAPPED_LEN,
        ),
        IpNet::V6(v6) => (u128::from(v6.network()), v6.prefix_len()),
    }
}

impl CidrTrie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rules attached anywhere in the trie
    pub fn len(&self) -> usize {
        self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules == 0
    }

    /// Attach a rule at the given prefix.
    ///
    /// A rule inserted at a prefix that already holds rules becomes the
    /// effective rule for that prefix; the earlier ones resurface if it is
    /// removed.
    pub fn insert(&mut self, net: &IpNet, rule: RuleId) {
        let (bits, len) = prefix_key(net);
        Self::insert_at(&mut self.root, bits & mask(len), len, rule);
        self.rules += 1;
    }

    fn insert_at(slot: &mut Option<Box<CidrNode>>, bits: u128, len: u8, rule: RuleId) {
        let Some(node) = slot else {
            let mut leaf = CidrNode::new(bits, len);
            leaf.rules.push(rule);
            *slot = Some(Box::new(leaf));
            return;
        };

        let common = common_prefix_len(node.bits, bits, node.len.min(len));

        if common == node.len {
            if len == node.len {
                node.rules.push(rule);
            } else {
                let dir = bit_at(bits, node.len);
                Self::insert_at(&mut node.children[dir], bits, len, rule);
            }
            return;
        }

        // The new prefix leaves this node's path part way along it: split the
        // path at the divergence point.
        let existing_dir = bit_at(node.bits, common);
        let branch = Box::new(CidrNode::new(bits & mask(common), common));
        let existing = std::mem::replace(node, branch);
        node.children[existing_dir] = Some(existing);

        if common == len {
            node.rules.push(rule);
        } else {
            let mut leaf = CidrNode::new(bits, len);
            leaf.rules.push(rule);
            node.children[1 - existing_dir] = Some(Box::new(leaf));
        }
    }

    /// Detach a rule from the given prefix. Returns whether it was found.
    pub fn remove(&mut self, net: &IpNet, rule: RuleId) -> bool {
        let (bits, len) = prefix_key(net);
        let removed = Self::remove_at(&mut self.root, bits & mask(len), len, rule);
        if removed {
            self.rules -= 1;
        }
        removed
    }

    fn remove_at(slot: &mut Option<Box<CidrNode>>, bits: u128, len: u8, rule: RuleId) -> bool {
        let Some(node) = slot else {
            return false;
        };
        if node.len > len || (bits & mask(node.len)) != node.bits {
            return false;
        }

        let removed = if node.len == len {
            match node.rules.iter().position(|&r| r == rule) {
                Some(index) => {
                    node.rules.remove(index);
                    true
                }
                None => false,
            }
        } else {
            let dir = bit_at(bits, node.len);
            Self::remove_at(&mut node.children[dir], bits, len, rule)
        };

        if removed {
            Self::compact(slot);
        }
        removed
    }

    /// Drop a node that no longer carries rules, or fold it into its only
    /// child.
    fn compact(slot: &mut Option<Box<CidrNode>>) {
        let replacement = match slot.as_deref_mut() {
            Some(node) if node.rules.is_empty() => {
                match node.children.iter().filter(|c| c.is_some()).count() {
                    0 => None,
                    1 => node.children.iter_mut().find_map(Option::take),
                    _ => return,
                }
            }
            _ => return,
        };
        *slot = replacement;
    }

    /// The rule at the longest prefix containing `addr`.
    pub fn lookup_longest(&self, addr: IpAddr) -> Option<CidrMatch> {
        self.lookup_longest_by(addr, |_| true)
    }

    /// As [`lookup_longest`](Self::lookup_longest), considering only rules for
    /// which `accept` returns true. At each prefix the newest accepted rule is
    /// the one returned.
    pub fn lookup_longest_by(
        &self,
        addr: IpAddr,
        mut accept: impl FnMut(RuleId) -> bool,
    ) -> Option<CidrMatch> {
        let key = address_key(addr);
        let mut best = None;
        let mut cursor = self.root.as_deref();

        while let Some(node) = cursor {
            if key & mask(node.len) != node.bits {
                break;
            }
            if let Some(&rule) = node.rules.iter().rev().find(|&&r| accept(r)) {
                best = Some(CidrMatch {
                    rule,
                    depth: node.len,
                });
            }
            if node.len == KEY_BITS {
                break;
            }
            cursor = node.children[bit_at(key, node.len)].as_deref();
        }

        best
    }

    /// Every attached rule, in no particular order
    pub fn rule_ids(&self) -> Vec<RuleId> {
        let mut ids = Vec::with_capacity(self.rules);
        let mut stack: Vec<&CidrNode> = self.root.as_deref().into_iter().collect();
        while let Some(node) = stack.pop() {
            ids.extend(node.rules.iter().copied());
            stack.extend(node.children.iter().filter_map(|c| c.as_deref()));
        }
        ids
    }
}
