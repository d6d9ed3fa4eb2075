pub mod prelude;

pub mod id;
pub mod errors;

pub mod mask;
pub mod rule;

pub mod candidate;
pub mod cidr_trie;
pub mod label_trie;
pub mod fallback;
pub mod temporary;

pub mod generation;
pub mod registry;
pub mod engine;
pub mod decision;

pub mod config;

pub mod types
{
    mod pattern;
    pub use pattern::*;
}

pub mod utils;
