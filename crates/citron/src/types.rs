//! Container aliases shared across the crate.
//!
//! Hash maps with unspecified iteration order must never sit on an output
//! path, so the whole crate goes through these insertion-ordered aliases.

type BuildHasher = std::hash::BuildHasherDefault<rustc_hash::FxHasher>;

pub type Map<K, V> = indexmap::IndexMap<K, V, BuildHasher>;
pub type Set<T> = indexmap::IndexSet<T, BuildHasher>;
