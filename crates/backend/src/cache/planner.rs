//! Splits a global memory target into per-cache entry limits.
//!
//! ```text
//! share(cache)       = memory_target * weight / sum(positive weights)
//! max_entries(cache) = floor(share / per_entry_footprint)
//! ```
//!
//! A negative weight bypasses the split entirely and pins the cache to
//! `|weight|` entries.

use std::mem::size_of;

use crate::config::CacheConfig;

/// Average cost of empty hash table slots, amortized per element at the
/// load factor the table settles at.
pub const BUCKET_OVERHEAD: f64 = 10.79;

/// Per-element bookkeeping of the cache: hash, key and value pointers, the
/// access-order deque links and the entry's frequency/weight counters.
pub const ELEMENT_OVERHEAD: usize = size_of::<[usize; 8]>();

/// Memory one cached value costs, including every key it is reachable under.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Footprint {
  /// Size of one lookup key
  pub key: usize,
  /// Size of the value itself, shared by all of its keys
  pub value: usize,
  /// Number of keys the value is indexed under
  pub lookups: usize,
}

impl Footprint {
  pub fn new(key: usize, value: usize, lookups: usize) -> Self {
    Self {
      key,
      value,
      lookups: lookups.max(1),
    }
  }

  /// Bytes per cached value
  pub fn per_entry(&self) -> f64 {
    let per_key = (self.key + size_of::<usize>() + ELEMENT_OVERHEAD) as f64 + BUCKET_OVERHEAD;
    self.value as f64 + per_key * self.lookups as f64
  }
}

#[derive(Debug, Clone)]
pub struct CapacityPlanner {
  memory_target: u64,
  total_weight: f64,
}

impl CapacityPlanner {
  pub fn new(config: &CacheConfig) -> Self {
    Self::with_weights(config.memory_target, config.weights.entries().into_iter().map(|(_, w)| w))
  }

  pub fn with_weights(memory_target: u64, weights: impl IntoIterator<Item = f64>) -> Self {
    let total_weight = weights.into_iter().filter(|w| *w > 0.0).sum();
    Self {
      memory_target,
      total_weight,
    }
  }

  pub fn memory_target(&self) -> u64 {
    self.memory_target
  }

  pub fn total_weight(&self) -> f64 {
    self.total_weight
  }

  /// Bytes of the memory target given to a cache with this weight
  pub fn share(&self, weight: f64) -> f64 {
    if weight <= 0.0 || self.total_weight <= 0.0 {
      return 0.0;
    }
    self.memory_target as f64 * (weight / self.total_weight)
  }

  /// Maximum number of values a cache with this weight and footprint may hold.
  pub fn plan(&self, footprint: &Footprint, weight: f64) -> usize {
    if weight < 0.0 {
      return (-weight) as usize;
    }
    let per_entry = footprint.per_entry();
    if per_entry <= 0.0 {
      return 0;
    }
    (self.share(weight) / per_entry).floor() as usize
  }
}
