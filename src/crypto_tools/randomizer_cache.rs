//! Pre-computed randomizer pool.
//!
//! Re-randomization costs a modular exponentiation, and the randomizer is
//! independent of the plaintext, so a fixed pool is generated eagerly at
//! construction and reused once exhausted. The same ring backs the
//! per-protocol blinding-factor pools.

use tracing::error;

use crate::sdk::api::{DuetError, DuetResult};

/// A fixed-capacity ring of precomputed values, owned by exactly one
/// cryptosystem or protocol instance.
#[derive(Debug)]
pub struct RandomizerCache<T> {
    items: Vec<T>,
    index: usize,
}

impl<T: Clone> RandomizerCache<T> {
    /// Fill the cache by calling `generator` `capacity` times in sequence.
    pub fn new(capacity: usize, mut generator: impl FnMut() -> DuetResult<T>) -> DuetResult<Self> {
        if capacity == 0 {
            error!("randomizer cache capacity must be positive");
            return Err(DuetError::InvalidParameter(
                "randomizer cache capacity must be positive".to_string(),
            ));
        }
        let mut items = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            items.push(generator()?);
        }
        Ok(Self { items, index: 0 })
    }

    /// The next element. Each pop returns a distinct element until the
    /// capacity is exhausted; the index then wraps around and values are
    /// reused.
    pub fn pop(&mut self) -> T {
        let current = self.index;
        self.index = (self.index + 1) % self.items.len();
        self.items[current].clone()
    }

    pub fn capacity(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_are_distinct_until_wraparound() {
        let mut next = 0u32;
        let mut cache = RandomizerCache::new(3, || {
            next += 1;
            Ok(next)
        })
        .unwrap();

        assert_eq!(cache.capacity(), 3);
        assert_eq!(cache.pop(), 1);
        assert_eq!(cache.pop(), 2);
        assert_eq!(cache.pop(), 3);
        // exhausted: the ring wraps and reuses values
        assert_eq!(cache.pop(), 1);
        assert_eq!(cache.pop(), 2);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            RandomizerCache::new(0, || Ok(0u32)),
            Err(DuetError::InvalidParameter(_))
        ));
    }

    #[test]
    fn generator_failure_propagates() {
        let result: DuetResult<RandomizerCache<u32>> =
            RandomizerCache::new(2, || Err(DuetError::InverseDoesNotExist));
        assert_eq!(result.unwrap_err(), DuetError::InverseDoesNotExist);
    }
}
