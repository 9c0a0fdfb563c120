//! Fisher-Yates (Knuth) shuffle with a recorded, invertible swap list.

use crate::{
    crypto_tools::rng,
    sdk::api::{DuetError, DuetResult},
};

/// A random permutation over sequences of a fixed length. The recorded
/// swap list is the permutation's state; it must be retained to invert.
#[derive(Debug, Clone)]
pub struct Permutation {
    size: usize,
    swaps: Vec<(usize, usize)>,
}

impl Permutation {
    /// For `i` from `size - 1` down to 1, draw `j` uniform in `[0, i]` and
    /// record the swap `(i, j)`.
    pub fn new(size: usize) -> Self {
        let mut swaps = Vec::with_capacity(size.saturating_sub(1));
        for index in (1..size).rev() {
            let j = rng::uniform_usize_below(index + 1);
            swaps.push((index, j));
        }
        Self { size, swaps }
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Apply the recorded swaps in order.
    pub fn permute<T>(&self, items: &mut [T]) -> DuetResult<()> {
        self.check_length(items.len())?;
        for &(i, j) in &self.swaps {
            items.swap(i, j);
        }
        Ok(())
    }

    /// Apply the recorded swaps in reverse order, undoing [Self::permute].
    pub fn invert<T>(&self, items: &mut [T]) -> DuetResult<()> {
        self.check_length(items.len())?;
        for &(i, j) in self.swaps.iter().rev() {
            items.swap(i, j);
        }
        Ok(())
    }

    fn check_length(&self, actual: usize) -> DuetResult<()> {
        if actual != self.size {
            return Err(DuetError::InvariantViolation(format!(
                "permutation of length {} applied to a sequence of length {}",
                self.size, actual
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permute_then_invert_is_identity() {
        let original: Vec<u32> = (0..57).collect();
        let permutation = Permutation::new(original.len());

        let mut items = original.clone();
        permutation.permute(&mut items).unwrap();
        permutation.invert(&mut items).unwrap();
        assert_eq!(items, original);
    }

    #[test]
    fn permutation_preserves_the_multiset() {
        let mut items: Vec<u32> = (0..31).collect();
        let permutation = Permutation::new(items.len());
        permutation.permute(&mut items).unwrap();
        let mut sorted = items.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..31).collect::<Vec<_>>());
    }

    #[test]
    fn wrong_length_is_rejected() {
        let permutation = Permutation::new(4);
        let mut items = [1u8, 2, 3];
        assert!(matches!(
            permutation.permute(&mut items),
            Err(DuetError::InvariantViolation(_))
        ));
        assert!(permutation.invert(&mut items).is_err());
    }

    #[test]
    fn trivial_sizes() {
        let mut empty: [u8; 0] = [];
        Permutation::new(0).permute(&mut empty).unwrap();
        let mut one = [7u8];
        Permutation::new(1).permute(&mut one).unwrap();
        assert_eq!(one, [7]);
    }
}
