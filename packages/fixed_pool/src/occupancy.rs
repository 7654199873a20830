const BITS_PER_WORD: usize = u64::BITS as usize;

/// Tracks which slots of a pool hold a live item, one bit per slot.
///
/// The free-list only knows about vacant slots, so this is what lets a pool reject a reclaim of
/// a vacant slot in constant time and find the occupied slots at teardown without touching the
/// vacant ones.
#[derive(Debug)]
pub(crate) struct Occupancy {
    words: Box<[u64]>,
}

impl Occupancy {
    /// Creates a bitmap with every slot marked vacant.
    #[must_use]
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            words: vec![0; capacity.div_ceil(BITS_PER_WORD)].into_boxed_slice(),
        }
    }

    #[allow(
        clippy::integer_division,
        clippy::arithmetic_side_effects,
        reason = "division and remainder by a non-zero constant cannot fail"
    )]
    fn locate(index: usize) -> (usize, u64) {
        (index / BITS_PER_WORD, 1 << (index % BITS_PER_WORD))
    }

    /// # Panics
    ///
    /// Panics if the index is beyond the capacity the bitmap was created with.
    #[must_use]
    pub(crate) fn is_occupied(&self, index: usize) -> bool {
        let (word_index, mask) = Self::locate(index);

        let word = self
            .words
            .get(word_index)
            .expect("slot index must be within the capacity of the bitmap");

        word & mask != 0
    }

    pub(crate) fn set_occupied(&mut self, index: usize) {
        let (word_index, mask) = Self::locate(index);
        *self.word_mut(word_index) |= mask;
    }

    pub(crate) fn set_vacant(&mut self, index: usize) {
        let (word_index, mask) = Self::locate(index);
        *self.word_mut(word_index) &= !mask;
    }

    fn word_mut(&mut self, word_index: usize) -> &mut u64 {
        self.words
            .get_mut(word_index)
            .expect("slot index must be within the capacity of the bitmap")
    }

    /// The number of occupied slots. Walks the whole bitmap.
    #[must_use]
    #[cfg(test)]
    #[cfg_attr(test, mutants::skip)] // Only used by the integrity check.
    pub(crate) fn count(&self) -> usize {
        self.words
            .iter()
            .map(|word| word.count_ones() as usize)
            .sum()
    }

    /// Iterates over the indexes of occupied slots in ascending order, skipping whole words
    /// that have no occupied slots.
    pub(crate) fn iter_occupied(&self) -> impl Iterator<Item = usize> + '_ {
        self.words
            .iter()
            .enumerate()
            .filter(|(_, word)| **word != 0)
            .flat_map(|(word_index, word)| OccupiedBits {
                remaining: *word,
                // Cannot overflow: the bitmap never has more bits than the address space.
                first_index: word_index.wrapping_mul(BITS_PER_WORD),
            })
    }
}

struct OccupiedBits {
    remaining: u64,
    first_index: usize,
}

impl Iterator for OccupiedBits {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let bit = self.remaining.trailing_zeros() as usize;

        // Clear the lowest set bit. Cannot underflow because we checked for zero above.
        self.remaining &= self.remaining.wrapping_sub(1);

        Some(self.first_index.wrapping_add(bit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_vacant() {
        let occupancy = Occupancy::new(100);

        assert_eq!(occupancy.count(), 0);
        assert!((0..100).all(|index| !occupancy.is_occupied(index)));
        assert_eq!(occupancy.iter_occupied().count(), 0);
    }

    #[test]
    fn set_and_clear() {
        let mut occupancy = Occupancy::new(3);

        occupancy.set_occupied(1);
        assert!(occupancy.is_occupied(1));
        assert!(!occupancy.is_occupied(0));
        assert!(!occupancy.is_occupied(2));
        assert_eq!(occupancy.count(), 1);

        occupancy.set_vacant(1);
        assert!(!occupancy.is_occupied(1));
        assert_eq!(occupancy.count(), 0);
    }

    #[test]
    fn iter_occupied_crosses_word_boundaries() {
        let mut occupancy = Occupancy::new(200);

        for index in [0, 63, 64, 129, 199] {
            occupancy.set_occupied(index);
        }

        assert_eq!(
            occupancy.iter_occupied().collect::<Vec<_>>(),
            vec![0, 63, 64, 129, 199]
        );
        assert_eq!(occupancy.count(), 5);
    }

    #[test]
    fn zero_capacity_has_no_words() {
        let occupancy = Occupancy::new(0);

        assert_eq!(occupancy.count(), 0);
        assert_eq!(occupancy.iter_occupied().count(), 0);
    }

    #[test]
    #[should_panic]
    fn out_of_range_index_panics() {
        let occupancy = Occupancy::new(64);

        _ = occupancy.is_occupied(64);
    }
}
