use rand::Rng;
use rand::seq::SliceRandom;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShuffleOrder {
    order: Vec<usize>,
    cursor: usize,
}

impl ShuffleOrder {
    pub fn new<R: Rng + ?Sized>(len: usize, rng: &mut R) -> Self {
        let mut order: Vec<usize> = (0..len).collect();
        order.shuffle(rng);
        Self { order, cursor: 0 }
    }

    pub fn starting_at<R: Rng + ?Sized>(len: usize, first: usize, rng: &mut R) -> Self {
        let mut shuffled = Self::new(len, rng);
        if let Some(pos) = shuffled.order.iter().position(|idx| *idx == first) {
            shuffled.order.swap(0, pos);
        }
        shuffled
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn current(&self) -> Option<usize> {
        self.order.get(self.cursor).copied()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.order
    }

    pub fn advance<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<usize> {
        if self.order.is_empty() {
            return None;
        }

        if self.cursor + 1 >= self.order.len() {
            self.order.shuffle(rng);
            self.cursor = 0;
        } else {
            self.cursor += 1;
        }
        self.current()
    }

    pub fn retreat(&mut self) -> Option<usize> {
        if self.cursor == 0 || self.order.is_empty() {
            return None;
        }
        self.cursor -= 1;
        self.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use std::collections::HashSet;

    #[test]
    fn starting_at_pins_the_current_track_first() {
        let mut rng = SmallRng::seed_from_u64(3);
        for first in 0..6 {
            let order = ShuffleOrder::starting_at(6, first, &mut rng);
            assert_eq!(order.current(), Some(first));
            assert_eq!(order.len(), 6);
        }
    }

    #[test]
    fn single_track_degenerates_and_regenerates() {
        let mut rng = SmallRng::seed_from_u64(1);
        let mut order = ShuffleOrder::new(1, &mut rng);
        assert_eq!(order.as_slice(), &[0]);
        assert_eq!(order.advance(&mut rng), Some(0));
        assert_eq!(order.advance(&mut rng), Some(0));
        assert_eq!(order.cursor(), 0);
    }

    #[test]
    fn retreat_stops_at_the_start() {
        let mut rng = SmallRng::seed_from_u64(9);
        let mut order = ShuffleOrder::new(3, &mut rng);
        assert_eq!(order.retreat(), None);
        let second = order.advance(&mut rng);
        let first = order.as_slice()[0];
        assert_eq!(order.retreat(), Some(first));
        assert_ne!(second, None);
    }

    #[test]
    fn empty_order_yields_nothing() {
        let mut rng = SmallRng::seed_from_u64(0);
        let mut order = ShuffleOrder::new(0, &mut rng);
        assert!(order.is_empty());
        assert_eq!(order.advance(&mut rng), None);
        assert_eq!(order.current(), None);
    }

    proptest::proptest! {
        #[test]
        fn one_pass_covers_every_index_once(len in 1usize..40, seed in 0u64..1000) {
            let mut rng = SmallRng::seed_from_u64(seed);
            let mut order = ShuffleOrder::new(len, &mut rng);
            let mut seen = HashSet::new();
            seen.insert(order.current().expect("first"));
            for _ in 1..len {
                let idx = order.advance(&mut rng).expect("next");
                proptest::prop_assert!(seen.insert(idx), "index {} repeated", idx);
            }
            proptest::prop_assert_eq!(seen.len(), len);
        }
    }
}
