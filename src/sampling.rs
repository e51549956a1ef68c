//! Negative sampling for open-world training.
//!
//! Under the open-world assumption absent triples are unknown, not false,
//! so training contrasts each observed triple against corrupted versions of
//! itself: replace the head or the tail (never the relation, never both
//! ends) with an entity drawn uniformly from the full entity space.

use rand::prelude::*;
use rand_xorshift::XorShiftRng;

use crate::error::{Error, Result};
use crate::triples::Triple;

/// Resampling attempts before a collision with the original entity is
/// accepted, so corruption always terminates (a 1-entity space has no
/// alternative to offer).
const RESAMPLE_BUDGET: usize = 16;

/// Uniform negative sampler.
///
/// Stateless across calls apart from its owned seeded RNG: negatives are a
/// pure function of the positive batch, the entity cardinality, and the
/// random stream.
#[derive(Debug)]
pub struct UniformNegativeSampler {
    num_entities: usize,
    num_negs_per_pos: usize,
    rng: XorShiftRng,
}

impl UniformNegativeSampler {
    pub fn new(num_entities: usize, num_negs_per_pos: usize, seed: u64) -> Result<Self> {
        if num_entities == 0 {
            return Err(Error::InvalidConfig(
                "negative sampling needs at least one entity".into(),
            ));
        }
        if num_negs_per_pos == 0 {
            return Err(Error::InvalidConfig(
                "need at least one negative per positive".into(),
            ));
        }
        Ok(Self {
            num_entities,
            num_negs_per_pos,
            rng: XorShiftRng::seed_from_u64(seed),
        })
    }

    /// Corrupt a batch of positives.
    ///
    /// Output holds `num_negs_per_pos` negatives per positive, grouped in
    /// input order: negatives `i*k..(i+1)*k` belong to positive `i`.
    pub fn corrupt_batch(&mut self, batch: &[Triple]) -> Vec<Triple> {
        let mut negatives = Vec::with_capacity(batch.len() * self.num_negs_per_pos);
        for positive in batch {
            for _ in 0..self.num_negs_per_pos {
                negatives.push(self.corrupt(*positive));
            }
        }
        negatives
    }

    /// Number of negatives produced per positive.
    pub fn num_negs_per_pos(&self) -> usize {
        self.num_negs_per_pos
    }

    fn corrupt(&mut self, positive: Triple) -> Triple {
        let corrupt_head = self.rng.random_bool(0.5);
        let original = if corrupt_head {
            positive.head
        } else {
            positive.tail
        };

        let mut replacement = original;
        for _ in 0..RESAMPLE_BUDGET {
            let candidate = self.rng.random_range(0..self.num_entities);
            if candidate != original {
                replacement = candidate;
                break;
            }
        }

        if corrupt_head {
            Triple::new(replacement, positive.relation, positive.tail)
        } else {
            Triple::new(positive.head, positive.relation, replacement)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn positives() -> Vec<Triple> {
        vec![
            Triple::new(0, 0, 1),
            Triple::new(1, 1, 2),
            Triple::new(2, 0, 3),
        ]
    }

    #[test]
    fn test_rejects_degenerate_config() {
        assert!(UniformNegativeSampler::new(0, 1, 7).is_err());
        assert!(UniformNegativeSampler::new(10, 0, 7).is_err());
    }

    #[test]
    fn test_one_negative_per_positive_by_default() {
        let mut sampler = UniformNegativeSampler::new(10, 1, 7).unwrap();
        let negatives = sampler.corrupt_batch(&positives());
        assert_eq!(negatives.len(), 3);
    }

    #[test]
    fn test_configurable_ratio_and_grouping() {
        let mut sampler = UniformNegativeSampler::new(10, 4, 7).unwrap();
        let batch = positives();
        let negatives = sampler.corrupt_batch(&batch);
        assert_eq!(negatives.len(), 12);
        // Negatives for positive i share its relation.
        for (i, neg) in negatives.iter().enumerate() {
            assert_eq!(neg.relation, batch[i / 4].relation);
        }
    }

    #[test]
    fn test_corrupts_exactly_one_entity_slot() {
        let mut sampler = UniformNegativeSampler::new(50, 1, 11).unwrap();
        let batch = positives();
        for _ in 0..200 {
            for (pos, neg) in batch.iter().zip(sampler.corrupt_batch(&batch)) {
                assert_eq!(pos.relation, neg.relation);
                let head_changed = pos.head != neg.head;
                let tail_changed = pos.tail != neg.tail;
                assert!(
                    head_changed ^ tail_changed,
                    "exactly one of head/tail must change: {:?} -> {:?}",
                    pos,
                    neg
                );
            }
        }
    }

    #[test]
    fn test_never_identical_when_alternatives_exist() {
        // With 50 entities the odds of burning the whole resample budget on
        // collisions are negligible, so every negative must differ.
        let mut sampler = UniformNegativeSampler::new(50, 2, 13).unwrap();
        let batch = positives();
        for _ in 0..100 {
            for (i, neg) in sampler.corrupt_batch(&batch).iter().enumerate() {
                assert_ne!(*neg, batch[i / 2], "negative equals its source triple");
            }
        }
    }

    #[test]
    fn test_single_entity_space_terminates() {
        // Only entity 0 exists: corruption cannot avoid the duplicate, but
        // the bounded retry budget still guarantees a same-shaped batch.
        let mut sampler = UniformNegativeSampler::new(1, 1, 17).unwrap();
        let batch = vec![Triple::new(0, 0, 0)];
        let negatives = sampler.corrupt_batch(&batch);
        assert_eq!(negatives.len(), 1);
        assert_eq!(negatives[0], batch[0]);
    }
}
