//! Triples and training-instance containers.
//!
//! Dataset loading and id assignment happen upstream (a triples factory);
//! this module defines the id-indexed shapes the training loops consume.
//!
//! Entity and relation ids live in disjoint numbering spaces. Every id must
//! satisfy `id < num_entities` (resp. `num_relations`); the containers check
//! this at construction so a bad id never reaches a tensor lookup mid-epoch.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// A knowledge-graph triple (head, relation, tail) over integer ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triple {
    /// Head entity (subject).
    pub head: usize,
    /// Relation (predicate).
    pub relation: usize,
    /// Tail entity (object).
    pub tail: usize,
}

impl Triple {
    pub fn new(head: usize, relation: usize, tail: usize) -> Self {
        Self {
            head,
            relation,
            tail,
        }
    }
}

impl From<(usize, usize, usize)> for Triple {
    fn from((head, relation, tail): (usize, usize, usize)) -> Self {
        Self::new(head, relation, tail)
    }
}

/// Open-world training instances: an ordered list of positive triples.
#[derive(Debug, Clone)]
pub struct OwaInstances {
    triples: Vec<Triple>,
    num_entities: usize,
    num_relations: usize,
}

impl OwaInstances {
    /// Wrap a triple list, validating every id against the entity and
    /// relation spaces.
    pub fn new(triples: Vec<Triple>, num_entities: usize, num_relations: usize) -> Result<Self> {
        for t in &triples {
            check_entity(t.head, num_entities)?;
            check_relation(t.relation, num_relations)?;
            check_entity(t.tail, num_entities)?;
        }
        Ok(Self {
            triples,
            num_entities,
            num_relations,
        })
    }

    pub fn triples(&self) -> &[Triple] {
        &self.triples
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    pub fn num_entities(&self) -> usize {
        self.num_entities
    }

    pub fn num_relations(&self) -> usize {
        self.num_relations
    }
}

/// Closed-world training instances: (head, relation) pairs, each with the
/// set of tail entities that complete it to a true triple. Every entity not
/// in the completion set is an implicit negative.
#[derive(Debug, Clone)]
pub struct CwaInstances {
    pairs: Vec<(usize, usize)>,
    completions: Vec<Vec<usize>>,
    num_entities: usize,
    num_relations: usize,
}

impl CwaInstances {
    /// Build from parallel pair/completion lists.
    pub fn new(
        pairs: Vec<(usize, usize)>,
        completions: Vec<Vec<usize>>,
        num_entities: usize,
        num_relations: usize,
    ) -> Result<Self> {
        if pairs.len() != completions.len() {
            return Err(Error::InvalidConfig(format!(
                "{} pairs but {} completion sets",
                pairs.len(),
                completions.len()
            )));
        }
        for &(h, r) in &pairs {
            check_entity(h, num_entities)?;
            check_relation(r, num_relations)?;
        }
        for set in &completions {
            for &t in set {
                check_entity(t, num_entities)?;
            }
        }
        Ok(Self {
            pairs,
            completions,
            num_entities,
            num_relations,
        })
    }

    /// Group a triple list by (head, relation) into pairs with completion
    /// sets, the shape a closed-world loop trains on.
    pub fn from_triples(
        triples: &[Triple],
        num_entities: usize,
        num_relations: usize,
    ) -> Result<Self> {
        // BTreeMap keeps the pair ordering deterministic across runs.
        let mut grouped: BTreeMap<(usize, usize), Vec<usize>> = BTreeMap::new();
        for t in triples {
            grouped.entry((t.head, t.relation)).or_default().push(t.tail);
        }
        let mut pairs = Vec::with_capacity(grouped.len());
        let mut completions = Vec::with_capacity(grouped.len());
        for ((h, r), mut tails) in grouped {
            tails.sort_unstable();
            tails.dedup();
            pairs.push((h, r));
            completions.push(tails);
        }
        Self::new(pairs, completions, num_entities, num_relations)
    }

    pub fn pairs(&self) -> &[(usize, usize)] {
        &self.pairs
    }

    pub fn completions(&self) -> &[Vec<usize>] {
        &self.completions
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn num_entities(&self) -> usize {
        self.num_entities
    }

    pub fn num_relations(&self) -> usize {
        self.num_relations
    }
}

pub(crate) fn check_entity(id: usize, num_entities: usize) -> Result<()> {
    if id >= num_entities {
        return Err(Error::IndexOutOfBounds {
            kind: "entity",
            id,
            num_rows: num_entities,
        });
    }
    Ok(())
}

pub(crate) fn check_relation(id: usize, num_relations: usize) -> Result<()> {
    if id >= num_relations {
        return Err(Error::IndexOutOfBounds {
            kind: "relation",
            id,
            num_rows: num_relations,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owa_instances_validate_ids() {
        let ok = OwaInstances::new(vec![Triple::new(0, 0, 1)], 2, 1);
        assert!(ok.is_ok());

        let bad_tail = OwaInstances::new(vec![Triple::new(0, 0, 5)], 2, 1);
        assert!(matches!(
            bad_tail,
            Err(Error::IndexOutOfBounds { kind: "entity", id: 5, .. })
        ));

        let bad_rel = OwaInstances::new(vec![Triple::new(0, 3, 1)], 2, 1);
        assert!(matches!(
            bad_rel,
            Err(Error::IndexOutOfBounds { kind: "relation", id: 3, .. })
        ));
    }

    #[test]
    fn test_cwa_from_triples_groups_and_dedups() {
        let triples = vec![
            Triple::new(0, 0, 1),
            Triple::new(0, 0, 2),
            Triple::new(0, 0, 2),
            Triple::new(1, 0, 2),
        ];
        let instances = CwaInstances::from_triples(&triples, 3, 1).unwrap();

        assert_eq!(instances.len(), 2);
        assert_eq!(instances.pairs(), &[(0, 0), (1, 0)]);
        assert_eq!(instances.completions()[0], vec![1, 2]);
        assert_eq!(instances.completions()[1], vec![2]);
    }

    #[test]
    fn test_cwa_mismatched_lengths_rejected() {
        let result = CwaInstances::new(vec![(0, 0)], vec![], 2, 1);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }
}
