//! Scoring models over entity and relation embedding tables.
//!
//! Each interaction function encodes a geometric hypothesis about how a
//! relation transforms its head into its tail:
//!
//! | Interaction | Score | Hypothesis |
//! |-------------|-------|------------|
//! | TransE | `-||h + r - t||_p` | Relations are translations (Bordes et al. 2013) |
//! | DistMult | `sum(h * r * t)` | Relations are diagonal scalings (Yang et al. 2015) |
//!
//! Interactions are a tagged enum rather than a trait hierarchy: every
//! variant shares the embedding-table and loss plumbing and differs only in
//! the scoring formula and the post-step constraint, so dispatch by tag
//! keeps the surface flat.
//!
//! Scores are real scalars, higher = more plausible. TransE scores are
//! negated distances and therefore never positive; DistMult scores are
//! unbounded on both sides.

use candle_core::{Device, Tensor};
use serde::{Deserialize, Serialize};

use crate::embedding::{EmbeddingTable, Initializer, Norm};
use crate::error::{Error, Result};
use crate::regularizer::{LpRegularizer, RegularizerConfig};
use crate::triples::Triple;

/// Interaction function variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interaction {
    /// Translational distance: `-||h + r - t||_p`.
    TransE { norm: Norm },
    /// Bilinear diagonal product: `sum(h * r * t)`.
    DistMult,
}

impl Interaction {
    /// Score fully specified (h, r, t) rows. All inputs `(batch, dim)`,
    /// output `(batch,)`.
    fn score_triples(&self, h: &Tensor, r: &Tensor, t: &Tensor) -> Result<Tensor> {
        match *self {
            Self::TransE { norm } => {
                let diff = ((h + r)? - t)?;
                Ok(lp_distance(&diff, norm, 1)?.neg()?)
            }
            Self::DistMult => Ok(((h * r)? * t)?.sum(1)?),
        }
    }

    /// Score every candidate tail for `(batch, dim)` head/relation rows
    /// against the full `(num_entities, dim)` table. Output
    /// `(batch, num_entities)`.
    fn rank_tails(&self, h: &Tensor, r: &Tensor, all_entities: &Tensor) -> Result<Tensor> {
        match *self {
            Self::TransE { norm } => {
                let hr = (h + r)?;
                let diff = hr.unsqueeze(1)?.broadcast_sub(&all_entities.unsqueeze(0)?)?;
                Ok(lp_distance(&diff, norm, 2)?.neg()?)
            }
            Self::DistMult => Ok((h * r)?.matmul(&all_entities.t()?)?),
        }
    }

    /// Score every candidate head for `(batch, dim)` relation/tail rows.
    /// Output `(batch, num_entities)`.
    fn rank_heads(&self, r: &Tensor, t: &Tensor, all_entities: &Tensor) -> Result<Tensor> {
        match *self {
            Self::TransE { norm } => {
                // -||e + r - t|| over candidates e equals -||(t - r) - e||.
                let target = (t - r)?;
                let diff = target.unsqueeze(1)?.broadcast_sub(&all_entities.unsqueeze(0)?)?;
                Ok(lp_distance(&diff, norm, 2)?.neg()?)
            }
            Self::DistMult => Ok((r * t)?.matmul(&all_entities.t()?)?),
        }
    }
}

fn lp_distance(diff: &Tensor, norm: Norm, dim: usize) -> Result<Tensor> {
    match norm {
        Norm::L1 => Ok(diff.abs()?.sum(dim)?),
        Norm::L2 => Ok(diff.sqr()?.sum(dim)?.sqrt()?),
    }
}

/// Model construction parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub interaction: Interaction,
    pub embedding_dim: usize,
    /// Ranking margin; required by margin-based training, unused otherwise.
    pub margin: Option<f32>,
    pub regularizer: Option<RegularizerConfig>,
    /// Seed for embedding initialization.
    pub seed: u64,
    /// Place embeddings on the first CUDA device when one is available.
    pub prefer_cuda: bool,
}

impl ModelConfig {
    /// TransE defaults: L1 distance, margin 1.0, no regularizer.
    pub fn transe(embedding_dim: usize) -> Self {
        Self {
            interaction: Interaction::TransE { norm: Norm::L1 },
            embedding_dim,
            margin: Some(1.0),
            regularizer: None,
            seed: 42,
            prefer_cuda: false,
        }
    }

    /// DistMult defaults: normalized L2 regularization on relations.
    pub fn distmult(embedding_dim: usize) -> Self {
        Self {
            interaction: Interaction::DistMult,
            embedding_dim,
            margin: None,
            regularizer: Some(RegularizerConfig::distmult_default()),
            seed: 42,
            prefer_cuda: false,
        }
    }

    pub fn with_margin(mut self, margin: f32) -> Self {
        self.margin = Some(margin);
        self
    }

    pub fn with_regularizer(mut self, config: RegularizerConfig) -> Self {
        self.regularizer = Some(config);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// A knowledge-graph embedding model: two embedding tables plus an
/// interaction function.
///
/// The scoring methods take `&mut self` because an attached regularizer
/// accumulates a penalty over the embeddings each forward pass touches;
/// [`KgeModel::pop_regularization_term`] yields that term exactly once per
/// optimization step. [`KgeModel::predict`] is read-only inference and
/// leaves the regularizer alone.
#[derive(Debug)]
pub struct KgeModel {
    interaction: Interaction,
    entities: EmbeddingTable,
    relations: EmbeddingTable,
    regularizer: Option<LpRegularizer>,
    reg_term: Option<Tensor>,
    margin: Option<f32>,
    device: Device,
}

impl KgeModel {
    /// Build a model for `num_entities` x `num_relations` id spaces.
    ///
    /// Fails with [`Error::InvalidConfig`] on a zero dimension or
    /// cardinality, a non-positive margin, or malformed regularizer
    /// settings.
    pub fn new(config: &ModelConfig, num_entities: usize, num_relations: usize) -> Result<Self> {
        if let Some(margin) = config.margin {
            if !(margin > 0.0) || !margin.is_finite() {
                return Err(Error::InvalidConfig(format!(
                    "margin must be positive and finite, got {}",
                    margin
                )));
            }
        }
        let regularizer = config
            .regularizer
            .map(LpRegularizer::new)
            .transpose()?;
        let device = resolve_device(config.prefer_cuda)?;

        let (entity_init, relation_init) = match config.interaction {
            Interaction::TransE { .. } => {
                let init = Initializer::uniform_for_dim(config.embedding_dim);
                (init, init)
            }
            Interaction::DistMult => (Initializer::XavierUniform, Initializer::XavierUniform),
        };

        let entities = EmbeddingTable::new(
            num_entities,
            config.embedding_dim,
            entity_init,
            config.seed,
            &device,
        )?;
        let relations = EmbeddingTable::new(
            num_relations,
            config.embedding_dim,
            relation_init,
            config.seed.wrapping_add(1),
            &device,
        )?;

        // DistMult starts from unit-length relation vectors.
        if config.interaction == Interaction::DistMult {
            relations.normalize_in_place(Norm::L2)?;
        }

        Ok(Self {
            interaction: config.interaction,
            entities,
            relations,
            regularizer,
            reg_term: None,
            margin: config.margin,
            device,
        })
    }

    /// Score a batch of fully specified triples. Output `(batch,)`.
    pub fn score_hrt(&mut self, batch: &[Triple]) -> Result<Tensor> {
        let heads: Vec<usize> = batch.iter().map(|t| t.head).collect();
        let relations: Vec<usize> = batch.iter().map(|t| t.relation).collect();
        let tails: Vec<usize> = batch.iter().map(|t| t.tail).collect();

        let h = self.entities.lookup(&heads, "entity")?;
        let r = self.relations.lookup(&relations, "relation")?;
        let t = self.entities.lookup(&tails, "entity")?;

        let scores = self.interaction.score_triples(&h, &r, &t)?;
        self.accumulate_regularization(&r)?;
        Ok(scores)
    }

    /// Score every entity as the tail of each (head, relation) pair.
    /// Output `(batch, num_entities)`.
    pub fn score_t(&mut self, hr_batch: &[(usize, usize)]) -> Result<Tensor> {
        let heads: Vec<usize> = hr_batch.iter().map(|&(h, _)| h).collect();
        let relations: Vec<usize> = hr_batch.iter().map(|&(_, r)| r).collect();

        let h = self.entities.lookup(&heads, "entity")?;
        let r = self.relations.lookup(&relations, "relation")?;

        let scores = self.interaction.rank_tails(&h, &r, self.entities.weights())?;
        self.accumulate_regularization(&r)?;
        Ok(scores)
    }

    /// Score every entity as the head of each (relation, tail) pair.
    /// Output `(batch, num_entities)`.
    pub fn score_h(&mut self, rt_batch: &[(usize, usize)]) -> Result<Tensor> {
        let relations: Vec<usize> = rt_batch.iter().map(|&(r, _)| r).collect();
        let tails: Vec<usize> = rt_batch.iter().map(|&(_, t)| t).collect();

        let r = self.relations.lookup(&relations, "relation")?;
        let t = self.entities.lookup(&tails, "entity")?;

        let scores = self.interaction.rank_heads(&r, &t, self.entities.weights())?;
        self.accumulate_regularization(&r)?;
        Ok(scores)
    }

    /// Single-triple inference. Returns the same value the batched path
    /// produces for that row; mutates nothing.
    pub fn predict(&self, triple: Triple) -> Result<f32> {
        let h = self.entities.lookup(&[triple.head], "entity")?;
        let r = self.relations.lookup(&[triple.relation], "relation")?;
        let t = self.entities.lookup(&[triple.tail], "entity")?;
        let scores = self.interaction.score_triples(&h, &r, &t)?;
        Ok(scores.to_vec1::<f32>()?[0])
    }

    /// Take the regularization term accumulated since the last call.
    ///
    /// `None` when no regularizer is attached or no forward pass has run
    /// since the last pop, so the term joins the loss at most once per
    /// optimization step.
    pub fn pop_regularization_term(&mut self) -> Option<Tensor> {
        self.reg_term.take()
    }

    /// Forward-constraint hook, invoked after every optimizer step:
    /// rescales entity rows to unit Euclidean norm. Idempotent and
    /// independent of gradient state.
    pub fn post_parameter_update(&mut self) -> Result<()> {
        match self.interaction {
            Interaction::TransE { .. } | Interaction::DistMult => {
                self.entities.normalize_in_place(Norm::L2)
            }
        }
    }

    /// Variables for the optimizer: both embedding tables.
    pub fn trainable_vars(&self) -> Vec<candle_core::Var> {
        vec![self.entities.var().clone(), self.relations.var().clone()]
    }

    fn accumulate_regularization(&mut self, touched: &Tensor) -> Result<()> {
        if let Some(reg) = &self.regularizer {
            let penalty = reg.penalty(touched)?;
            self.reg_term = Some(match self.reg_term.take() {
                Some(acc) => (acc + penalty)?,
                None => penalty,
            });
        }
        Ok(())
    }

    pub fn interaction(&self) -> Interaction {
        self.interaction
    }

    pub fn margin(&self) -> Option<f32> {
        self.margin
    }

    pub fn num_entities(&self) -> usize {
        self.entities.num_rows()
    }

    pub fn num_relations(&self) -> usize {
        self.relations.num_rows()
    }

    pub fn embedding_dim(&self) -> usize {
        self.entities.dim()
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn entity_embeddings(&self) -> &EmbeddingTable {
        &self.entities
    }

    pub fn relation_embeddings(&self) -> &EmbeddingTable {
        &self.relations
    }
}

fn resolve_device(prefer_cuda: bool) -> Result<Device> {
    if prefer_cuda {
        Ok(Device::cuda_if_available(0)?)
    } else {
        Ok(Device::Cpu)
    }
}
