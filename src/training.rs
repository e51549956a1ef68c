//! Training loops for the two training assumptions.
//!
//! [`OwaTrainingLoop`] trains under the open-world assumption: each positive
//! triple is contrasted against sampled corruptions with a margin ranking
//! loss. [`CwaTrainingLoop`] trains under the closed-world assumption: each
//! (head, relation) pair is scored against every entity and pushed toward
//! its multi-label completion vector with binary cross-entropy.
//!
//! Both loops share the same skeleton. Per epoch: draw a fresh shuffle
//! permutation (never reused across epochs, which matters for
//! gradient-noise reproducibility), slice into `batch_size` chunks (the
//! last chunk may be short), and for each chunk run forward, loss,
//! `backward_step`, and the model's forward-constraint hook. The epoch loss
//! is the size-weighted mean of batch losses over the total instance count,
//! not the mean of batch means, so a short final batch is weighted
//! correctly.
//!
//! Execution is synchronous and single-threaded: a batch fully completes
//! before the next begins, and the embedding tables are mutated only by the
//! optimizer step and the constraint hook. Any error inside a batch aborts
//! the whole run; there is no partial-epoch recovery and no retry.

use candle_core::{Device, Tensor, Var};
use candle_nn::optim::{AdamW, Optimizer, ParamsAdamW, SGD};
use rand::prelude::*;
use rand_xorshift::XorShiftRng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::loss::{BceWithLogitsLoss, MarginRankingLoss};
use crate::model::KgeModel;
use crate::sampling::UniformNegativeSampler;
use crate::triples::{CwaInstances, OwaInstances, Triple};

/// Epochs between progress lines on stderr.
const REPORT_EVERY: usize = 10;

/// Optimizer selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OptimizerKind {
    /// Plain stochastic gradient descent, the classic TransE recipe.
    Sgd,
    /// AdamW with decoupled weight decay.
    AdamW { weight_decay: f64 },
}

/// Run-level training parameters. Epoch and batch counts are arguments to
/// `train` itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub learning_rate: f64,
    pub optimizer: OptimizerKind,
    /// Negatives sampled per positive (open-world only).
    pub num_negs_per_pos: usize,
    /// Seed for shuffling and negative sampling.
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            optimizer: OptimizerKind::Sgd,
            num_negs_per_pos: 1,
            seed: 42,
        }
    }
}

impl TrainingConfig {
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_optimizer(mut self, optimizer: OptimizerKind) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn with_num_negs_per_pos(mut self, n: usize) -> Self {
        self.num_negs_per_pos = n;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn validate(&self) -> Result<()> {
        if !(self.learning_rate > 0.0) || !self.learning_rate.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "learning rate must be positive and finite, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }
}

/// Uniform wrapper over the candle optimizers.
enum OptimizerWrapper {
    Sgd(SGD),
    AdamW(AdamW),
}

impl OptimizerWrapper {
    fn new(vars: Vec<Var>, config: &TrainingConfig) -> Result<Self> {
        match config.optimizer {
            OptimizerKind::Sgd => Ok(Self::Sgd(SGD::new(vars, config.learning_rate)?)),
            OptimizerKind::AdamW { weight_decay } => {
                let params = ParamsAdamW {
                    lr: config.learning_rate,
                    weight_decay,
                    ..Default::default()
                };
                Ok(Self::AdamW(AdamW::new(vars, params)?))
            }
        }
    }

    /// One optimization step: a fresh backward pass from `loss`, then a
    /// parameter update. Gradients never carry over between calls.
    fn backward_step(&mut self, loss: &Tensor) -> candle_core::Result<()> {
        match self {
            Self::Sgd(opt) => opt.backward_step(loss),
            Self::AdamW(opt) => opt.backward_step(loss),
        }
    }
}

/// Size-weighted mean of `(batch_loss, batch_len)` entries: total loss mass
/// divided by total instance count.
fn size_weighted_mean(batch_losses: &[(f32, usize)]) -> f32 {
    let total: usize = batch_losses.iter().map(|&(_, n)| n).sum();
    if total == 0 {
        return 0.0;
    }
    let mass: f32 = batch_losses.iter().map(|&(l, n)| l * n as f32).sum();
    mass / total as f32
}

fn validate_run(num_epochs: usize, batch_size: usize) -> Result<()> {
    if num_epochs == 0 {
        return Err(Error::InvalidConfig("num_epochs must be positive".into()));
    }
    if batch_size == 0 {
        return Err(Error::InvalidConfig("batch_size must be positive".into()));
    }
    Ok(())
}

fn validate_cardinalities(
    model: &KgeModel,
    num_entities: usize,
    num_relations: usize,
) -> Result<()> {
    if model.num_entities() != num_entities || model.num_relations() != num_relations {
        return Err(Error::InvalidConfig(format!(
            "model covers {} entities / {} relations but instances declare {} / {}",
            model.num_entities(),
            model.num_relations(),
            num_entities,
            num_relations
        )));
    }
    Ok(())
}

/// Open-world training loop: margin ranking against sampled corruptions.
pub struct OwaTrainingLoop {
    model: KgeModel,
    config: TrainingConfig,
    loss: MarginRankingLoss,
    losses_per_epoch: Vec<f32>,
}

impl OwaTrainingLoop {
    /// Fails fast when the learning rate is out of domain or the model
    /// carries no ranking margin.
    pub fn new(model: KgeModel, config: TrainingConfig) -> Result<Self> {
        config.validate()?;
        let margin = model.margin().ok_or_else(|| {
            Error::InvalidConfig("margin ranking training needs a model margin".into())
        })?;
        let loss = MarginRankingLoss::new(margin)?;
        Ok(Self {
            model,
            config,
            loss,
            losses_per_epoch: Vec::new(),
        })
    }

    /// Run `num_epochs` over the instances and return the per-epoch loss
    /// history (one appended entry per epoch, never mutated afterwards).
    pub fn train(
        &mut self,
        instances: &OwaInstances,
        num_epochs: usize,
        batch_size: usize,
    ) -> Result<Vec<f32>> {
        validate_run(num_epochs, batch_size)?;
        validate_cardinalities(&self.model, instances.num_entities(), instances.num_relations())?;
        if instances.is_empty() {
            return Err(Error::InvalidConfig("no training instances".into()));
        }

        let mut rng = XorShiftRng::seed_from_u64(self.config.seed);
        let mut sampler = UniformNegativeSampler::new(
            instances.num_entities(),
            self.config.num_negs_per_pos,
            self.config.seed.wrapping_add(0x9e37_79b9),
        )?;
        let mut optimizer = OptimizerWrapper::new(self.model.trainable_vars(), &self.config)?;

        let triples = instances.triples();
        let num_negs = sampler.num_negs_per_pos();

        for epoch in 0..num_epochs {
            let mut order: Vec<usize> = (0..triples.len()).collect();
            order.shuffle(&mut rng);

            let mut batch_losses = Vec::with_capacity(order.len() / batch_size + 1);
            for chunk in order.chunks(batch_size) {
                let batch: Vec<Triple> = chunk.iter().map(|&i| triples[i]).collect();
                let negatives = sampler.corrupt_batch(&batch);
                // Align one positive score with each of its negatives.
                let positives: Vec<Triple> = if num_negs == 1 {
                    batch.clone()
                } else {
                    batch
                        .iter()
                        .flat_map(|t| std::iter::repeat(*t).take(num_negs))
                        .collect()
                };

                let pos_scores = self.model.score_hrt(&positives)?;
                let neg_scores = self.model.score_hrt(&negatives)?;
                let mut loss = self.loss.forward(&pos_scores, &neg_scores)?;
                if let Some(reg) = self.model.pop_regularization_term() {
                    loss = (loss + reg)?;
                }

                let loss_value = loss.to_scalar::<f32>()?;
                optimizer.backward_step(&loss)?;
                self.model.post_parameter_update()?;
                batch_losses.push((loss_value, batch.len()));
            }

            let epoch_loss = size_weighted_mean(&batch_losses);
            self.losses_per_epoch.push(epoch_loss);
            if epoch % REPORT_EVERY == 0 {
                eprintln!("Epoch {}: loss = {:.4}", epoch, epoch_loss);
            }
        }

        Ok(self.losses_per_epoch.clone())
    }

    pub fn losses_per_epoch(&self) -> &[f32] {
        &self.losses_per_epoch
    }

    pub fn model(&self) -> &KgeModel {
        &self.model
    }

    pub fn into_model(self) -> KgeModel {
        self.model
    }
}

/// Closed-world training loop: multi-label classification over all
/// entities.
pub struct CwaTrainingLoop {
    model: KgeModel,
    config: TrainingConfig,
    loss: BceWithLogitsLoss,
    losses_per_epoch: Vec<f32>,
}

impl CwaTrainingLoop {
    pub fn new(model: KgeModel, config: TrainingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            model,
            config,
            loss: BceWithLogitsLoss,
            losses_per_epoch: Vec::new(),
        })
    }

    /// Train on (head, relation) pairs labeled with their tail completion
    /// sets. With smoothing enabled, each true completion is relabeled
    /// `1 - epsilon` and the remaining mass spreads uniformly over the
    /// other `num_entities - 1` slots.
    pub fn train(
        &mut self,
        instances: &CwaInstances,
        num_epochs: usize,
        batch_size: usize,
        label_smoothing: bool,
        label_smoothing_epsilon: f32,
    ) -> Result<Vec<f32>> {
        validate_run(num_epochs, batch_size)?;
        validate_cardinalities(&self.model, instances.num_entities(), instances.num_relations())?;
        if instances.is_empty() {
            return Err(Error::InvalidConfig("no training instances".into()));
        }
        let epsilon = if label_smoothing {
            if !(0.0..1.0).contains(&label_smoothing_epsilon) {
                return Err(Error::InvalidConfig(format!(
                    "label smoothing epsilon must lie in [0, 1), got {}",
                    label_smoothing_epsilon
                )));
            }
            if instances.num_entities() < 2 {
                return Err(Error::InvalidConfig(
                    "label smoothing needs at least two entities".into(),
                ));
            }
            Some(label_smoothing_epsilon)
        } else {
            None
        };

        let mut rng = XorShiftRng::seed_from_u64(self.config.seed);
        let mut optimizer = OptimizerWrapper::new(self.model.trainable_vars(), &self.config)?;
        let device = self.model.device().clone();

        let pairs = instances.pairs();
        let completions = instances.completions();
        let num_entities = instances.num_entities();

        for epoch in 0..num_epochs {
            let mut order: Vec<usize> = (0..pairs.len()).collect();
            order.shuffle(&mut rng);

            let mut batch_losses = Vec::with_capacity(order.len() / batch_size + 1);
            for chunk in order.chunks(batch_size) {
                let batch: Vec<(usize, usize)> = chunk.iter().map(|&i| pairs[i]).collect();
                let batch_completions: Vec<&[usize]> =
                    chunk.iter().map(|&i| completions[i].as_slice()).collect();
                let labels = label_matrix(&batch_completions, num_entities, epsilon, &device)?;

                let scores = self.model.score_t(&batch)?;
                let mut loss = self.loss.forward(&scores, &labels)?;
                if let Some(reg) = self.model.pop_regularization_term() {
                    loss = (loss + reg)?;
                }

                let loss_value = loss.to_scalar::<f32>()?;
                optimizer.backward_step(&loss)?;
                self.model.post_parameter_update()?;
                batch_losses.push((loss_value, batch.len()));
            }

            let epoch_loss = size_weighted_mean(&batch_losses);
            self.losses_per_epoch.push(epoch_loss);
            if epoch % REPORT_EVERY == 0 {
                eprintln!("Epoch {}: loss = {:.4}", epoch, epoch_loss);
            }
        }

        Ok(self.losses_per_epoch.clone())
    }

    pub fn losses_per_epoch(&self) -> &[f32] {
        &self.losses_per_epoch
    }

    pub fn model(&self) -> &KgeModel {
        &self.model
    }

    pub fn into_model(self) -> KgeModel {
        self.model
    }
}

/// Build the `(batch, num_entities)` label matrix: 1.0 at every true
/// completion and 0.0 elsewhere, or the smoothed pair
/// `(1 - eps, eps / (num_entities - 1))` when an epsilon is given.
fn label_matrix(
    completions: &[&[usize]],
    num_entities: usize,
    epsilon: Option<f32>,
    device: &Device,
) -> Result<Tensor> {
    let (positive, negative) = match epsilon {
        Some(eps) => (1.0 - eps, eps / (num_entities - 1) as f32),
        None => (1.0, 0.0),
    };
    let mut data = vec![negative; completions.len() * num_entities];
    for (row, set) in completions.iter().enumerate() {
        for &tail in *set {
            data[row * num_entities + tail] = positive;
        }
    }
    Ok(Tensor::from_vec(
        data,
        (completions.len(), num_entities),
        device,
    )?)
}
