//! Knowledge graph embedding training and inference.
//!
//! Knowledge graphs store facts as (head, relation, tail) triples:
//! `(Einstein, won, NobelPrize)`, `(Paris, capitalOf, France)`. This crate
//! learns low-dimensional vectors for entities and relations such that a
//! scoring function separates true triples from false ones, supporting
//! link prediction and triple classification.
//!
//! ## Interaction functions
//!
//! | Model | Score | Hypothesis |
//! |-------|-------|------------|
//! | TransE | `-||h + r - t||_p` | Relations are translations ([Bordes et al. 2013](https://papers.nips.cc/paper/2013/hash/1cecc7a77928ca8133fa24680a88d2f9-Abstract.html)) |
//! | DistMult | `sum(h * r * t)` | Relations are diagonal scalings ([Yang et al. 2015](https://arxiv.org/abs/1412.6575)) |
//!
//! ## Training assumptions
//!
//! Two regimes share the same scoring math:
//!
//! - **Open-world** ([`OwaTrainingLoop`]): absent triples are unknown, not
//!   false. Each positive is contrasted against sampled corruptions (head
//!   or tail replaced uniformly) with a margin ranking loss.
//! - **Closed-world** ([`CwaTrainingLoop`]): each (head, relation) pair is
//!   scored against *every* entity and trained as multi-label
//!   classification; entities outside the completion set are implicit
//!   negatives. Optional label smoothing spreads an epsilon of label mass
//!   over the non-completions.
//!
//! ## Example
//!
//! ```rust,ignore
//! use kgembed::{
//!     KgeModel, ModelConfig, OwaInstances, OwaTrainingLoop, TrainingConfig, Triple,
//! };
//!
//! let triples = vec![
//!     Triple::new(0, 0, 1),
//!     Triple::new(1, 0, 2),
//!     Triple::new(2, 1, 0),
//! ];
//! let instances = OwaInstances::new(triples, 3, 2)?;
//!
//! let model = KgeModel::new(&ModelConfig::transe(64), 3, 2)?;
//! let mut run = OwaTrainingLoop::new(model, TrainingConfig::default())?;
//! let losses = run.train(&instances, 100, 32)?;
//!
//! let model = run.into_model();
//! let score = model.predict(Triple::new(0, 0, 1))?;
//! ```
//!
//! ## Scope
//!
//! Dataset download/parsing, hyperparameter search, evaluation reporting,
//! and distributed training live upstream; this crate covers the model
//! contract (embedding ownership, scoring, constraints, regularization)
//! and the training loops. Gradients come from [`candle_core`]'s autodiff;
//! a training run is one synchronous thread of control and any batch error
//! aborts the run.

pub mod embedding;
pub mod error;
pub mod loss;
pub mod model;
pub mod regularizer;
pub mod sampling;
pub mod training;
pub mod triples;

pub use embedding::{EmbeddingTable, Initializer, Norm};
pub use error::{Error, Result};
pub use loss::{BceWithLogitsLoss, MarginRankingLoss};
pub use model::{Interaction, KgeModel, ModelConfig};
pub use regularizer::{LpRegularizer, RegularizerConfig};
pub use sampling::UniformNegativeSampler;
pub use training::{CwaTrainingLoop, OptimizerKind, OwaTrainingLoop, TrainingConfig};
pub use triples::{CwaInstances, OwaInstances, Triple};
