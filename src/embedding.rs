//! Embedding tables: dense, id-indexed, trainable.
//!
//! An [`EmbeddingTable`] is a `(num_rows, dim)` matrix of `f32` wrapped in a
//! [`candle_core::Var`] so gradients flow through lookups. Row count and
//! dimension are fixed at construction.

use candle_core::{Device, Tensor, Var};
use rand::prelude::*;
use rand_xorshift::XorShiftRng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Vector norm used for row normalization and translational distances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Norm {
    /// Manhattan norm.
    L1,
    /// Euclidean norm.
    L2,
}

/// Row initialization policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Initializer {
    /// Uniform in `[-bound, bound]`.
    Uniform { bound: f32 },
    /// Xavier/Glorot uniform: bound `sqrt(6 / (num_rows + dim))`.
    XavierUniform,
}

impl Initializer {
    /// The TransE-paper default: uniform in `[-6/sqrt(dim), 6/sqrt(dim)]`
    /// (Bordes et al. 2013).
    pub fn uniform_for_dim(dim: usize) -> Self {
        Self::Uniform {
            bound: 6.0 / (dim as f32).sqrt(),
        }
    }

    fn bound(&self, num_rows: usize, dim: usize) -> f32 {
        match *self {
            Self::Uniform { bound } => bound,
            Self::XavierUniform => (6.0 / (num_rows + dim) as f32).sqrt(),
        }
    }
}

/// A trainable embedding table.
#[derive(Debug)]
pub struct EmbeddingTable {
    weights: Var,
    num_rows: usize,
    dim: usize,
    device: Device,
}

impl EmbeddingTable {
    /// Allocate and initialize a `(num_rows, dim)` table on `device`.
    ///
    /// Initialization is drawn from a seeded RNG so runs with the same seed
    /// produce the same starting point on any device.
    pub fn new(
        num_rows: usize,
        dim: usize,
        initializer: Initializer,
        seed: u64,
        device: &Device,
    ) -> Result<Self> {
        if num_rows == 0 {
            return Err(Error::InvalidConfig(
                "embedding table needs at least one row".into(),
            ));
        }
        if dim == 0 {
            return Err(Error::InvalidConfig(
                "embedding dimension must be positive".into(),
            ));
        }

        let bound = initializer.bound(num_rows, dim);
        let mut rng = XorShiftRng::seed_from_u64(seed);
        let data: Vec<f32> = (0..num_rows * dim)
            .map(|_| rng.random_range(-bound..bound))
            .collect();
        let tensor = Tensor::from_vec(data, (num_rows, dim), device)?;
        let weights = Var::from_tensor(&tensor)?;

        Ok(Self {
            weights,
            num_rows,
            dim,
            device: device.clone(),
        })
    }

    /// Look up a batch of rows. Differentiable; gradients flow back into
    /// the table through `index_select`.
    pub fn lookup(&self, ids: &[usize], kind: &'static str) -> Result<Tensor> {
        let mut indices = Vec::with_capacity(ids.len());
        for &id in ids {
            if id >= self.num_rows {
                return Err(Error::IndexOutOfBounds {
                    kind,
                    id,
                    num_rows: self.num_rows,
                });
            }
            indices.push(id as u32);
        }
        let ids = Tensor::from_vec(indices, (ids.len(),), &self.device)?;
        Ok(self.weights.as_tensor().index_select(&ids, 0)?)
    }

    /// The full `(num_rows, dim)` weight tensor, for ranking against every
    /// row at once.
    pub fn weights(&self) -> &Tensor {
        self.weights.as_tensor()
    }

    /// The underlying variable, for handing to an optimizer.
    pub fn var(&self) -> &Var {
        &self.weights
    }

    /// Rescale every row to unit norm, in place.
    ///
    /// Runs through `Var::set`, outside the autodiff graph: no gradient
    /// flows through the rescale itself. Idempotent.
    pub fn normalize_in_place(&self, norm: Norm) -> Result<()> {
        let w = self.weights.as_tensor();
        let norms = match norm {
            Norm::L1 => w.abs()?.sum_keepdim(1)?,
            Norm::L2 => w.sqr()?.sum_keepdim(1)?.sqrt()?,
        };
        // Zero rows stay zero instead of dividing by zero.
        let norms = norms.maximum(1e-12)?;
        let normalized = w.broadcast_div(&norms)?;
        self.weights.set(&normalized)?;
        Ok(())
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn device(&self) -> &Device {
        &self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: usize, dim: usize) -> EmbeddingTable {
        EmbeddingTable::new(rows, dim, Initializer::uniform_for_dim(dim), 7, &Device::Cpu)
            .unwrap()
    }

    #[test]
    fn test_construction_rejects_zero_sizes() {
        let zero_rows =
            EmbeddingTable::new(0, 4, Initializer::XavierUniform, 7, &Device::Cpu);
        assert!(matches!(zero_rows, Err(Error::InvalidConfig(_))));

        let zero_dim = EmbeddingTable::new(4, 0, Initializer::XavierUniform, 7, &Device::Cpu);
        assert!(matches!(zero_dim, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_lookup_returns_dim_length_rows() {
        let table = table(5, 8);
        let batch = table.lookup(&[0, 3, 4], "entity").unwrap();
        assert_eq!(batch.dims(), &[3, 8]);
    }

    #[test]
    fn test_lookup_out_of_range_fails() {
        let table = table(5, 8);
        let result = table.lookup(&[0, 5], "entity");
        assert!(matches!(
            result,
            Err(Error::IndexOutOfBounds { kind: "entity", id: 5, num_rows: 5 })
        ));
    }

    #[test]
    fn test_seeded_init_is_deterministic() {
        let a = table(4, 6).weights().to_vec2::<f32>().unwrap();
        let b = table(4, 6).weights().to_vec2::<f32>().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_normalize_l2_gives_unit_rows() {
        let table = table(6, 16);
        table.normalize_in_place(Norm::L2).unwrap();
        let rows = table.weights().to_vec2::<f32>().unwrap();
        for row in rows {
            let norm: f32 = row.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5, "row norm {}", norm);
        }
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let table = table(6, 16);
        table.normalize_in_place(Norm::L2).unwrap();
        let once = table.weights().to_vec2::<f32>().unwrap();
        table.normalize_in_place(Norm::L2).unwrap();
        let twice = table.weights().to_vec2::<f32>().unwrap();

        for (a, b) in once.iter().zip(twice.iter()) {
            for (x, y) in a.iter().zip(b.iter()) {
                assert!((x - y).abs() < 1e-6);
            }
        }
    }
}
