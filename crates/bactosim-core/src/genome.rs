//! Fixed-length genomes encoding trait genes and brain weights.
//!
//! Layout: genes `[0, TRAIT_GENE_COUNT)` are trait genes in `[0, 1]`; genes
//! `[TRAIT_GENE_COUNT, GENOME_LENGTH)` are brain parameters in the order
//! expected by [`FeedForwardBrain`].

use bactosim_brain::{BrainError, FeedForwardBrain, WEIGHT_COUNT};
use rand::{Rng, RngCore, seq::index};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;

use crate::trait_pool::{TRAIT_POOL, TraitId, TraitSet};

/// Number of trait genes, one per entry of [`TRAIT_POOL`].
pub const TRAIT_GENE_COUNT: usize = TRAIT_POOL.len();
/// Total genes per genome.
pub const GENOME_LENGTH: usize = TRAIT_GENE_COUNT + WEIGHT_COUNT;
/// A trait is expressed iff its gene is strictly greater than this value.
pub const EXPRESSION_THRESHOLD: f64 = 0.5;
/// Absolute bound applied to weight genes after mutation.
pub const WEIGHT_LIMIT: f64 = 3.0;
/// Range of freshly initialized weight genes.
pub const INITIAL_WEIGHT_RANGE: f64 = 0.8;

/// Errors raised when raw gene data violates the genome layout.
#[derive(Debug, Error, PartialEq)]
pub enum GenomeError {
    #[error("genome must contain {expected} genes but has {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("gene {index} is not a finite number")]
    NonFinite { index: usize },
    #[error(transparent)]
    Brain(#[from] BrainError),
}

/// Fixed-length vector of genes; the single source of truth for traits and brain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Genome {
    genes: Vec<f64>,
}

impl Genome {
    /// Uniform random genome: trait genes in `[0, 1]`, weights in `[-0.8, 0.8]`.
    #[must_use]
    pub fn random(rng: &mut dyn RngCore) -> Self {
        let mut genes = Vec::with_capacity(GENOME_LENGTH);
        genes.extend((0..TRAIT_GENE_COUNT).map(|_| rng.random_range(0.0..=1.0)));
        genes.extend(
            (0..WEIGHT_COUNT).map(|_| rng.random_range(-INITIAL_WEIGHT_RANGE..=INITIAL_WEIGHT_RANGE)),
        );
        Self { genes }
    }

    /// Random genome expressing exactly `traits_per_agent` randomly chosen traits.
    #[must_use]
    pub fn random_biased(rng: &mut dyn RngCore, traits_per_agent: usize) -> Self {
        let expressed = traits_per_agent.min(TRAIT_GENE_COUNT);
        let mut genome = Self::random(rng);
        let chosen = index::sample(rng, TRAIT_GENE_COUNT, TRAIT_GENE_COUNT);
        for (rank, gene_index) in chosen.iter().enumerate() {
            genome.genes[gene_index] = if rank < expressed {
                rng.random_range(0.5..1.0_f64).max(0.5 + f64::EPSILON)
            } else {
                rng.random_range(0.0..0.45)
            };
        }
        genome
    }

    /// Wrap raw genes, checking the layout invariant.
    pub fn from_genes(genes: Vec<f64>) -> Result<Self, GenomeError> {
        if genes.len() != GENOME_LENGTH {
            return Err(GenomeError::LengthMismatch {
                expected: GENOME_LENGTH,
                actual: genes.len(),
            });
        }
        if let Some(index) = genes.iter().position(|gene| !gene.is_finite()) {
            return Err(GenomeError::NonFinite { index });
        }
        Ok(Self { genes })
    }

    /// All genes in layout order.
    #[must_use]
    pub fn genes(&self) -> &[f64] {
        &self.genes
    }

    /// Mutable view of all genes; the length cannot change through a slice.
    pub(crate) fn genes_mut(&mut self) -> &mut [f64] {
        &mut self.genes
    }

    #[must_use]
    pub fn trait_genes(&self) -> &[f64] {
        &self.genes[..TRAIT_GENE_COUNT]
    }

    #[must_use]
    pub fn weight_genes(&self) -> &[f64] {
        &self.genes[TRAIT_GENE_COUNT..]
    }

    #[must_use]
    pub fn trait_gene(&self, id: TraitId) -> f64 {
        self.genes[id.index()]
    }

    /// Overwrite a trait gene, clamped to `[0, 1]`.
    pub fn set_trait_gene(&mut self, id: TraitId, value: f64) {
        self.genes[id.index()] = value.clamp(0.0, 1.0);
    }

    #[must_use]
    pub fn is_expressed(&self, id: TraitId) -> bool {
        self.trait_gene(id) > EXPRESSION_THRESHOLD
    }

    /// Expressed traits in pool order (not gene magnitude order).
    #[must_use]
    pub fn express_traits(&self) -> SmallVec<[TraitId; 8]> {
        TraitId::all().filter(|id| self.is_expressed(*id)).collect()
    }

    /// Expressed traits as a bitset.
    #[must_use]
    pub fn trait_set(&self) -> TraitSet {
        TraitId::all().filter(|id| self.is_expressed(*id)).collect()
    }

    /// Decode the brain stored in the weight segment.
    pub fn build_brain(&self) -> Result<FeedForwardBrain, GenomeError> {
        Ok(FeedForwardBrain::from_weights(self.weight_genes())?)
    }

    /// Store `brain`'s parameters back into the weight segment.
    pub fn write_brain(&mut self, brain: &FeedForwardBrain) {
        for (slot, weight) in self.genes[TRAIT_GENE_COUNT..]
            .iter_mut()
            .zip(brain.weights())
        {
            *slot = weight;
        }
    }

    /// Clamp trait genes to `[0, 1]` and weights to `[-WEIGHT_LIMIT, WEIGHT_LIMIT]`.
    pub fn clamp_genes(&mut self) {
        let (traits, weights) = self.genes.split_at_mut(TRAIT_GENE_COUNT);
        for gene in traits {
            *gene = gene.clamp(0.0, 1.0);
        }
        for gene in weights {
            *gene = gene.clamp(-WEIGHT_LIMIT, WEIGHT_LIMIT);
        }
    }

    /// Squared Euclidean distance in full genome space.
    #[must_use]
    pub fn distance_sq(&self, other: &[f64]) -> f64 {
        self.genes
            .iter()
            .zip(other)
            .map(|(a, b)| (a - b) * (a - b))
            .sum()
    }
}

impl TryFrom<Vec<f64>> for Genome {
    type Error = GenomeError;

    fn try_from(genes: Vec<f64>) -> Result<Self, Self::Error> {
        Self::from_genes(genes)
    }
}

impl From<Genome> for Vec<f64> {
    fn from(genome: Genome) -> Self {
        genome.genes
    }
}
