//! Fixed-topology feedforward brains for bactosim agents.
//!
//! A brain is a pure function of its weights: three fully connected layers
//! (`6 → 8 → 2`) with one bias per hidden/output unit and `tanh` activations.
//! Weights are laid out unit by unit: for each unit of a layer, the weights
//! of its incoming connections in source order, followed by its bias. Genomes
//! store exactly this layout, so gene `i` of the weight segment always maps
//! to the same synapse.

mod feedforward;

pub use feedforward::FeedForwardBrain;

use thiserror::Error;

/// Layer sizes of every bactosim brain.
pub const TOPOLOGY: [usize; 3] = [INPUT_SIZE, HIDDEN_SIZE, OUTPUT_SIZE];
/// Number of sensory inputs.
pub const INPUT_SIZE: usize = 6;
/// Number of hidden units.
pub const HIDDEN_SIZE: usize = 8;
/// Number of control outputs (turn delta, speed multiplier).
pub const OUTPUT_SIZE: usize = 2;
/// Total weights plus biases for [`TOPOLOGY`].
pub const WEIGHT_COUNT: usize = weight_count(&TOPOLOGY);

/// Count weights plus biases of a fully connected topology.
#[must_use]
pub const fn weight_count(topology: &[usize]) -> usize {
    let mut total = 0;
    let mut layer = 1;
    while layer < topology.len() {
        total += topology[layer - 1] * topology[layer] + topology[layer];
        layer += 1;
    }
    total
}

/// Errors raised when weights do not fit the brain topology or batch shape.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BrainError {
    #[error("brain expects {expected} weights but received {actual}")]
    TopologyMismatch { expected: usize, actual: usize },
    #[error("batch has {weights} weight rows but {inputs} input rows")]
    BatchMismatch { weights: usize, inputs: usize },
}
