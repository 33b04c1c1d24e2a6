//! Three-layer `tanh` perceptron with a genome-compatible weight layout.

use crate::{BrainError, HIDDEN_SIZE, INPUT_SIZE, OUTPUT_SIZE, WEIGHT_COUNT};

/// Weights feeding one hidden unit: inputs then bias.
type HiddenRow = [f64; INPUT_SIZE + 1];
/// Weights feeding one output unit: hidden activations then bias.
type OutputRow = [f64; HIDDEN_SIZE + 1];

/// Deterministic feedforward brain decoded from a genome's weight segment.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedForwardBrain {
    hidden: [HiddenRow; HIDDEN_SIZE],
    output: [OutputRow; OUTPUT_SIZE],
}

impl Default for FeedForwardBrain {
    fn default() -> Self {
        Self {
            hidden: [[0.0; INPUT_SIZE + 1]; HIDDEN_SIZE],
            output: [[0.0; HIDDEN_SIZE + 1]; OUTPUT_SIZE],
        }
    }
}

impl FeedForwardBrain {
    /// Decode a brain from exactly [`WEIGHT_COUNT`] parameters.
    pub fn from_weights(weights: &[f64]) -> Result<Self, BrainError> {
        if weights.len() != WEIGHT_COUNT {
            return Err(BrainError::TopologyMismatch {
                expected: WEIGHT_COUNT,
                actual: weights.len(),
            });
        }
        let mut brain = Self::default();
        let mut cursor = weights.iter().copied();
        for row in brain.hidden.iter_mut() {
            for (slot, value) in row.iter_mut().zip(&mut cursor) {
                *slot = value;
            }
        }
        for row in brain.output.iter_mut() {
            for (slot, value) in row.iter_mut().zip(&mut cursor) {
                *slot = value;
            }
        }
        Ok(brain)
    }

    /// Encode the brain back into `out`, which must hold [`WEIGHT_COUNT`] slots.
    pub fn write_weights(&self, out: &mut [f64]) -> Result<(), BrainError> {
        if out.len() != WEIGHT_COUNT {
            return Err(BrainError::TopologyMismatch {
                expected: WEIGHT_COUNT,
                actual: out.len(),
            });
        }
        for (slot, value) in out.iter_mut().zip(self.parameters()) {
            *slot = *value;
        }
        Ok(())
    }

    /// Flattened copy of all parameters in genome order.
    #[must_use]
    pub fn weights(&self) -> Vec<f64> {
        self.parameters().copied().collect()
    }

    fn parameters(&self) -> impl Iterator<Item = &f64> {
        self.hidden
            .iter()
            .flat_map(|row| row.iter())
            .chain(self.output.iter().flat_map(|row| row.iter()))
    }

    /// Mutable access to a single parameter by its flat genome-order index.
    #[must_use]
    pub fn weight_mut(&mut self, index: usize) -> Option<&mut f64> {
        let hidden_len = HIDDEN_SIZE * (INPUT_SIZE + 1);
        if index < hidden_len {
            let row = index / (INPUT_SIZE + 1);
            let col = index % (INPUT_SIZE + 1);
            return Some(&mut self.hidden[row][col]);
        }
        let rest = index - hidden_len;
        if rest < OUTPUT_SIZE * (HIDDEN_SIZE + 1) {
            let row = rest / (HIDDEN_SIZE + 1);
            let col = rest % (HIDDEN_SIZE + 1);
            return Some(&mut self.output[row][col]);
        }
        None
    }

    /// Evaluate the network. Outputs lie in `[-1, 1]`.
    #[must_use]
    pub fn forward(&self, inputs: &[f64; INPUT_SIZE]) -> [f64; OUTPUT_SIZE] {
        let mut hidden = [0.0; HIDDEN_SIZE];
        for (activation, row) in hidden.iter_mut().zip(&self.hidden) {
            let (weights, bias) = row.split_at(INPUT_SIZE);
            let acc: f64 = weights.iter().zip(inputs).map(|(w, x)| w * x).sum();
            *activation = (acc + bias[0]).tanh();
        }

        let mut outputs = [0.0; OUTPUT_SIZE];
        for (activation, row) in outputs.iter_mut().zip(&self.output) {
            let (weights, bias) = row.split_at(HIDDEN_SIZE);
            let acc: f64 = weights.iter().zip(&hidden).map(|(w, h)| w * h).sum();
            *activation = (acc + bias[0]).tanh();
        }
        outputs
    }

    /// Evaluate every brain on its own input row, in batch order.
    pub fn forward_batch<'a, I>(batch: I) -> Vec<[f64; OUTPUT_SIZE]>
    where
        I: IntoIterator<Item = (&'a FeedForwardBrain, &'a [f64; INPUT_SIZE])>,
    {
        batch
            .into_iter()
            .map(|(brain, inputs)| brain.forward(inputs))
            .collect()
    }

    /// Decode `weights[i]` and evaluate it on `inputs[i]` for every row.
    pub fn forward_weights_batch(
        weights: &[Vec<f64>],
        inputs: &[[f64; INPUT_SIZE]],
    ) -> Result<Vec<[f64; OUTPUT_SIZE]>, BrainError> {
        if weights.len() != inputs.len() {
            return Err(BrainError::BatchMismatch {
                weights: weights.len(),
                inputs: inputs.len(),
            });
        }
        weights
            .iter()
            .zip(inputs)
            .map(|(row, input)| Ok(Self::from_weights(row)?.forward(input)))
            .collect()
    }
}
