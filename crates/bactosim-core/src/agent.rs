//! Agent state: genome-derived phenotype plus mutable simulation fields.

use bactosim_brain::{FeedForwardBrain, INPUT_SIZE, OUTPUT_SIZE};
use serde::{Deserialize, Serialize};

use crate::ga::fitness;
use crate::genome::{Genome, GenomeError};
use crate::trait_pool::{TraitEffects, TraitId, TraitSet};
use crate::{AgentId, Generation, Position, Velocity};

/// Terminal state reached by an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeathCause {
    Starvation,
    Predation,
    Hazard,
    Selection,
    OldAge,
}

/// A single bacterium. Traits and brain are always derived from `genome`.
#[derive(Debug, Clone)]
pub struct Agent {
    pub id: AgentId,
    genome: Genome,
    traits: TraitSet,
    effects: TraitEffects,
    brain: FeedForwardBrain,
    pub position: Position,
    pub velocity: Velocity,
    /// Heading in radians, wrapped into `(-π, π]`.
    pub heading: f64,
    pub energy: f64,
    pub age: f64,
    pub survival_time: f64,
    pub food_eaten: u32,
    pub energy_collected: f64,
    pub fitness: f64,
    pub species: Option<usize>,
    pub generation: Generation,
    alive: bool,
    death_cause: Option<DeathCause>,
    /// Sensor vector from the latest movement phase.
    pub sensors: [f64; INPUT_SIZE],
    /// Brain outputs from the latest movement phase.
    pub outputs: [f64; OUTPUT_SIZE],
}

impl Agent {
    /// Build an agent, decoding its phenotype from `genome`.
    pub fn new(
        id: AgentId,
        genome: Genome,
        position: Position,
        heading: f64,
        energy: f64,
        generation: Generation,
    ) -> Result<Self, GenomeError> {
        let traits = genome.trait_set();
        Ok(Self {
            id,
            effects: traits.effects(),
            brain: genome.build_brain()?,
            traits,
            genome,
            position,
            velocity: Velocity::default(),
            heading,
            energy,
            age: 0.0,
            survival_time: 0.0,
            food_eaten: 0,
            energy_collected: 0.0,
            fitness: 0.0,
            species: None,
            generation,
            alive: true,
            death_cause: None,
            sensors: [0.0; INPUT_SIZE],
            outputs: [0.0; OUTPUT_SIZE],
        })
    }

    #[must_use]
    pub fn genome(&self) -> &Genome {
        &self.genome
    }

    #[must_use]
    pub fn traits(&self) -> TraitSet {
        self.traits
    }

    #[must_use]
    pub fn effects(&self) -> TraitEffects {
        self.effects
    }

    #[must_use]
    pub fn brain(&self) -> &FeedForwardBrain {
        &self.brain
    }

    /// Set one trait gene (clamped to `[0, 1]`) and refresh the expressed traits.
    pub fn set_trait_gene(&mut self, id: TraitId, value: f64) {
        self.genome.set_trait_gene(id, value);
        self.traits = self.genome.trait_set();
        self.effects = self.traits.effects();
    }

    /// Mutate brain weights in place and write them back into the genome.
    pub fn edit_brain(&mut self, edit: impl FnOnce(&mut FeedForwardBrain)) {
        edit(&mut self.brain);
        self.genome.write_brain(&self.brain);
    }

    #[must_use]
    pub fn expresses(&self, id: TraitId) -> bool {
        self.traits.contains(id)
    }

    #[must_use]
    pub fn is_predator(&self) -> bool {
        self.effects.predatory
    }

    /// First expressed trait in pool order, used for display.
    #[must_use]
    pub fn dominant_trait(&self) -> Option<TraitId> {
        self.traits.dominant()
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    #[must_use]
    pub fn death_cause(&self) -> Option<DeathCause> {
        self.death_cause
    }

    /// Mark the agent dead. Returns `false` if it was already dead; the first
    /// cause is kept.
    pub fn kill(&mut self, cause: DeathCause) -> bool {
        if !self.alive {
            return false;
        }
        self.alive = false;
        self.death_cause = Some(cause);
        true
    }

    /// Add energy up to `max_energy`, counting what was actually absorbed.
    pub fn gain_energy(&mut self, amount: f64, max_energy: f64) {
        let before = self.energy;
        self.energy = (self.energy + amount).min(max_energy);
        self.energy_collected += (self.energy - before).max(0.0);
    }

    /// Remove energy, never going below zero.
    pub fn drain_energy(&mut self, amount: f64) {
        self.energy = (self.energy - amount).max(0.0);
    }

    pub fn refresh_fitness(&mut self) {
        self.fitness = fitness(
            self.energy_collected,
            self.survival_time,
            f64::from(self.food_eaten),
        );
    }
}
