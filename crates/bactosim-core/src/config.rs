//! Simulation and genetic-algorithm configuration.

use rand::{SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while validating configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Indicates a parameter outside its admissible range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Parent selection strategy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMethod {
    /// Best of `k` uniform draws with replacement.
    #[default]
    Tournament,
    /// Fitness-proportionate selection with an epsilon floor.
    Roulette,
}

/// Crossover operator applied to selected parents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum CrossoverMethod {
    #[default]
    Uniform,
    SinglePoint,
    TwoPoint,
}

/// Genetic-algorithm parameters used at generation boundaries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneticConfig {
    /// Parent selection strategy.
    pub selection: SelectionMethod,
    /// Tournament size `k`; larger values increase selection pressure.
    pub tournament_size: usize,
    /// Crossover operator.
    pub crossover: CrossoverMethod,
    /// Per-gene mutation probability.
    pub mutation_rate: f64,
    /// Standard deviation of the Gaussian mutation noise.
    pub mutation_sigma: f64,
    /// Fraction of the breeding pool copied unchanged into the next generation.
    pub elitism: f64,
    /// Number of k-means species clusters.
    pub species_k: usize,
    /// Fixed k-means iteration budget.
    pub kmeans_iterations: usize,
}

impl Default for GeneticConfig {
    fn default() -> Self {
        Self {
            selection: SelectionMethod::Tournament,
            tournament_size: 3,
            crossover: CrossoverMethod::Uniform,
            mutation_rate: 0.05,
            mutation_sigma: 0.2,
            elitism: 0.1,
            species_k: 4,
            kmeans_iterations: 12,
        }
    }
}

impl GeneticConfig {
    /// Validate operator parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err(ConfigError::InvalidConfig(
                "mutation_rate must be within [0, 1]",
            ));
        }
        if !non_negative(self.mutation_sigma) {
            return Err(ConfigError::InvalidConfig(
                "mutation_sigma must be finite and non-negative",
            ));
        }
        if !(0.0..=1.0).contains(&self.elitism) {
            return Err(ConfigError::InvalidConfig("elitism must be within [0, 1]"));
        }
        if self.tournament_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "tournament_size must be at least 1",
            ));
        }
        if self.species_k == 0 {
            return Err(ConfigError::InvalidConfig("species_k must be at least 1"));
        }
        if !(8..=20).contains(&self.kmeans_iterations) {
            return Err(ConfigError::InvalidConfig(
                "kmeans_iterations must be within [8, 20]",
            ));
        }
        Ok(())
    }
}

/// Static configuration for a bactosim run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    /// Width of the simulation area.
    pub world_width: f64,
    /// Height of the simulation area.
    pub world_height: f64,
    /// Optional RNG seed for reproducible runs.
    pub rng_seed: Option<u64>,
    /// Agents created at start and after a reset.
    pub initial_population: usize,
    /// Trait genes biased above the expression threshold in fresh genomes.
    pub traits_per_agent: usize,
    /// Hard population cap; budding and reproduction stop at this size.
    pub max_population: usize,
    /// Energy assigned to freshly created agents.
    pub initial_energy: f64,
    /// Upper bound of an agent's energy.
    pub max_energy: f64,
    /// Agent body radius.
    pub agent_size: f64,
    /// Food particle radius.
    pub food_size: f64,
    /// Food particles spawned per unit of time.
    pub food_spawn_rate: f64,
    /// Maximum concurrent food particles.
    pub max_food: usize,
    /// Food particles seeded at start.
    pub initial_food: usize,
    /// Energy gained from one food particle.
    pub food_energy: f64,
    /// Baseline metabolic drain per unit of time.
    pub metabolic_cost: f64,
    /// Population size above which metabolism becomes more expensive.
    pub overcrowding_threshold: usize,
    /// Metabolic multiplier reached at the population cap.
    pub overcrowding_max_multiplier: f64,
    /// Top speed per unit of time.
    pub max_speed: f64,
    /// Largest heading change per unit of time, in radians.
    pub max_turn_rate: f64,
    /// Distance beyond which food and threats are sensed as absent.
    pub sense_range: f64,
    /// Probability per unit of time that a hazard zone appears.
    pub hazard_spawn_chance: f64,
    pub hazard_min_radius: f64,
    pub hazard_max_radius: f64,
    /// Largest drift speed of a hazard zone.
    pub hazard_max_speed: f64,
    /// Ticks a hazard zone persists.
    pub hazard_lifetime: f64,
    /// Energy drained per unit of time by each overlapping, unresisted zone.
    pub hazard_damage: f64,
    /// Catch range of predators, as a multiple of `agent_size`.
    pub predation_catch_multiplier: f64,
    /// Energy a predator gains per catch.
    pub predation_reward: f64,
    /// Energy required before budding is possible.
    pub budding_energy_threshold: f64,
    /// Base budding probability per unit of time.
    pub budding_chance: f64,
    /// Per-gene mutation probability applied to buds.
    pub budding_mutation_rate: f64,
    /// Mutation noise applied to buds.
    pub budding_mutation_sigma: f64,
    /// Per-tick probability of a de novo trait activation.
    pub spontaneous_mutation_chance: f64,
    /// Donor reach for horizontal gene transfer.
    pub gene_transfer_radius: f64,
    /// Per-tick probability for each eligible donor/recipient pair.
    pub gene_transfer_chance: f64,
    /// Age after which old-age death becomes possible.
    pub max_age: f64,
    /// Per-tick death probability added per tick of age beyond `max_age`.
    pub old_age_death_rate: f64,
    /// Survivor floor of a selection event, as a fraction of the population.
    pub selection_survivor_fraction: f64,
    /// Absolute survivor floor of a selection event.
    pub selection_survivor_minimum: usize,
    /// Offspring bred after a selection event, as a fraction of survivors.
    pub reproduction_fraction: f64,
    /// Ticks between culling and repopulation.
    pub selection_settle_ticks: u64,
    /// Interval (ticks) between statistics refreshes; 0 disables them.
    pub stats_interval: u64,
    /// Maximum number of generation summaries retained.
    pub history_capacity: usize,
    /// Ticks a dead agent stays visible.
    pub dead_fade_ticks: f64,
    /// Maximum number of recently-dead agents retained.
    pub dead_capacity: usize,
    /// Genetic-algorithm parameters.
    pub genetics: GeneticConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            world_width: 800.0,
            world_height: 600.0,
            rng_seed: None,
            initial_population: 60,
            traits_per_agent: 4,
            max_population: 300,
            initial_energy: 100.0,
            max_energy: 150.0,
            agent_size: 5.0,
            food_size: 3.0,
            food_spawn_rate: 0.5,
            max_food: 150,
            initial_food: 60,
            food_energy: 20.0,
            metabolic_cost: 0.04,
            overcrowding_threshold: 150,
            overcrowding_max_multiplier: 3.0,
            max_speed: 1.5,
            max_turn_rate: 0.3,
            sense_range: 150.0,
            hazard_spawn_chance: 0.002,
            hazard_min_radius: 30.0,
            hazard_max_radius: 70.0,
            hazard_max_speed: 0.6,
            hazard_lifetime: 900.0,
            hazard_damage: 0.5,
            predation_catch_multiplier: 2.0,
            predation_reward: 40.0,
            budding_energy_threshold: 110.0,
            budding_chance: 0.004,
            budding_mutation_rate: 0.02,
            budding_mutation_sigma: 0.08,
            spontaneous_mutation_chance: 0.0002,
            gene_transfer_radius: 30.0,
            gene_transfer_chance: 0.001,
            max_age: 3_000.0,
            old_age_death_rate: 0.000_5,
            selection_survivor_fraction: 0.15,
            selection_survivor_minimum: 10,
            reproduction_fraction: 0.3,
            selection_settle_ticks: 90,
            stats_interval: 300,
            history_capacity: 128,
            dead_fade_ticks: 60.0,
            dead_capacity: 100,
            genetics: GeneticConfig::default(),
        }
    }
}

fn probability(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

fn non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

impl SimulationConfig {
    /// Reject configurations that cannot drive a simulation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !positive(self.world_width) || !positive(self.world_height) {
            return Err(ConfigError::InvalidConfig(
                "world dimensions must be positive",
            ));
        }
        if self.initial_population == 0 {
            return Err(ConfigError::InvalidConfig(
                "initial_population must be non-zero",
            ));
        }
        if self.max_population < self.initial_population {
            return Err(ConfigError::InvalidConfig(
                "max_population cannot be below initial_population",
            ));
        }
        if !positive(self.max_energy)
            || !positive(self.initial_energy)
            || self.initial_energy > self.max_energy
        {
            return Err(ConfigError::InvalidConfig(
                "initial_energy must be positive and not exceed max_energy",
            ));
        }
        if !positive(self.agent_size) || !positive(self.food_size) || !positive(self.sense_range) {
            return Err(ConfigError::InvalidConfig(
                "agent_size, food_size and sense_range must be positive",
            ));
        }
        if self.initial_food > self.max_food {
            return Err(ConfigError::InvalidConfig(
                "initial_food cannot exceed max_food",
            ));
        }
        if !non_negative(self.food_spawn_rate)
            || !non_negative(self.food_energy)
            || !non_negative(self.metabolic_cost)
            || !non_negative(self.max_speed)
            || !non_negative(self.max_turn_rate)
            || !non_negative(self.hazard_damage)
            || !non_negative(self.hazard_max_speed)
            || !non_negative(self.predation_reward)
            || !non_negative(self.budding_energy_threshold)
            || !non_negative(self.budding_chance)
            || !non_negative(self.budding_mutation_sigma)
            || !non_negative(self.gene_transfer_radius)
            || !non_negative(self.old_age_death_rate)
            || !non_negative(self.dead_fade_ticks)
        {
            return Err(ConfigError::InvalidConfig(
                "rates, costs, speeds and rewards must be finite and non-negative",
            ));
        }
        if self.overcrowding_max_multiplier < 1.0 || !self.overcrowding_max_multiplier.is_finite()
        {
            return Err(ConfigError::InvalidConfig(
                "overcrowding_max_multiplier must be at least 1",
            ));
        }
        if !probability(self.hazard_spawn_chance)
            || !probability(self.budding_mutation_rate)
            || !probability(self.spontaneous_mutation_chance)
            || !probability(self.gene_transfer_chance)
            || !probability(self.selection_survivor_fraction)
            || !probability(self.reproduction_fraction)
        {
            return Err(ConfigError::InvalidConfig(
                "probabilities and fractions must be within [0, 1]",
            ));
        }
        if !positive(self.hazard_min_radius)
            || self.hazard_max_radius < self.hazard_min_radius
            || !positive(self.hazard_lifetime)
        {
            return Err(ConfigError::InvalidConfig(
                "hazard radii and lifetime must be positive with min <= max",
            ));
        }
        if !positive(self.predation_catch_multiplier) {
            return Err(ConfigError::InvalidConfig(
                "predation_catch_multiplier must be positive",
            ));
        }
        if !positive(self.max_age) {
            return Err(ConfigError::InvalidConfig("max_age must be positive"));
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "history_capacity must be non-zero",
            ));
        }
        self.genetics.validate()
    }

    /// Returns the configured RNG, seeding from entropy when no seed is set.
    pub(crate) fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::seed_from_u64(rand::random()),
        }
    }
}
