//! Core engine for the bactosim evolutionary bacteria simulation.
//!
//! Agents carry a fixed-length [`Genome`] that encodes both their expressed
//! traits and the weights of a small feedforward brain. The [`Simulation`]
//! controller advances an [`Ecosystem`] tick by tick, applies the lifecycle
//! rules (budding, spontaneous mutation, gene transfer, old age) and hands
//! survivors of selection events to the [`GeneticAlgorithm`] through a
//! [`ComputeBackend`] that may offload the work to a remote provider.

pub mod agent;
pub mod compute;
pub mod config;
pub mod ecosystem;
pub mod ga;
pub mod genome;
pub mod lifecycle;
pub mod population;
pub mod stats;
pub mod trait_pool;

pub use agent::{Agent, DeathCause};
pub use bactosim_brain::{
    BrainError, FeedForwardBrain, INPUT_SIZE, OUTPUT_SIZE, TOPOLOGY, WEIGHT_COUNT,
};
pub use compute::{
    ComputeBackend, ComputeError, ComputeProvider, ComputeStatus, CrossoverWire, ForwardRequest,
    InitRequest, LocalCompute, ReproduceRequest, ReproduceResponse, StatsRequest, StatsResponse,
    SurvivorData,
};
pub use config::{ConfigError, CrossoverMethod, GeneticConfig, SelectionMethod, SimulationConfig};
pub use ecosystem::{Ecosystem, EcosystemReport, Food, HazardZone};
pub use ga::{GeneticAlgorithm, Scored, fitness};
pub use genome::{GENOME_LENGTH, Genome, GenomeError, TRAIT_GENE_COUNT};
pub use lifecycle::{
    DeathTally, GenerationSummary, SelectionOutcome, Simulation, SimulationError,
    SimulationState, TickEvents,
};
pub use population::{FadingAgent, Population};
pub use stats::{HardyWeinbergRecord, PopulationStatistics};
pub use trait_pool::{TRAIT_POOL, TraitCategory, TraitEffects, TraitId, TraitInfo, TraitSet};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Simulation clock (ticks processed since the last reset).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Tick counter at the start of a run.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Tick that lies `delta` ticks in the future.
    #[must_use]
    pub const fn after(self, delta: u64) -> Self {
        Self(self.0 + delta)
    }
}

/// Lineage counter, advanced once per generation boundary.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct Generation(pub u32);

impl Generation {
    /// Advances to the next generation.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Agent identity; allocated monotonically and never reused.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct AgentId(pub u64);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Point in the simulation area.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    /// Construct a new position.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_sq(other).sqrt()
    }

    /// Squared Euclidean distance to `other`.
    #[must_use]
    pub fn distance_sq(self, other: Self) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        dx * dx + dy * dy
    }

    /// Absolute angle (radians) of the vector pointing from `self` to `other`.
    #[must_use]
    pub fn angle_to(self, other: Self) -> f64 {
        (other.y - self.y).atan2(other.x - self.x)
    }
}

/// Displacement per unit of time.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Velocity {
    pub vx: f64,
    pub vy: f64,
}

impl Velocity {
    /// Construct a new velocity vector.
    #[must_use]
    pub const fn new(vx: f64, vy: f64) -> Self {
        Self { vx, vy }
    }

    /// Magnitude of the velocity.
    #[must_use]
    pub fn speed(self) -> f64 {
        self.vx.hypot(self.vy)
    }
}

const FULL_TURN: f64 = std::f64::consts::TAU;
const HALF_TURN: f64 = std::f64::consts::PI;

/// Wrap an angle into `(-π, π]`; non-finite angles become `0`.
pub(crate) fn wrap_signed_angle(angle: f64) -> f64 {
    if !angle.is_finite() {
        return 0.0;
    }
    if angle > -HALF_TURN && angle <= HALF_TURN {
        return angle;
    }
    let wrapped = HALF_TURN - (HALF_TURN - angle).rem_euclid(FULL_TURN);
    if wrapped <= -HALF_TURN {
        wrapped + FULL_TURN
    } else {
        wrapped
    }
}
