//! Generation-boundary computation: provider interface, local strategy and a
//! backend that prefers a remote provider but silently falls back to local work.

use bactosim_brain::{BrainError, FeedForwardBrain, INPUT_SIZE, OUTPUT_SIZE};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{CrossoverMethod, GeneticConfig, SelectionMethod};
use crate::ga::{GeneticAlgorithm, Scored};
use crate::genome::{Genome, GenomeError, TRAIT_GENE_COUNT};
use crate::stats::PopulationStatistics;

/// Survivor handed to reproduction: genome plus fitness.
pub type SurvivorData = Scored;
/// Statistics returned by a provider.
pub type StatsResponse = PopulationStatistics;

/// Failures of an external computation provider.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("compute provider unavailable: {0}")]
    Unavailable(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("protocol violation: {0}")]
    Protocol(String),
    #[error(transparent)]
    Genome(#[from] GenomeError),
    #[error(transparent)]
    Brain(#[from] BrainError),
}

/// Where generation-boundary work is currently performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputeStatus {
    /// No remote provider configured, or the startup probe failed.
    Local,
    /// Remote provider probed successfully and in use.
    Remote,
    /// Remote provider failed mid-run; local fallback until the next reset.
    Degraded,
}

/// Crossover names used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrossoverWire {
    #[serde(rename = "uniform")]
    Uniform,
    #[serde(rename = "single")]
    Single,
    #[serde(rename = "two")]
    Two,
}

impl From<CrossoverMethod> for CrossoverWire {
    fn from(method: CrossoverMethod) -> Self {
        match method {
            CrossoverMethod::Uniform => Self::Uniform,
            CrossoverMethod::SinglePoint => Self::Single,
            CrossoverMethod::TwoPoint => Self::Two,
        }
    }
}

impl From<CrossoverWire> for CrossoverMethod {
    fn from(wire: CrossoverWire) -> Self {
        match wire {
            CrossoverWire::Uniform => Self::Uniform,
            CrossoverWire::Single => Self::SinglePoint,
            CrossoverWire::Two => Self::TwoPoint,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitRequest {
    pub population_size: usize,
    pub traits_per_agent: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReproduceRequest {
    pub survivors: Vec<SurvivorData>,
    /// Survivors plus offspring; `target_population - survivors.len()` children are bred.
    pub target_population: usize,
    pub mutation_rate: f64,
    pub mutation_sigma: f64,
    /// Elite fraction in `[0, 1]`.
    pub elitism: f64,
    pub crossover: CrossoverMethod,
    pub tournament_size: usize,
    /// Honored by the local strategy; remote providers always run tournaments.
    pub selection: SelectionMethod,
}

impl ReproduceRequest {
    /// Build a request from the genetic configuration.
    #[must_use]
    pub fn from_config(
        survivors: Vec<SurvivorData>,
        target_population: usize,
        genetics: &GeneticConfig,
    ) -> Self {
        Self {
            survivors,
            target_population,
            mutation_rate: genetics.mutation_rate,
            mutation_sigma: genetics.mutation_sigma,
            elitism: genetics.elitism,
            crossover: genetics.crossover,
            tournament_size: genetics.tournament_size,
            selection: genetics.selection,
        }
    }

    /// Number of offspring the request asks for.
    #[must_use]
    pub fn offspring_needed(&self) -> usize {
        if self.survivors.is_empty() {
            self.target_population
        } else {
            self.target_population.saturating_sub(self.survivors.len())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReproduceResponse {
    pub offspring: Vec<Genome>,
    /// Indices into the survivor list, fitness-descending.
    pub elite_indices: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsRequest {
    pub genomes: Vec<Genome>,
    pub fitnesses: Vec<f64>,
    pub species_k: usize,
}

/// Bulk brain evaluation: row `i` of `weights` runs on row `i` of `inputs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardRequest {
    pub weights: Vec<Vec<f64>>,
    pub inputs: Vec<[f64; INPUT_SIZE]>,
}

/// Capability interface for generation-boundary computation.
pub trait ComputeProvider: Send {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Availability check performed before first use.
    fn probe(&self) -> Result<(), ComputeError>;

    fn init_population(
        &self,
        request: &InitRequest,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<Genome>, ComputeError>;

    fn reproduce(
        &self,
        request: &ReproduceRequest,
        rng: &mut dyn RngCore,
    ) -> Result<ReproduceResponse, ComputeError>;

    fn statistics(
        &self,
        request: &StatsRequest,
        rng: &mut dyn RngCore,
    ) -> Result<StatsResponse, ComputeError>;

    fn forward_batch(
        &self,
        request: &ForwardRequest,
    ) -> Result<Vec<[f64; OUTPUT_SIZE]>, ComputeError>;
}

/// In-process implementation of every contract.
#[derive(Debug, Clone)]
pub struct LocalCompute {
    /// k-means iteration budget.
    pub kmeans_iterations: usize,
    /// Expressed traits per genome when repopulating from scratch.
    pub traits_per_agent: usize,
}

impl LocalCompute {
    #[must_use]
    pub fn new(kmeans_iterations: usize, traits_per_agent: usize) -> Self {
        Self {
            kmeans_iterations,
            traits_per_agent,
        }
    }

    fn biased_population(&self, size: usize, traits: usize, rng: &mut dyn RngCore) -> Vec<Genome> {
        (0..size).map(|_| Genome::random_biased(rng, traits)).collect()
    }

    fn breed(&self, request: &ReproduceRequest, rng: &mut dyn RngCore) -> ReproduceResponse {
        if request.survivors.is_empty() {
            return ReproduceResponse {
                offspring: self.biased_population(
                    request.target_population,
                    self.traits_per_agent,
                    rng,
                ),
                elite_indices: Vec::new(),
            };
        }
        let ga = GeneticAlgorithm::new(GeneticConfig {
            selection: request.selection,
            tournament_size: request.tournament_size,
            crossover: request.crossover,
            mutation_rate: request.mutation_rate,
            mutation_sigma: request.mutation_sigma,
            elitism: request.elitism,
            ..GeneticConfig::default()
        });
        ReproduceResponse {
            elite_indices: ga.elite_indices(&request.survivors),
            offspring: ga.breed(&request.survivors, request.offspring_needed(), rng),
        }
    }

    fn summarize(&self, request: &StatsRequest, rng: &mut dyn RngCore) -> StatsResponse {
        PopulationStatistics::compute(
            &request.genomes,
            &request.fitnesses,
            request.species_k,
            self.kmeans_iterations,
            rng,
        )
    }
}

impl Default for LocalCompute {
    fn default() -> Self {
        Self::new(GeneticConfig::default().kmeans_iterations, 4)
    }
}

impl ComputeProvider for LocalCompute {
    fn name(&self) -> &'static str {
        "local"
    }

    fn probe(&self) -> Result<(), ComputeError> {
        Ok(())
    }

    fn init_population(
        &self,
        request: &InitRequest,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<Genome>, ComputeError> {
        Ok(self.biased_population(request.population_size, request.traits_per_agent, rng))
    }

    fn reproduce(
        &self,
        request: &ReproduceRequest,
        rng: &mut dyn RngCore,
    ) -> Result<ReproduceResponse, ComputeError> {
        Ok(self.breed(request, rng))
    }

    fn statistics(
        &self,
        request: &StatsRequest,
        rng: &mut dyn RngCore,
    ) -> Result<StatsResponse, ComputeError> {
        Ok(self.summarize(request, rng))
    }

    fn forward_batch(
        &self,
        request: &ForwardRequest,
    ) -> Result<Vec<[f64; OUTPUT_SIZE]>, ComputeError> {
        Ok(FeedForwardBrain::forward_weights_batch(
            &request.weights,
            &request.inputs,
        )?)
    }
}

/// Remote-first computation with transparent local fallback.
pub struct ComputeBackend {
    remote: Option<Box<dyn ComputeProvider>>,
    local: LocalCompute,
    status: ComputeStatus,
}

impl std::fmt::Debug for ComputeBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeBackend")
            .field("remote", &self.remote.as_ref().map(|r| r.name()))
            .field("local", &self.local)
            .field("status", &self.status)
            .finish()
    }
}

impl ComputeBackend {
    /// Backend that never leaves the process.
    #[must_use]
    pub fn local(local: LocalCompute) -> Self {
        Self {
            remote: None,
            local,
            status: ComputeStatus::Local,
        }
    }

    /// Backend that probes `remote` once and uses it while it keeps answering.
    #[must_use]
    pub fn with_remote(remote: Box<dyn ComputeProvider>, local: LocalCompute) -> Self {
        let mut backend = Self {
            remote: Some(remote),
            local,
            status: ComputeStatus::Local,
        };
        backend.reprobe();
        backend
    }

    #[must_use]
    pub fn status(&self) -> ComputeStatus {
        self.status
    }

    /// Probe the remote provider again; called on reset.
    pub fn reprobe(&mut self) {
        let Some(remote) = &self.remote else {
            self.status = ComputeStatus::Local;
            return;
        };
        match remote.probe() {
            Ok(()) => {
                info!(provider = remote.name(), "remote compute provider available");
                self.status = ComputeStatus::Remote;
            }
            Err(err) => {
                warn!(provider = remote.name(), error = %err, "remote compute provider unavailable; using local");
                self.status = ComputeStatus::Local;
            }
        }
    }

    fn active_remote(&self) -> Option<&dyn ComputeProvider> {
        match self.status {
            ComputeStatus::Remote => self.remote.as_deref(),
            ComputeStatus::Local | ComputeStatus::Degraded => None,
        }
    }

    fn degrade(&mut self, operation: &'static str, err: &ComputeError) {
        warn!(operation, error = %err, "remote compute failed; falling back to local");
        self.status = ComputeStatus::Degraded;
    }

    pub fn init_population(&mut self, request: &InitRequest, rng: &mut dyn RngCore) -> Vec<Genome> {
        if let Some(remote) = self.active_remote() {
            let result = remote.init_population(request, rng).and_then(|genomes| {
                expect_len("init", genomes.len(), request.population_size)?;
                Ok(genomes)
            });
            match result {
                Ok(genomes) => return genomes,
                Err(err) => self.degrade("init", &err),
            }
        }
        self.local
            .biased_population(request.population_size, request.traits_per_agent, rng)
    }

    pub fn reproduce(&mut self, request: &ReproduceRequest, rng: &mut dyn RngCore) -> ReproduceResponse {
        if let Some(remote) = self.active_remote() {
            let result = remote.reproduce(request, rng).and_then(|response| {
                expect_len("reproduce", response.offspring.len(), request.offspring_needed())?;
                if response
                    .elite_indices
                    .iter()
                    .any(|index| *index >= request.survivors.len().max(1))
                {
                    return Err(ComputeError::Protocol(
                        "elite index outside the survivor list".to_owned(),
                    ));
                }
                Ok(response)
            });
            match result {
                Ok(response) => return response,
                Err(err) => self.degrade("reproduce", &err),
            }
        }
        self.local.breed(request, rng)
    }

    pub fn statistics(&mut self, request: &StatsRequest, rng: &mut dyn RngCore) -> StatsResponse {
        if let Some(remote) = self.active_remote() {
            let result = remote.statistics(request, rng).and_then(|stats| {
                expect_len(
                    "stats",
                    stats.species_assignments.len(),
                    request.genomes.len(),
                )?;
                expect_len(
                    "stats trait frequencies",
                    stats.trait_frequencies.len(),
                    TRAIT_GENE_COUNT,
                )?;
                let records = if request.genomes.is_empty() {
                    0
                } else {
                    TRAIT_GENE_COUNT
                };
                expect_len("stats hardy-weinberg", stats.hardy_weinberg.len(), records)?;
                Ok(stats)
            });
            match result {
                Ok(stats) => return stats,
                Err(err) => self.degrade("stats", &err),
            }
        }
        self.local.summarize(request, rng)
    }

    /// Evaluate a batch of brains; only a malformed request is an error.
    pub fn forward_batch(
        &mut self,
        request: &ForwardRequest,
    ) -> Result<Vec<[f64; OUTPUT_SIZE]>, ComputeError> {
        if let Some(remote) = self.active_remote() {
            let result = remote.forward_batch(request).and_then(|outputs| {
                expect_len("forward", outputs.len(), request.inputs.len())?;
                Ok(outputs)
            });
            match result {
                Ok(outputs) => return Ok(outputs),
                Err(err) => self.degrade("forward", &err),
            }
        }
        self.local.forward_batch(request)
    }
}

fn expect_len(operation: &str, actual: usize, expected: usize) -> Result<(), ComputeError> {
    if actual == expected {
        Ok(())
    } else {
        Err(ComputeError::Protocol(format!(
            "{operation} returned {actual} items, expected {expected}"
        )))
    }
}
