//! Population lifecycle controller.
//!
//! A [`Simulation`] owns the [`SimulationState`] and advances it one tick at a
//! time in three fixed phases: the ecosystem update, birth/death resolution,
//! then movement. Selection events cull the population immediately and
//! schedule generation reproduction a few ticks later; budding is suppressed
//! while that deferred reproduction is pending. [`Simulation::reset`] drops any
//! pending work and rebuilds the state from the configuration.

use std::collections::VecDeque;

use rand::rngs::SmallRng;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;
use tracing::{debug, info, warn};

use bactosim_brain::OUTPUT_SIZE;

use crate::agent::DeathCause;
use crate::compute::{
    ComputeBackend, ComputeError, ComputeStatus, ForwardRequest, InitRequest, LocalCompute,
    ReproduceRequest, StatsRequest, StatsResponse,
};
use crate::config::{ConfigError, SimulationConfig};
use crate::ecosystem::{Ecosystem, EcosystemReport, random_position};
use crate::ga::{Scored, mutate};
use crate::genome::{Genome, GenomeError, TRAIT_GENE_COUNT};
use crate::population::Population;
use crate::trait_pool::TraitId;
use crate::{AgentId, Generation, Position, Tick};

/// Errors raised by controller operations.
#[derive(Debug, Error, PartialEq)]
pub enum SimulationError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("a selection event is already in progress")]
    SelectionInProgress,
    #[error("the population is empty")]
    EmptyPopulation,
    #[error("time step must be finite and non-negative, got {0}")]
    InvalidTimeStep(f64),
    #[error(transparent)]
    Genome(#[from] GenomeError),
}

/// Deaths per cause.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeathTally {
    pub starvation: usize,
    pub predation: usize,
    pub hazard: usize,
    pub selection: usize,
    pub old_age: usize,
}

impl DeathTally {
    pub fn record(&mut self, cause: DeathCause) {
        match cause {
            DeathCause::Starvation => self.starvation += 1,
            DeathCause::Predation => self.predation += 1,
            DeathCause::Hazard => self.hazard += 1,
            DeathCause::Selection => self.selection += 1,
            DeathCause::OldAge => self.old_age += 1,
        }
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.starvation + self.predation + self.hazard + self.selection + self.old_age
    }

    pub fn absorb(&mut self, other: &Self) {
        self.starvation += other.starvation;
        self.predation += other.predation;
        self.hazard += other.hazard;
        self.selection += other.selection;
        self.old_age += other.old_age;
    }
}

/// One history entry, recorded whenever statistics are refreshed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSummary {
    pub generation: Generation,
    pub tick: Tick,
    pub population: usize,
    /// Offspring added by the reproduction that produced this entry, if any.
    pub offspring: usize,
    /// Trait tested by the selection event preceding this entry, if any.
    pub selected_trait: Option<TraitId>,
    pub mean_fitness: f64,
    pub max_fitness: f64,
    pub diversity: f64,
    pub species_count: usize,
    /// Most frequently expressed trait.
    pub top_trait: Option<TraitId>,
}

/// Result of a selection event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionOutcome {
    pub trait_id: TraitId,
    pub population_before: usize,
    pub survivors: usize,
    pub culled: usize,
    /// Minimum survivor count enforced for this event.
    pub floor: usize,
    /// Agents spared by the floor after losing their draw.
    pub backfilled: usize,
    /// Deaths caused by the cull, all attributed to selection.
    pub deaths: DeathTally,
    /// Tick at which survivors reproduce.
    pub reproduce_at: Tick,
}

/// Everything that happened during one [`Simulation::step`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickEvents {
    pub tick: Tick,
    pub births: usize,
    pub offspring: usize,
    pub spontaneous_mutations: usize,
    pub gene_transfers: usize,
    pub deaths: DeathTally,
    pub ecosystem: EcosystemReport,
    /// Set when deferred reproduction ran this tick.
    pub reproduction: Option<GenerationSummary>,
    pub stats_refreshed: bool,
}

/// Mutable world state shared by the tick phases.
#[derive(Debug, Clone)]
pub struct SimulationState {
    pub config: SimulationConfig,
    pub tick: Tick,
    pub generation: Generation,
    pub population: Population,
    pub ecosystem: Ecosystem,
    rng: SmallRng,
}

impl SimulationState {
    fn new(config: SimulationConfig) -> Self {
        let rng = config.seeded_rng();
        let population = Population::new(config.dead_capacity, config.dead_fade_ticks);
        Self {
            config,
            tick: Tick::zero(),
            generation: Generation::default(),
            population,
            ecosystem: Ecosystem::new(),
            rng,
        }
    }

    /// Controller RNG, for callers staging scenarios.
    pub fn rng(&mut self) -> &mut dyn RngCore {
        &mut self.rng
    }

    /// Live agents that have reached the population cap.
    #[must_use]
    pub fn at_capacity(&self) -> bool {
        self.population.live_count() >= self.config.max_population
    }

    fn spawn_genome(
        &mut self,
        genome: Genome,
        generation: Generation,
    ) -> Result<AgentId, GenomeError> {
        let position = random_position(&self.config, &mut self.rng);
        let heading = self.rng.random_range(-std::f64::consts::PI..std::f64::consts::PI);
        self.population
            .spawn(genome, position, heading, self.config.initial_energy, generation)
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingReproduction {
    due: Tick,
    trait_id: TraitId,
}

/// Tick-driven controller tying ecosystem, lifecycle and reproduction together.
#[derive(Debug)]
pub struct Simulation {
    state: SimulationState,
    backend: ComputeBackend,
    pending: Option<PendingReproduction>,
    latest_stats: Option<StatsResponse>,
    history: VecDeque<GenerationSummary>,
}

impl Simulation {
    /// Validate `config` and build a simulation that computes everything locally.
    pub fn new(config: SimulationConfig) -> Result<Self, SimulationError> {
        let local = LocalCompute::new(config.genetics.kmeans_iterations, config.traits_per_agent);
        Self::with_backend(config, ComputeBackend::local(local))
    }

    /// Validate `config` and build a simulation using `backend` at generation boundaries.
    pub fn with_backend(
        config: SimulationConfig,
        backend: ComputeBackend,
    ) -> Result<Self, SimulationError> {
        config.validate()?;
        let mut simulation = Self {
            state: SimulationState::new(config),
            backend,
            pending: None,
            latest_stats: None,
            history: VecDeque::new(),
        };
        simulation.populate()?;
        Ok(simulation)
    }

    fn populate(&mut self) -> Result<(), SimulationError> {
        let request = InitRequest {
            population_size: self.state.config.initial_population,
            traits_per_agent: self.state.config.traits_per_agent,
        };
        let genomes = self.backend.init_population(&request, &mut self.state.rng);
        self.state
            .ecosystem
            .reset(&self.state.config, &mut self.state.rng);
        for genome in genomes {
            self.state.spawn_genome(genome, Generation::default())?;
        }
        info!(
            population = self.state.population.len(),
            food = self.state.ecosystem.food().len(),
            "population initialized"
        );
        Ok(())
    }

    #[must_use]
    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    /// Mutable access for drivers and tests that stage scenarios.
    pub fn state_mut(&mut self) -> &mut SimulationState {
        &mut self.state
    }

    #[must_use]
    pub fn config(&self) -> &SimulationConfig {
        &self.state.config
    }

    #[must_use]
    pub fn population(&self) -> &Population {
        &self.state.population
    }

    #[must_use]
    pub fn ecosystem(&self) -> &Ecosystem {
        &self.state.ecosystem
    }

    #[must_use]
    pub fn tick(&self) -> Tick {
        self.state.tick
    }

    #[must_use]
    pub fn generation(&self) -> Generation {
        self.state.generation
    }

    /// True between a selection event and its deferred reproduction.
    #[must_use]
    pub fn selection_in_progress(&self) -> bool {
        self.pending.is_some()
    }

    /// Tick at which pending reproduction will run.
    #[must_use]
    pub fn pending_reproduction(&self) -> Option<Tick> {
        self.pending.map(|pending| pending.due)
    }

    #[must_use]
    pub fn latest_stats(&self) -> Option<&StatsResponse> {
        self.latest_stats.as_ref()
    }

    #[must_use]
    pub fn history(&self) -> &VecDeque<GenerationSummary> {
        &self.history
    }

    #[must_use]
    pub fn compute_status(&self) -> ComputeStatus {
        self.backend.status()
    }

    /// Advance the simulation by one tick of length `dt`.
    pub fn step(&mut self, dt: f64) -> Result<TickEvents, SimulationError> {
        if !dt.is_finite() || dt < 0.0 {
            return Err(SimulationError::InvalidTimeStep(dt));
        }
        self.state.tick = self.state.tick.next();
        let mut events = TickEvents {
            tick: self.state.tick,
            ..TickEvents::default()
        };

        let SimulationState {
            config,
            population,
            ecosystem,
            rng,
            ..
        } = &mut self.state;
        events.ecosystem = ecosystem.update(population.agents_mut(), config, dt, rng);

        stage_aging(&mut self.state, dt);
        stage_old_age(&mut self.state);
        stage_spontaneous_mutation(&mut self.state, &mut events);
        stage_gene_transfer(&mut self.state, &mut events);
        if !self.selection_in_progress() {
            stage_budding(&mut self.state, dt, &mut events);
        }
        if self
            .pending
            .is_some_and(|pending| pending.due <= self.state.tick)
        {
            events.reproduction = self.reproduce_generation(&mut events);
        }
        for agent in self.state.population.agents_mut() {
            if agent.is_alive() {
                agent.refresh_fitness();
            }
        }
        for (_, cause) in self.state.population.remove_dead() {
            events.deaths.record(cause);
        }
        self.state.population.decay_dead(dt);

        let SimulationState {
            config,
            population,
            ecosystem,
            ..
        } = &mut self.state;
        ecosystem.move_agents(population.agents_mut(), config, dt);

        let interval = self.state.config.stats_interval;
        if interval > 0 && self.state.tick.0 % interval == 0 && events.reproduction.is_none() {
            self.refresh_statistics(0, None);
            events.stats_refreshed = true;
        }
        Ok(events)
    }

    /// Cull the population on one trait and schedule reproduction.
    ///
    /// Each live agent survives with probability equal to its gene at the
    /// chosen index. If fewer than `max(⌈fraction·P⌉, min(minimum, P))` agents
    /// survive, the highest-scoring losers are spared until the floor is met.
    pub fn trigger_selection_event(
        &mut self,
        trait_id: Option<TraitId>,
    ) -> Result<SelectionOutcome, SimulationError> {
        if self.pending.is_some() {
            return Err(SimulationError::SelectionInProgress);
        }
        let state = &mut self.state;
        let population_before = state.population.live_count();
        if population_before == 0 {
            return Err(SimulationError::EmptyPopulation);
        }
        let trait_id = trait_id.unwrap_or_else(|| TraitId::random(&mut state.rng));

        let mut doomed: Vec<(usize, f64)> = Vec::new();
        let mut survivors = 0;
        for (index, agent) in state.population.agents().iter().enumerate() {
            if !agent.is_alive() {
                continue;
            }
            let gene = agent.genome().trait_gene(trait_id);
            if state.rng.random::<f64>() < gene {
                survivors += 1;
            } else {
                doomed.push((index, gene));
            }
        }

        let floor = survivor_floor(
            population_before,
            state.config.selection_survivor_fraction,
            state.config.selection_survivor_minimum,
        );
        let backfilled = floor.saturating_sub(survivors).min(doomed.len());
        doomed.sort_by(|a, b| b.1.total_cmp(&a.1));
        let agents = state.population.agents_mut();
        for &(index, _) in doomed.iter().skip(backfilled) {
            agents[index].kill(DeathCause::Selection);
        }
        let culled = doomed.len() - backfilled;
        let mut deaths = DeathTally::default();
        for (_, cause) in state.population.remove_dead() {
            deaths.record(cause);
        }

        let reproduce_at = state.tick.after(state.config.selection_settle_ticks);
        self.pending = Some(PendingReproduction {
            due: reproduce_at,
            trait_id,
        });
        let survivors = survivors + backfilled;
        info!(
            trait_name = trait_id.info().name,
            population_before,
            survivors,
            culled,
            backfilled,
            reproduce_at = reproduce_at.0,
            "selection event"
        );
        Ok(SelectionOutcome {
            trait_id,
            population_before,
            survivors,
            culled,
            floor,
            backfilled,
            deaths,
            reproduce_at,
        })
    }

    /// Cancel pending work and rebuild the world from the configuration.
    pub fn reset(&mut self) -> Result<(), SimulationError> {
        if let Some(pending) = self.pending.take() {
            info!(due = pending.due.0, "discarding pending reproduction");
        }
        self.backend.reprobe();
        // The population is carried over so agent ids keep increasing.
        let mut fresh = SimulationState::new(self.state.config.clone());
        std::mem::swap(&mut fresh.population, &mut self.state.population);
        fresh.population.clear();
        self.state = fresh;
        self.latest_stats = None;
        self.history.clear();
        self.populate()
    }

    /// Run every live agent's brain on its latest sensor vector as one batch.
    pub fn predict_population(
        &mut self,
    ) -> Result<Vec<(AgentId, [f64; OUTPUT_SIZE])>, ComputeError> {
        let live: Vec<_> = self
            .state
            .population
            .agents()
            .iter()
            .filter(|agent| agent.is_alive())
            .collect();
        let request = ForwardRequest {
            weights: live
                .iter()
                .map(|agent| agent.genome().weight_genes().to_vec())
                .collect(),
            inputs: live.iter().map(|agent| agent.sensors).collect(),
        };
        let ids: Vec<AgentId> = live.iter().map(|agent| agent.id).collect();
        let outputs = self.backend.forward_batch(&request)?;
        Ok(ids.into_iter().zip(outputs).collect())
    }

    fn reproduce_generation(&mut self, events: &mut TickEvents) -> Option<GenerationSummary> {
        let pending = self.pending.take()?;
        let state = &mut self.state;
        let survivors: Vec<Scored> = state
            .population
            .agents()
            .iter()
            .filter(|agent| agent.is_alive())
            .map(|agent| Scored::new(agent.genome().clone(), agent.fitness))
            .collect();
        let live = survivors.len();
        let room = state.config.max_population.saturating_sub(live);

        let (request, count) = if live == 0 {
            let target = state.config.initial_population.min(state.config.max_population);
            warn!(target, "population extinct before reproduction; reseeding");
            (
                ReproduceRequest::from_config(Vec::new(), target, &state.config.genetics),
                target,
            )
        } else {
            let count = offspring_count(live, state.config.reproduction_fraction).min(room);
            (
                ReproduceRequest::from_config(survivors, live + count, &state.config.genetics),
                count,
            )
        };

        let response = self.backend.reproduce(&request, &mut self.state.rng);
        let generation = self.state.generation.next();
        let mut added = 0;
        for genome in response.offspring.into_iter().take(count) {
            match self.state.spawn_genome(genome, generation) {
                Ok(_) => added += 1,
                Err(err) => warn!(error = %err, "discarding offspring genome"),
            }
        }
        self.state.generation = generation;
        events.offspring = added;
        info!(
            generation = generation.0,
            survivors = live,
            offspring = added,
            elites = response.elite_indices.len(),
            "generation reproduced"
        );
        Some(self.refresh_statistics(added, Some(pending.trait_id)))
    }

    /// Request statistics for the live population, relabel species and log history.
    pub fn refresh_statistics(
        &mut self,
        offspring: usize,
        selected_trait: Option<TraitId>,
    ) -> GenerationSummary {
        let live: Vec<usize> = self
            .state
            .population
            .agents()
            .iter()
            .enumerate()
            .filter(|(_, agent)| agent.is_alive())
            .map(|(index, _)| index)
            .collect();
        let agents = self.state.population.agents();
        let request = StatsRequest {
            genomes: live.iter().map(|&i| agents[i].genome().clone()).collect(),
            fitnesses: live.iter().map(|&i| agents[i].fitness).collect(),
            species_k: self.state.config.genetics.species_k,
        };
        let stats = self.backend.statistics(&request, &mut self.state.rng);

        let agents = self.state.population.agents_mut();
        for (&index, label) in live.iter().zip(&stats.species_assignments) {
            agents[index].species = Some(*label);
        }

        let top_trait = stats
            .trait_frequencies
            .iter()
            .enumerate()
            .filter(|(_, p)| **p > 0.0)
            .fold(None::<(usize, f64)>, |best, (index, p)| match best {
                Some((_, best_p)) if best_p >= *p => best,
                _ => Some((index, *p)),
            })
            .and_then(|(index, _)| TraitId::new(index));
        let summary = GenerationSummary {
            generation: self.state.generation,
            tick: self.state.tick,
            population: live.len(),
            offspring,
            selected_trait,
            mean_fitness: stats.mean_fitness,
            max_fitness: stats.max_fitness,
            diversity: stats.diversity,
            species_count: stats.species_count,
            top_trait,
        };
        debug!(
            generation = summary.generation.0,
            population = summary.population,
            diversity = summary.diversity,
            species = summary.species_count,
            "statistics refreshed"
        );
        if self.history.len() >= self.state.config.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(summary.clone());
        self.latest_stats = Some(stats);
        summary
    }
}

/// `max(⌈fraction·P⌉, min(minimum, P))`, never above `P`.
#[must_use]
pub fn survivor_floor(population: usize, fraction: f64, minimum: usize) -> usize {
    let proportional = (fraction * population as f64 - 1e-9).ceil().max(0.0) as usize;
    proportional.max(minimum.min(population)).min(population)
}

/// `max(⌊fraction·survivors⌋, 1)`.
#[must_use]
pub fn offspring_count(survivors: usize, fraction: f64) -> usize {
    ((fraction * survivors as f64 + 1e-9).floor() as usize).max(1)
}

fn stage_aging(state: &mut SimulationState, dt: f64) {
    for agent in state.population.agents_mut() {
        if agent.is_alive() {
            agent.age += dt;
            agent.survival_time += dt;
        }
    }
}

fn stage_old_age(state: &mut SimulationState) {
    let SimulationState {
        config,
        population,
        rng,
        ..
    } = state;
    for agent in population.agents_mut() {
        if !agent.is_alive() {
            continue;
        }
        let limit = config.max_age * agent.effects().max_age_multiplier();
        if agent.age <= limit {
            continue;
        }
        let chance = (config.old_age_death_rate * (agent.age - limit)).min(1.0);
        if rng.random::<f64>() < chance {
            agent.kill(DeathCause::OldAge);
        }
    }
}

fn stage_spontaneous_mutation(state: &mut SimulationState, events: &mut TickEvents) {
    let SimulationState {
        config,
        population,
        rng,
        ..
    } = state;
    if config.spontaneous_mutation_chance <= 0.0 {
        return;
    }
    for agent in population.agents_mut() {
        if !agent.is_alive() {
            continue;
        }
        let chance =
            config.spontaneous_mutation_chance * agent.effects().spontaneous_mutation_multiplier();
        if rng.random::<f64>() >= chance {
            continue;
        }
        let dormant = TRAIT_GENE_COUNT - agent.traits().len();
        if dormant == 0 {
            continue;
        }
        let pick = rng.random_range(0..dormant);
        let Some(chosen) = TraitId::all().filter(|id| !agent.expresses(*id)).nth(pick) else {
            continue;
        };
        agent.set_trait_gene(chosen, rng.random_range(0.55..0.85));
        events.spontaneous_mutations += 1;
        debug!(agent = %agent.id, trait_name = chosen.info().name, "spontaneous mutation");
    }
}

fn stage_gene_transfer(state: &mut SimulationState, events: &mut TickEvents) {
    let SimulationState {
        config,
        population,
        rng,
        ..
    } = state;
    if config.gene_transfer_chance <= 0.0 {
        return;
    }
    let radius_sq = config.gene_transfer_radius * config.gene_transfer_radius;
    let agents = population.agents();
    let mut transfers: Vec<(usize, TraitId, f64)> = Vec::new();
    for (donor_index, donor) in agents.iter().enumerate() {
        if !donor.is_alive() || !donor.effects().gene_transfer {
            continue;
        }
        for (recipient_index, recipient) in agents.iter().enumerate() {
            if recipient_index == donor_index
                || !recipient.is_alive()
                || donor.position.distance_sq(recipient.position) > radius_sq
            {
                continue;
            }
            if rng.random::<f64>() >= config.gene_transfer_chance {
                continue;
            }
            let offered: SmallVec<[TraitId; 8]> = donor
                .traits()
                .iter()
                .filter(|id| !recipient.expresses(*id))
                .collect();
            if offered.is_empty() {
                continue;
            }
            let chosen = offered[rng.random_range(0..offered.len())];
            transfers.push((recipient_index, chosen, donor.genome().trait_gene(chosen)));
        }
    }

    let agents = population.agents_mut();
    for (recipient, trait_id, value) in transfers {
        agents[recipient].set_trait_gene(trait_id, value);
        events.gene_transfers += 1;
    }
}

fn stage_budding(state: &mut SimulationState, dt: f64, events: &mut TickEvents) {
    let SimulationState {
        config,
        population,
        rng,
        ..
    } = state;
    let mut live = population.live_count();
    let mut buds: Vec<(Genome, Position, f64, Generation)> = Vec::new();
    for agent in population.agents_mut() {
        if live >= config.max_population {
            break;
        }
        if !agent.is_alive() || agent.energy < config.budding_energy_threshold {
            continue;
        }
        let chance = config.budding_chance * dt * agent.effects().budding_multiplier();
        if rng.random::<f64>() >= chance {
            continue;
        }
        let mut genome = agent.genome().clone();
        mutate(
            &mut genome,
            config.budding_mutation_rate,
            config.budding_mutation_sigma,
            rng,
        );
        let bud_energy = agent.energy * 0.4;
        agent.energy -= bud_energy;
        let offset = config.agent_size * 2.0;
        let position = Position::new(
            (agent.position.x + rng.random_range(-offset..=offset)).rem_euclid(config.world_width),
            (agent.position.y + rng.random_range(-offset..=offset)).rem_euclid(config.world_height),
        );
        buds.push((genome, position, bud_energy, agent.generation));
        live += 1;
    }

    for (genome, position, energy, generation) in buds {
        let heading = rng.random_range(-std::f64::consts::PI..std::f64::consts::PI);
        match population.spawn(genome, position, heading, energy, generation) {
            Ok(id) => {
                debug!(agent = %id, energy, "budded");
                events.births += 1;
            }
            Err(err) => warn!(error = %err, "discarding bud genome"),
        }
    }
}
