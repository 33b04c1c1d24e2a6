use std::collections::HashSet;

use bactosim_core::{
    AgentId, DeathCause, Generation, Simulation, SimulationConfig, SimulationError, Tick, TraitId,
};

fn quiet_config(seed: u64) -> SimulationConfig {
    SimulationConfig {
        rng_seed: Some(seed),
        food_spawn_rate: 0.0,
        initial_food: 0,
        hazard_spawn_chance: 0.0,
        spontaneous_mutation_chance: 0.0,
        gene_transfer_chance: 0.0,
        stats_interval: 0,
        ..SimulationConfig::default()
    }
}

fn live_ids(sim: &Simulation) -> Vec<AgentId> {
    sim.population().agents().iter().map(|agent| agent.id).collect()
}

#[test]
fn lone_agent_starves_after_exactly_2500_ticks() {
    let config = SimulationConfig {
        initial_population: 1,
        traits_per_agent: 0,
        initial_energy: 100.0,
        metabolic_cost: 0.04,
        budding_energy_threshold: 1_000.0,
        max_age: 1e12,
        ..quiet_config(1)
    };
    let mut sim = Simulation::new(config).expect("simulation");
    assert!(sim.population().agents()[0].traits().is_empty());

    for _ in 0..2_499 {
        let events = sim.step(1.0).expect("step");
        assert_eq!(events.deaths.total(), 0, "died early at {:?}", events.tick);
    }
    let events = sim.step(1.0).expect("step");
    assert_eq!(events.tick, Tick(2_500));
    assert_eq!(events.deaths.starvation, 1);
    assert!(sim.population().is_empty());
    assert_eq!(
        sim.population().recently_dead()[0].agent.death_cause(),
        Some(DeathCause::Starvation)
    );
}

#[test]
fn selection_respects_survivor_floor() {
    let cases = [(1, 1), (5, 5), (12, 10), (40, 10), (90, 14), (200, 30)];
    for (seed, (size, expected_floor)) in cases.into_iter().enumerate() {
        let config = SimulationConfig {
            initial_population: size,
            max_population: size.max(300),
            // Low trait genes make most agents lose their draw.
            traits_per_agent: 0,
            ..quiet_config(seed as u64)
        };
        let mut sim = Simulation::new(config).expect("simulation");
        let outcome = sim.trigger_selection_event(None).expect("selection");
        assert_eq!(outcome.floor, expected_floor, "population {size}");
        assert!(outcome.survivors >= expected_floor, "population {size}");
        assert_eq!(sim.population().live_count(), outcome.survivors);
        assert_eq!(outcome.survivors + outcome.culled, size);
        assert_eq!(outcome.deaths.selection, outcome.culled, "population {size}");
    }
}

#[test]
fn backfill_spares_highest_genes() {
    let config = SimulationConfig {
        initial_population: 30,
        traits_per_agent: 0,
        ..quiet_config(8)
    };
    let mut sim = Simulation::new(config).expect("simulation");
    let target = TraitId::new(3).expect("trait");
    // Give agents strictly ordered genes far below the expression threshold.
    for (rank, agent) in sim.state_mut().population.agents_mut().iter_mut().enumerate() {
        agent.set_trait_gene(target, rank as f64 * 1e-7);
    }
    let outcome = sim.trigger_selection_event(Some(target)).expect("selection");
    assert_eq!(outcome.floor, 10);
    assert_eq!(outcome.survivors, 10);
    let genes: Vec<f64> = sim
        .population()
        .agents()
        .iter()
        .map(|agent| agent.genome().trait_gene(target))
        .collect();
    // Survival odds are negligible, so the floor picks the top genes.
    assert!(genes.iter().all(|g| *g >= 19.0 * 1e-7 - 1e-15), "{genes:?}");
}

#[test]
fn seeded_runs_are_reproducible() {
    let config = SimulationConfig {
        rng_seed: Some(99),
        initial_population: 40,
        budding_chance: 0.05,
        ..SimulationConfig::default()
    };
    let mut a = Simulation::new(config.clone()).expect("simulation");
    let mut b = Simulation::new(config).expect("simulation");
    for tick in 0..300 {
        if tick == 120 {
            a.trigger_selection_event(None).expect("selection");
            b.trigger_selection_event(None).expect("selection");
        }
        assert_eq!(a.step(1.0).expect("step"), b.step(1.0).expect("step"));
    }
    let snapshot = |sim: &Simulation| -> Vec<(AgentId, f64, f64, f64)> {
        sim.population()
            .agents()
            .iter()
            .map(|agent| (agent.id, agent.position.x, agent.position.y, agent.energy))
            .collect()
    };
    assert_eq!(snapshot(&a), snapshot(&b));
    assert_eq!(a.history(), b.history());
}

#[test]
fn budding_is_suppressed_while_selection_is_pending() {
    let config = SimulationConfig {
        initial_population: 20,
        initial_energy: 150.0,
        max_energy: 150.0,
        metabolic_cost: 0.0,
        budding_energy_threshold: 100.0,
        budding_chance: 1.0,
        selection_settle_ticks: 5,
        ..quiet_config(10)
    };
    let mut sim = Simulation::new(config).expect("simulation");
    sim.trigger_selection_event(None).expect("selection");
    for _ in 0..4 {
        let events = sim.step(1.0).expect("step");
        assert_eq!(events.births, 0);
        assert!(sim.selection_in_progress());
    }
    let events = sim.step(1.0).expect("step");
    assert_eq!(events.births, 0);
    assert!(events.reproduction.is_some());
    assert!(events.offspring >= 1);
    assert!(!sim.selection_in_progress());

    let events = sim.step(1.0).expect("step");
    assert!(events.births > 0);
}

#[test]
fn reset_cancels_pending_reproduction() {
    let config = SimulationConfig {
        initial_population: 25,
        selection_settle_ticks: 4,
        ..quiet_config(11)
    };
    let mut sim = Simulation::new(config).expect("simulation");
    let highest_before = live_ids(&sim).into_iter().max().expect("agents");
    sim.trigger_selection_event(None).expect("selection");
    sim.step(1.0).expect("step");
    sim.step(1.0).expect("step");
    sim.reset().expect("reset");

    assert!(!sim.selection_in_progress());
    assert_eq!(sim.pending_reproduction(), None);
    assert_eq!(sim.tick(), Tick::zero());
    assert_eq!(sim.generation(), Generation(0));
    assert_eq!(sim.population().live_count(), 25);
    assert!(sim.history().is_empty());
    assert!(live_ids(&sim).iter().all(|id| *id > highest_before));

    for _ in 0..10 {
        let events = sim.step(1.0).expect("step");
        assert!(events.reproduction.is_none());
        assert_eq!(events.offspring, 0);
    }
    assert_eq!(sim.generation(), Generation(0));
}

#[test]
fn population_never_exceeds_cap() {
    let config = SimulationConfig {
        initial_population: 20,
        max_population: 32,
        overcrowding_threshold: 25,
        initial_energy: 150.0,
        max_energy: 150.0,
        metabolic_cost: 0.0,
        budding_energy_threshold: 10.0,
        budding_chance: 1.0,
        ..quiet_config(12)
    };
    let mut sim = Simulation::new(config).expect("simulation");
    let mut peak = 0;
    for tick in 0..60 {
        if tick == 30 {
            sim.trigger_selection_event(None).expect("selection");
        }
        sim.step(1.0).expect("step");
        let live = sim.population().live_count();
        assert!(live <= 32, "tick {tick}: {live} agents");
        peak = peak.max(live);
    }
    assert_eq!(peak, 32);
}

#[test]
fn agent_ids_are_never_reused() {
    let config = SimulationConfig {
        initial_population: 30,
        budding_chance: 0.2,
        initial_energy: 120.0,
        selection_settle_ticks: 3,
        ..quiet_config(13)
    };
    let mut sim = Simulation::new(config).expect("simulation");
    let mut seen: HashSet<AgentId> = live_ids(&sim).into_iter().collect();
    for round in 0..4 {
        sim.trigger_selection_event(None).expect("selection");
        for _ in 0..10 {
            sim.step(1.0).expect("step");
            let ids = live_ids(&sim);
            assert!(ids.windows(2).all(|w| w[0] < w[1]), "round {round}");
            seen.extend(ids);
        }
    }
    let before_reset = seen.len();
    sim.reset().expect("reset");
    for id in live_ids(&sim) {
        assert!(seen.insert(id), "{id} reused after reset");
    }
    assert!(seen.len() > before_reset);
}

#[test]
fn survivors_keep_their_genomes_through_reproduction() {
    let config = SimulationConfig {
        initial_population: 50,
        selection_settle_ticks: 2,
        budding_chance: 0.0,
        // No predators, so every survivor lives to reproduce.
        traits_per_agent: 0,
        ..quiet_config(14)
    };
    let mut sim = Simulation::new(config).expect("simulation");
    sim.trigger_selection_event(None).expect("selection");
    let survivors: Vec<_> = sim
        .population()
        .agents()
        .iter()
        .map(|agent| (agent.id, agent.genome().clone()))
        .collect();
    sim.step(1.0).expect("step");
    let events = sim.step(1.0).expect("step");
    let summary = events.reproduction.expect("reproduction");
    assert_eq!(summary.generation, Generation(1));
    assert_eq!(events.offspring, (survivors.len() * 3 / 10).max(1));
    for (id, genome) in &survivors {
        let agent = sim.population().get(*id).expect("survivor alive");
        assert_eq!(agent.genome(), genome);
    }
    let newcomers = sim
        .population()
        .agents()
        .iter()
        .filter(|agent| agent.generation == Generation(1))
        .count();
    assert_eq!(newcomers, events.offspring);
}

#[test]
fn statistics_refresh_labels_species_and_bounds_history() {
    let config = SimulationConfig {
        initial_population: 30,
        stats_interval: 5,
        history_capacity: 3,
        ..quiet_config(15)
    };
    let mut sim = Simulation::new(config).expect("simulation");
    let mut refreshed = 0;
    for _ in 0..25 {
        if sim.step(1.0).expect("step").stats_refreshed {
            refreshed += 1;
        }
    }
    assert_eq!(refreshed, 5);
    assert_eq!(sim.history().len(), 3);
    let stats = sim.latest_stats().expect("stats");
    assert_eq!(stats.species_assignments.len(), sim.population().live_count());
    assert!(sim
        .population()
        .agents()
        .iter()
        .all(|agent| agent.species.is_some_and(|s| s < 4)));
}

#[test]
fn selection_on_empty_population_is_rejected() {
    let config = SimulationConfig {
        initial_population: 1,
        traits_per_agent: 0,
        initial_energy: 0.5,
        metabolic_cost: 1.0,
        budding_energy_threshold: 1_000.0,
        ..quiet_config(16)
    };
    let mut sim = Simulation::new(config).expect("simulation");
    sim.step(1.0).expect("step");
    assert!(sim.population().is_empty());
    assert_eq!(
        sim.trigger_selection_event(None),
        Err(SimulationError::EmptyPopulation)
    );
}
