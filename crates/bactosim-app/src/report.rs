//! End-of-run report.

use std::fmt::Write as _;

use bactosim_core::{
    ComputeStatus, DeathTally, SelectionOutcome, Simulation, TickEvents, TraitId,
};
use owo_colors::OwoColorize;
use serde::Serialize;

/// Totals accumulated over a run plus the final population snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub ticks: u64,
    pub generation: u32,
    pub population: usize,
    pub births: usize,
    pub offspring: usize,
    pub spontaneous_mutations: usize,
    pub gene_transfers: usize,
    pub selection_events: usize,
    pub deaths: DeathTally,
    pub compute: ComputeStatus,
    pub mean_fitness: Option<f64>,
    pub diversity: Option<f64>,
    pub species_count: Option<usize>,
    /// Most frequently expressed traits with their frequency.
    pub top_traits: Vec<(String, f64)>,
}

impl RunReport {
    #[must_use]
    pub fn new(compute: ComputeStatus) -> Self {
        Self {
            ticks: 0,
            generation: 0,
            population: 0,
            births: 0,
            offspring: 0,
            spontaneous_mutations: 0,
            gene_transfers: 0,
            selection_events: 0,
            deaths: DeathTally::default(),
            compute,
            mean_fitness: None,
            diversity: None,
            species_count: None,
            top_traits: Vec::new(),
        }
    }

    pub fn record(&mut self, events: &TickEvents) {
        self.ticks = events.tick.0;
        self.births += events.births;
        self.offspring += events.offspring;
        self.spontaneous_mutations += events.spontaneous_mutations;
        self.gene_transfers += events.gene_transfers;
        self.deaths.absorb(&events.deaths);
    }

    /// Count a selection event and the deaths its cull caused.
    pub fn record_selection(&mut self, outcome: &SelectionOutcome) {
        self.selection_events += 1;
        self.deaths.absorb(&outcome.deaths);
    }

    /// Capture the final state of `sim`.
    pub fn finish(&mut self, sim: &Simulation) {
        self.generation = sim.generation().0;
        self.population = sim.population().live_count();
        self.compute = sim.compute_status();
        if let Some(stats) = sim.latest_stats() {
            self.mean_fitness = Some(stats.mean_fitness);
            self.diversity = Some(stats.diversity);
            self.species_count = Some(stats.species_count);
            self.top_traits = top_traits(&stats.trait_frequencies, 5)
                .into_iter()
                .map(|(id, frequency)| (id.info().name.to_owned(), frequency))
                .collect();
        }
    }

    /// Human-readable, colored summary.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", "bactosim run complete".bold());
        let _ = writeln!(
            out,
            "  ticks {}  generation {}  population {}  compute {:?}",
            self.ticks.cyan(),
            self.generation.cyan(),
            self.population.cyan(),
            self.compute
        );
        let _ = writeln!(
            out,
            "  births {}  offspring {}  selection events {}  mutations {}  transfers {}",
            self.births, self.offspring, self.selection_events, self.spontaneous_mutations,
            self.gene_transfers
        );
        let _ = writeln!(
            out,
            "  deaths {}: starvation {}  predation {}  hazard {}  selection {}  old age {}",
            self.deaths.total().red(),
            self.deaths.starvation,
            self.deaths.predation,
            self.deaths.hazard,
            self.deaths.selection,
            self.deaths.old_age
        );
        match (self.mean_fitness, self.diversity, self.species_count) {
            (Some(fitness), Some(diversity), Some(species)) => {
                let _ = writeln!(
                    out,
                    "  mean fitness {fitness:.2}  diversity {diversity:.3}  species {species}"
                );
            }
            _ => {
                let _ = writeln!(out, "  {}", "no statistics collected".yellow());
            }
        }
        for (name, frequency) in &self.top_traits {
            let _ = writeln!(out, "  {:>5.1}%  {}", frequency * 100.0, name.green());
        }
        out
    }
}

/// Up to `limit` expressed traits, most frequent first; ties keep pool order.
#[must_use]
pub fn top_traits(frequencies: &[f64], limit: usize) -> Vec<(TraitId, f64)> {
    let mut ranked: Vec<(TraitId, f64)> = frequencies
        .iter()
        .enumerate()
        .filter(|(_, frequency)| **frequency > 0.0)
        .filter_map(|(index, frequency)| TraitId::new(index).map(|id| (id, *frequency)))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(limit);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use bactosim_core::{DeathCause, Tick};

    #[test]
    fn record_accumulates_tick_events() {
        let mut report = RunReport::new(ComputeStatus::Local);
        let mut events = TickEvents {
            tick: Tick(4),
            births: 2,
            offspring: 1,
            ..TickEvents::default()
        };
        events.deaths.record(DeathCause::Predation);
        report.record(&events);
        events.tick = Tick(5);
        report.record(&events);
        assert_eq!(report.ticks, 5);
        assert_eq!(report.births, 4);
        assert_eq!(report.offspring, 2);
        assert_eq!(report.deaths.predation, 2);
    }

    #[test]
    fn selection_culls_count_as_deaths() {
        let mut report = RunReport::new(ComputeStatus::Local);
        let outcome = SelectionOutcome {
            trait_id: TraitId::CHEMOTAXIS,
            population_before: 40,
            survivors: 10,
            culled: 30,
            floor: 10,
            backfilled: 10,
            deaths: DeathTally {
                selection: 30,
                ..DeathTally::default()
            },
            reproduce_at: Tick(300),
        };
        report.record_selection(&outcome);
        assert_eq!(report.selection_events, 1);
        assert_eq!(report.deaths.selection, 30);
        assert_eq!(report.deaths.total(), 30);
    }

    #[test]
    fn top_traits_rank_by_frequency() {
        let mut frequencies = vec![0.0; 40];
        frequencies[3] = 0.2;
        frequencies[7] = 0.9;
        frequencies[12] = 0.2;
        let top = top_traits(&frequencies, 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].0.index(), 7);
        assert_eq!(top[1].0.index(), 3);
        assert!(top_traits(&[0.0; 40], 5).is_empty());
    }

    #[test]
    fn render_mentions_missing_statistics() {
        let report = RunReport::new(ComputeStatus::Degraded);
        let text = report.render();
        assert!(text.contains("no statistics collected"));
        assert!(text.contains("Degraded"));
    }
}
