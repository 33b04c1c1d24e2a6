//! Genetic-algorithm operators: fitness, selection, crossover, mutation, elitism.

use ordered_float::OrderedFloat;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::config::{CrossoverMethod, GeneticConfig, SelectionMethod};
use crate::genome::{GENOME_LENGTH, Genome};

/// Floor applied to fitness values before roulette weighting.
pub const ROULETTE_EPSILON: f64 = 1e-6;

/// Scalar fitness: `0.4·energy + 0.3·survival + 0.3·food`, inputs clamped at zero.
#[must_use]
pub fn fitness(energy_collected: f64, survival_time: f64, food_eaten: f64) -> f64 {
    0.4 * energy_collected.max(0.0) + 0.3 * survival_time.max(0.0) + 0.3 * food_eaten.max(0.0)
}

/// A genome paired with its fitness, as handed to the breeding pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scored {
    pub genome: Genome,
    pub fitness: f64,
}

impl Scored {
    #[must_use]
    pub fn new(genome: Genome, fitness: f64) -> Self {
        Self { genome, fitness }
    }
}

/// Standard normal sample via the Box–Muller transform.
pub fn gaussian(rng: &mut dyn RngCore) -> f64 {
    let u1 = loop {
        let candidate: f64 = rng.random();
        if candidate > 0.0 {
            break candidate;
        }
    };
    let u2: f64 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

/// Per-gene Gaussian mutation followed by the absolute gene clamps.
///
/// Returns the number of genes that received noise.
pub fn mutate(genome: &mut Genome, rate: f64, sigma: f64, rng: &mut dyn RngCore) -> usize {
    let mut mutated = 0;
    for gene in genome.genes_mut() {
        if rng.random::<f64>() < rate {
            *gene += gaussian(rng) * sigma;
            mutated += 1;
        }
    }
    genome.clamp_genes();
    mutated
}

/// Each gene copied from `a` or `b` with probability one half.
#[must_use]
pub fn uniform_crossover(a: &Genome, b: &Genome, rng: &mut dyn RngCore) -> Genome {
    let mut child = a.clone();
    for (slot, gene) in child.genes_mut().iter_mut().zip(b.genes()) {
        if rng.random_bool(0.5) {
            *slot = *gene;
        }
    }
    child
}

/// Genes before a random cut come from `a`, the rest from `b`.
#[must_use]
pub fn single_point_crossover(a: &Genome, b: &Genome, rng: &mut dyn RngCore) -> Genome {
    let cut = rng.random_range(0..GENOME_LENGTH);
    let mut child = a.clone();
    child.genes_mut()[cut..].copy_from_slice(&b.genes()[cut..]);
    child
}

/// The segment `[c1, c2)` comes from `b`, everything else from `a`.
#[must_use]
pub fn two_point_crossover(a: &Genome, b: &Genome, rng: &mut dyn RngCore) -> Genome {
    let mut first = rng.random_range(0..GENOME_LENGTH);
    let mut second = rng.random_range(0..GENOME_LENGTH);
    if first > second {
        std::mem::swap(&mut first, &mut second);
    }
    let mut child = a.clone();
    child.genes_mut()[first..second].copy_from_slice(&b.genes()[first..second]);
    child
}

/// Number of elites for a pool of `len` individuals: `⌈elitism·len⌉`, at most `len`.
#[must_use]
pub fn elite_count(elitism: f64, len: usize) -> usize {
    // Tolerance keeps products such as 0.3·10 from rounding up to 4.
    let raw = (elitism * len as f64 - 1e-9).ceil().max(0.0);
    (raw as usize).min(len)
}

/// Indices of the pool sorted by fitness, descending; ties keep pool order.
#[must_use]
pub fn rank_by_fitness(pool: &[Scored]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..pool.len()).collect();
    order.sort_by_key(|&index| std::cmp::Reverse(OrderedFloat(pool[index].fitness)));
    order
}

/// Stateless driver for the configured operators.
#[derive(Debug, Clone, Default)]
pub struct GeneticAlgorithm {
    config: GeneticConfig,
}

impl GeneticAlgorithm {
    #[must_use]
    pub fn new(config: GeneticConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &GeneticConfig {
        &self.config
    }

    /// Best of `k` uniform draws with replacement; the first maximum wins.
    pub fn tournament(&self, pool: &[Scored], rng: &mut dyn RngCore) -> Option<usize> {
        if pool.is_empty() {
            return None;
        }
        let mut best = rng.random_range(0..pool.len());
        for _ in 1..self.config.tournament_size.max(1) {
            let challenger = rng.random_range(0..pool.len());
            if pool[challenger].fitness > pool[best].fitness {
                best = challenger;
            }
        }
        Some(best)
    }

    /// Fitness-proportionate pick with weights `max(fitness, ε)`.
    pub fn roulette(&self, pool: &[Scored], rng: &mut dyn RngCore) -> Option<usize> {
        if pool.is_empty() {
            return None;
        }
        let weight = |s: &Scored| {
            if s.fitness.is_finite() {
                s.fitness.max(ROULETTE_EPSILON)
            } else {
                ROULETTE_EPSILON
            }
        };
        let total: f64 = pool.iter().map(weight).sum();
        let mut target = rng.random::<f64>() * total;
        for (index, scored) in pool.iter().enumerate() {
            target -= weight(scored);
            if target < 0.0 {
                return Some(index);
            }
        }
        Some(pool.len() - 1)
    }

    /// Parent index chosen with the configured strategy; `None` for an empty pool.
    pub fn select(&self, pool: &[Scored], rng: &mut dyn RngCore) -> Option<usize> {
        match self.config.selection {
            SelectionMethod::Tournament => self.tournament(pool, rng),
            SelectionMethod::Roulette => self.roulette(pool, rng),
        }
    }

    /// Fresh child genome using the configured crossover operator.
    #[must_use]
    pub fn crossover(&self, a: &Genome, b: &Genome, rng: &mut dyn RngCore) -> Genome {
        match self.config.crossover {
            CrossoverMethod::Uniform => uniform_crossover(a, b, rng),
            CrossoverMethod::SinglePoint => single_point_crossover(a, b, rng),
            CrossoverMethod::TwoPoint => two_point_crossover(a, b, rng),
        }
    }

    /// Indices of the elite tier in fitness-descending order.
    #[must_use]
    pub fn elite_indices(&self, pool: &[Scored]) -> Vec<usize> {
        let mut ranked = rank_by_fitness(pool);
        ranked.truncate(elite_count(self.config.elitism, pool.len()));
        ranked
    }

    /// Breed `count` offspring: select two parents, cross over, mutate.
    pub fn breed(&self, pool: &[Scored], count: usize, rng: &mut dyn RngCore) -> Vec<Genome> {
        let mut offspring = Vec::with_capacity(count);
        for _ in 0..count {
            let (Some(a), Some(b)) = (self.select(pool, rng), self.select(pool, rng)) else {
                break;
            };
            let mut child = self.crossover(&pool[a].genome, &pool[b].genome, rng);
            mutate(
                &mut child,
                self.config.mutation_rate,
                self.config.mutation_sigma,
                rng,
            );
            offspring.push(child);
        }
        offspring
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::{TRAIT_GENE_COUNT, WEIGHT_LIMIT};
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn pool(fitnesses: &[f64], rng: &mut SmallRng) -> Vec<Scored> {
        fitnesses
            .iter()
            .map(|f| Scored::new(Genome::random(rng), *f))
            .collect()
    }

    #[test]
    fn fitness_clamps_negative_inputs() {
        assert_eq!(fitness(10.0, 20.0, 5.0), 0.4 * 10.0 + 0.3 * 20.0 + 0.3 * 5.0);
        assert_eq!(fitness(-4.0, -1.0, -2.0), 0.0);
    }

    #[test]
    fn gaussian_has_unit_moments() {
        let mut rng = SmallRng::seed_from_u64(11);
        let samples: Vec<f64> = (0..20_000).map(|_| gaussian(&mut rng)).collect();
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / samples.len() as f64;
        assert!(mean.abs() < 0.05, "mean {mean}");
        assert!((var - 1.0).abs() < 0.05, "variance {var}");
        assert!(samples.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn mutation_clamps_regardless_of_sigma() {
        let mut rng = SmallRng::seed_from_u64(12);
        let mut genome = Genome::random(&mut rng);
        for _ in 0..20 {
            mutate(&mut genome, 1.0, 50.0, &mut rng);
            assert!(genome.trait_genes().iter().all(|g| (0.0..=1.0).contains(g)));
            assert!(
                genome
                    .weight_genes()
                    .iter()
                    .all(|g| (-WEIGHT_LIMIT..=WEIGHT_LIMIT).contains(g))
            );
        }
    }

    #[test]
    fn zero_rate_mutation_is_identity() {
        let mut rng = SmallRng::seed_from_u64(13);
        let mut genome = Genome::random(&mut rng);
        let before = genome.clone();
        assert_eq!(mutate(&mut genome, 0.0, 1.0, &mut rng), 0);
        assert_eq!(genome, before);
    }

    #[test]
    fn uniform_crossover_never_interpolates() {
        let mut rng = SmallRng::seed_from_u64(14);
        let a = Genome::random(&mut rng);
        let b = Genome::random(&mut rng);
        for _ in 0..20 {
            let child = uniform_crossover(&a, &b, &mut rng);
            assert_eq!(child.genes().len(), GENOME_LENGTH);
            for ((c, x), y) in child.genes().iter().zip(a.genes()).zip(b.genes()) {
                assert!(c == x || c == y);
            }
        }
    }

    #[test]
    fn point_crossovers_take_contiguous_segments() {
        let a = Genome::from_genes(vec![0.0; GENOME_LENGTH]).expect("genome");
        let mut b_genes = vec![1.0; GENOME_LENGTH];
        for gene in &mut b_genes[TRAIT_GENE_COUNT..] {
            *gene = 2.0;
        }
        let b = Genome::from_genes(b_genes).expect("genome");
        let mut rng = SmallRng::seed_from_u64(15);
        for _ in 0..50 {
            let single = single_point_crossover(&a, &b, &mut rng);
            let from_b = single.genes().iter().position(|g| *g != 0.0);
            if let Some(cut) = from_b {
                assert!(single.genes()[cut..].iter().all(|g| *g != 0.0));
            }

            let two = two_point_crossover(&a, &b, &mut rng);
            let touched: Vec<usize> = two
                .genes()
                .iter()
                .enumerate()
                .filter(|(_, g)| **g != 0.0)
                .map(|(i, _)| i)
                .collect();
            if let (Some(first), Some(last)) = (touched.first(), touched.last()) {
                assert_eq!(touched.len(), last - first + 1);
            }
        }
    }

    #[test]
    fn roulette_matches_proportions() {
        let mut rng = SmallRng::seed_from_u64(16);
        let ga = GeneticAlgorithm::new(GeneticConfig {
            selection: SelectionMethod::Roulette,
            ..GeneticConfig::default()
        });
        let pool = pool(&[10.0, 5.0, 1.0], &mut rng);
        let trials = 64_000;
        let mut counts = [0usize; 3];
        for _ in 0..trials {
            counts[ga.select(&pool, &mut rng).expect("non-empty")] += 1;
        }
        let expected = [10.0 / 16.0, 5.0 / 16.0, 1.0 / 16.0];
        for (count, p) in counts.iter().zip(expected) {
            let observed = *count as f64 / trials as f64;
            assert!((observed - p).abs() < 0.01, "observed {observed} expected {p}");
        }
    }

    #[test]
    fn roulette_handles_zero_fitness_and_empty_pool() {
        let mut rng = SmallRng::seed_from_u64(17);
        let ga = GeneticAlgorithm::default();
        assert_eq!(ga.roulette(&[], &mut rng), None);
        assert_eq!(ga.tournament(&[], &mut rng), None);
        let zeros = pool(&[0.0, 0.0], &mut rng);
        let mut seen = [false; 2];
        for _ in 0..200 {
            seen[ga.roulette(&zeros, &mut rng).expect("pick")] = true;
        }
        assert_eq!(seen, [true, true]);
    }

    #[test]
    fn tournament_pressure_grows_with_k() {
        let mut rng = SmallRng::seed_from_u64(18);
        let fitnesses: Vec<f64> = (0..10).map(f64::from).collect();
        let pool = pool(&fitnesses, &mut rng);
        let mean_pick = |k: usize, rng: &mut SmallRng| {
            let ga = GeneticAlgorithm::new(GeneticConfig {
                tournament_size: k,
                ..GeneticConfig::default()
            });
            (0..4_000)
                .map(|_| pool[ga.tournament(&pool, rng).expect("pick")].fitness)
                .sum::<f64>()
                / 4_000.0
        };
        let weak = mean_pick(1, &mut rng);
        let strong = mean_pick(6, &mut rng);
        assert!(strong > weak + 1.0, "k=1 {weak} k=6 {strong}");
    }

    #[test]
    fn elite_count_rounds_up_with_tolerance() {
        assert_eq!(elite_count(0.1, 10), 1);
        assert_eq!(elite_count(0.3, 10), 3);
        assert_eq!(elite_count(0.1, 11), 2);
        assert_eq!(elite_count(0.0, 10), 0);
        assert_eq!(elite_count(1.0, 4), 4);
    }

    #[test]
    fn elites_rank_with_stable_ties_and_breeding_leaves_them_intact() {
        let mut rng = SmallRng::seed_from_u64(19);
        let ga = GeneticAlgorithm::new(GeneticConfig {
            elitism: 0.3,
            mutation_rate: 1.0,
            mutation_sigma: 1.0,
            ..GeneticConfig::default()
        });
        let pool = pool(&[3.0, 9.0, 1.0, 9.0, 4.0, 0.5, 2.0, 7.0, 6.0, 5.0], &mut rng);
        let before: Vec<Genome> = pool.iter().map(|s| s.genome.clone()).collect();
        assert_eq!(ga.elite_indices(&pool), vec![1, 3, 7]);
        let offspring = ga.breed(&pool, 7, &mut rng);
        assert_eq!(offspring.len(), 7);
        for index in [1, 3, 7] {
            assert_eq!(pool[index].genome, before[index]);
            assert!(offspring.iter().all(|child| *child != before[index]));
        }
    }

    #[test]
    fn breed_produces_requested_count() {
        let mut rng = SmallRng::seed_from_u64(20);
        let ga = GeneticAlgorithm::default();
        let pool = pool(&[1.0, 2.0, 3.0], &mut rng);
        assert_eq!(ga.breed(&pool, 7, &mut rng).len(), 7);
        assert!(ga.breed(&[], 7, &mut rng).is_empty());
    }
}
