//! Population statistics: diversity, Hardy–Weinberg departure, k-means species.

use rand::{RngCore, seq::index};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::genome::{EXPRESSION_THRESHOLD, GENOME_LENGTH, Genome, TRAIT_GENE_COUNT};

/// Per-trait expression frequency and its Hardy–Weinberg reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HardyWeinbergRecord {
    pub trait_index: usize,
    /// Fraction of genomes expressing the trait.
    pub observed: f64,
    /// `2p(1 - p)`.
    pub expected_het: f64,
    /// `|p - 0.5|`.
    pub departure: f64,
}

/// Outcome of species clustering.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SpeciesClustering {
    /// Cluster label per genome, in input order.
    pub assignments: Vec<usize>,
    /// Number of distinct labels in `assignments`.
    pub species_count: usize,
}

/// Aggregate statistics for one population snapshot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PopulationStatistics {
    pub mean_fitness: f64,
    pub max_fitness: f64,
    pub min_fitness: f64,
    /// Population standard deviation of fitness.
    pub std_fitness: f64,
    /// Shannon entropy over trait expression frequencies.
    pub diversity: f64,
    pub species_assignments: Vec<usize>,
    pub species_count: usize,
    pub hardy_weinberg: Vec<HardyWeinbergRecord>,
    pub trait_frequencies: Vec<f64>,
}

impl PopulationStatistics {
    /// Compute every statistic for `genomes` and their parallel `fitnesses`.
    pub fn compute(
        genomes: &[Genome],
        fitnesses: &[f64],
        species_k: usize,
        kmeans_iterations: usize,
        rng: &mut dyn RngCore,
    ) -> Self {
        let clustering = kmeans(genomes, species_k, kmeans_iterations, rng);
        let mut stats = Self {
            diversity: shannon_diversity(genomes),
            species_assignments: clustering.assignments,
            species_count: clustering.species_count,
            hardy_weinberg: hardy_weinberg(genomes),
            trait_frequencies: trait_frequencies(genomes),
            ..Self::default()
        };
        if !fitnesses.is_empty() {
            let n = fitnesses.len() as f64;
            let mean = fitnesses.iter().sum::<f64>() / n;
            stats.mean_fitness = mean;
            stats.max_fitness = fitnesses.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            stats.min_fitness = fitnesses.iter().copied().fold(f64::INFINITY, f64::min);
            stats.std_fitness =
                (fitnesses.iter().map(|f| (f - mean).powi(2)).sum::<f64>() / n).sqrt();
        }
        stats
    }
}

/// Fraction of genomes expressing each trait; all zero for an empty input.
#[must_use]
pub fn trait_frequencies(genomes: &[Genome]) -> Vec<f64> {
    let mut counts = vec![0usize; TRAIT_GENE_COUNT];
    for genome in genomes {
        for (count, gene) in counts.iter_mut().zip(genome.trait_genes()) {
            if *gene > EXPRESSION_THRESHOLD {
                *count += 1;
            }
        }
    }
    if genomes.is_empty() {
        return vec![0.0; TRAIT_GENE_COUNT];
    }
    let n = genomes.len() as f64;
    counts.into_iter().map(|count| count as f64 / n).collect()
}

/// Shannon entropy `-Σ p ln p` over trait frequencies strictly inside `(0, 1)`.
#[must_use]
pub fn shannon_diversity(genomes: &[Genome]) -> f64 {
    trait_frequencies(genomes)
        .into_iter()
        .filter(|p| *p > 0.0 && *p < 1.0)
        .map(|p| -p * p.ln())
        .sum()
}

/// Hardy–Weinberg records for every trait; empty for an empty population.
#[must_use]
pub fn hardy_weinberg(genomes: &[Genome]) -> Vec<HardyWeinbergRecord> {
    if genomes.is_empty() {
        return Vec::new();
    }
    trait_frequencies(genomes)
        .into_iter()
        .enumerate()
        .map(|(trait_index, p)| HardyWeinbergRecord {
            trait_index,
            observed: p,
            expected_het: 2.0 * p * (1.0 - p),
            departure: (p - 0.5).abs(),
        })
        .collect()
}

/// Lloyd's k-means in full genome space with a fixed iteration budget.
///
/// Centroids start at `k` distinct random genomes. Distance ties go to the
/// lowest centroid index and an empty cluster keeps its previous centroid.
/// With fewer genomes than `k`, every genome is its own species.
pub fn kmeans(
    genomes: &[Genome],
    k: usize,
    iterations: usize,
    rng: &mut dyn RngCore,
) -> SpeciesClustering {
    let n = genomes.len();
    if n < k || k == 0 {
        return SpeciesClustering {
            assignments: (0..n).collect(),
            species_count: n,
        };
    }

    let mut centroids: Vec<Vec<f64>> = index::sample(rng, n, k)
        .iter()
        .map(|i| genomes[i].genes().to_vec())
        .collect();

    let mut assignments = assign(genomes, &centroids);
    for _ in 0..iterations {
        let mut sums = vec![vec![0.0; GENOME_LENGTH]; k];
        let mut counts = vec![0usize; k];
        for (genome, &label) in genomes.iter().zip(&assignments) {
            counts[label] += 1;
            for (acc, gene) in sums[label].iter_mut().zip(genome.genes()) {
                *acc += gene;
            }
        }
        for ((centroid, sum), count) in centroids.iter_mut().zip(sums).zip(counts) {
            if count > 0 {
                *centroid = sum.into_iter().map(|s| s / count as f64).collect();
            }
        }
        assignments = assign(genomes, &centroids);
    }

    let mut seen = vec![false; k];
    for &label in &assignments {
        seen[label] = true;
    }
    SpeciesClustering {
        species_count: seen.into_iter().filter(|s| *s).count(),
        assignments,
    }
}

fn assign(genomes: &[Genome], centroids: &[Vec<f64>]) -> Vec<usize> {
    genomes
        .par_iter()
        .map(|genome| {
            let mut best = 0;
            let mut best_distance = f64::INFINITY;
            for (label, centroid) in centroids.iter().enumerate() {
                let distance = genome.distance_sq(centroid);
                if distance < best_distance {
                    best = label;
                    best_distance = distance;
                }
            }
            best
        })
        .collect()
}
