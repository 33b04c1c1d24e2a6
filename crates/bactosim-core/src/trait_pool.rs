//! Static pool of the 40 heritable traits and their behavioral effects.

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad family a trait belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TraitCategory {
    Resistance,
    Metabolic,
    Behavioral,
    Survival,
    Genetic,
    Reproductive,
}

impl TraitCategory {
    /// Lowercase label used in reports.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Resistance => "resistance",
            Self::Metabolic => "metabolic",
            Self::Behavioral => "behavioral",
            Self::Survival => "survival",
            Self::Genetic => "genetic",
            Self::Reproductive => "reproductive",
        }
    }
}

/// Descriptor of one entry in [`TRAIT_POOL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraitInfo {
    pub name: &'static str,
    pub category: TraitCategory,
    /// Display color as RGB.
    pub color: [u8; 3],
    pub description: &'static str,
}

const fn info(
    name: &'static str,
    category: TraitCategory,
    color: [u8; 3],
    description: &'static str,
) -> TraitInfo {
    TraitInfo {
        name,
        category,
        color,
        description,
    }
}

use TraitCategory::{Behavioral, Genetic, Metabolic, Reproductive, Resistance, Survival};

/// Every trait, indexed identically to the trait genes of a genome.
pub const TRAIT_POOL: [TraitInfo; 40] = [
    info("Antibiotic Resistance", Resistance, [231, 76, 60], "Survives antibiotic exposure zones."),
    info("Heat Tolerance", Resistance, [230, 126, 34], "Withstands thermal shock zones."),
    info("Cold Tolerance", Resistance, [52, 152, 219], "Withstands cold shock zones."),
    info("Acid Tolerance", Resistance, [241, 196, 15], "Survives low-pH pockets."),
    info("UV Resistance", Resistance, [155, 89, 182], "Repairs ultraviolet damage."),
    info("Heavy Metal Resistance", Resistance, [127, 140, 141], "Pumps out toxic metal ions."),
    info("Osmotic Tolerance", Resistance, [26, 188, 156], "Handles high-salt environments."),
    info("Radiation Resistance", Resistance, [46, 204, 113], "Survives ionizing radiation."),
    info("Fast Metabolism", Metabolic, [255, 99, 72], "Burns energy faster but moves quicker."),
    info("Slow Metabolism", Metabolic, [112, 161, 255], "Conserves energy at the cost of speed."),
    info("Photosynthesis", Metabolic, [123, 237, 159], "Harvests light for energy."),
    info("Nitrogen Fixation", Metabolic, [236, 204, 104], "Converts atmospheric nitrogen."),
    info("Fermentation", Metabolic, [255, 165, 2], "Extracts energy without oxygen."),
    info("Lactose Digestion", Metabolic, [241, 242, 246], "Digests milk sugars."),
    info("Sulfur Metabolism", Metabolic, [255, 221, 89], "Oxidizes sulfur compounds."),
    info("Predatory Behavior", Behavioral, [192, 57, 43], "Hunts and consumes other bacteria."),
    info("Chemotaxis", Behavioral, [0, 210, 211], "Senses chemical gradients from farther away."),
    info("Enhanced Motility", Behavioral, [84, 160, 255], "Stronger flagella for faster swimming."),
    info("Quorum Sensing", Behavioral, [95, 39, 205], "Coordinates behavior by population density."),
    info("Swarming", Behavioral, [1, 163, 164], "Moves collectively across surfaces."),
    info("Phototaxis", Behavioral, [254, 202, 87], "Orients toward light."),
    info("Magnetotaxis", Behavioral, [87, 101, 116], "Aligns with magnetic fields."),
    info("Spore Formation", Survival, [200, 214, 229], "Forms dormant, hardy spores."),
    info("Biofilm Formation", Survival, [16, 172, 132], "Builds protective biofilms."),
    info("Capsule Formation", Survival, [131, 149, 167], "Grows a protective polysaccharide capsule."),
    info("Toxin Production", Survival, [238, 82, 83], "Secretes toxins against competitors."),
    info("Longevity", Survival, [72, 219, 251], "Lives longer before senescence."),
    info("Dormancy", Survival, [34, 47, 62], "Survives lean times in a resting state."),
    info("Persister Cells", Survival, [200, 150, 255], "Keeps a tolerant sub-population."),
    info("DNA Repair", Genetic, [29, 209, 161], "Fixes copying errors, lowering mutation."),
    info("Gene Transfer", Genetic, [243, 104, 224], "Shares genes with nearby bacteria."),
    info("Hypermutation", Genetic, [255, 159, 243], "Error-prone replication raises mutation."),
    info("Plasmid Stability", Genetic, [254, 211, 48], "Retains plasmids across divisions."),
    info("CRISPR Immunity", Genetic, [46, 134, 222], "Remembers and cuts viral DNA."),
    info("Transposon Activity", Genetic, [165, 94, 234], "Mobile elements reshuffle the genome."),
    info("Rapid Division", Reproductive, [255, 107, 107], "Buds far more often."),
    info("Binary Fission Efficiency", Reproductive, [78, 205, 196], "Splits cleanly and cheaply."),
    info("Budding Control", Reproductive, [199, 236, 238], "Regulates daughter cell size."),
    info("Conjugation Pilus", Reproductive, [247, 159, 31], "Forms bridges to other cells."),
    info("Sporulation Burst", Reproductive, [18, 137, 167], "Releases many spores at once."),
];

/// Index of a trait within [`TRAIT_POOL`] (and of its gene in a genome).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TraitId(u8);

impl TraitId {
    pub const FAST_METABOLISM: Self = Self(8);
    pub const SLOW_METABOLISM: Self = Self(9);
    pub const PREDATORY_BEHAVIOR: Self = Self(15);
    pub const CHEMOTAXIS: Self = Self(16);
    pub const ENHANCED_MOTILITY: Self = Self(17);
    pub const LONGEVITY: Self = Self(26);
    pub const DNA_REPAIR: Self = Self(29);
    pub const GENE_TRANSFER: Self = Self(30);
    pub const HYPERMUTATION: Self = Self(31);
    pub const RAPID_DIVISION: Self = Self(35);

    /// Wrap a pool index, returning `None` when out of range.
    #[must_use]
    pub const fn new(index: usize) -> Option<Self> {
        if index < TRAIT_POOL.len() {
            Some(Self(index as u8))
        } else {
            None
        }
    }

    /// Position in the pool and in the genome's trait segment.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[must_use]
    pub const fn info(self) -> &'static TraitInfo {
        &TRAIT_POOL[self.0 as usize]
    }

    /// Uniformly random trait id.
    pub fn random(rng: &mut dyn RngCore) -> Self {
        Self(rng.random_range(0..TRAIT_POOL.len() as u8))
    }

    /// Iterate over all trait ids in pool order.
    pub fn all() -> impl Iterator<Item = Self> {
        (0..TRAIT_POOL.len() as u8).map(Self)
    }

    /// All trait ids of one category, in pool order.
    pub fn in_category(category: TraitCategory) -> impl Iterator<Item = Self> {
        Self::all().filter(move |id| id.info().category == category)
    }
}

impl fmt::Display for TraitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.info().name)
    }
}

/// Fixed-size bitset of expressed traits, indexed by [`TraitId`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TraitSet(u64);

impl TraitSet {
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn insert(&mut self, id: TraitId) {
        self.0 |= 1 << id.0;
    }

    #[must_use]
    pub const fn contains(self, id: TraitId) -> bool {
        self.0 & (1 << id.0) != 0
    }

    #[must_use]
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Expressed traits in pool order.
    pub fn iter(self) -> impl Iterator<Item = TraitId> {
        TraitId::all().filter(move |id| self.contains(*id))
    }

    /// First expressed trait in pool order, used for display.
    #[must_use]
    pub fn dominant(self) -> Option<TraitId> {
        self.iter().next()
    }

    /// Behavioral flags derived from the expressed traits.
    #[must_use]
    pub const fn effects(self) -> TraitEffects {
        TraitEffects {
            fast_metabolism: self.contains(TraitId::FAST_METABOLISM),
            slow_metabolism: self.contains(TraitId::SLOW_METABOLISM),
            predatory: self.contains(TraitId::PREDATORY_BEHAVIOR),
            chemotaxis: self.contains(TraitId::CHEMOTAXIS),
            enhanced_motility: self.contains(TraitId::ENHANCED_MOTILITY),
            longevity: self.contains(TraitId::LONGEVITY),
            dna_repair: self.contains(TraitId::DNA_REPAIR),
            gene_transfer: self.contains(TraitId::GENE_TRANSFER),
            hypermutation: self.contains(TraitId::HYPERMUTATION),
            rapid_division: self.contains(TraitId::RAPID_DIVISION),
        }
    }
}

impl FromIterator<TraitId> for TraitSet {
    fn from_iter<I: IntoIterator<Item = TraitId>>(iter: I) -> Self {
        let mut set = Self::empty();
        for id in iter {
            set.insert(id);
        }
        set
    }
}

/// Closed set of capability flags consulted by the ecosystem and lifecycle.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TraitEffects {
    pub fast_metabolism: bool,
    pub slow_metabolism: bool,
    pub predatory: bool,
    pub chemotaxis: bool,
    pub enhanced_motility: bool,
    pub longevity: bool,
    pub dna_repair: bool,
    pub gene_transfer: bool,
    pub hypermutation: bool,
    pub rapid_division: bool,
}

impl TraitEffects {
    /// Multiplier applied to metabolic drain.
    #[must_use]
    pub fn metabolism_multiplier(self) -> f64 {
        let mut multiplier = 1.0;
        if self.fast_metabolism {
            multiplier *= 1.5;
        }
        if self.slow_metabolism {
            multiplier *= 0.6;
        }
        multiplier
    }

    /// Multiplier applied to top speed.
    #[must_use]
    pub fn speed_multiplier(self) -> f64 {
        let mut multiplier = 1.0;
        if self.fast_metabolism {
            multiplier *= 1.3;
        }
        if self.slow_metabolism {
            multiplier *= 0.8;
        }
        if self.enhanced_motility {
            multiplier *= 1.2;
        }
        multiplier
    }

    #[must_use]
    pub fn sense_multiplier(self) -> f64 {
        if self.chemotaxis { 1.5 } else { 1.0 }
    }

    #[must_use]
    pub fn max_age_multiplier(self) -> f64 {
        if self.longevity { 1.5 } else { 1.0 }
    }

    #[must_use]
    pub fn budding_multiplier(self) -> f64 {
        if self.rapid_division { 2.5 } else { 1.0 }
    }

    /// Multiplier applied to the spontaneous mutation probability.
    #[must_use]
    pub fn spontaneous_mutation_multiplier(self) -> f64 {
        let mut multiplier = 1.0;
        if self.dna_repair {
            multiplier *= 0.3;
        }
        if self.hypermutation {
            multiplier *= 3.0;
        }
        multiplier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn pool_has_forty_unique_traits() {
        assert_eq!(TRAIT_POOL.len(), 40);
        let names: HashSet<_> = TRAIT_POOL.iter().map(|t| t.name).collect();
        assert_eq!(names.len(), 40);
    }

    #[test]
    fn category_sizes() {
        let count = |c| TraitId::in_category(c).count();
        assert_eq!(count(TraitCategory::Resistance), 8);
        assert_eq!(count(TraitCategory::Metabolic), 7);
        assert_eq!(count(TraitCategory::Behavioral), 7);
        assert_eq!(count(TraitCategory::Survival), 7);
        assert_eq!(count(TraitCategory::Genetic), 6);
        assert_eq!(count(TraitCategory::Reproductive), 5);
    }

    #[test]
    fn named_ids_point_at_their_traits() {
        assert_eq!(TraitId::PREDATORY_BEHAVIOR.info().name, "Predatory Behavior");
        assert_eq!(TraitId::FAST_METABOLISM.info().name, "Fast Metabolism");
        assert_eq!(TraitId::SLOW_METABOLISM.info().name, "Slow Metabolism");
        assert_eq!(TraitId::RAPID_DIVISION.info().name, "Rapid Division");
        assert_eq!(TraitId::DNA_REPAIR.info().name, "DNA Repair");
        assert_eq!(TraitId::GENE_TRANSFER.info().name, "Gene Transfer");
        assert_eq!(TraitId::LONGEVITY.info().name, "Longevity");
        assert_eq!(TraitId::CHEMOTAXIS.info().name, "Chemotaxis");
        assert_eq!(TraitId::ENHANCED_MOTILITY.info().name, "Enhanced Motility");
        assert_eq!(TraitId::HYPERMUTATION.info().name, "Hypermutation");
        assert!(TraitId::new(40).is_none());
    }

    #[test]
    fn set_iterates_in_pool_order() {
        let set: TraitSet = [TraitId::RAPID_DIVISION, TraitId::DNA_REPAIR, TraitId::FAST_METABOLISM]
            .into_iter()
            .collect();
        let order: Vec<_> = set.iter().collect();
        assert_eq!(
            order,
            vec![TraitId::FAST_METABOLISM, TraitId::DNA_REPAIR, TraitId::RAPID_DIVISION]
        );
        assert_eq!(set.dominant(), Some(TraitId::FAST_METABOLISM));
        assert_eq!(set.len(), 3);
        assert!(TraitSet::empty().dominant().is_none());
    }

    #[test]
    fn effects_multipliers() {
        let set: TraitSet = [TraitId::FAST_METABOLISM, TraitId::RAPID_DIVISION, TraitId::DNA_REPAIR]
            .into_iter()
            .collect();
        let effects = set.effects();
        assert!(effects.fast_metabolism && effects.rapid_division && !effects.predatory);
        assert_eq!(effects.metabolism_multiplier(), 1.5);
        assert_eq!(effects.budding_multiplier(), 2.5);
        assert!((effects.spontaneous_mutation_multiplier() - 0.3).abs() < 1e-12);
        assert_eq!(TraitEffects::default().metabolism_multiplier(), 1.0);
    }
}
