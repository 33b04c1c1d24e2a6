//! Environment update: food, hazard zones, metabolism, eating, predation, movement.

use std::collections::VecDeque;

use bactosim_brain::{FeedForwardBrain, INPUT_SIZE, OUTPUT_SIZE};
use rand::{Rng, RngCore};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::agent::{Agent, DeathCause};
use crate::config::SimulationConfig;
use crate::trait_pool::{TraitCategory, TraitId};
use crate::{AgentId, Position, Velocity, wrap_signed_angle};

/// Maximum number of concurrent hazard zones.
pub const MAX_HAZARDS: usize = 5;
/// Energy at or below this value counts as exhausted.
pub const STARVATION_EPSILON: f64 = 1e-9;

/// A food particle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Food {
    pub position: Position,
    pub age: f64,
}

/// A drifting zone that drains agents lacking its resistance trait.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HazardZone {
    pub position: Position,
    pub radius: f64,
    pub velocity: Velocity,
    /// Agents expressing this trait are unaffected.
    pub trait_id: TraitId,
    /// Ticks left before the zone disappears.
    pub remaining: f64,
}

impl HazardZone {
    #[must_use]
    pub fn contains(&self, point: Position) -> bool {
        self.position.distance_sq(point) < self.radius * self.radius
    }

    /// Move by `velocity·dt`, reflecting off the area bounds.
    pub fn drift(&mut self, dt: f64, width: f64, height: f64) {
        let (x, vx) = bounce(self.position.x + self.velocity.vx * dt, self.velocity.vx, width);
        let (y, vy) = bounce(self.position.y + self.velocity.vy * dt, self.velocity.vy, height);
        self.position = Position::new(x, y);
        self.velocity = Velocity::new(vx, vy);
    }
}

fn bounce(value: f64, velocity: f64, extent: f64) -> (f64, f64) {
    if value < 0.0 {
        (0.0, velocity.abs())
    } else if value > extent {
        (extent, -velocity.abs())
    } else {
        (value, velocity)
    }
}

fn wrap_position(value: f64, extent: f64) -> f64 {
    if extent <= 0.0 {
        return 0.0;
    }
    value.rem_euclid(extent)
}

/// What happened during one ecosystem update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EcosystemReport {
    pub food_spawned: usize,
    pub food_eaten: usize,
    pub hazards_spawned: usize,
    pub hazards_expired: usize,
    /// Agents killed this update, in the order they died.
    pub deaths: Vec<(AgentId, DeathCause)>,
}

impl EcosystemReport {
    #[must_use]
    pub fn deaths_by(&self, cause: DeathCause) -> usize {
        self.deaths.iter().filter(|(_, c)| *c == cause).count()
    }
}

/// Food and hazards sharing the simulation area with the agents.
#[derive(Debug, Clone, Default)]
pub struct Ecosystem {
    food: Vec<Food>,
    hazards: VecDeque<HazardZone>,
    spawn_accumulator: f64,
}

impl Ecosystem {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty the area and scatter `initial_food` particles.
    pub fn reset(&mut self, config: &SimulationConfig, rng: &mut dyn RngCore) {
        self.food.clear();
        self.hazards.clear();
        self.spawn_accumulator = 0.0;
        for _ in 0..config.initial_food.min(config.max_food) {
            let position = random_position(config, rng);
            self.food.push(Food { position, age: 0.0 });
        }
    }

    #[must_use]
    pub fn food(&self) -> &[Food] {
        &self.food
    }

    #[must_use]
    pub fn hazards(&self) -> &VecDeque<HazardZone> {
        &self.hazards
    }

    /// Place a food particle unless the area is already full.
    pub fn add_food(&mut self, position: Position, max_food: usize) -> bool {
        if self.food.len() >= max_food {
            return false;
        }
        self.food.push(Food { position, age: 0.0 });
        true
    }

    /// Insert a zone, evicting and returning the oldest one when at capacity.
    pub fn add_hazard(&mut self, zone: HazardZone) -> Option<HazardZone> {
        let evicted = if self.hazards.len() >= MAX_HAZARDS {
            self.hazards.pop_front()
        } else {
            None
        };
        self.hazards.push_back(zone);
        evicted
    }

    /// Metabolic multiplier for a population of `live` agents.
    #[must_use]
    pub fn overcrowding_factor(live: usize, config: &SimulationConfig) -> f64 {
        let threshold = config.overcrowding_threshold;
        if live <= threshold {
            return 1.0;
        }
        let span = config.max_population.saturating_sub(threshold);
        let pressure = if span == 0 {
            1.0
        } else {
            ((live - threshold) as f64 / span as f64).min(1.0)
        };
        1.0 + (config.overcrowding_max_multiplier - 1.0) * pressure
    }

    /// Run one environment update over `agents`.
    pub fn update(
        &mut self,
        agents: &mut [Agent],
        config: &SimulationConfig,
        dt: f64,
        rng: &mut dyn RngCore,
    ) -> EcosystemReport {
        let mut report = EcosystemReport::default();
        self.stage_food(config, dt, rng, &mut report);
        self.stage_hazards(config, dt, rng, &mut report);

        let live = agents.iter().filter(|a| a.is_alive()).count();
        let crowding = Self::overcrowding_factor(live, config);
        let contact = config.agent_size + config.food_size;
        let contact_sq = contact * contact;

        let mut hazard_hit = vec![false; agents.len()];
        for (agent, hit) in agents.iter_mut().zip(hazard_hit.iter_mut()) {
            if !agent.is_alive() {
                continue;
            }
            let cost = config.metabolic_cost * dt * crowding * agent.effects().metabolism_multiplier();
            agent.drain_energy(cost);

            let position = agent.position;
            if let Some(index) = self
                .food
                .iter()
                .position(|food| food.position.distance_sq(position) < contact_sq)
            {
                self.food.remove(index);
                agent.gain_energy(config.food_energy, config.max_energy);
                agent.food_eaten += 1;
                report.food_eaten += 1;
            }

            let damage: f64 = self
                .hazards
                .iter()
                .filter(|zone| zone.contains(position) && !agent.expresses(zone.trait_id))
                .map(|_| config.hazard_damage * dt)
                .sum();
            if damage > 0.0 {
                agent.drain_energy(damage);
                *hit = true;
            }
        }

        stage_predation(agents, config, &mut report);

        for (agent, hit) in agents.iter_mut().zip(hazard_hit) {
            if agent.is_alive() && agent.energy <= STARVATION_EPSILON {
                let cause = if hit {
                    DeathCause::Hazard
                } else {
                    DeathCause::Starvation
                };
                agent.kill(cause);
                report.deaths.push((agent.id, cause));
            }
        }
        report
    }

    fn stage_food(
        &mut self,
        config: &SimulationConfig,
        dt: f64,
        rng: &mut dyn RngCore,
        report: &mut EcosystemReport,
    ) {
        for food in &mut self.food {
            food.age += dt;
        }
        self.spawn_accumulator += config.food_spawn_rate * dt;
        while self.spawn_accumulator >= 1.0 && self.food.len() < config.max_food {
            let position = random_position(config, rng);
            self.food.push(Food { position, age: 0.0 });
            self.spawn_accumulator -= 1.0;
            report.food_spawned += 1;
        }
        if self.food.len() >= config.max_food {
            // Whole particles owed while the area is full are forfeited.
            self.spawn_accumulator = self.spawn_accumulator.fract();
        }
    }

    fn stage_hazards(
        &mut self,
        config: &SimulationConfig,
        dt: f64,
        rng: &mut dyn RngCore,
        report: &mut EcosystemReport,
    ) {
        for zone in &mut self.hazards {
            zone.drift(dt, config.world_width, config.world_height);
            zone.remaining -= dt;
        }
        let before = self.hazards.len();
        self.hazards.retain(|zone| zone.remaining > 0.0);
        report.hazards_expired += before - self.hazards.len();

        if rng.random::<f64>() < config.hazard_spawn_chance * dt {
            let zone = random_hazard(config, rng);
            self.add_hazard(zone);
            report.hazards_spawned += 1;
        }
    }

    /// Sensor vector for `agents[index]`:
    /// `[food angle, food distance, threat angle, threat distance, energy, speed]`.
    #[must_use]
    pub fn sense(&self, index: usize, agents: &[Agent], config: &SimulationConfig) -> [f64; INPUT_SIZE] {
        let agent = &agents[index];
        let effects = agent.effects();
        let range = config.sense_range * effects.sense_multiplier();
        let mut sensors = [0.0, 1.0, 0.0, 1.0, 0.0, 0.0];

        let nearest_food = self
            .food
            .iter()
            .map(|food| (food.position, agent.position.distance(food.position)))
            .filter(|(_, distance)| *distance <= range)
            .min_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((target, distance)) = nearest_food {
            sensors[0] = relative_angle(agent, target);
            sensors[1] = (distance / range).clamp(0.0, 1.0);
        }

        let hazard_threats = self
            .hazards
            .iter()
            .filter(|zone| !agent.expresses(zone.trait_id))
            .map(|zone| {
                let edge = (agent.position.distance(zone.position) - zone.radius).max(0.0);
                (zone.position, edge)
            });
        let predator_threats = agents
            .iter()
            .enumerate()
            .filter(|(other, predator)| {
                *other != index && !agent.is_predator() && predator.is_alive() && predator.is_predator()
            })
            .map(|(_, predator)| (predator.position, agent.position.distance(predator.position)));
        let nearest_threat = hazard_threats
            .chain(predator_threats)
            .filter(|(_, distance)| *distance <= range)
            .min_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((target, distance)) = nearest_threat {
            sensors[2] = relative_angle(agent, target);
            sensors[3] = (distance / range).clamp(0.0, 1.0);
        }

        sensors[4] = (agent.energy / config.max_energy).clamp(0.0, 1.0);
        let top_speed = config.max_speed * effects.speed_multiplier();
        if top_speed > 0.0 {
            sensors[5] = (agent.velocity.speed() / top_speed).clamp(0.0, 1.0);
        }
        sensors
    }

    /// Sense, think and move every live agent.
    ///
    /// Sensors are computed in parallel against the pre-movement state and
    /// the brains run as one batch; positions are then applied in population
    /// order.
    pub fn move_agents(&self, agents: &mut [Agent], config: &SimulationConfig, dt: f64) {
        let snapshot: &[Agent] = agents;
        let sensed: Vec<(usize, [f64; INPUT_SIZE])> = (0..snapshot.len())
            .into_par_iter()
            .filter(|index| snapshot[*index].is_alive())
            .map(|index| (index, self.sense(index, snapshot, config)))
            .collect();
        let outputs = FeedForwardBrain::forward_batch(
            sensed
                .iter()
                .map(|(index, sensors)| (snapshot[*index].brain(), sensors)),
        );
        let actuations: Vec<(usize, Actuation)> = sensed
            .iter()
            .zip(outputs)
            .map(|(&(index, sensors), outputs)| {
                (index, actuate(&snapshot[index], sensors, outputs, config, dt))
            })
            .collect();

        for (index, actuation) in actuations {
            let agent = &mut agents[index];
            agent.sensors = actuation.sensors;
            agent.outputs = actuation.outputs;
            agent.heading = actuation.heading;
            agent.velocity = actuation.velocity;
            agent.position = actuation.position;
        }
    }
}

struct Actuation {
    sensors: [f64; INPUT_SIZE],
    outputs: [f64; OUTPUT_SIZE],
    heading: f64,
    velocity: Velocity,
    position: Position,
}

fn actuate(
    agent: &Agent,
    sensors: [f64; INPUT_SIZE],
    outputs: [f64; OUTPUT_SIZE],
    config: &SimulationConfig,
    dt: f64,
) -> Actuation {
    let turn = outputs[0].clamp(-1.0, 1.0);
    let throttle = (outputs[1].clamp(-1.0, 1.0) + 1.0) * 0.5;
    let heading = wrap_signed_angle(agent.heading + turn * config.max_turn_rate * dt);
    let speed = throttle * config.max_speed * agent.effects().speed_multiplier();
    let velocity = Velocity::new(heading.cos() * speed, heading.sin() * speed);
    let position = Position::new(
        wrap_position(agent.position.x + velocity.vx * dt, config.world_width),
        wrap_position(agent.position.y + velocity.vy * dt, config.world_height),
    );
    Actuation {
        sensors,
        outputs,
        heading,
        velocity,
        position,
    }
}

/// Each predator catches at most the first live non-predator in range.
fn stage_predation(agents: &mut [Agent], config: &SimulationConfig, report: &mut EcosystemReport) {
    let reach = config.agent_size * config.predation_catch_multiplier;
    let reach_sq = reach * reach;
    for predator in 0..agents.len() {
        if !agents[predator].is_alive() || !agents[predator].is_predator() {
            continue;
        }
        let hunter = agents[predator].position;
        let prey = agents.iter().position(|candidate| {
            candidate.is_alive()
                && !candidate.is_predator()
                && candidate.position.distance_sq(hunter) < reach_sq
        });
        if let Some(prey) = prey {
            agents[prey].kill(DeathCause::Predation);
            report.deaths.push((agents[prey].id, DeathCause::Predation));
            agents[predator].gain_energy(config.predation_reward, config.max_energy);
        }
    }
}

/// Heading-relative angle towards `target`, scaled into `[-1, 1]`.
fn relative_angle(agent: &Agent, target: Position) -> f64 {
    let absolute = agent.position.angle_to(target);
    wrap_signed_angle(absolute - agent.heading) / std::f64::consts::PI
}

pub(crate) fn random_position(config: &SimulationConfig, rng: &mut dyn RngCore) -> Position {
    Position::new(
        rng.random_range(0.0..config.world_width),
        rng.random_range(0.0..config.world_height),
    )
}

fn random_hazard(config: &SimulationConfig, rng: &mut dyn RngCore) -> HazardZone {
    let radius = rng.random_range(config.hazard_min_radius..=config.hazard_max_radius);
    let direction = rng.random_range(0.0..std::f64::consts::TAU);
    let speed = rng.random_range(0.0..=config.hazard_max_speed);
    let resistances: Vec<TraitId> = TraitId::in_category(TraitCategory::Resistance).collect();
    let trait_id = resistances[rng.random_range(0..resistances.len())];
    HazardZone {
        position: random_position(config, rng),
        radius,
        velocity: Velocity::new(direction.cos() * speed, direction.sin() * speed),
        trait_id,
        remaining: config.hazard_lifetime,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::{GENOME_LENGTH, Genome};
    use crate::{AgentId, Generation};
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn quiet_config() -> SimulationConfig {
        SimulationConfig {
            food_spawn_rate: 0.0,
            initial_food: 0,
            hazard_spawn_chance: 0.0,
            ..SimulationConfig::default()
        }
    }

    fn agent_at(id: u64, x: f64, y: f64, traits: &[TraitId]) -> Agent {
        let mut genes = vec![0.1; GENOME_LENGTH];
        for id in traits {
            genes[id.index()] = 0.9;
        }
        Agent::new(
            AgentId(id),
            Genome::from_genes(genes).expect("genome"),
            Position::new(x, y),
            0.0,
            100.0,
            Generation::default(),
        )
        .expect("agent")
    }

    fn zone_at(x: f64, y: f64, trait_id: TraitId) -> HazardZone {
        HazardZone {
            position: Position::new(x, y),
            radius: 20.0,
            velocity: Velocity::default(),
            trait_id,
            remaining: 1_000.0,
        }
    }

    #[test]
    fn accumulator_spawns_whole_particles() {
        let config = SimulationConfig {
            food_spawn_rate: 0.25,
            ..quiet_config()
        };
        let mut rng = SmallRng::seed_from_u64(51);
        let mut eco = Ecosystem::new();
        let spawned: Vec<usize> = (0..10)
            .map(|_| eco.update(&mut [], &config, 1.0, &mut rng).food_spawned)
            .collect();
        assert_eq!(spawned, vec![0, 0, 0, 1, 0, 0, 0, 1, 0, 0]);
        assert_eq!(eco.food().len(), 2);
    }

    #[test]
    fn food_never_exceeds_cap() {
        let config = SimulationConfig {
            food_spawn_rate: 10.0,
            max_food: 7,
            ..quiet_config()
        };
        let mut rng = SmallRng::seed_from_u64(52);
        let mut eco = Ecosystem::new();
        for _ in 0..5 {
            eco.update(&mut [], &config, 1.0, &mut rng);
        }
        assert_eq!(eco.food().len(), 7);
    }

    #[test]
    fn first_food_in_order_is_eaten() {
        let config = quiet_config();
        let mut rng = SmallRng::seed_from_u64(53);
        let mut eco = Ecosystem::new();
        eco.add_food(Position::new(105.0, 100.0), 10);
        eco.add_food(Position::new(100.5, 100.0), 10);
        let mut agents = vec![agent_at(0, 100.0, 100.0, &[])];
        let report = eco.update(&mut agents, &config, 1.0, &mut rng);
        assert_eq!(report.food_eaten, 1);
        assert_eq!(eco.food().len(), 1);
        assert_eq!(eco.food()[0].position, Position::new(100.5, 100.0));
        assert_eq!(agents[0].food_eaten, 1);
    }

    #[test]
    fn hazard_damage_is_additive_and_resistable() {
        let config = quiet_config();
        let mut rng = SmallRng::seed_from_u64(54);
        let heat = TraitId::new(1).expect("trait");
        let cold = TraitId::new(2).expect("trait");
        let mut eco = Ecosystem::new();
        eco.add_hazard(zone_at(100.0, 100.0, heat));
        eco.add_hazard(zone_at(105.0, 100.0, cold));
        let mut agents = vec![
            agent_at(0, 100.0, 100.0, &[]),
            agent_at(1, 100.0, 100.0, &[heat]),
        ];
        eco.update(&mut agents, &config, 1.0, &mut rng);
        let base = 100.0 - config.metabolic_cost;
        assert!((agents[0].energy - (base - 2.0 * config.hazard_damage)).abs() < 1e-9);
        assert!((agents[1].energy - (base - config.hazard_damage)).abs() < 1e-9);
    }

    #[test]
    fn hazard_kill_is_attributed_to_hazard() {
        let config = quiet_config();
        let mut rng = SmallRng::seed_from_u64(55);
        let mut eco = Ecosystem::new();
        eco.add_hazard(zone_at(50.0, 50.0, TraitId::new(0).expect("trait")));
        let mut agents = vec![agent_at(0, 50.0, 50.0, &[]), agent_at(1, 400.0, 400.0, &[])];
        agents[0].energy = 0.2;
        agents[1].energy = 0.01;
        let report = eco.update(&mut agents, &config, 1.0, &mut rng);
        assert_eq!(agents[0].death_cause(), Some(DeathCause::Hazard));
        assert_eq!(agents[1].death_cause(), Some(DeathCause::Starvation));
        assert_eq!(report.deaths.len(), 2);
    }

    #[test]
    fn predator_takes_first_prey_only() {
        let config = quiet_config();
        let mut rng = SmallRng::seed_from_u64(56);
        let mut eco = Ecosystem::new();
        let mut agents = vec![
            agent_at(0, 10.0, 10.0, &[]),
            agent_at(1, 12.0, 10.0, &[TraitId::PREDATORY_BEHAVIOR]),
            agent_at(2, 11.0, 10.0, &[]),
            agent_at(3, 13.0, 10.0, &[TraitId::PREDATORY_BEHAVIOR]),
        ];
        let report = eco.update(&mut agents, &config, 1.0, &mut rng);
        // Predator 1 takes agent 0, predator 3 the next live prey, agent 2.
        assert_eq!(report.deaths_by(DeathCause::Predation), 2);
        assert!(!agents[0].is_alive());
        assert!(!agents[2].is_alive());
        assert!(agents[1].is_alive() && agents[3].is_alive());
        assert_eq!(agents[1].energy, config.max_energy.min(100.0 - config.metabolic_cost + config.predation_reward));
    }

    #[test]
    fn overcrowding_ramps_to_cap() {
        let config = SimulationConfig::default();
        assert_eq!(Ecosystem::overcrowding_factor(150, &config), 1.0);
        assert!((Ecosystem::overcrowding_factor(225, &config) - 2.0).abs() < 1e-12);
        assert_eq!(Ecosystem::overcrowding_factor(300, &config), 3.0);
        assert_eq!(Ecosystem::overcrowding_factor(400, &config), 3.0);
    }

    #[test]
    fn hazards_bounce_and_evict_oldest() {
        let mut zone = zone_at(795.0, 10.0, TraitId::new(0).expect("trait"));
        zone.velocity = Velocity::new(10.0, -20.0);
        zone.drift(1.0, 800.0, 600.0);
        assert_eq!(zone.position, Position::new(800.0, 0.0));
        assert_eq!(zone.velocity, Velocity::new(-10.0, 20.0));

        let mut eco = Ecosystem::new();
        for i in 0..MAX_HAZARDS {
            assert!(eco.add_hazard(zone_at(i as f64, 0.0, TraitId::new(i).expect("trait"))).is_none());
        }
        let evicted = eco.add_hazard(zone_at(99.0, 0.0, TraitId::new(7).expect("trait")));
        assert_eq!(evicted.map(|z| z.position.x), Some(0.0));
        assert_eq!(eco.hazards().len(), MAX_HAZARDS);
    }

    #[test]
    fn sensing_defaults_when_nothing_in_range() {
        let config = quiet_config();
        let eco = Ecosystem::new();
        let agents = vec![agent_at(0, 100.0, 100.0, &[])];
        let sensors = eco.sense(0, &agents, &config);
        assert_eq!(sensors[..4], [0.0, 1.0, 0.0, 1.0]);
        assert!((sensors[4] - 100.0 / config.max_energy).abs() < 1e-12);
    }

    #[test]
    fn predators_ignore_each_other() {
        let config = quiet_config();
        let eco = Ecosystem::new();
        let agents = vec![
            agent_at(0, 100.0, 100.0, &[TraitId::PREDATORY_BEHAVIOR]),
            agent_at(1, 100.0, 150.0, &[TraitId::PREDATORY_BEHAVIOR]),
            agent_at(2, 100.0, 200.0, &[]),
        ];
        let predator_view = eco.sense(0, &agents, &config);
        assert_eq!(predator_view[3], 1.0);
        let prey_view = eco.sense(2, &agents, &config);
        assert!((prey_view[3] - 50.0 / config.sense_range).abs() < 1e-12);
        // Predator 1 sits straight "behind" at -π/2 relative to heading 0.
        assert!((prey_view[2] + 0.5).abs() < 1e-12);
    }

    #[test]
    fn movement_wraps_and_updates_state() {
        let config = quiet_config();
        let eco = Ecosystem::new();
        let mut agents = vec![agent_at(0, 799.9, 300.0, &[])];
        agents[0].edit_brain(|brain| {
            // Full throttle through the second output's bias.
            if let Some(bias) = brain.weight_mut(8 * 7 + 9 + 8) {
                *bias = 10.0;
            }
        });
        eco.move_agents(&mut agents, &config, 1.0);
        let agent = &agents[0];
        assert!(agent.position.x < 10.0, "x wrapped to {}", agent.position.x);
        assert!((agent.velocity.speed() - config.max_speed).abs() < 1e-6);
        assert_eq!(agent.sensors[1], 1.0);
    }

    #[test]
    fn batched_thinking_skips_the_dead() {
        let config = quiet_config();
        let eco = Ecosystem::new();
        let mut rng = SmallRng::seed_from_u64(12);
        let mut agents: Vec<Agent> = (0..3)
            .map(|id| {
                Agent::new(
                    AgentId(id),
                    Genome::random(&mut rng),
                    Position::new(100.0 + 50.0 * id as f64, 200.0),
                    0.0,
                    100.0,
                    Generation::default(),
                )
                .expect("agent")
            })
            .collect();
        agents[1].kill(DeathCause::Hazard);
        eco.move_agents(&mut agents, &config, 1.0);

        assert_eq!(agents[1].position, Position::new(150.0, 200.0));
        assert_eq!(agents[1].outputs, [0.0; OUTPUT_SIZE]);
        for agent in [&agents[0], &agents[2]] {
            assert_eq!(agent.brain().forward(&agent.sensors), agent.outputs);
        }
    }
}
