//! Live agents plus a bounded fade-out queue of recently dead ones.

use std::collections::VecDeque;

use crate::agent::{Agent, DeathCause};
use crate::genome::{Genome, GenomeError};
use crate::{AgentId, Generation, Position};

/// A dead agent kept around for display until its timer runs out.
#[derive(Debug, Clone)]
pub struct FadingAgent {
    pub agent: Agent,
    /// Ticks left before the entry is dropped.
    pub remaining: f64,
}

/// Ordered collection of agents with monotonically allocated ids.
#[derive(Debug, Clone)]
pub struct Population {
    agents: Vec<Agent>,
    recently_dead: VecDeque<FadingAgent>,
    next_id: u64,
    dead_capacity: usize,
    fade_ticks: f64,
}

impl Population {
    #[must_use]
    pub fn new(dead_capacity: usize, fade_ticks: f64) -> Self {
        Self {
            agents: Vec::new(),
            recently_dead: VecDeque::with_capacity(dead_capacity),
            next_id: 0,
            dead_capacity,
            fade_ticks,
        }
    }

    /// Reserve a fresh id. Ids are never handed out twice, even across [`Self::clear`].
    pub fn allocate_id(&mut self) -> AgentId {
        let id = AgentId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Create and append a new agent, returning its id.
    pub fn spawn(
        &mut self,
        genome: Genome,
        position: Position,
        heading: f64,
        energy: f64,
        generation: Generation,
    ) -> Result<AgentId, GenomeError> {
        let id = self.allocate_id();
        let agent = Agent::new(id, genome, position, heading, energy, generation)?;
        self.agents.push(agent);
        Ok(id)
    }

    #[must_use]
    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    #[must_use]
    pub fn agents_mut(&mut self) -> &mut [Agent] {
        &mut self.agents
    }

    /// Number of agents in the active set, dead-but-not-yet-removed included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    #[must_use]
    pub fn live_count(&self) -> usize {
        self.agents.iter().filter(|agent| agent.is_alive()).count()
    }

    #[must_use]
    pub fn get(&self, id: AgentId) -> Option<&Agent> {
        self.agents.iter().find(|agent| agent.id == id)
    }

    #[must_use]
    pub fn recently_dead(&self) -> &VecDeque<FadingAgent> {
        &self.recently_dead
    }

    /// Move dead agents into the fade queue, preserving order of the survivors.
    pub fn remove_dead(&mut self) -> Vec<(AgentId, DeathCause)> {
        let mut removed = Vec::new();
        let (alive, dead): (Vec<Agent>, Vec<Agent>) = std::mem::take(&mut self.agents)
            .into_iter()
            .partition(Agent::is_alive);
        self.agents = alive;
        for agent in dead {
            if let Some(cause) = agent.death_cause() {
                removed.push((agent.id, cause));
            }
            if self.dead_capacity == 0 {
                continue;
            }
            if self.recently_dead.len() == self.dead_capacity {
                self.recently_dead.pop_front();
            }
            self.recently_dead.push_back(FadingAgent {
                agent,
                remaining: self.fade_ticks,
            });
        }
        removed
    }

    /// Advance fade timers and drop expired entries.
    pub fn decay_dead(&mut self, dt: f64) {
        for entry in &mut self.recently_dead {
            entry.remaining -= dt;
        }
        self.recently_dead.retain(|entry| entry.remaining > 0.0);
    }

    /// Drop every agent, live or fading. The id counter keeps running.
    pub fn clear(&mut self) {
        self.agents.clear();
        self.recently_dead.clear();
    }
}
