//! HTTP compute provider for bactosim.
//!
//! [`RemoteCompute`] speaks the JSON protocol of the offload service:
//!
//! | method | path             | purpose                               |
//! |--------|------------------|---------------------------------------|
//! | GET    | `/api/health`    | availability and genome layout check  |
//! | POST   | `/api/init`      | initial population genomes            |
//! | POST   | `/api/reproduce` | offspring and elite indices           |
//! | POST   | `/api/stats`     | population statistics and species     |
//! | POST   | `/api/nn/forward`| batched brain evaluation              |
//!
//! Requests block on a private current-thread tokio runtime so the provider
//! can sit behind the synchronous simulation loop. Do not call it from inside
//! another tokio runtime.

use std::time::Duration;

use bactosim_core::{
    ComputeError, ComputeProvider, CrossoverWire, ForwardRequest, GENOME_LENGTH, Genome,
    INPUT_SIZE, InitRequest, OUTPUT_SIZE, ReproduceRequest, ReproduceResponse, StatsRequest,
    StatsResponse, TOPOLOGY, TRAIT_GENE_COUNT, WEIGHT_COUNT,
};
use rand::RngCore;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::runtime::{Builder, Runtime};
use tracing::debug;

/// Per-request timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors raised while constructing a [`RemoteCompute`].
#[derive(Debug, Error)]
pub enum OffloadError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("failed to start offload runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

/// [`ComputeProvider`] backed by the remote offload service.
#[derive(Debug)]
pub struct RemoteCompute {
    base_url: String,
    client: Client,
    runtime: Runtime,
}

impl RemoteCompute {
    /// Build a provider for `base_url`; no request is made until [`ComputeProvider::probe`].
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, OffloadError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(OffloadError::Client)?;
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(OffloadError::Runtime)?;
        Ok(Self {
            base_url: base_url.into(),
            client,
            runtime,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ComputeError> {
        let url = join_url(&self.base_url, path);
        debug!(%url, "offload request");
        self.runtime.block_on(async {
            let response = self.client.get(&url).send().await.map_err(transport)?;
            parse_response(response).await
        })
    }

    fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ComputeError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = join_url(&self.base_url, path);
        debug!(%url, "offload request");
        self.runtime.block_on(async {
            let response = self
                .client
                .post(&url)
                .json(body)
                .send()
                .await
                .map_err(transport)?;
            parse_response(response).await
        })
    }
}

impl ComputeProvider for RemoteCompute {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn probe(&self) -> Result<(), ComputeError> {
        let health: HealthReply = self.get("/api/health")?;
        if health.status != "ok" {
            return Err(ComputeError::Unavailable(format!(
                "service reported status {:?}",
                health.status
            )));
        }
        health.check_layout()
    }

    fn init_population(
        &self,
        request: &InitRequest,
        _rng: &mut dyn RngCore,
    ) -> Result<Vec<Genome>, ComputeError> {
        let body = InitWire {
            pop_size: request.population_size,
            traits_per_bacterium: request.traits_per_agent,
        };
        let reply: InitReply = self.post("/api/init", &body)?;
        if reply.genome_length != GENOME_LENGTH || reply.trait_gene_count != TRAIT_GENE_COUNT {
            return Err(ComputeError::Protocol(format!(
                "service genome layout {}/{} does not match {GENOME_LENGTH}/{TRAIT_GENE_COUNT}",
                reply.genome_length, reply.trait_gene_count
            )));
        }
        decode_genomes(reply.genomes)
    }

    fn reproduce(
        &self,
        request: &ReproduceRequest,
        _rng: &mut dyn RngCore,
    ) -> Result<ReproduceResponse, ComputeError> {
        let reply: ReproduceReply = self.post("/api/reproduce", &ReproduceWire::from(request))?;
        Ok(ReproduceResponse {
            offspring: decode_genomes(reply.offspring_genomes)?,
            elite_indices: reply.elite_indices,
        })
    }

    fn statistics(
        &self,
        request: &StatsRequest,
        _rng: &mut dyn RngCore,
    ) -> Result<StatsResponse, ComputeError> {
        let body = StatsWire {
            genomes: request.genomes.iter().map(Genome::genes).collect(),
            fitnesses: &request.fitnesses,
            k_species: request.species_k,
        };
        self.post("/api/stats", &body)
    }

    fn forward_batch(
        &self,
        request: &ForwardRequest,
    ) -> Result<Vec<[f64; OUTPUT_SIZE]>, ComputeError> {
        let body = ForwardWire {
            nn_weights: &request.weights,
            inputs: &request.inputs,
        };
        let reply: ForwardReply = self.post("/api/nn/forward", &body)?;
        decode_outputs(reply.outputs)
    }
}

#[derive(Debug, Deserialize)]
struct HealthReply {
    status: String,
    genome_length: usize,
    nn_weight_count: usize,
    nn_topology: Vec<usize>,
    trait_gene_count: usize,
}

impl HealthReply {
    fn check_layout(&self) -> Result<(), ComputeError> {
        if self.genome_length != GENOME_LENGTH
            || self.nn_weight_count != WEIGHT_COUNT
            || self.trait_gene_count != TRAIT_GENE_COUNT
            || self.nn_topology != TOPOLOGY
        {
            return Err(ComputeError::Protocol(format!(
                "service layout (genome {}, weights {}, traits {}, topology {:?}) does not match local layout",
                self.genome_length, self.nn_weight_count, self.trait_gene_count, self.nn_topology
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct InitWire {
    pop_size: usize,
    traits_per_bacterium: usize,
}

#[derive(Debug, Deserialize)]
struct InitReply {
    genomes: Vec<Vec<f64>>,
    genome_length: usize,
    trait_gene_count: usize,
}

#[derive(Debug, Serialize)]
struct SurvivorWire<'a> {
    genome: &'a [f64],
    fitness: f64,
}

#[derive(Debug, Serialize)]
struct ReproduceWire<'a> {
    survivors: Vec<SurvivorWire<'a>>,
    target_pop: usize,
    mutation_rate: f64,
    mutation_sigma: f64,
    /// Whole percent; the service truncates fractional values anyway.
    elitism_pct: u32,
    crossover_method: CrossoverWire,
    tournament_size: usize,
}

impl<'a> From<&'a ReproduceRequest> for ReproduceWire<'a> {
    fn from(request: &'a ReproduceRequest) -> Self {
        Self {
            survivors: request
                .survivors
                .iter()
                .map(|survivor| SurvivorWire {
                    genome: survivor.genome.genes(),
                    fitness: survivor.fitness,
                })
                .collect(),
            target_pop: request.target_population,
            mutation_rate: request.mutation_rate,
            mutation_sigma: request.mutation_sigma,
            elitism_pct: (request.elitism * 100.0).round() as u32,
            crossover_method: request.crossover.into(),
            tournament_size: request.tournament_size,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReproduceReply {
    offspring_genomes: Vec<Vec<f64>>,
    elite_indices: Vec<usize>,
}

#[derive(Debug, Serialize)]
struct StatsWire<'a> {
    genomes: Vec<&'a [f64]>,
    fitnesses: &'a [f64],
    k_species: usize,
}

#[derive(Debug, Serialize)]
struct ForwardWire<'a> {
    nn_weights: &'a [Vec<f64>],
    inputs: &'a [[f64; INPUT_SIZE]],
}

#[derive(Debug, Deserialize)]
struct ForwardReply {
    outputs: Vec<Vec<f64>>,
}

fn decode_outputs(rows: Vec<Vec<f64>>) -> Result<Vec<[f64; OUTPUT_SIZE]>, ComputeError> {
    rows.into_iter()
        .map(|row| {
            let len = row.len();
            <[f64; OUTPUT_SIZE]>::try_from(row).map_err(|_| {
                ComputeError::Protocol(format!(
                    "brain output row has {len} values, expected {OUTPUT_SIZE}"
                ))
            })
        })
        .collect()
}

fn decode_genomes(rows: Vec<Vec<f64>>) -> Result<Vec<Genome>, ComputeError> {
    rows.into_iter()
        .map(|genes| Genome::from_genes(genes).map_err(ComputeError::from))
        .collect()
}

fn transport(err: reqwest::Error) -> ComputeError {
    if err.is_connect() || err.is_timeout() {
        ComputeError::Unavailable(err.to_string())
    } else {
        ComputeError::Transport(err.to_string())
    }
}

async fn parse_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ComputeError> {
    let status = response.status();
    if status.is_success() {
        response
            .json::<T>()
            .await
            .map_err(|err| ComputeError::Protocol(format!("malformed response: {err}")))
    } else {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unavailable>".to_owned());
        Err(ComputeError::Transport(format!(
            "offload request failed ({status}): {body}"
        )))
    }
}

fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}
