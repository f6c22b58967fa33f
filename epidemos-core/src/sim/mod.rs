//! Local simulation abstraction.

pub mod step;

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::analyzer::Analyzer;
use crate::connector::Connector;
use crate::data::AgeStructure;
use crate::demog::Demographic;
use crate::disease::Disease;
use crate::error::{Error, Result};
use crate::intervention::Intervention;
use crate::net::{NetConnector, Network, Networks};
use crate::params::SimParams;
use crate::people::People;
use crate::results::Results;
use crate::rng::{StreamId, Streams};
use crate::scenario::Scenario;
use crate::Float;

/// The state of a simulation: everything a snapshot carries.
///
/// Module logic objects are not part of the state; they are rebuilt from
/// the embedded scenario when a snapshot is loaded, and their stream
/// draws are a pure function of `(seed, timestep)`, so a resumed
/// simulation continues exactly as an uninterrupted run would have.
pub struct SimState {
    /// The scenario this simulation was built from
    pub scenario: Scenario,
    /// Copy of the scenario's `[sim]` table
    pub params: SimParams,
    /// Number of steps that have been processed so far
    pub clock: usize,
    pub people: People,
    /// Edge data of all networks, keyed by network name
    pub networks: Networks,
    pub streams: Streams,
    pub results: Results,
}

impl SimState {
    fn from_scenario(scenario: Scenario) -> Self {
        let params = scenario.sim.clone();
        SimState {
            people: People::new(params.n_agents),
            networks: Networks::new(),
            streams: Streams::new(params.rand_seed, params.multistream),
            results: Results::new(params.npts()),
            clock: 0,
            scenario,
            params,
        }
    }

    /// Minimal state for driving modules directly, mainly in tests.
    pub fn bare(params: SimParams) -> Self {
        SimState::from_scenario(Scenario::from_params(params))
    }

    /// Current timestep index.
    pub fn ti(&self) -> usize {
        self.clock
    }

    /// Current calendar year.
    pub fn year(&self) -> Float {
        self.params.year(self.clock)
    }
}

/// Local simulation instance object.
///
/// One of the main abstractions provided by the library. It allows for
/// quick assembly of a full simulation from a scenario manifest or a
/// snapshot.
///
/// # Example
///
/// ```ignore
/// let mut sim = epidemos_core::Sim::from_scenario_at("./scenario.toml").expect("failed");
/// sim.run();
/// ```
pub struct Sim {
    /// All data that defines the simulation at this moment
    pub state: SimState,

    pub(crate) demographics: Vec<Box<dyn Demographic>>,
    pub(crate) networks: Vec<Box<dyn Network>>,
    pub(crate) net_connectors: Vec<Box<dyn NetConnector>>,
    pub(crate) diseases: Vec<Box<dyn Disease>>,
    pub(crate) interventions: Vec<Box<dyn Intervention>>,
    pub(crate) connectors: Vec<Box<dyn Connector>>,
    pub(crate) analyzers: Vec<Box<dyn Analyzer>>,

    rng_init_age: StreamId,
    rng_init_sex: StreamId,
    initialized: bool,
}

impl Sim {
    /// Creates a bare simulation (no modules) from parameters alone.
    pub fn new(params: SimParams) -> Result<Sim> {
        Sim::from_scenario(Scenario::from_params(params))
    }

    /// Creates a simulation from a scenario, building all module objects.
    pub fn from_scenario(scenario: Scenario) -> Result<Sim> {
        scenario.validate()?;
        let state = SimState::from_scenario(scenario);
        Ok(Sim::assemble(state))
    }

    /// Creates a simulation from a scenario manifest on disk.
    pub fn from_scenario_at(path: &str) -> Result<Sim> {
        let scenario = Scenario::from_path(Path::new(path))?;
        Sim::from_scenario(scenario)
    }

    fn assemble(state: SimState) -> Sim {
        let scenario = &state.scenario;
        let demographics = scenario.demographics.iter().map(|s| s.build()).collect();
        let networks = scenario.networks.iter().map(|s| s.build()).collect();
        let net_connectors = scenario.net_connectors.iter().map(|s| s.build()).collect();
        let diseases = scenario.diseases.iter().map(|s| s.build()).collect();
        let interventions = scenario.interventions.iter().map(|s| s.build()).collect();
        let connectors = scenario.connectors.iter().map(|s| s.build()).collect();
        let analyzers = scenario.analyzers.iter().map(|s| s.build()).collect();
        Sim {
            state,
            demographics,
            networks,
            net_connectors,
            diseases,
            interventions,
            connectors,
            analyzers,
            rng_init_age: StreamId::INVALID,
            rng_init_sex: StreamId::INVALID,
            initialized: false,
        }
    }

    /// Gets the sim clock value.
    pub fn get_clock(&self) -> usize {
        self.state.clock
    }

    pub fn results(&self) -> &Results {
        &self.state.results
    }

    pub fn people(&self) -> &People {
        &self.state.people
    }

    /// Wires every module into the state and draws the initial
    /// population. Idempotent; on a restored snapshot all seeding is
    /// skipped.
    pub fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        self.state.params.validate()?;
        let state = &mut self.state;

        self.rng_init_age = state.streams.register("init_age")?;
        self.rng_init_sex = state.streams.register("init_sex")?;
        if !state.people.is_initialized() {
            let age_structure = match &state.scenario.age_structure_file {
                Some(file) => {
                    let path = state.scenario.resolve(file);
                    Some(AgeStructure::from_csv_path(&path)?)
                }
                None => None,
            };
            let uids = state.people.uid.clone();
            let age_draws = state
                .streams
                .get_mut(self.rng_init_age)?
                .random_for(&uids, &state.people)?;
            let sex_draws = state
                .streams
                .get_mut(self.rng_init_sex)?
                .random_for(&uids, &state.people)?;
            state
                .people
                .initialize(&age_draws, &sex_draws, age_structure.as_ref())?;
        }

        for module in &mut self.networks {
            module.init(state)?;
        }
        for module in &mut self.net_connectors {
            module.init(state)?;
        }
        for module in &mut self.demographics {
            module.init(state)?;
        }
        for module in &mut self.diseases {
            module.init(state)?;
        }
        for module in &mut self.interventions {
            module.init(state)?;
        }
        for module in &mut self.connectors {
            module.init(state)?;
        }
        for module in &mut self.analyzers {
            module.init(state)?;
        }

        self.initialized = true;
        info!(
            "initialized simulation \"{}\": {} agents, {} timepoints",
            self.state.scenario.name,
            self.state.people.len(),
            self.state.params.npts()
        );
        Ok(())
    }

    /// Runs the simulation to the end of the simulated period.
    pub fn run(&mut self) -> Result<()> {
        self.initialize()?;
        let npts = self.state.params.npts();
        while self.state.clock < npts {
            self.step()?;
            let verbose = self.state.params.verbose as usize;
            if verbose > 0 && self.state.clock % verbose == 0 {
                info!(
                    "year {:.2} ({}/{} steps)",
                    self.state.params.year(self.state.clock - 1),
                    self.state.clock,
                    npts
                );
            }
        }
        info!(
            "simulation \"{}\" finished after {} steps",
            self.state.scenario.name, npts
        );
        Ok(())
    }
}

/// On-disk snapshot layout. The scenario travels as its TOML manifest
/// text; everything else is plain data encoded with bincode.
#[derive(Serialize)]
struct SnapshotRef<'a> {
    scenario: String,
    params: &'a SimParams,
    clock: usize,
    people: &'a People,
    networks: &'a Networks,
    results: &'a Results,
}

#[derive(Deserialize)]
struct Snapshot {
    scenario: String,
    params: SimParams,
    clock: usize,
    people: People,
    networks: Networks,
    results: Results,
}

/// Transformations.
impl Sim {
    /// Serialize simulation state to a vector of bytes.
    ///
    /// # Compression
    ///
    /// Optional compression using LZ4 algorithm can be performed.
    pub fn to_snapshot(&self, compress: bool) -> Result<Vec<u8>> {
        let snapshot = SnapshotRef {
            scenario: self.state.scenario.to_toml()?,
            params: &self.state.params,
            clock: self.state.clock,
            people: &self.state.people,
            networks: &self.state.networks,
            results: &self.state.results,
        };
        let mut data = bincode::serialize(&snapshot)
            .map_err(|e| Error::FailedCreatingSnapshot(e.to_string()))?;
        #[cfg(feature = "lz4")]
        if compress {
            data = lz4::block::compress(&data, None, true)?;
        }
        #[cfg(not(feature = "lz4"))]
        if compress {
            return Err(Error::FailedCreatingSnapshot(
                "compression requires the lz4 feature".to_string(),
            ));
        }
        Ok(data)
    }

    /// Create simulation instance from a vector of bytes representing a
    /// snapshot. The module set is rebuilt from the embedded scenario and
    /// the simulation resumes at the stored clock.
    pub fn from_snapshot(buf: &[u8], compressed: bool) -> Result<Sim> {
        let data = if compressed {
            #[cfg(feature = "lz4")]
            {
                lz4::block::decompress(buf, None)
                    .map_err(|e| Error::SnapshotDecompressionError(e.to_string()))?
            }
            #[cfg(not(feature = "lz4"))]
            {
                return Err(Error::FailedReadingSnapshot(
                    "decompression requires the lz4 feature".to_string(),
                ));
            }
        } else {
            buf.to_vec()
        };
        let snapshot: Snapshot = bincode::deserialize(&data)
            .map_err(|e| Error::FailedReadingSnapshot(e.to_string()))?;
        let scenario = Scenario::from_toml(&snapshot.scenario)?;

        // streams are rebuilt from scratch; their draws only depend on the
        // seed and the clock, so the restored run continues identically
        let state = SimState {
            streams: Streams::new(snapshot.params.rand_seed, snapshot.params.multistream),
            scenario,
            params: snapshot.params,
            clock: snapshot.clock,
            people: snapshot.people,
            networks: snapshot.networks,
            results: snapshot.results,
        };
        let mut sim = Sim::assemble(state);
        sim.initialize()?;
        Ok(sim)
    }

    /// Write a snapshot to the given file.
    pub fn to_snapshot_at(&self, path: &Path, compress: bool) -> Result<()> {
        let data = self.to_snapshot(compress)?;
        let mut file = File::create(path)?;
        file.write_all(&data)?;
        info!("wrote snapshot to {}", path.display());
        Ok(())
    }

    /// Create simulation instance using a path to snapshot file.
    pub fn from_snapshot_at(path: &Path, compressed: bool) -> Result<Sim> {
        let mut file = File::open(path)?;
        let mut buf: Vec<u8> = Vec::new();
        file.read_to_end(&mut buf)?;
        Sim::from_snapshot(&buf, compressed)
    }
}

/// A collection of simulation variants run as a batch.
///
/// With the `parallel` feature enabled the variants run across threads.
pub struct MultiSim {
    pub scenarios: Vec<Scenario>,
}

impl MultiSim {
    pub fn new(scenarios: Vec<Scenario>) -> Self {
        MultiSim { scenarios }
    }

    /// Builds a sweep of `n` copies of the base scenario differing only
    /// in their random seed.
    pub fn seed_sweep(base: &Scenario, n: u32) -> Self {
        let scenarios = (0..n)
            .map(|seed| {
                let mut scenario = base.clone();
                scenario.sim.rand_seed = seed as u64;
                scenario.name = format!("{}_seed{}", scenario.name, seed);
                scenario
            })
            .collect();
        MultiSim { scenarios }
    }

    fn run_one(scenario: &Scenario) -> Result<Results> {
        let mut sim = Sim::from_scenario(scenario.clone())?;
        sim.run()?;
        Ok(sim.state.results)
    }

    /// Runs every variant to completion and collects their results.
    #[cfg(feature = "parallel")]
    pub fn run(&self) -> Result<Vec<Results>> {
        use rayon::prelude::*;
        self.scenarios.par_iter().map(MultiSim::run_one).collect()
    }

    /// Runs every variant to completion and collects their results.
    #[cfg(not(feature = "parallel"))]
    pub fn run(&self) -> Result<Vec<Results>> {
        self.scenarios.iter().map(MultiSim::run_one).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SWEEP_SCENARIO: &str = r#"
        name = "sweep"

        [sim]
        n_agents = 120
        start = 2000.0
        end = 2005.0
        rand_seed = 1

        [[networks]]
        type = "random"

        [[diseases]]
        type = "sir"
        initial = 5
        beta = { random = 0.05 }
    "#;

    #[test]
    fn sim_runs_a_scenario_to_completion() {
        let scenario = Scenario::from_toml(SWEEP_SCENARIO).unwrap();
        let mut sim = Sim::from_scenario(scenario).unwrap();
        sim.run().unwrap();
        assert_eq!(sim.get_clock(), 6);
        // results cover every timepoint; the seeds are present from the
        // first recorded step onward
        let series = sim.results().get("sir", "n_infected").unwrap();
        assert_eq!(series.values.len(), 6);
        assert!(series.values[0] >= 5.);
    }

    #[test]
    fn identical_seeds_reproduce_results() {
        let scenario = Scenario::from_toml(SWEEP_SCENARIO).unwrap();
        let mut a = Sim::from_scenario(scenario.clone()).unwrap();
        let mut b = Sim::from_scenario(scenario).unwrap();
        a.run().unwrap();
        b.run().unwrap();
        let series_a = &a.results().get("sir", "cum_infections").unwrap().values;
        let series_b = &b.results().get("sir", "cum_infections").unwrap().values;
        assert_eq!(series_a, series_b);
    }

    #[test]
    fn different_seeds_diverge() {
        let base = Scenario::from_toml(SWEEP_SCENARIO).unwrap();
        let mut other = base.clone();
        other.sim.rand_seed = 99;
        let mut a = Sim::from_scenario(base).unwrap();
        let mut b = Sim::from_scenario(other).unwrap();
        a.run().unwrap();
        b.run().unwrap();
        let series_a = &a.results().get("sir", "new_infections").unwrap().values;
        let series_b = &b.results().get("sir", "new_infections").unwrap().values;
        assert_ne!(series_a, series_b);
    }

    #[test]
    fn snapshot_resume_matches_uninterrupted_run() {
        let scenario = Scenario::from_toml(SWEEP_SCENARIO).unwrap();

        // uninterrupted reference run
        let mut reference = Sim::from_scenario(scenario.clone()).unwrap();
        reference.run().unwrap();

        // run half way, snapshot, restore, finish
        let mut first_half = Sim::from_scenario(scenario).unwrap();
        first_half.initialize().unwrap();
        for _ in 0..3 {
            first_half.step().unwrap();
        }
        let snapshot = first_half.to_snapshot(false).unwrap();
        let mut resumed = Sim::from_snapshot(&snapshot, false).unwrap();
        assert_eq!(resumed.get_clock(), 3);
        resumed.run().unwrap();

        let series_ref = &reference.results().get("sir", "cum_infections").unwrap().values;
        let series_res = &resumed.results().get("sir", "cum_infections").unwrap().values;
        assert_eq!(series_ref, series_res);
    }

    #[cfg(feature = "lz4")]
    #[test]
    fn compressed_snapshots_round_trip() {
        let scenario = Scenario::from_toml(SWEEP_SCENARIO).unwrap();
        let mut sim = Sim::from_scenario(scenario).unwrap();
        sim.initialize().unwrap();
        sim.step().unwrap();
        let snapshot = sim.to_snapshot(true).unwrap();
        let resumed = Sim::from_snapshot(&snapshot, true).unwrap();
        assert_eq!(resumed.get_clock(), 1);
    }

    #[test]
    fn multisim_seed_sweep_produces_distinct_runs() {
        let base = Scenario::from_toml(SWEEP_SCENARIO).unwrap();
        let multi = MultiSim::seed_sweep(&base, 3);
        let all_results = multi.run().unwrap();
        assert_eq!(all_results.len(), 3);
        let first = &all_results[0].get("sir", "new_infections").unwrap().values;
        let second = &all_results[1].get("sir", "new_infections").unwrap().values;
        assert_ne!(first, second);
    }

    #[test]
    fn stepping_past_the_end_is_an_error() {
        let scenario = Scenario::from_toml(SWEEP_SCENARIO).unwrap();
        let mut sim = Sim::from_scenario(scenario).unwrap();
        sim.run().unwrap();
        assert!(sim.step().is_err());
    }
}
