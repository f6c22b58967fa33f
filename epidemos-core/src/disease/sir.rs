//! Generic susceptible-infected-recovered disease.

use linked_hash_map::LinkedHashMap;

use crate::disease::{resolve_seeding, BetaSpec, Disease, InfectionCore, Seeding};
use crate::dist::Dist;
use crate::error::Result;
use crate::people::Var;
use crate::rng::StreamId;
use crate::sim::SimState;
use crate::{Float, ModName, Uid};

fn default_dur_inf() -> Dist {
    Dist::LogNormal { mean: 6., std: 1. }
}
fn default_p_death() -> Float {
    0.01
}

/// Parameters of the generic SIR disease.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SirPars {
    /// Exact number of initial cases
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<u32>,
    /// Initial prevalence; wins over `initial` when both are given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_prev: Option<Float>,
    /// Probability an infection ends in death rather than recovery
    #[serde(default = "default_p_death")]
    pub p_death: Float,
    /// Duration of the infectious period
    #[serde(default = "default_dur_inf")]
    pub dur_inf: Dist,
    /// Per-network transmissibility
    #[serde(default)]
    pub beta: LinkedHashMap<String, BetaSpec>,
}

impl Default for SirPars {
    fn default() -> Self {
        SirPars {
            initial: None,
            init_prev: None,
            p_death: default_p_death(),
            dur_inf: default_dur_inf(),
            beta: LinkedHashMap::new(),
        }
    }
}

/// Susceptible-infected-recovered disease with an infectious period drawn
/// per case, after which the agent recovers with immunity or dies.
pub struct Sir {
    core: InfectionCore,
    pars: SirPars,
    rng_dur: StreamId,
    rng_death: StreamId,
}

impl Sir {
    pub fn new(pars: SirPars) -> Self {
        let seeding = resolve_seeding(pars.initial, pars.init_prev, Seeding::Count(10));
        Sir {
            core: InfectionCore::new("sir", pars.beta.clone(), seeding),
            pars,
            rng_dur: StreamId::INVALID,
            rng_death: StreamId::INVALID,
        }
    }
}

impl Disease for Sir {
    fn name(&self) -> ModName {
        self.core.name
    }

    fn init(&mut self, state: &mut SimState) -> Result<()> {
        let fresh = self.core.wire(state)?;
        let len = state.people.len();
        let storage = &mut state.people.storage;
        storage.register(self.core.idx("recovered"), Var::Bool(false), len);
        storage.register(self.core.idx("ti_recovered"), Var::Float(Float::NAN), len);
        storage.register(self.core.idx("ti_dead"), Var::Float(Float::NAN), len);
        self.rng_dur = state.streams.register("sir_dur")?;
        self.rng_death = state.streams.register("sir_death")?;
        state.results.new_series(self.core.name.as_str(), "new_deaths");
        state.results.new_series(self.core.name.as_str(), "cum_deaths");

        if fresh {
            let seeds = self.core.seed_infections(state)?;
            self.set_prognoses(state, &seeds)?;
        }
        Ok(())
    }

    fn update_states(&mut self, state: &mut SimState) -> Result<()> {
        let ti = state.clock as Float;
        let recoveries: Vec<usize> = {
            let infected = state.people.storage.get_bool(&self.core.idx("infected"))?;
            let ti_rec = state
                .people
                .storage
                .get_float(&self.core.idx("ti_recovered"))?;
            (0..state.people.len())
                .filter(|&row| infected[row] && ti_rec[row] <= ti)
                .collect()
        };
        let storage = &mut state.people.storage;
        storage.set_bool_at(&self.core.idx("infected"), &recoveries, false)?;
        storage.set_bool_at(&self.core.idx("recovered"), &recoveries, true)?;

        let deaths: Vec<Uid> = {
            let ti_dead = state.people.storage.get_float(&self.core.idx("ti_dead"))?;
            (0..state.people.len())
                .filter(|&row| state.people.alive[row] && ti_dead[row] <= ti)
                .map(|row| state.people.uid[row])
                .collect()
        };
        state.people.request_death(&deaths, state.clock);
        state.results.set(
            self.core.name.as_str(),
            "new_deaths",
            state.clock,
            state.people.scale_flows(&deaths),
        )?;
        Ok(())
    }

    fn make_new_cases(&mut self, state: &mut SimState) -> Result<()> {
        let new_cases = self.core.transmission(state)?;
        self.set_prognoses(state, &new_cases)
    }

    fn set_prognoses(&mut self, state: &mut SimState, uids: &[Uid]) -> Result<()> {
        if uids.is_empty() {
            return Ok(());
        }
        self.core.mark_infected(state, uids)?;

        let ti = state.clock as Float;
        let dt = state.params.dt;
        let durs = state
            .streams
            .get_mut(self.rng_dur)?
            .sample_for(&self.pars.dur_inf, uids, &state.people)?;
        let dead = state
            .streams
            .get_mut(self.rng_death)?
            .bernoulli_for(self.pars.p_death, uids, &state.people)?;

        let ti_rec_idx = self.core.idx("ti_recovered");
        let ti_dead_idx = self.core.idx("ti_dead");
        for ((&uid, dur), dies) in uids.iter().zip(&durs).zip(&dead) {
            let row = state.people.row_of(uid)?;
            let t_end = ti + (dur / dt).max(0.);
            if *dies {
                state.people.storage.get_float_mut(&ti_dead_idx)?[row] = t_end;
            } else {
                state.people.storage.get_float_mut(&ti_rec_idx)?[row] = t_end;
            }
        }
        Ok(())
    }

    fn update_death(&mut self, state: &mut SimState, uids: &[Uid]) -> Result<()> {
        self.core.clear_on_death(state, uids)
    }

    fn update_results(&mut self, state: &mut SimState) -> Result<()> {
        self.core.update_base_results(state)?;
        let cum = state
            .results
            .cumulative_to(self.core.name.as_str(), "new_deaths", state.clock)?;
        state
            .results
            .set(self.core.name.as_str(), "cum_deaths", state.clock, cum)?;
        Ok(())
    }
}
