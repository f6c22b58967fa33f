//! Gonorrhea disease module.

use linked_hash_map::LinkedHashMap;

use crate::disease::{resolve_seeding, BetaSpec, Disease, InfectionCore, Seeding};
use crate::dist::Dist;
use crate::error::Result;
use crate::people::Var;
use crate::rng::StreamId;
use crate::sim::SimState;
use crate::{Float, ModName, Uid};

fn default_dur_inf() -> Float {
    3.
}
fn default_p_death() -> Float {
    0.2
}

/// Parameters of the gonorrhea module.
///
/// Diagnosis and treatment are not modelled explicitly; `dur_inf` is the
/// mean duration until the infection resolves one way or the other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GonorrheaPars {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_prev: Option<Float>,
    /// Mean infection duration in years
    #[serde(default = "default_dur_inf")]
    pub dur_inf: Float,
    #[serde(default = "default_p_death")]
    pub p_death: Float,
    #[serde(default)]
    pub beta: LinkedHashMap<String, BetaSpec>,
}

impl Default for GonorrheaPars {
    fn default() -> Self {
        GonorrheaPars {
            initial: None,
            init_prev: None,
            dur_inf: default_dur_inf(),
            p_death: default_p_death(),
            beta: LinkedHashMap::new(),
        }
    }
}

/// Gonorrhea: an infection that resolves after a Poisson-distributed
/// number of timesteps, by recovery back to susceptible or by death.
pub struct Gonorrhea {
    core: InfectionCore,
    pars: GonorrheaPars,
    rng_dur: StreamId,
    rng_death: StreamId,
}

impl Gonorrhea {
    pub fn new(pars: GonorrheaPars) -> Self {
        let seeding = resolve_seeding(pars.initial, pars.init_prev, Seeding::Count(3));
        Gonorrhea {
            core: InfectionCore::new("gonorrhea", pars.beta.clone(), seeding),
            pars,
            rng_dur: StreamId::INVALID,
            rng_death: StreamId::INVALID,
        }
    }
}

impl Disease for Gonorrhea {
    fn name(&self) -> ModName {
        self.core.name
    }

    fn init(&mut self, state: &mut SimState) -> Result<()> {
        let fresh = self.core.wire(state)?;
        let len = state.people.len();
        let storage = &mut state.people.storage;
        storage.register(self.core.idx("ti_recovered"), Var::Float(Float::NAN), len);
        storage.register(self.core.idx("ti_dead"), Var::Float(Float::NAN), len);
        self.rng_dur = state.streams.register("gonorrhea_dur")?;
        self.rng_death = state.streams.register("gonorrhea_death")?;
        state
            .results
            .new_series(self.core.name.as_str(), "new_deaths");

        if fresh {
            let seeds = self.core.seed_infections(state)?;
            self.set_prognoses(state, &seeds)?;
        }
        Ok(())
    }

    fn update_states(&mut self, state: &mut SimState) -> Result<()> {
        let ti = state.clock as Float;
        // recoveries return the agent to the susceptible pool
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
        storage.set_bool_at(&self.core.idx("susceptible"), &recoveries, true)?;

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
        let dur_dist = Dist::Poisson {
            lam: self.pars.dur_inf / dt,
        };
        let durs = state
            .streams
            .get_mut(self.rng_dur)?
            .sample_for(&dur_dist, uids, &state.people)?;
        let dead = state
            .streams
            .get_mut(self.rng_death)?
            .bernoulli_for(self.pars.p_death, uids, &state.people)?;

        let ti_rec_idx = self.core.idx("ti_recovered");
        let ti_dead_idx = self.core.idx("ti_dead");
        for ((&uid, dur), dies) in uids.iter().zip(&durs).zip(&dead) {
            let row = state.people.row_of(uid)?;
            let t_end = ti + dur;
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
        self.core.update_base_results(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimParams;

    fn test_state(n: u32) -> SimState {
        let mut params = SimParams::default();
        params.n_agents = n;
        params.rand_seed = 9;
        let mut state = crate::sim::SimState::bare(params);
        state.streams.step(0);
        state
    }

    #[test]
    fn recovered_agents_become_susceptible_again() {
        let mut state = test_state(12);
        let mut pars = GonorrheaPars::default();
        pars.initial = Some(4);
        pars.p_death = 0.;
        pars.dur_inf = 0.; // Poisson(0) resolves immediately
        let mut gon = Gonorrhea::new(pars);
        gon.init(&mut state).unwrap();

        state.streams.step(0);
        gon.update_states(&mut state).unwrap();
        let infected = state
            .people
            .storage
            .get_bool(&gon.core.idx("infected"))
            .unwrap();
        let susceptible = state
            .people
            .storage
            .get_bool(&gon.core.idx("susceptible"))
            .unwrap();
        assert_eq!(infected.iter().filter(|&&i| i).count(), 0);
        assert_eq!(susceptible.iter().filter(|&&s| s).count(), 12);
    }

    #[test]
    fn fatal_cases_schedule_people_deaths() {
        let mut state = test_state(12);
        let mut pars = GonorrheaPars::default();
        pars.initial = Some(3);
        pars.p_death = 1.;
        pars.dur_inf = 0.;
        let mut gon = Gonorrhea::new(pars);
        gon.init(&mut state).unwrap();

        state.streams.step(0);
        gon.update_states(&mut state).unwrap();
        let died = state.people.update_demographics(1., 0);
        assert_eq!(died.len(), 3);
        assert_eq!(state.results.at("gonorrhea", "new_deaths", 0).unwrap(), 3.);
    }
}
