//! Ebola disease module.

use linked_hash_map::LinkedHashMap;

use crate::disease::{resolve_seeding, BetaSpec, Disease, InfectionCore, Seeding};
use crate::dist::Dist;
use crate::error::Result;
use crate::people::Var;
use crate::rng::StreamId;
use crate::sim::SimState;
use crate::{Float, ModName, Uid};

fn default_sev_factor() -> Float {
    2.2
}
fn default_unburied_factor() -> Float {
    2.1
}
fn default_dur_exp2symp() -> Dist {
    Dist::LogNormal {
        mean: 12.7,
        std: 1.,
    }
}
fn default_dur_symp2sev() -> Dist {
    Dist::LogNormal { mean: 6., std: 1. }
}
fn default_dur_sev2dead() -> Dist {
    Dist::LogNormal { mean: 1.5, std: 1. }
}
fn default_dur_dead2buried() -> Dist {
    Dist::LogNormal { mean: 2., std: 1. }
}
fn default_dur_symp2rec() -> Dist {
    Dist::LogNormal { mean: 10., std: 1. }
}
fn default_dur_sev2rec() -> Dist {
    Dist::LogNormal {
        mean: 10.4,
        std: 1.,
    }
}
fn default_p_sev() -> Float {
    0.7
}
fn default_p_death() -> Float {
    0.55
}
fn default_p_safe_bury() -> Float {
    0.25
}

/// Parameters of the ebola module. Natural history parameters are
/// specified in days; run with a matching `dt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EbolaPars {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_prev: Option<Float>,

    /// Relative transmissibility of severe cases
    #[serde(default = "default_sev_factor")]
    pub sev_factor: Float,
    /// Relative transmissibility of dead, unburied cases
    #[serde(default = "default_unburied_factor")]
    pub unburied_factor: Float,

    /// Probability a symptomatic case progresses to severe disease
    #[serde(default = "default_p_sev")]
    pub p_sev: Float,
    /// Probability a severe case dies
    #[serde(default = "default_p_death")]
    pub p_death: Float,
    /// Probability of a safe (immediate) burial
    #[serde(default = "default_p_safe_bury")]
    pub p_safe_bury: Float,

    #[serde(default = "default_dur_exp2symp")]
    pub dur_exp2symp: Dist,
    #[serde(default = "default_dur_symp2sev")]
    pub dur_symp2sev: Dist,
    #[serde(default = "default_dur_sev2dead")]
    pub dur_sev2dead: Dist,
    #[serde(default = "default_dur_dead2buried")]
    pub dur_dead2buried: Dist,
    #[serde(default = "default_dur_symp2rec")]
    pub dur_symp2rec: Dist,
    #[serde(default = "default_dur_sev2rec")]
    pub dur_sev2rec: Dist,

    #[serde(default)]
    pub beta: LinkedHashMap<String, BetaSpec>,
}

impl Default for EbolaPars {
    fn default() -> Self {
        EbolaPars {
            initial: None,
            init_prev: None,
            sev_factor: default_sev_factor(),
            unburied_factor: default_unburied_factor(),
            p_sev: default_p_sev(),
            p_death: default_p_death(),
            p_safe_bury: default_p_safe_bury(),
            dur_exp2symp: default_dur_exp2symp(),
            dur_symp2sev: default_dur_symp2sev(),
            dur_sev2dead: default_dur_sev2dead(),
            dur_dead2buried: default_dur_dead2buried(),
            dur_symp2rec: default_dur_symp2rec(),
            dur_sev2rec: default_dur_sev2rec(),
            beta: LinkedHashMap::new(),
        }
    }
}

/// Ebola: exposed-symptomatic-severe progression with raised
/// transmissibility for severe cases and for the dead awaiting burial.
pub struct Ebola {
    core: InfectionCore,
    pars: EbolaPars,
    rng_exp2symp: StreamId,
    rng_sev: StreamId,
    rng_symp2sev: StreamId,
    rng_death: StreamId,
    rng_sev2dead: StreamId,
    rng_sev2rec: StreamId,
    rng_symp2rec: StreamId,
    rng_bury: StreamId,
    rng_dead2buried: StreamId,
}

impl Ebola {
    pub fn new(pars: EbolaPars) -> Self {
        let seeding = resolve_seeding(pars.initial, pars.init_prev, Seeding::Prev(0.005));
        Ebola {
            core: InfectionCore::new("ebola", pars.beta.clone(), seeding),
            pars,
            rng_exp2symp: StreamId::INVALID,
            rng_sev: StreamId::INVALID,
            rng_symp2sev: StreamId::INVALID,
            rng_death: StreamId::INVALID,
            rng_sev2dead: StreamId::INVALID,
            rng_sev2rec: StreamId::INVALID,
            rng_symp2rec: StreamId::INVALID,
            rng_bury: StreamId::INVALID,
            rng_dead2buried: StreamId::INVALID,
        }
    }

    /// Writes a per-row timer for the given agents, offset from a base
    /// column value.
    fn set_timer_from(
        &self,
        state: &mut SimState,
        uids: &[Uid],
        durs: &[Float],
        base: &str,
        target: &str,
    ) -> Result<()> {
        let dt = state.params.dt;
        let updates: Vec<(usize, Float)> = {
            let base_col = state.people.storage.get_float(&self.core.idx(base))?;
            uids.iter()
                .zip(durs)
                .filter_map(|(&uid, d)| {
                    state
                        .people
                        .row_of(uid)
                        .ok()
                        .map(|row| (row, base_col[row] + d / dt))
                })
                .collect()
        };
        let target_col = state.people.storage.get_float_mut(&self.core.idx(target))?;
        for (row, t) in updates {
            target_col[row] = t;
        }
        Ok(())
    }
}

impl Disease for Ebola {
    fn name(&self) -> ModName {
        self.core.name
    }

    fn init(&mut self, state: &mut SimState) -> Result<()> {
        let fresh = self.core.wire(state)?;
        let len = state.people.len();
        let storage = &mut state.people.storage;
        storage.register(self.core.idx("exposed"), Var::Bool(false), len);
        storage.register(self.core.idx("severe"), Var::Bool(false), len);
        storage.register(self.core.idx("recovered"), Var::Bool(false), len);
        storage.register(self.core.idx("buried"), Var::Bool(false), len);
        storage.register(self.core.idx("ti_exposed"), Var::Float(Float::NAN), len);
        storage.register(self.core.idx("ti_severe"), Var::Float(Float::NAN), len);
        storage.register(self.core.idx("ti_recovered"), Var::Float(Float::NAN), len);
        storage.register(self.core.idx("ti_dead"), Var::Float(Float::NAN), len);
        storage.register(self.core.idx("ti_buried"), Var::Float(Float::NAN), len);

        self.rng_exp2symp = state.streams.register("ebola_exp2symp")?;
        self.rng_sev = state.streams.register("ebola_sev")?;
        self.rng_symp2sev = state.streams.register("ebola_symp2sev")?;
        self.rng_death = state.streams.register("ebola_death")?;
        self.rng_sev2dead = state.streams.register("ebola_sev2dead")?;
        self.rng_sev2rec = state.streams.register("ebola_sev2rec")?;
        self.rng_symp2rec = state.streams.register("ebola_symp2rec")?;
        self.rng_bury = state.streams.register("ebola_bury")?;
        self.rng_dead2buried = state.streams.register("ebola_dead2buried")?;

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
        let n = state.people.len();

        // progress exposed -> symptomatic (infected)
        let symp_rows: Vec<usize> = {
            let exposed = state.people.storage.get_bool(&self.core.idx("exposed"))?;
            let ti_inf = state
                .people
                .storage
                .get_float(&self.core.idx("ti_infected"))?;
            (0..n).filter(|&row| exposed[row] && ti_inf[row] <= ti).collect()
        };
        {
            let storage = &mut state.people.storage;
            storage.set_bool_at(&self.core.idx("exposed"), &symp_rows, false)?;
            storage.set_bool_at(&self.core.idx("infected"), &symp_rows, true)?;
        }

        // progress symptomatic -> severe
        let sev_rows: Vec<usize> = {
            let infected = state.people.storage.get_bool(&self.core.idx("infected"))?;
            let ti_sev = state.people.storage.get_float(&self.core.idx("ti_severe"))?;
            (0..n)
                .filter(|&row| infected[row] && ti_sev[row] <= ti)
                .collect()
        };
        state
            .people
            .storage
            .set_bool_at(&self.core.idx("severe"), &sev_rows, true)?;

        // recoveries, from either stage
        let rec_rows: Vec<usize> = {
            let infected = state.people.storage.get_bool(&self.core.idx("infected"))?;
            let severe = state.people.storage.get_bool(&self.core.idx("severe"))?;
            let ti_rec = state
                .people
                .storage
                .get_float(&self.core.idx("ti_recovered"))?;
            (0..n)
                .filter(|&row| (infected[row] || severe[row]) && ti_rec[row] <= ti)
                .collect()
        };
        {
            let storage = &mut state.people.storage;
            storage.set_bool_at(&self.core.idx("infected"), &rec_rows, false)?;
            storage.set_bool_at(&self.core.idx("severe"), &rec_rows, false)?;
            storage.set_bool_at(&self.core.idx("recovered"), &rec_rows, true)?;
        }

        // trigger deaths
        let deaths: Vec<Uid> = {
            let ti_dead = state.people.storage.get_float(&self.core.idx("ti_dead"))?;
            (0..n)
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

        // progress dead -> buried
        let buried_rows: Vec<usize> = {
            let ti_buried = state
                .people
                .storage
                .get_float(&self.core.idx("ti_buried"))?;
            (0..n).filter(|&row| ti_buried[row] <= ti).collect()
        };
        state
            .people
            .storage
            .set_bool_at(&self.core.idx("buried"), &buried_rows, true)?;

        // transmissibility multipliers for the current stage mix
        let updates: Vec<(usize, Float)> = {
            let infected = state.people.storage.get_bool(&self.core.idx("infected"))?;
            let exposed = state.people.storage.get_bool(&self.core.idx("exposed"))?;
            let severe = state.people.storage.get_bool(&self.core.idx("severe"))?;
            let ti_dead = state.people.storage.get_float(&self.core.idx("ti_dead"))?;
            let ti_buried = state
                .people
                .storage
                .get_float(&self.core.idx("ti_buried"))?;
            (0..n)
                .filter_map(|row| {
                    if ti_dead[row] <= ti && ti_buried[row] > ti {
                        Some((row, self.pars.unburied_factor))
                    } else if severe[row] {
                        Some((row, self.pars.sev_factor))
                    } else if infected[row] || exposed[row] {
                        Some((row, 1.))
                    } else {
                        None
                    }
                })
                .collect()
        };
        let rel_trans = state
            .people
            .storage
            .get_float_mut(&self.core.idx("rel_trans"))?;
        for (row, v) in updates {
            rel_trans[row] = v;
        }
        Ok(())
    }

    fn make_new_cases(&mut self, state: &mut SimState) -> Result<()> {
        let mask: Vec<bool> = {
            let exposed = state.people.storage.get_bool(&self.core.idx("exposed"))?;
            let infected = state.people.storage.get_bool(&self.core.idx("infected"))?;
            (0..state.people.len())
                .map(|row| state.people.alive[row] && (exposed[row] || infected[row]))
                .collect()
        };
        let new_cases = self.core.transmission_from(state, &mask)?;
        self.set_prognoses(state, &new_cases)
    }

    fn set_prognoses(&mut self, state: &mut SimState, uids: &[Uid]) -> Result<()> {
        if uids.is_empty() {
            return Ok(());
        }
        let ti = state.clock as Float;
        let dt = state.params.dt;
        let rows: Vec<usize> = uids
            .iter()
            .filter_map(|&uid| state.people.row_of(uid).ok())
            .collect();
        {
            let storage = &mut state.people.storage;
            storage.set_bool_at(&self.core.idx("susceptible"), &rows, false)?;
            storage.set_bool_at(&self.core.idx("exposed"), &rows, true)?;
            storage.set_float_at(&self.core.idx("ti_exposed"), &rows, ti)?;
        }

        // when the exposed develop symptoms
        let durs = state
            .streams
            .get_mut(self.rng_exp2symp)?
            .sample_for(&self.pars.dur_exp2symp, uids, &state.people)?;
        {
            let ti_inf: Vec<Float> = durs.iter().map(|d| ti + d / dt).collect();
            state
                .people
                .storage
                .set_float_each(&self.core.idx("ti_infected"), &rows, &ti_inf)?;
        }

        // who progresses to severe disease and when
        let sev_uids = state.streams.get_mut(self.rng_sev)?.bernoulli_filter(
            self.pars.p_sev,
            uids,
            &state.people,
        )?;
        let dur_sev = state
            .streams
            .get_mut(self.rng_symp2sev)?
            .sample_for(&self.pars.dur_symp2sev, &sev_uids, &state.people)?;
        self.set_timer_from(state, &sev_uids, &dur_sev, "ti_infected", "ti_severe")?;

        // who dies and who recovers, and when
        let dead_uids = state.streams.get_mut(self.rng_death)?.bernoulli_filter(
            self.pars.p_death,
            &sev_uids,
            &state.people,
        )?;
        let dur_dead = state
            .streams
            .get_mut(self.rng_sev2dead)?
            .sample_for(&self.pars.dur_sev2dead, &dead_uids, &state.people)?;
        self.set_timer_from(state, &dead_uids, &dur_dead, "ti_severe", "ti_dead")?;

        let rec_sev_uids: Vec<Uid> = sev_uids
            .iter()
            .copied()
            .filter(|uid| !dead_uids.contains(uid))
            .collect();
        let dur_sev_rec = state
            .streams
            .get_mut(self.rng_sev2rec)?
            .sample_for(&self.pars.dur_sev2rec, &rec_sev_uids, &state.people)?;
        self.set_timer_from(state, &rec_sev_uids, &dur_sev_rec, "ti_severe", "ti_recovered")?;

        let rec_symp_uids: Vec<Uid> = uids
            .iter()
            .copied()
            .filter(|uid| !sev_uids.contains(uid))
            .collect();
        let dur_symp_rec = state
            .streams
            .get_mut(self.rng_symp2rec)?
            .sample_for(&self.pars.dur_symp2rec, &rec_symp_uids, &state.people)?;
        self.set_timer_from(
            state,
            &rec_symp_uids,
            &dur_symp_rec,
            "ti_infected",
            "ti_recovered",
        )?;

        // time of burial, immediate for safe burials
        let safe_uids = state.streams.get_mut(self.rng_bury)?.bernoulli_filter(
            self.pars.p_safe_bury,
            &dead_uids,
            &state.people,
        )?;
        let zeros = vec![0.; safe_uids.len()];
        self.set_timer_from(state, &safe_uids, &zeros, "ti_dead", "ti_buried")?;
        let unsafe_uids: Vec<Uid> = dead_uids
            .iter()
            .copied()
            .filter(|uid| !safe_uids.contains(uid))
            .collect();
        let dur_bury = state
            .streams
            .get_mut(self.rng_dead2buried)?
            .sample_for(&self.pars.dur_dead2buried, &unsafe_uids, &state.people)?;
        self.set_timer_from(state, &unsafe_uids, &dur_bury, "ti_dead", "ti_buried")?;
        Ok(())
    }

    fn update_death(&mut self, state: &mut SimState, uids: &[Uid]) -> Result<()> {
        let rows: Vec<usize> = uids
            .iter()
            .filter_map(|&uid| state.people.row_of(uid).ok())
            .collect();
        let storage = &mut state.people.storage;
        for name in &["susceptible", "exposed", "infected", "severe", "recovered"] {
            storage.set_bool_at(&self.core.idx(name), &rows, false)?;
        }
        Ok(())
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimParams;

    fn test_state(n: u32) -> SimState {
        let mut params = SimParams::default();
        params.n_agents = n;
        params.rand_seed = 17;
        let mut state = crate::sim::SimState::bare(params);
        state.streams.step(0);
        state
    }

    fn fast_pars() -> EbolaPars {
        let mut pars = EbolaPars::default();
        pars.initial = Some(4);
        pars.dur_exp2symp = Dist::Constant { v: 1. };
        pars.dur_symp2sev = Dist::Constant { v: 1. };
        pars.dur_sev2dead = Dist::Constant { v: 1. };
        pars.dur_dead2buried = Dist::Constant { v: 2. };
        pars.dur_symp2rec = Dist::Constant { v: 50. };
        pars.dur_sev2rec = Dist::Constant { v: 50. };
        pars
    }

    fn count(state: &SimState, ebola: &Ebola, name: &str) -> usize {
        state
            .people
            .storage
            .get_bool(&ebola.core.idx(name))
            .unwrap()
            .iter()
            .filter(|&&v| v)
            .count()
    }

    #[test]
    fn progression_runs_through_the_stages() {
        let mut state = test_state(20);
        let mut pars = fast_pars();
        pars.p_sev = 1.;
        pars.p_death = 0.;
        let mut ebola = Ebola::new(pars);
        ebola.init(&mut state).unwrap();
        assert_eq!(count(&state, &ebola, "exposed"), 4);

        state.clock = 1;
        state.streams.step(1);
        ebola.update_states(&mut state).unwrap();
        assert_eq!(count(&state, &ebola, "exposed"), 0);
        assert_eq!(count(&state, &ebola, "infected"), 4);

        state.clock = 2;
        state.streams.step(2);
        ebola.update_states(&mut state).unwrap();
        assert_eq!(count(&state, &ebola, "severe"), 4);
        // severe cases transmit more
        let rel_trans = state
            .people
            .storage
            .get_float(&ebola.core.idx("rel_trans"))
            .unwrap();
        assert!(rel_trans.iter().any(|&r| (r - 2.2).abs() < 1e-12));
    }

    #[test]
    fn fatal_progression_ends_in_burial() {
        let mut state = test_state(20);
        let mut pars = fast_pars();
        pars.p_sev = 1.;
        pars.p_death = 1.;
        pars.p_safe_bury = 1.;
        let mut ebola = Ebola::new(pars);
        ebola.init(&mut state).unwrap();

        // symptomatic at 1, severe at 2, dead at 3, safe burial at 3
        for ti in 1..=3 {
            state.clock = ti;
            state.streams.step(ti);
            ebola.update_states(&mut state).unwrap();
            let died = state.people.update_demographics(1., ti);
            ebola.update_death(&mut state, &died).unwrap();
        }
        assert_eq!(count(&state, &ebola, "buried"), 4);
        assert_eq!(state.people.n_alive(), 16);
        assert_eq!(state.results.at("ebola", "new_deaths", 3).unwrap(), 4.);
    }
}
