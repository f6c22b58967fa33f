//! HIV disease module, antiretroviral therapy intervention and CD4
//! analyzer.

use linked_hash_map::LinkedHashMap;

use crate::analyzer::Analyzer;
use crate::disease::{resolve_seeding, BetaSpec, Disease, InfectionCore, Seeding};
use crate::error::Result;
use crate::intervention::Intervention;
use crate::people::Var;
use crate::rng::StreamId;
use crate::sim::SimState;
use crate::{string, Float, ModName, Uid};

fn default_cd4_min() -> Float {
    100.
}
fn default_cd4_max() -> Float {
    500.
}
fn default_cd4_rate() -> Float {
    5.
}

/// Parameters of the HIV module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HivPars {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_prev: Option<Float>,
    /// CD4 count an untreated infection decays towards
    #[serde(default = "default_cd4_min")]
    pub cd4_min: Float,
    /// CD4 count treatment recovers towards
    #[serde(default = "default_cd4_max")]
    pub cd4_max: Float,
    /// Reciprocal rate of CD4 change per timestep
    #[serde(default = "default_cd4_rate")]
    pub cd4_rate: Float,
    #[serde(default)]
    pub beta: LinkedHashMap<String, BetaSpec>,
}

impl Default for HivPars {
    fn default() -> Self {
        HivPars {
            initial: None,
            init_prev: None,
            cd4_min: default_cd4_min(),
            cd4_max: default_cd4_max(),
            cd4_rate: default_cd4_rate(),
            beta: LinkedHashMap::new(),
        }
    }
}

/// HIV: a lifelong infection whose CD4 count decays while untreated and
/// recovers on antiretroviral therapy.
pub struct Hiv {
    core: InfectionCore,
    pars: HivPars,
}

impl Hiv {
    pub fn new(pars: HivPars) -> Self {
        let seeding = resolve_seeding(pars.initial, pars.init_prev, Seeding::Count(30));
        Hiv {
            core: InfectionCore::new("hiv", pars.beta.clone(), seeding),
            pars,
        }
    }
}

impl Disease for Hiv {
    fn name(&self) -> ModName {
        self.core.name
    }

    fn init(&mut self, state: &mut SimState) -> Result<()> {
        let fresh = self.core.wire(state)?;
        let len = state.people.len();
        let storage = &mut state.people.storage;
        storage.register(self.core.idx("on_art"), Var::Bool(false), len);
        storage.register(self.core.idx("cd4"), Var::Float(500.), len);

        if fresh {
            let seeds = self.core.seed_infections(state)?;
            self.set_prognoses(state, &seeds)?;
        }
        Ok(())
    }

    fn update_states(&mut self, state: &mut SimState) -> Result<()> {
        let infected = state
            .people
            .storage
            .get_bool(&self.core.idx("infected"))?
            .clone();
        let on_art = state
            .people
            .storage
            .get_bool(&self.core.idx("on_art"))?
            .clone();
        let alive = state.people.alive.clone();
        let (cd4_min, cd4_max, cd4_rate) =
            (self.pars.cd4_min, self.pars.cd4_max, self.pars.cd4_rate);

        let cd4 = state.people.storage.get_float_mut(&self.core.idx("cd4"))?;
        for row in 0..cd4.len() {
            if !alive[row] || !infected[row] {
                continue;
            }
            let target = if on_art[row] { cd4_max } else { cd4_min };
            cd4[row] += (target - cd4[row]) / cd4_rate;
        }
        Ok(())
    }

    fn make_new_cases(&mut self, state: &mut SimState) -> Result<()> {
        let new_cases = self.core.transmission(state)?;
        self.set_prognoses(state, &new_cases)
    }

    fn set_prognoses(&mut self, state: &mut SimState, uids: &[Uid]) -> Result<()> {
        self.core.mark_infected(state, uids)
    }

    fn update_death(&mut self, state: &mut SimState, uids: &[Uid]) -> Result<()> {
        self.core.clear_on_death(state, uids)
    }

    fn update_results(&mut self, state: &mut SimState) -> Result<()> {
        self.core.update_base_results(state)
    }
}

/// Parameters of the antiretroviral therapy intervention: a stepwise
/// treatment capacity schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtPars {
    /// Years at which capacity changes
    pub t: Vec<Float>,
    /// Treatment slots available from the matching year onward
    pub capacity: Vec<Float>,
}

/// Antiretroviral therapy: each step, agents are put on or taken off
/// treatment so that the number treated matches the scheduled capacity.
pub struct Art {
    name: ModName,
    pars: ArtPars,
    rng_assign: StreamId,
}

impl Art {
    pub fn new(pars: ArtPars) -> Self {
        Art {
            name: string::new_truncate("art"),
            pars,
            rng_assign: StreamId::INVALID,
        }
    }

    fn on_art_idx() -> (ModName, ModName) {
        (string::new_truncate("hiv"), string::new_truncate("on_art"))
    }

    fn infected_idx() -> (ModName, ModName) {
        (string::new_truncate("hiv"), string::new_truncate("infected"))
    }
}

impl Intervention for Art {
    fn name(&self) -> ModName {
        self.name
    }

    fn init(&mut self, state: &mut SimState) -> Result<()> {
        if self.pars.t.len() != self.pars.capacity.len() || self.pars.t.is_empty() {
            return Err(crate::error::Error::InvalidParam(
                "art: t and capacity must be equally long and non-empty".to_string(),
            ));
        }
        self.rng_assign = state.streams.register_single("art_assign")?;
        state.results.new_series("hiv", "n_art");
        Ok(())
    }

    fn apply(&mut self, state: &mut SimState) -> Result<()> {
        let ti = state.clock;
        let year = state.params.year(ti);
        if year < self.pars.t[0] {
            return Ok(());
        }
        let slot = self
            .pars
            .t
            .iter()
            .rposition(|&t| t <= year)
            .unwrap_or(0);
        let capacity = self.pars.capacity[slot];

        let on_art = state.people.storage.get_bool(&Art::on_art_idx())?.clone();
        let infected = state.people.storage.get_bool(&Art::infected_idx())?.clone();
        let people = &state.people;
        let n_on_art = (0..people.len())
            .filter(|&row| people.alive[row] && on_art[row])
            .count() as i64;
        let n_change = capacity as i64 - n_on_art;

        if n_change > 0 {
            // add more agents to treatment
            let eligible: Vec<Uid> = (0..people.len())
                .filter(|&row| people.alive[row] && infected[row] && !on_art[row])
                .map(|row| people.uid[row])
                .collect();
            let chosen = state
                .streams
                .get_mut(self.rng_assign)?
                .choose_without_replacement(&eligible, n_change as usize)?;
            let rows: Vec<usize> = chosen
                .iter()
                .filter_map(|&uid| state.people.row_of(uid).ok())
                .collect();
            state
                .people
                .storage
                .set_bool_at(&Art::on_art_idx(), &rows, true)?;
        } else if n_change < 0 {
            // take some agents off treatment
            let eligible: Vec<Uid> = (0..people.len())
                .filter(|&row| people.alive[row] && infected[row] && on_art[row])
                .map(|row| people.uid[row])
                .collect();
            let chosen = state
                .streams
                .get_mut(self.rng_assign)?
                .choose_without_replacement(&eligible, (-n_change) as usize)?;
            let rows: Vec<usize> = chosen
                .iter()
                .filter_map(|&uid| state.people.row_of(uid).ok())
                .collect();
            state
                .people
                .storage
                .set_bool_at(&Art::on_art_idx(), &rows, false)?;
        }

        let on_art = state.people.storage.get_bool(&Art::on_art_idx())?;
        let n_art = (0..state.people.len())
            .filter(|&row| state.people.alive[row] && on_art[row])
            .count() as Float;
        state.results.set("hiv", "n_art", ti, n_art)?;
        Ok(())
    }
}

/// Records the full CD4 count array at every timestep.
pub struct Cd4Analyzer {
    name: ModName,
    cd4: Vec<Vec<Float>>,
}

impl Cd4Analyzer {
    pub fn new() -> Self {
        Cd4Analyzer {
            name: string::new_truncate("cd4_analyzer"),
            cd4: Vec::new(),
        }
    }

    pub fn recorded(&self) -> &[Vec<Float>] {
        &self.cd4
    }
}

impl Default for Cd4Analyzer {
    fn default() -> Self {
        Cd4Analyzer::new()
    }
}

impl Analyzer for Cd4Analyzer {
    fn name(&self) -> ModName {
        self.name
    }

    fn init(&mut self, state: &mut SimState) -> Result<()> {
        self.cd4.reserve(state.params.npts());
        Ok(())
    }

    fn apply(&mut self, state: &mut SimState) -> Result<()> {
        let cd4 = state.people.storage.get_float(&(
            string::new_truncate("hiv"),
            string::new_truncate("cd4"),
        ))?;
        self.cd4.push(cd4.clone());
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
        params.rand_seed = 8;
        let mut state = crate::sim::SimState::bare(params);
        state.streams.step(0);
        state
    }

    #[test]
    fn cd4_decays_untreated_and_recovers_on_art() {
        let mut state = test_state(10);
        let mut pars = HivPars::default();
        pars.initial = Some(2);
        let mut hiv = Hiv::new(pars);
        hiv.init(&mut state).unwrap();

        let infected_rows: Vec<usize> = {
            let infected = state
                .people
                .storage
                .get_bool(&hiv.core.idx("infected"))
                .unwrap();
            (0..state.people.len()).filter(|&r| infected[r]).collect()
        };
        hiv.update_states(&mut state).unwrap();
        {
            let cd4 = state.people.storage.get_float(&hiv.core.idx("cd4")).unwrap();
            for &row in &infected_rows {
                assert!(cd4[row] < 500.);
            }
        }

        // put one infected agent on treatment and watch cd4 climb back
        let treated = infected_rows[0];
        state
            .people
            .storage
            .get_bool_mut(&hiv.core.idx("on_art"))
            .unwrap()[treated] = true;
        let before = state.people.storage.get_float(&hiv.core.idx("cd4")).unwrap()[treated];
        hiv.update_states(&mut state).unwrap();
        let after = state.people.storage.get_float(&hiv.core.idx("cd4")).unwrap()[treated];
        assert!(after > before);
    }

    #[test]
    fn art_fills_to_capacity() {
        let mut state = test_state(40);
        let mut pars = HivPars::default();
        pars.initial = Some(20);
        let mut hiv = Hiv::new(pars);
        hiv.init(&mut state).unwrap();

        let mut art = Art::new(ArtPars {
            t: vec![2000.],
            capacity: vec![8.],
        });
        art.init(&mut state).unwrap();
        state.streams.step(0);
        art.apply(&mut state).unwrap();
        assert_eq!(state.results.at("hiv", "n_art", 0).unwrap(), 8.);

        // shrinking capacity takes agents off treatment
        art.pars.capacity[0] = 3.;
        state.clock = 1;
        state.streams.step(1);
        art.apply(&mut state).unwrap();
        assert_eq!(state.results.at("hiv", "n_art", 1).unwrap(), 3.);
    }

    #[test]
    fn art_respects_eligibility() {
        let mut state = test_state(10);
        let mut pars = HivPars::default();
        pars.initial = Some(2);
        let mut hiv = Hiv::new(pars);
        hiv.init(&mut state).unwrap();

        let mut art = Art::new(ArtPars {
            t: vec![2000.],
            capacity: vec![100.],
        });
        art.init(&mut state).unwrap();
        state.streams.step(0);
        art.apply(&mut state).unwrap();
        // only the infected can be treated, regardless of capacity
        assert_eq!(state.results.at("hiv", "n_art", 0).unwrap(), 2.);
    }

    #[test]
    fn cd4_analyzer_records_every_step() {
        let mut state = test_state(6);
        let mut hiv = Hiv::new(HivPars::default());
        hiv.init(&mut state).unwrap();
        let mut analyzer = Cd4Analyzer::new();
        analyzer.init(&mut state).unwrap();
        analyzer.apply(&mut state).unwrap();
        analyzer.apply(&mut state).unwrap();
        assert_eq!(analyzer.recorded().len(), 2);
        assert_eq!(analyzer.recorded()[0].len(), 6);
    }
}
