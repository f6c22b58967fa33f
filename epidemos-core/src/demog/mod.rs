//! Vital dynamics modules.

mod pregnancy;

pub use self::pregnancy::{Pregnancy, PregnancyPars};

use std::path::PathBuf;

use crate::data::RateTable;
use crate::dist::Dist;
use crate::error::Result;
use crate::rng::StreamId;
use crate::sim::SimState;
use crate::{string, Float, ModName, Uid};

/// A vital dynamics module, updated at the start of every step before the
/// population ages.
pub trait Demographic {
    fn name(&self) -> ModName;

    fn init(&mut self, state: &mut SimState) -> Result<()>;

    fn update(&mut self, state: &mut SimState) -> Result<()>;
}

fn default_birth_rate() -> Float {
    20.
}

/// Parameters of the births module. Rates are births per 1000 alive
/// person-years; an age-specific fertility file (rates per 1000 women by
/// mother age) takes precedence over the crude rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BirthsPars {
    #[serde(default = "default_birth_rate")]
    pub birth_rate: Float,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fertility_file: Option<PathBuf>,
}

impl Default for BirthsPars {
    fn default() -> Self {
        BirthsPars {
            birth_rate: default_birth_rate(),
            fertility_file: None,
        }
    }
}

/// Adds newborn agents, either from a crude birth rate or from
/// age-specific fertility rates.
pub struct Births {
    name: ModName,
    pars: BirthsPars,
    table: Option<RateTable>,
    rng_n: StreamId,
    rng_fert: StreamId,
    rng_sex: StreamId,
}

impl Births {
    pub fn new(pars: BirthsPars) -> Self {
        Births {
            name: string::new_truncate("births"),
            pars,
            table: None,
            rng_n: StreamId::INVALID,
            rng_fert: StreamId::INVALID,
            rng_sex: StreamId::INVALID,
        }
    }
}

impl Demographic for Births {
    fn name(&self) -> ModName {
        self.name
    }

    fn init(&mut self, state: &mut SimState) -> Result<()> {
        if let Some(file) = &self.pars.fertility_file {
            let path = state.scenario.resolve(file);
            self.table = Some(RateTable::from_csv_path(&path)?);
        }
        self.rng_n = state.streams.register("births_n")?;
        self.rng_fert = state.streams.register("births_fertility")?;
        self.rng_sex = state.streams.register_single("births_sex")?;
        state.results.new_series(self.name.as_str(), "new");
        state.results.new_series(self.name.as_str(), "cumulative");
        Ok(())
    }

    fn update(&mut self, state: &mut SimState) -> Result<()> {
        let ti = state.clock;
        let dt = state.params.dt;

        let n_new = match &self.table {
            Some(table) => {
                // one trial per living woman at her age-specific rate
                let mothers: Vec<Uid> = state
                    .people
                    .uids_where(|row| state.people.female[row]);
                let probs: Vec<Float> = mothers
                    .iter()
                    .filter_map(|&uid| state.people.row_of(uid).ok())
                    .map(|row| (table.rate_at(state.people.age[row]) * dt / 1000.).min(1.))
                    .collect();
                state
                    .streams
                    .get_mut(self.rng_fert)?
                    .filter_by_prob(&mothers, &probs, &state.people)?
                    .len()
            }
            None => {
                let expected =
                    self.pars.birth_rate / 1000. * state.people.n_alive() as Float * dt;
                let dist = Dist::Poisson { lam: expected };
                state.streams.get_mut(self.rng_n)?.sample(&dist, 1)?[0] as usize
            }
        };

        if n_new > 0 {
            let new_uids = state.people.grow(n_new);
            let sex_draws = state.streams.get_mut(self.rng_sex)?.random(n_new)?;
            for (&uid, &u) in new_uids.iter().zip(&sex_draws) {
                let row = state.people.row_of(uid)?;
                state.people.age[row] = 0.;
                state.people.female[row] = u < 0.5;
            }
            debug!("{}: {} newborns", self.name, n_new);
        }
        state
            .results
            .set(self.name.as_str(), "new", ti, n_new as Float)?;
        let cum = state.results.cumulative_to(self.name.as_str(), "new", ti)?;
        state
            .results
            .set(self.name.as_str(), "cumulative", ti, cum)?;
        Ok(())
    }
}

fn default_death_rate() -> Float {
    8.
}

/// Parameters of the background mortality module. Rates are deaths per
/// 1000 person-years; an age-specific file takes precedence over the
/// crude rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeathsPars {
    #[serde(default = "default_death_rate")]
    pub death_rate: Float,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub death_rate_file: Option<PathBuf>,
}

impl Default for DeathsPars {
    fn default() -> Self {
        DeathsPars {
            death_rate: default_death_rate(),
            death_rate_file: None,
        }
    }
}

/// Background mortality from causes outside the modelled diseases.
pub struct Deaths {
    name: ModName,
    pars: DeathsPars,
    table: Option<RateTable>,
    rng_deaths: StreamId,
}

impl Deaths {
    pub fn new(pars: DeathsPars) -> Self {
        Deaths {
            name: string::new_truncate("deaths"),
            pars,
            table: None,
            rng_deaths: StreamId::INVALID,
        }
    }
}

impl Demographic for Deaths {
    fn name(&self) -> ModName {
        self.name
    }

    fn init(&mut self, state: &mut SimState) -> Result<()> {
        if let Some(file) = &self.pars.death_rate_file {
            let path = state.scenario.resolve(file);
            self.table = Some(RateTable::from_csv_path(&path)?);
        }
        self.rng_deaths = state.streams.register("deaths_background")?;
        state.results.new_series(self.name.as_str(), "new");
        Ok(())
    }

    fn update(&mut self, state: &mut SimState) -> Result<()> {
        let ti = state.clock;
        let dt = state.params.dt;
        let alive = state.people.alive_uids();
        let probs: Vec<Float> = alive
            .iter()
            .filter_map(|&uid| state.people.row_of(uid).ok())
            .map(|row| {
                let rate = match &self.table {
                    Some(table) => table.rate_at(state.people.age[row]),
                    None => self.pars.death_rate,
                };
                (rate * dt / 1000.).min(1.)
            })
            .collect();
        let dying = state
            .streams
            .get_mut(self.rng_deaths)?
            .filter_by_prob(&alive, &probs, &state.people)?;
        state.people.request_death(&dying, ti);
        state
            .results
            .set(self.name.as_str(), "new", ti, state.people.scale_flows(&dying))?;
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
        params.rand_seed = 4;
        let mut state = crate::sim::SimState::bare(params);
        state.streams.step(0);
        state
    }

    #[test]
    fn zero_birth_rate_adds_nobody() {
        let mut state = test_state(50);
        let mut births = Births::new(BirthsPars {
            birth_rate: 0.,
            fertility_file: None,
        });
        births.init(&mut state).unwrap();
        births.update(&mut state).unwrap();
        assert_eq!(state.people.len(), 50);
        assert_eq!(state.results.at("births", "new", 0).unwrap(), 0.);
    }

    #[test]
    fn crude_births_grow_the_population() {
        let mut state = test_state(200);
        // an implausibly high rate so some births certainly occur
        let mut births = Births::new(BirthsPars {
            birth_rate: 500.,
            fertility_file: None,
        });
        births.init(&mut state).unwrap();
        births.update(&mut state).unwrap();
        assert!(state.people.len() > 200);
        let n_new = state.results.at("births", "new", 0).unwrap();
        assert_eq!(state.people.len(), 200 + n_new as usize);
        // newborns start at age zero
        for row in 200..state.people.len() {
            assert_eq!(state.people.age[row], 0.);
        }
    }

    #[test]
    fn certain_mortality_kills_everyone() {
        let mut state = test_state(30);
        let mut deaths = Deaths::new(DeathsPars {
            death_rate: 1000. / 1., // probability 1 per year
            death_rate_file: None,
        });
        deaths.init(&mut state).unwrap();
        deaths.update(&mut state).unwrap();
        let died = state.people.update_demographics(1., 0);
        assert_eq!(died.len(), 30);
        assert_eq!(state.people.n_alive(), 0);
    }

    #[test]
    fn zero_mortality_kills_nobody() {
        let mut state = test_state(30);
        let mut deaths = Deaths::new(DeathsPars {
            death_rate: 0.,
            death_rate_file: None,
        });
        deaths.init(&mut state).unwrap();
        deaths.update(&mut state).unwrap();
        assert!(state.people.update_demographics(1., 0).is_empty());
        assert_eq!(state.people.n_alive(), 30);
    }
}
