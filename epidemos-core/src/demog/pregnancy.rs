//! Pregnancy module: conception, delivery and the maternal network.

use std::path::PathBuf;

use crate::data::RateTable;
use crate::demog::Demographic;
use crate::error::Result;
use crate::people::{StorageIndex, Var};
use crate::rng::StreamId;
use crate::sim::SimState;
use crate::{string, Float, ModName, Uid};

fn default_fertility_rate() -> Float {
    60.
}
fn default_dur_pregnancy() -> Float {
    0.75
}
fn default_dur_postpartum() -> Float {
    0.5
}
fn default_p_female() -> Float {
    0.5
}
fn default_min_age() -> Float {
    15.
}
fn default_max_age() -> Float {
    50.
}

/// Parameters of the pregnancy module. The fertility rate is conceptions
/// per 1000 eligible women per year; an age-specific fertility file takes
/// precedence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PregnancyPars {
    #[serde(default = "default_fertility_rate")]
    pub fertility_rate: Float,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fertility_file: Option<PathBuf>,
    /// Gestation in years
    #[serde(default = "default_dur_pregnancy")]
    pub dur_pregnancy: Float,
    /// Postpartum period in years
    #[serde(default = "default_dur_postpartum")]
    pub dur_postpartum: Float,
    #[serde(default = "default_p_female")]
    pub p_female: Float,
    /// Eligible maternal age window
    #[serde(default = "default_min_age")]
    pub min_age: Float,
    #[serde(default = "default_max_age")]
    pub max_age: Float,
}

impl Default for PregnancyPars {
    fn default() -> Self {
        PregnancyPars {
            fertility_rate: default_fertility_rate(),
            fertility_file: None,
            dur_pregnancy: default_dur_pregnancy(),
            dur_postpartum: default_dur_postpartum(),
            p_female: default_p_female(),
            min_age: default_min_age(),
            max_age: default_max_age(),
        }
    }
}

/// Models conception and delivery explicitly.
///
/// Children are created at conception with a negative age (they age into
/// birth as the simulation advances) and connected to their mother on the
/// maternal network, when one is present, for the duration of gestation
/// plus the postpartum period. Newborn random-number slots are drawn from
/// the mother's stream so they stay aligned across simulation variants.
pub struct Pregnancy {
    name: ModName,
    pars: PregnancyPars,
    table: Option<RateTable>,
    rng_conceive: StreamId,
    rng_sex: StreamId,
    rng_slot: StreamId,
}

impl Pregnancy {
    pub fn new(pars: PregnancyPars) -> Self {
        Pregnancy {
            name: string::new_truncate("pregnancy"),
            pars,
            table: None,
            rng_conceive: StreamId::INVALID,
            rng_sex: StreamId::INVALID,
            rng_slot: StreamId::INVALID,
        }
    }

    fn idx(&self, state_name: &str) -> StorageIndex {
        (self.name, string::new_truncate(state_name))
    }
}

impl Demographic for Pregnancy {
    fn name(&self) -> ModName {
        self.name
    }

    fn init(&mut self, state: &mut SimState) -> Result<()> {
        if let Some(file) = &self.pars.fertility_file {
            let path = state.scenario.resolve(file);
            self.table = Some(RateTable::from_csv_path(&path)?);
        }
        let len = state.people.len();
        let storage = &mut state.people.storage;
        storage.register(self.idx("pregnant"), Var::Bool(false), len);
        storage.register(self.idx("postpartum"), Var::Bool(false), len);
        storage.register(self.idx("ti_delivery"), Var::Float(Float::NAN), len);
        storage.register(self.idx("ti_postpartum"), Var::Float(Float::NAN), len);

        self.rng_conceive = state.streams.register("pregnancy_conceive")?;
        self.rng_sex = state.streams.register("pregnancy_sex")?;
        self.rng_slot = state.streams.register("pregnancy_slot")?;

        state.results.new_series(self.name.as_str(), "pregnancies");
        state.results.new_series(self.name.as_str(), "births");
        Ok(())
    }

    fn update(&mut self, state: &mut SimState) -> Result<()> {
        let ti = state.clock;
        let t = ti as Float;
        let dt = state.params.dt;

        // deliveries
        let delivering: Vec<usize> = {
            let pregnant = state.people.storage.get_bool(&self.idx("pregnant"))?;
            let ti_delivery = state.people.storage.get_float(&self.idx("ti_delivery"))?;
            (0..state.people.len())
                .filter(|&row| pregnant[row] && ti_delivery[row] <= t)
                .collect()
        };
        {
            let storage = &mut state.people.storage;
            storage.set_bool_at(&self.idx("pregnant"), &delivering, false)?;
            storage.set_bool_at(&self.idx("postpartum"), &delivering, true)?;
            storage.set_float_at(
                &self.idx("ti_postpartum"),
                &delivering,
                t + self.pars.dur_postpartum / dt,
            )?;
        }
        state.results.set(
            self.name.as_str(),
            "births",
            ti,
            delivering.len() as Float,
        )?;

        // postpartum recovery
        let recovering: Vec<usize> = {
            let postpartum = state.people.storage.get_bool(&self.idx("postpartum"))?;
            let ti_pp = state.people.storage.get_float(&self.idx("ti_postpartum"))?;
            (0..state.people.len())
                .filter(|&row| postpartum[row] && ti_pp[row] <= t)
                .collect()
        };
        state
            .people
            .storage
            .set_bool_at(&self.idx("postpartum"), &recovering, false)?;

        // conceptions
        let eligible: Vec<Uid> = {
            let pregnant = state.people.storage.get_bool(&self.idx("pregnant"))?;
            let postpartum = state.people.storage.get_bool(&self.idx("postpartum"))?;
            let people = &state.people;
            (0..people.len())
                .filter(|&row| {
                    people.alive[row]
                        && people.female[row]
                        && !pregnant[row]
                        && !postpartum[row]
                        && people.age[row] >= self.pars.min_age
                        && people.age[row] < self.pars.max_age
                })
                .map(|row| people.uid[row])
                .collect()
        };
        let probs: Vec<Float> = eligible
            .iter()
            .filter_map(|&uid| state.people.row_of(uid).ok())
            .map(|row| {
                let rate = match &self.table {
                    Some(table) => table.rate_at(state.people.age[row]),
                    None => self.pars.fertility_rate,
                };
                (rate * dt / 1000.).min(1.)
            })
            .collect();
        let mothers = state
            .streams
            .get_mut(self.rng_conceive)?
            .filter_by_prob(&eligible, &probs, &state.people)?;
        state.results.set(
            self.name.as_str(),
            "pregnancies",
            ti,
            mothers.len() as Float,
        )?;
        if mothers.is_empty() {
            return Ok(());
        }

        // mark the mothers
        let mother_rows: Vec<usize> = mothers
            .iter()
            .filter_map(|&uid| state.people.row_of(uid).ok())
            .collect();
        {
            let storage = &mut state.people.storage;
            storage.set_bool_at(&self.idx("pregnant"), &mother_rows, true)?;
            storage.set_float_at(
                &self.idx("ti_delivery"),
                &mother_rows,
                t + self.pars.dur_pregnancy / dt,
            )?;
        }

        // the children are conceived now and age into birth; their sex and
        // random-number slot derive from the mother's stream
        let sex_draws = state
            .streams
            .get_mut(self.rng_sex)?
            .random_for(&mothers, &state.people)?;
        let n_agents = state.params.n_agents as u64;
        let slot_draws = state.streams.get_mut(self.rng_slot)?.integers_for(
            n_agents,
            n_agents * state.params.slot_scale as u64,
            &mothers,
            &state.people,
        )?;
        let children = state.people.grow(mothers.len());
        for (i, &child) in children.iter().enumerate() {
            let row = state.people.row_of(child)?;
            state.people.age[row] = -self.pars.dur_pregnancy;
            state.people.female[row] = sex_draws[i] < self.pars.p_female;
            state.people.slot[row] = slot_draws[i] as u32;
        }
        debug!("{}: {} conceptions", self.name, mothers.len());

        // maternal connections, when the network is configured
        let maternal = string::new_truncate("maternal");
        if state.networks.has(&maternal) {
            let dur = self.pars.dur_pregnancy + self.pars.dur_postpartum;
            let edges = state.networks.get_mut(&maternal)?;
            for (&mother, &child) in mothers.iter().zip(&children) {
                edges.push(mother, child, 1., dur);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{MaternalNet, MaternalPars, Network};
    use crate::SimParams;

    fn test_state(n: u32) -> SimState {
        let mut params = SimParams::default();
        params.n_agents = n;
        params.rand_seed = 13;
        let mut state = crate::sim::SimState::bare(params);
        state.streams.step(0);
        // everyone an eligible woman
        for row in 0..state.people.len() {
            state.people.age[row] = 25.;
            state.people.female[row] = true;
        }
        state
    }

    fn certain_pregnancy() -> PregnancyPars {
        let mut pars = PregnancyPars::default();
        pars.fertility_rate = 1000.; // probability 1 per year
        pars
    }

    #[test]
    fn conception_creates_unborn_children_with_maternal_links() {
        let mut state = test_state(10);
        let mut maternal = MaternalNet::new(MaternalPars::default());
        maternal.init(&mut state).unwrap();
        let mut pregnancy = Pregnancy::new(certain_pregnancy());
        pregnancy.init(&mut state).unwrap();

        pregnancy.update(&mut state).unwrap();
        assert_eq!(state.people.len(), 20);
        assert_eq!(state.results.at("pregnancy", "pregnancies", 0).unwrap(), 10.);
        // children age into birth from minus gestation
        for row in 10..20 {
            assert_eq!(state.people.age[row], -0.75);
            // slots drawn from the newborn slot range
            let slot = state.people.slot[row];
            assert!(slot >= 10 && slot < 50, "slot was {}", slot);
        }
        let edges = state.networks.get(&string::new_truncate("maternal")).unwrap();
        assert_eq!(edges.len(), 10);
        assert!(edges.vertical);
    }

    #[test]
    fn pregnant_women_do_not_conceive_again() {
        let mut state = test_state(10);
        let mut pregnancy = Pregnancy::new(certain_pregnancy());
        pregnancy.init(&mut state).unwrap();
        pregnancy.update(&mut state).unwrap();
        assert_eq!(state.people.len(), 20);

        state.clock = 1;
        state.streams.step(1);
        state.people.update_demographics(1., 0);
        pregnancy.update(&mut state).unwrap();
        // the mothers just delivered into postpartum and the children are
        // far too young, so nobody conceives
        assert_eq!(state.results.at("pregnancy", "pregnancies", 1).unwrap(), 0.);
    }

    #[test]
    fn delivery_flips_to_postpartum_and_counts_births() {
        let mut state = test_state(6);
        let mut pregnancy = Pregnancy::new(certain_pregnancy());
        pregnancy.init(&mut state).unwrap();
        pregnancy.update(&mut state).unwrap();

        state.clock = 1;
        state.streams.step(1);
        pregnancy.update(&mut state).unwrap();
        assert_eq!(state.results.at("pregnancy", "births", 1).unwrap(), 6.);
        let postpartum = state
            .people
            .storage
            .get_bool(&pregnancy.idx("postpartum"))
            .unwrap();
        assert_eq!(postpartum.iter().filter(|&&p| p).count(), 6);
    }
}
