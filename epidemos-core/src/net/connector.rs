//! Connectors coordinating state across networks.

use crate::error::Result;
use crate::rng::StreamId;
use crate::sim::SimState;
use crate::{string, Float, ModName, Uid};

/// A connector between networks, run after all network updates.
pub trait NetConnector {
    fn name(&self) -> ModName;

    fn init(&mut self, state: &mut SimState) -> Result<()>;

    fn update(&mut self, state: &mut SimState) -> Result<()>;
}

fn default_prop_bi() -> Float {
    0.5
}
fn default_msm_part_rate() -> Float {
    0.1
}
fn default_mf_part_rate() -> Float {
    0.85
}

/// Parameters of the mf/msm participation connector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MfMsmPars {
    /// Share of msm participants also active in the mf network
    #[serde(default = "default_prop_bi")]
    pub prop_bi: Float,
    /// Male participation rate in the msm network
    #[serde(default = "default_msm_part_rate")]
    pub msm_part_rate: Float,
    /// Target male participation rate in the mf network
    #[serde(default = "default_mf_part_rate")]
    pub mf_part_rate: Float,
}

impl Default for MfMsmPars {
    fn default() -> Self {
        MfMsmPars {
            prop_bi: default_prop_bi(),
            msm_part_rate: default_msm_part_rate(),
            mf_part_rate: default_mf_part_rate(),
        }
    }
}

/// Combines the mf and msm networks: male participation is assigned
/// jointly so that a `prop_bi` share of msm participants is bisexual and
/// the mf network still reaches its target male participation rate.
pub struct MfMsm {
    name: ModName,
    pars: MfMsmPars,
    rng_msm: StreamId,
    rng_bi: StreamId,
    rng_excl: StreamId,
}

impl MfMsm {
    pub fn new(pars: MfMsmPars) -> Self {
        MfMsm {
            name: string::new_truncate("mf_msm"),
            pars,
            rng_msm: StreamId::INVALID,
            rng_bi: StreamId::INVALID,
            rng_excl: StreamId::INVALID,
        }
    }

    fn set_participation(&mut self, state: &mut SimState, upper_age: Option<Float>) -> Result<()> {
        let mf_part = (string::new_truncate("mf"), string::new_truncate("participant"));
        let msm_part = (
            string::new_truncate("msm"),
            string::new_truncate("participant"),
        );

        let males: Vec<Uid> = {
            let people = &state.people;
            (0..people.len())
                .filter(|&row| {
                    !people.female[row]
                        && match upper_age {
                            Some(upper) => people.age[row] < upper,
                            None => true,
                        }
                })
                .map(|row| people.uid[row])
                .collect()
        };
        if males.is_empty() {
            return Ok(());
        }
        let male_rows: Vec<usize> = males
            .iter()
            .filter_map(|&uid| state.people.row_of(uid).ok())
            .collect();
        state.people.storage.set_bool_at(&mf_part, &male_rows, false)?;
        state
            .people
            .storage
            .set_bool_at(&msm_part, &male_rows, false)?;

        // who participates in the msm network at all
        let msm_uids = state.streams.get_mut(self.rng_msm)?.bernoulli_filter(
            self.pars.msm_part_rate,
            &males,
            &state.people,
        )?;
        // the bisexual share joins the mf network as well
        let bi_uids = state.streams.get_mut(self.rng_bi)?.bernoulli_filter(
            self.pars.prop_bi,
            &msm_uids,
            &state.people,
        )?;
        // fill the mf network up to its target from the remaining males
        let mf_excl_set: Vec<Uid> = males
            .iter()
            .copied()
            .filter(|uid| !msm_uids.contains(uid))
            .collect();
        let remaining_pr = if mf_excl_set.is_empty() {
            0.
        } else {
            (self.pars.mf_part_rate * males.len() as Float - bi_uids.len() as Float).max(0.)
                / mf_excl_set.len() as Float
        };
        let mf_excl_uids = state.streams.get_mut(self.rng_excl)?.bernoulli_filter(
            remaining_pr,
            &mf_excl_set,
            &state.people,
        )?;

        let to_rows = |uids: &[Uid], state: &SimState| -> Vec<usize> {
            uids.iter()
                .filter_map(|&uid| state.people.row_of(uid).ok())
                .collect()
        };
        let msm_rows = to_rows(&msm_uids, state);
        state.people.storage.set_bool_at(&msm_part, &msm_rows, true)?;
        let bi_rows = to_rows(&bi_uids, state);
        state.people.storage.set_bool_at(&mf_part, &bi_rows, true)?;
        let excl_rows = to_rows(&mf_excl_uids, state);
        state.people.storage.set_bool_at(&mf_part, &excl_rows, true)?;
        Ok(())
    }
}

impl NetConnector for MfMsm {
    fn name(&self) -> ModName {
        self.name
    }

    fn init(&mut self, state: &mut SimState) -> Result<()> {
        self.rng_msm = state.streams.register_single("mf_msm_sel")?;
        self.rng_bi = state.streams.register("mf_msm_bi")?;
        self.rng_excl = state.streams.register("mf_msm_excl")?;
        if state.clock == 0 {
            self.set_participation(state, None)?;
        }
        Ok(())
    }

    fn update(&mut self, state: &mut SimState) -> Result<()> {
        let dt = state.params.dt;
        self.set_participation(state, Some(dt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{MfNet, MfPars, MsmNet, MsmPars, Network};
    use crate::SimParams;

    #[test]
    fn male_participation_is_coordinated() {
        let mut params = SimParams::default();
        params.n_agents = 400;
        params.rand_seed = 11;
        let mut state = crate::sim::SimState::bare(params);
        state.streams.step(0);
        for row in 0..state.people.len() {
            state.people.age[row] = 30.;
            state.people.female[row] = row % 2 == 0;
        }
        let mut mf = MfNet::new(MfPars::default());
        let mut msm = MsmNet::new(MsmPars::default());
        mf.init(&mut state).unwrap();
        msm.init(&mut state).unwrap();

        let mut connector = MfMsm::new(MfMsmPars::default());
        connector.init(&mut state).unwrap();

        let mf_part = state
            .people
            .storage
            .get_bool(&(string::new_truncate("mf"), string::new_truncate("participant")))
            .unwrap();
        let msm_part = state
            .people
            .storage
            .get_bool(&(string::new_truncate("msm"), string::new_truncate("participant")))
            .unwrap();

        let mut n_males = 0;
        let mut n_msm = 0;
        for row in 0..state.people.len() {
            if state.people.female[row] {
                // female msm participation was not touched by the connector
                continue;
            }
            n_males += 1;
            if msm_part[row] {
                n_msm += 1;
            }
        }
        // roughly one male in ten participates in the msm network
        assert!(n_msm > 0 && n_msm < n_males / 4, "n_msm = {}", n_msm);
        // most males participate in the mf network
        let n_mf = (0..state.people.len())
            .filter(|&row| !state.people.female[row] && mf_part[row])
            .count();
        assert!(n_mf > n_males / 2, "n_mf = {}", n_mf);
    }
}
