//! Interventions and the products they deliver.

use crate::error::Result;
use crate::people::Var;
use crate::rng::StreamId;
use crate::sim::SimState;
use crate::{string, Float, ModName, Uid};

/// An intervention modifies simulation state at specified times, applied
/// every step before disease updates.
pub trait Intervention {
    fn name(&self) -> ModName;

    fn init(&mut self, state: &mut SimState) -> Result<()>;

    fn apply(&mut self, state: &mut SimState) -> Result<()>;
}

/// The payload delivered by an intervention to a set of agents.
pub trait Product {
    fn administer(&self, state: &mut SimState, uids: &[Uid]) -> Result<()>;
}

fn default_efficacy() -> Float {
    0.9
}

/// A leaky vaccine: recipients' relative susceptibility to the target
/// disease is multiplied by `1 - efficacy`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaccineProduct {
    /// Name of the disease module the vaccine protects against
    pub disease: String,
    #[serde(default = "default_efficacy")]
    pub efficacy: Float,
}

impl Product for VaccineProduct {
    fn administer(&self, state: &mut SimState, uids: &[Uid]) -> Result<()> {
        let idx = (
            string::new_truncate(&self.disease),
            string::new_truncate("rel_sus"),
        );
        let rows: Vec<usize> = uids
            .iter()
            .filter_map(|&uid| state.people.row_of(uid).ok())
            .collect();
        let rel_sus = state.people.storage.get_float_mut(&idx)?;
        for &row in &rows {
            rel_sus[row] *= 1. - self.efficacy;
        }
        Ok(())
    }
}

fn default_prob() -> Float {
    0.9
}
fn default_max_age() -> Float {
    1.
}

/// Parameters of the routine vaccination intervention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutineVxPars {
    /// First year doses are given
    pub start: Float,
    /// Year vaccination stops, open-ended when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<Float>,
    /// Per-eligible-agent probability of receiving a dose each timestep
    #[serde(default = "default_prob")]
    pub prob: Float,
    /// Eligible age window
    #[serde(default)]
    pub min_age: Float,
    #[serde(default = "default_max_age")]
    pub max_age: Float,
    pub product: VaccineProduct,
}

/// Routine vaccination: from `start` onward, unvaccinated agents in the
/// eligible age window receive the product with probability `prob` per
/// timestep.
pub struct RoutineVx {
    name: ModName,
    pars: RoutineVxPars,
    rng_doses: StreamId,
}

impl RoutineVx {
    pub fn new(pars: RoutineVxPars) -> Self {
        RoutineVx {
            name: string::new_truncate("routinevx"),
            pars,
            rng_doses: StreamId::INVALID,
        }
    }

    fn vaccinated_idx(&self) -> (ModName, ModName) {
        (self.name, string::new_truncate("vaccinated"))
    }

    fn ti_idx(&self) -> (ModName, ModName) {
        (self.name, string::new_truncate("ti_vaccinated"))
    }
}

impl Intervention for RoutineVx {
    fn name(&self) -> ModName {
        self.name
    }

    fn init(&mut self, state: &mut SimState) -> Result<()> {
        let len = state.people.len();
        state
            .people
            .storage
            .register(self.vaccinated_idx(), Var::Bool(false), len);
        state
            .people
            .storage
            .register(self.ti_idx(), Var::Float(Float::NAN), len);
        self.rng_doses = state.streams.register("routinevx_doses")?;
        state.results.new_series(self.name.as_str(), "n_doses");
        state.results.new_series(self.name.as_str(), "cum_doses");
        Ok(())
    }

    fn apply(&mut self, state: &mut SimState) -> Result<()> {
        let ti = state.clock;
        let year = state.params.year(ti);
        if year < self.pars.start {
            return Ok(());
        }
        if let Some(end) = self.pars.end {
            if year >= end {
                return Ok(());
            }
        }

        let eligible: Vec<Uid> = {
            let vaccinated = state.people.storage.get_bool(&self.vaccinated_idx())?;
            let people = &state.people;
            (0..people.len())
                .filter(|&row| {
                    people.alive[row]
                        && !vaccinated[row]
                        && people.age[row] >= self.pars.min_age
                        && people.age[row] < self.pars.max_age
                })
                .map(|row| people.uid[row])
                .collect()
        };
        let recipients = state.streams.get_mut(self.rng_doses)?.bernoulli_filter(
            self.pars.prob,
            &eligible,
            &state.people,
        )?;
        if recipients.is_empty() {
            state.results.set(self.name.as_str(), "n_doses", ti, 0.)?;
        } else {
            self.pars.product.administer(state, &recipients)?;
            let rows: Vec<usize> = recipients
                .iter()
                .filter_map(|&uid| state.people.row_of(uid).ok())
                .collect();
            state
                .people
                .storage
                .set_bool_at(&self.vaccinated_idx(), &rows, true)?;
            state
                .people
                .storage
                .set_float_at(&self.ti_idx(), &rows, ti as Float)?;
            debug!("{}: administered {} doses", self.name, recipients.len());
            state.results.set(
                self.name.as_str(),
                "n_doses",
                ti,
                state.people.scale_flows(&recipients),
            )?;
        }
        let cum = state
            .results
            .cumulative_to(self.name.as_str(), "n_doses", ti)?;
        state.results.set(self.name.as_str(), "cum_doses", ti, cum)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disease::{Disease, Sir, SirPars};
    use crate::SimParams;

    fn test_state(n: u32) -> SimState {
        let mut params = SimParams::default();
        params.n_agents = n;
        params.rand_seed = 5;
        let mut state = crate::sim::SimState::bare(params);
        state.streams.step(0);
        state
    }

    fn vx(start: Float, prob: Float, efficacy: Float) -> RoutineVx {
        RoutineVx::new(RoutineVxPars {
            start,
            end: None,
            prob,
            min_age: 0.,
            max_age: 200.,
            product: VaccineProduct {
                disease: "sir".to_string(),
                efficacy,
            },
        })
    }

    #[test]
    fn doses_wait_for_the_start_year() {
        let mut state = test_state(20);
        let mut sir = Sir::new(SirPars::default());
        sir.init(&mut state).unwrap();
        // default start year is 2000; doses begin in 2010
        let mut intervention = vx(2010., 1., 0.9);
        intervention.init(&mut state).unwrap();

        state.streams.step(0);
        intervention.apply(&mut state).unwrap();
        let vaccinated = state
            .people
            .storage
            .get_bool(&intervention.vaccinated_idx())
            .unwrap();
        assert_eq!(vaccinated.iter().filter(|&&v| v).count(), 0);

        state.clock = 10;
        state.streams.step(10);
        intervention.apply(&mut state).unwrap();
        let vaccinated = state
            .people
            .storage
            .get_bool(&intervention.vaccinated_idx())
            .unwrap();
        assert_eq!(vaccinated.iter().filter(|&&v| v).count(), 20);
        assert_eq!(state.results.at("routinevx", "n_doses", 10).unwrap(), 20.);
    }

    #[test]
    fn full_efficacy_zeroes_susceptibility() {
        let mut state = test_state(10);
        let mut sir = Sir::new(SirPars::default());
        sir.init(&mut state).unwrap();
        let mut intervention = vx(2000., 1., 1.);
        intervention.init(&mut state).unwrap();

        state.streams.step(0);
        intervention.apply(&mut state).unwrap();
        let rel_sus = state
            .people
            .storage
            .get_float(&(
                string::new_truncate("sir"),
                string::new_truncate("rel_sus"),
            ))
            .unwrap();
        assert!(rel_sus.iter().all(|&r| r == 0.));
    }

    #[test]
    fn agents_are_vaccinated_at_most_once() {
        let mut state = test_state(10);
        let mut sir = Sir::new(SirPars::default());
        sir.init(&mut state).unwrap();
        let mut intervention = vx(2000., 1., 0.5);
        intervention.init(&mut state).unwrap();

        state.streams.step(0);
        intervention.apply(&mut state).unwrap();
        state.clock = 1;
        state.streams.step(1);
        intervention.apply(&mut state).unwrap();

        // a second pass finds nobody eligible, so rel_sus was only
        // multiplied down once
        let rel_sus = state
            .people
            .storage
            .get_float(&(
                string::new_truncate("sir"),
                string::new_truncate("rel_sus"),
            ))
            .unwrap();
        assert!(rel_sus.iter().all(|&r| (r - 0.5).abs() < 1e-12));
        assert_eq!(state.results.at("routinevx", "n_doses", 1).unwrap(), 0.);
    }
}
