//! Connectors coupling the states of two disease modules.

use crate::error::Result;
use crate::sim::SimState;
use crate::{string, Float, ModName};

/// A connector between diseases, run after transmission each step.
pub trait Connector {
    fn name(&self) -> ModName;

    fn init(&mut self, state: &mut SimState) -> Result<()>;

    fn update(&mut self, state: &mut SimState) -> Result<()>;
}

fn default_rel_sus_hiv() -> Float {
    2.
}

/// Parameters of the HIV-gonorrhea coupling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HivGonorrheaPars {
    /// Relative gonorrhea susceptibility of HIV-positive agents
    #[serde(default = "default_rel_sus_hiv")]
    pub rel_sus_hiv: Float,
}

impl Default for HivGonorrheaPars {
    fn default() -> Self {
        HivGonorrheaPars {
            rel_sus_hiv: default_rel_sus_hiv(),
        }
    }
}

/// HIV infection raises susceptibility to gonorrhea.
///
/// Every step, gonorrhea's `rel_sus` is set to `rel_sus_hiv` for agents
/// living with HIV and back to 1 for everyone else, so the coupling also
/// releases when it no longer applies.
pub struct HivGonorrhea {
    name: ModName,
    pars: HivGonorrheaPars,
}

impl HivGonorrhea {
    pub fn new(pars: HivGonorrheaPars) -> Self {
        HivGonorrhea {
            name: string::new_truncate("hiv_gonorrhea"),
            pars,
        }
    }
}

impl Connector for HivGonorrhea {
    fn name(&self) -> ModName {
        self.name
    }

    fn init(&mut self, _state: &mut SimState) -> Result<()> {
        Ok(())
    }

    fn update(&mut self, state: &mut SimState) -> Result<()> {
        let hiv_infected = state
            .people
            .storage
            .get_bool(&(
                string::new_truncate("hiv"),
                string::new_truncate("infected"),
            ))?
            .clone();
        let rel_sus = state.people.storage.get_float_mut(&(
            string::new_truncate("gonorrhea"),
            string::new_truncate("rel_sus"),
        ))?;
        for (row, &positive) in hiv_infected.iter().enumerate() {
            rel_sus[row] = if positive { self.pars.rel_sus_hiv } else { 1. };
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disease::{Disease, Gonorrhea, GonorrheaPars, Hiv, HivPars};
    use crate::SimParams;

    #[test]
    fn hiv_raises_gonorrhea_susceptibility() {
        let mut params = SimParams::default();
        params.n_agents = 20;
        params.rand_seed = 2;
        let mut state = crate::sim::SimState::bare(params);
        state.streams.step(0);

        let mut hiv_pars = HivPars::default();
        hiv_pars.initial = Some(5);
        let mut hiv = Hiv::new(hiv_pars);
        hiv.init(&mut state).unwrap();
        let mut gon_pars = GonorrheaPars::default();
        gon_pars.initial = Some(0);
        let mut gon = Gonorrhea::new(gon_pars);
        gon.init(&mut state).unwrap();

        let mut connector = HivGonorrhea::new(HivGonorrheaPars::default());
        connector.init(&mut state).unwrap();
        connector.update(&mut state).unwrap();

        let hiv_infected = state
            .people
            .storage
            .get_bool(&(
                string::new_truncate("hiv"),
                string::new_truncate("infected"),
            ))
            .unwrap();
        let rel_sus = state
            .people
            .storage
            .get_float(&(
                string::new_truncate("gonorrhea"),
                string::new_truncate("rel_sus"),
            ))
            .unwrap();
        for row in 0..state.people.len() {
            let expected = if hiv_infected[row] { 2. } else { 1. };
            assert_eq!(rel_sus[row], expected);
        }
        assert_eq!(hiv_infected.iter().filter(|&&i| i).count(), 5);
    }
}
