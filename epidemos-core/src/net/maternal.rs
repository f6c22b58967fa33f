//! Maternal (vertical transmission) network.

use crate::error::Result;
use crate::net::Network;
use crate::sim::SimState;
use crate::{string, NetName};

/// Parameters of the maternal network. The network starts empty and is
/// filled with mother-child connections by the pregnancy module.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaternalPars {}

/// Vertical network connecting pregnant women to their unborn children.
///
/// Transmission only flows from mother (`p1`) to child (`p2`). When a
/// connection's duration lapses (end of the postpartum period) its beta is
/// zeroed but the edge is kept.
pub struct MaternalNet {
    name: NetName,
}

impl MaternalNet {
    pub fn new(_pars: MaternalPars) -> Self {
        MaternalNet {
            name: string::new_truncate("maternal"),
        }
    }
}

impl Network for MaternalNet {
    fn name(&self) -> NetName {
        self.name
    }

    fn init(&mut self, state: &mut SimState) -> Result<()> {
        // no pairs added upon initialization
        state.networks.insert(self.name, true);
        Ok(())
    }

    fn update(&mut self, state: &mut SimState) -> Result<()> {
        let dt = state.params.dt;
        let edges = state.networks.get_mut(&self.name)?;
        for i in 0..edges.len() {
            edges.dur[i] -= dt;
            if edges.dur[i] <= 0. {
                edges.beta[i] = 0.;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimParams;

    #[test]
    fn lapsed_connections_lose_beta_but_remain() {
        let mut state = SimState::bare(SimParams::default());
        let mut net = MaternalNet::new(MaternalPars::default());
        net.init(&mut state).unwrap();

        {
            let edges = state.networks.get_mut(&net.name()).unwrap();
            edges.push(0, 1, 1., 0.5);
            edges.push(2, 3, 1., 2.);
        }
        net.update(&mut state).unwrap();

        let edges = state.networks.get(&net.name()).unwrap();
        assert!(edges.vertical);
        assert_eq!(edges.len(), 2);
        assert_eq!(edges.beta[0], 0.);
        assert_eq!(edges.beta[1], 1.);
    }
}
