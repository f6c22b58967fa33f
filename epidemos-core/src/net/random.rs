//! Random mixing network.

use crate::dist::Dist;
use crate::error::Result;
use crate::net::Network;
use crate::rng::StreamId;
use crate::sim::SimState;
use crate::{string, NetName, Uid};

fn default_n_contacts() -> Dist {
    Dist::Poisson { lam: 10. }
}

/// Parameters of the random mixing network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomNetPars {
    /// Number of contacts per agent per timestep
    #[serde(default = "default_n_contacts")]
    pub n_contacts: Dist,
}

impl Default for RandomNetPars {
    fn default() -> Self {
        RandomNetPars {
            n_contacts: default_n_contacts(),
        }
    }
}

/// A network that rewires completely every timestep: each living agent
/// draws a contact count and the resulting stubs are shuffled and paired.
pub struct RandomNet {
    name: NetName,
    pars: RandomNetPars,
    rng_contacts: StreamId,
    rng_shuffle: StreamId,
}

impl RandomNet {
    pub fn new(pars: RandomNetPars) -> Self {
        RandomNet {
            name: string::new_truncate("random"),
            pars,
            rng_contacts: StreamId::INVALID,
            rng_shuffle: StreamId::INVALID,
        }
    }

    fn add_pairs(&mut self, state: &mut SimState) -> Result<usize> {
        let dt = state.params.dt;
        let alive = state.people.alive_uids();
        if alive.len() < 2 {
            return Ok(0);
        }
        let counts = state
            .streams
            .get_mut(self.rng_contacts)?
            .sample_for(&self.pars.n_contacts, &alive, &state.people)?;

        let mut stubs: Vec<Uid> = Vec::new();
        for (&uid, &count) in alive.iter().zip(&counts) {
            for _ in 0..count.max(0.) as usize {
                stubs.push(uid);
            }
        }
        state
            .streams
            .get_mut(self.rng_shuffle)?
            .shuffle(&mut stubs)?;

        let edges = state.networks.get_mut(&self.name)?;
        let mut added = 0;
        for pair in stubs.chunks_exact(2) {
            if pair[0] == pair[1] {
                continue;
            }
            edges.push(pair[0], pair[1], 1., dt);
            added += 1;
        }
        trace!("{}: formed {} pairs", self.name, added);
        Ok(added)
    }
}

impl Network for RandomNet {
    fn name(&self) -> NetName {
        self.name
    }

    fn init(&mut self, state: &mut SimState) -> Result<()> {
        let restored = state.networks.has(&self.name);
        state.networks.insert(self.name, false);
        self.rng_contacts = state.streams.register("random_contacts")?;
        self.rng_shuffle = state.streams.register_single("random_shuffle")?;
        if !restored {
            self.add_pairs(state)?;
        }
        Ok(())
    }

    fn update(&mut self, state: &mut SimState) -> Result<()> {
        // the network is memoryless: discard last step's edges wholesale
        state.networks.get_mut(&self.name)?.clear();
        self.add_pairs(state)?;
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
        let mut state = SimState::bare(params);
        state.streams.step(0);
        state
    }

    #[test]
    fn pairs_form_among_the_living() {
        let mut state = test_state(50);
        for row in 40..50 {
            state.people.alive[row] = false;
        }
        let mut net = RandomNet::new(RandomNetPars::default());
        net.init(&mut state).unwrap();

        let edges = state.networks.get(&net.name()).unwrap();
        assert!(!edges.is_empty());
        for i in 0..edges.len() {
            assert_ne!(edges.p1[i], edges.p2[i]);
            assert!(edges.p1[i] < 40);
            assert!(edges.p2[i] < 40);
        }
    }

    #[test]
    fn update_rewires_the_network() {
        let mut state = test_state(30);
        let mut net = RandomNet::new(RandomNetPars::default());
        net.init(&mut state).unwrap();
        let before: Vec<Uid> = state.networks.get(&net.name()).unwrap().p1.clone();

        state.streams.step(1);
        net.update(&mut state).unwrap();
        let after: Vec<Uid> = state.networks.get(&net.name()).unwrap().p1.clone();
        assert!(!after.is_empty());
        assert_ne!(before, after);
    }

    #[test]
    fn zero_contacts_means_no_edges() {
        let mut state = test_state(30);
        let mut net = RandomNet::new(RandomNetPars {
            n_contacts: Dist::Constant { v: 0. },
        });
        net.init(&mut state).unwrap();
        assert!(state.networks.get(&net.name()).unwrap().is_empty());
    }
}
