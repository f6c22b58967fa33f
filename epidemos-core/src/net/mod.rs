//! Contact networks connecting people within the population.
//!
//! Edge data ([`Edges`]) lives in the simulation state, keyed by network
//! name in [`Networks`], and is what gets snapshotted. The [`Network`]
//! implementations are logic objects rebuilt from the scenario; they own
//! their parameter sets and stream handles and operate on the shared
//! state.

mod connector;
mod maternal;
mod random;
mod sexual;

pub use self::connector::{MfMsm, MfMsmPars, NetConnector};
pub use self::maternal::{MaternalNet, MaternalPars};
pub use self::random::{RandomNet, RandomNetPars};
pub use self::sexual::{EmbeddingNet, EmbeddingPars, MfNet, MfPars, MsmNet, MsmPars};

use linked_hash_map::LinkedHashMap;

use crate::error::{Error, Result};
use crate::people::People;
use crate::sim::SimState;
use crate::{Float, NetName, Uid};

/// A single network of contact edges between people.
///
/// All vectors are parallel: edge `i` connects `p1[i]` and `p2[i]` with
/// relative transmissibility `beta[i]` for `dur[i]` remaining years. On
/// vertical networks transmission only flows from `p1` to `p2`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Edges {
    pub p1: Vec<Uid>,
    pub p2: Vec<Uid>,
    pub beta: Vec<Float>,
    pub dur: Vec<Float>,
    pub vertical: bool,
}

impl Edges {
    pub fn new(vertical: bool) -> Self {
        Edges {
            vertical,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.p1.len()
    }

    pub fn is_empty(&self) -> bool {
        self.p1.is_empty()
    }

    /// Appends one edge.
    pub fn push(&mut self, p1: Uid, p2: Uid, beta: Float, dur: Float) {
        self.p1.push(p1);
        self.p2.push(p2);
        self.beta.push(beta);
        self.dur.push(dur);
    }

    /// Appends a batch of edges; all slices must be the same length.
    pub fn extend(&mut self, p1: &[Uid], p2: &[Uid], beta: &[Float], dur: &[Float]) {
        debug_assert!(p1.len() == p2.len() && p1.len() == beta.len() && p1.len() == dur.len());
        self.p1.extend_from_slice(p1);
        self.p2.extend_from_slice(p2);
        self.beta.extend_from_slice(beta);
        self.dur.extend_from_slice(dur);
    }

    /// Drops all edges.
    pub fn clear(&mut self) {
        self.p1.clear();
        self.p2.clear();
        self.beta.clear();
        self.dur.clear();
    }

    /// Checks the integrity of the edge list: all columns equally long.
    pub fn validate(&self) -> Result<()> {
        let n = self.p1.len();
        if self.p2.len() != n || self.beta.len() != n || self.dur.len() != n {
            return Err(Error::Other(format!(
                "edge list columns disagree on length: p1={}, p2={}, beta={}, dur={}",
                self.p1.len(),
                self.p2.len(),
                self.beta.len(),
                self.dur.len()
            )));
        }
        Ok(())
    }

    /// Sorted unique list of all agents appearing in the network.
    pub fn members(&self) -> Vec<Uid> {
        let mut out: Vec<Uid> = self.p1.iter().chain(self.p2.iter()).copied().collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Whether the agent appears in any edge.
    pub fn contains(&self, uid: Uid) -> bool {
        self.p1.contains(&uid) || self.p2.contains(&uid)
    }

    /// All contacts of the given agents, as a sorted unique array.
    ///
    /// Contacts are bidirectional, so both columns are checked. An agent
    /// paired with another agent from `inds` will itself appear in the
    /// output.
    pub fn find_contacts(&self, inds: &[Uid]) -> Vec<Uid> {
        let mut out = Vec::new();
        for i in 0..self.len() {
            if inds.contains(&self.p1[i]) {
                out.push(self.p2[i]);
            }
            if inds.contains(&self.p2[i]) {
                out.push(self.p1[i]);
            }
        }
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Keeps only the edges where `mask` is true.
    pub fn retain(&mut self, mask: &[bool]) {
        debug_assert_eq!(mask.len(), self.len());
        let keep: Vec<usize> = (0..self.len()).filter(|&i| mask[i]).collect();
        self.p1 = keep.iter().map(|&i| self.p1[i]).collect();
        self.p2 = keep.iter().map(|&i| self.p2[i]).collect();
        self.beta = keep.iter().map(|&i| self.beta[i]).collect();
        self.dur = keep.iter().map(|&i| self.dur[i]).collect();
    }

    /// Removes all edges involving the given agents.
    pub fn remove_uids(&mut self, uids: &[Uid]) {
        let mask: Vec<bool> = (0..self.len())
            .map(|i| !uids.contains(&self.p1[i]) && !uids.contains(&self.p2[i]))
            .collect();
        self.retain(&mask);
    }

    /// Ages all edges by `dt` and drops the expired ones along with any
    /// edge touching a dead agent.
    pub fn end_pairs(&mut self, dt: Float, people: &People) {
        for dur in self.dur.iter_mut() {
            *dur -= dt;
        }
        let mask: Vec<bool> = (0..self.len())
            .map(|i| {
                self.dur[i] > 0.
                    && people
                        .row_of(self.p1[i])
                        .map(|row| people.alive[row])
                        .unwrap_or(false)
                    && people
                        .row_of(self.p2[i])
                        .map(|row| people.alive[row])
                        .unwrap_or(false)
            })
            .collect();
        self.retain(&mask);
    }
}

/// Edge data of all networks in a simulation, in scenario order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Networks {
    map: LinkedHashMap<NetName, Edges>,
}

impl Networks {
    pub fn new() -> Self {
        Networks {
            map: LinkedHashMap::new(),
        }
    }

    /// Creates an empty edge list for the network; a no-op if present.
    pub fn insert(&mut self, name: NetName, vertical: bool) {
        self.map.entry(name).or_insert_with(|| Edges::new(vertical));
    }

    pub fn has(&self, name: &NetName) -> bool {
        self.map.contains_key(name)
    }

    pub fn get(&self, name: &NetName) -> Result<&Edges> {
        self.map.get(name).ok_or(Error::NoNetwork(*name))
    }

    pub fn get_mut(&mut self, name: &NetName) -> Result<&mut Edges> {
        self.map.get_mut(name).ok_or(Error::NoNetwork(*name))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NetName, &Edges)> {
        self.map.iter()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Removes all edges involving the given agents, across every network.
    pub fn remove_uids(&mut self, uids: &[Uid]) {
        for (_, edges) in self.map.iter_mut() {
            edges.remove_uids(uids);
        }
    }
}

/// A network module: owns the pair-formation logic for one named edge
/// list in the simulation state.
pub trait Network {
    fn name(&self) -> NetName;

    /// Registers edge data, states and streams; forms initial pairs.
    fn init(&mut self, state: &mut SimState) -> Result<()>;

    /// Evolves pairs for one timestep.
    fn update(&mut self, state: &mut SimState) -> Result<()>;
}
