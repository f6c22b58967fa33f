//! Disease transmission modules.

mod cholera;
mod ebola;
mod gonorrhea;
mod hiv;
mod sir;

pub use self::cholera::{Cholera, CholeraPars};
pub use self::ebola::{Ebola, EbolaPars};
pub use self::gonorrhea::{Gonorrhea, GonorrheaPars};
pub use self::hiv::{Art, ArtPars, Cd4Analyzer, Hiv, HivPars};
pub use self::sir::{Sir, SirPars};

use linked_hash_map::LinkedHashMap;

use crate::error::Result;
use crate::people::{StorageIndex, Var};
use crate::rng::StreamId;
use crate::sim::SimState;
use crate::{string, Float, ModName, Uid};

/// A disease module.
///
/// The step loop calls `update_states` (progression of existing cases)
/// before `make_new_cases` (transmission) on every disease, then
/// `update_results` after all modules have run. `update_death` is invoked
/// with the agents who died during the step, whatever the cause.
pub trait Disease {
    fn name(&self) -> ModName;

    fn init(&mut self, state: &mut SimState) -> Result<()>;

    /// Progression of existing cases at the current timestep.
    fn update_states(&mut self, state: &mut SimState) -> Result<()>;

    /// Transmission: finds new cases and sets their prognoses.
    fn make_new_cases(&mut self, state: &mut SimState) -> Result<()>;

    /// Applies infection outcomes to the given agents.
    fn set_prognoses(&mut self, state: &mut SimState, uids: &[Uid]) -> Result<()>;

    /// Clears disease states for agents who died this step.
    fn update_death(&mut self, _state: &mut SimState, _uids: &[Uid]) -> Result<()> {
        Ok(())
    }

    fn update_results(&mut self, state: &mut SimState) -> Result<()>;
}

/// Per-network transmissibility, either symmetric or per-direction
/// `[p1 -> p2, p2 -> p1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BetaSpec {
    Scalar(Float),
    Pair([Float; 2]),
}

impl BetaSpec {
    pub fn pair(&self) -> [Float; 2] {
        match *self {
            BetaSpec::Scalar(v) => [v, v],
            BetaSpec::Pair(p) => p,
        }
    }
}

/// How initial infections are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Seeding {
    /// Exact number of initial cases
    Count(u32),
    /// Per-agent probability of starting infected
    Prev(Float),
}

/// Resolves the `initial` / `init_prev` parameter pair into a seeding
/// strategy; a prevalence, when given, wins over a count.
pub(crate) fn resolve_seeding(
    initial: Option<u32>,
    init_prev: Option<Float>,
    fallback: Seeding,
) -> Seeding {
    match (init_prev, initial) {
        (Some(p), _) => Seeding::Prev(p),
        (None, Some(k)) => Seeding::Count(k),
        (None, None) => fallback,
    }
}

/// The machinery every transmissible disease shares: susceptible/infected
/// bookkeeping, seeding, and edge-based transmission over the networks
/// named in `beta`.
///
/// Diseases embed this and layer their natural history on top.
pub struct InfectionCore {
    pub name: ModName,
    pub beta: LinkedHashMap<String, BetaSpec>,
    pub seeding: Seeding,
    rng_init: StreamId,
    rng_trans: StreamId,
}

impl InfectionCore {
    pub fn new(name: &str, beta: LinkedHashMap<String, BetaSpec>, seeding: Seeding) -> Self {
        InfectionCore {
            name: string::new_truncate(name),
            beta,
            seeding,
            rng_init: StreamId::INVALID,
            rng_trans: StreamId::INVALID,
        }
    }

    pub fn idx(&self, state_name: &str) -> StorageIndex {
        (self.name, string::new_truncate(state_name))
    }

    /// Registers base states, streams and result series. Returns false if
    /// the state was restored from a snapshot and seeding must be skipped.
    pub fn wire(&mut self, state: &mut SimState) -> Result<bool> {
        let fresh = !state.people.storage.has(&self.idx("susceptible"));
        let len = state.people.len();
        let storage = &mut state.people.storage;
        storage.register(self.idx("susceptible"), Var::Bool(true), len);
        storage.register(self.idx("infected"), Var::Bool(false), len);
        storage.register(self.idx("ti_infected"), Var::Float(Float::NAN), len);
        storage.register(self.idx("rel_sus"), Var::Float(1.), len);
        storage.register(self.idx("rel_trans"), Var::Float(1.), len);

        self.rng_init = state.streams.register(&format!("{}_init", self.name))?;
        self.rng_trans = state.streams.register(&format!("{}_trans", self.name))?;

        for series in &[
            "n_susceptible",
            "n_infected",
            "prevalence",
            "new_infections",
            "cum_infections",
        ] {
            state.results.new_series(self.name.as_str(), series);
        }
        Ok(fresh)
    }

    /// Chooses the initial cases among the living.
    ///
    /// A prevalence draws one Bernoulli trial per agent; an exact count
    /// ranks one uniform draw per agent and takes the lowest, which keeps
    /// the selection aligned between simulations.
    pub fn seed_infections(&mut self, state: &mut SimState) -> Result<Vec<Uid>> {
        let alive = state.people.alive_uids();
        let seeded = match self.seeding {
            Seeding::Prev(p) => state.streams.get_mut(self.rng_init)?.bernoulli_filter(
                p,
                &alive,
                &state.people,
            )?,
            Seeding::Count(k) => {
                let draws = state
                    .streams
                    .get_mut(self.rng_init)?
                    .random_for(&alive, &state.people)?;
                let mut ranked: Vec<(Float, Uid)> =
                    draws.into_iter().zip(alive.iter().copied()).collect();
                ranked.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
                ranked
                    .into_iter()
                    .take(k as usize)
                    .map(|(_, uid)| uid)
                    .collect()
            }
        };
        info!("{}: seeded {} initial infections", self.name, seeded.len());
        Ok(seeded)
    }

    /// Edge-based transmission over all networks with a beta entry, with
    /// the infected-and-alive as sources.
    pub fn transmission(&mut self, state: &mut SimState) -> Result<Vec<Uid>> {
        let infected = state.people.storage.get_bool(&self.idx("infected"))?;
        let mask: Vec<bool> = (0..state.people.len())
            .map(|row| infected[row] && state.people.alive[row])
            .collect();
        self.transmission_from(state, &mask)
    }

    /// Edge-based transmission with an explicit row mask of infectious
    /// sources, for diseases whose infectious set differs from the
    /// infected state (incubation, post-mortem transmission).
    ///
    /// For every edge and direction, a source in the mask exposes a
    /// susceptible living target with probability
    /// `beta * edge.beta * rel_trans[src] * rel_sus[dst]`; multiple
    /// exposures of one target combine independently. Returns the uids of
    /// the new cases.
    pub fn transmission_from(
        &mut self,
        state: &mut SimState,
        infectious: &[bool],
    ) -> Result<Vec<Uid>> {
        let susceptible = state.people.storage.get_bool(&self.idx("susceptible"))?;
        let rel_sus = state.people.storage.get_float(&self.idx("rel_sus"))?;
        let rel_trans = state.people.storage.get_float(&self.idx("rel_trans"))?;
        let people = &state.people;

        let mut escape: LinkedHashMap<Uid, Float> = LinkedHashMap::new();
        for (net_name, spec) in &self.beta {
            let net_id = string::new_truncate(net_name);
            let edges = match state.networks.get(&net_id) {
                Ok(edges) => edges,
                Err(_) => {
                    warn!(
                        "{}: beta references unknown network: {}",
                        self.name, net_name
                    );
                    continue;
                }
            };
            let [fwd, bwd] = spec.pair();
            for i in 0..edges.len() {
                let directions: [(Uid, Uid, Float); 2] = [
                    (edges.p1[i], edges.p2[i], fwd),
                    (edges.p2[i], edges.p1[i], if edges.vertical { 0. } else { bwd }),
                ];
                for &(src, dst, b) in &directions {
                    if b <= 0. || edges.beta[i] <= 0. {
                        continue;
                    }
                    let src_row = match people.row_of(src) {
                        Ok(row) => row,
                        Err(_) => continue,
                    };
                    let dst_row = match people.row_of(dst) {
                        Ok(row) => row,
                        Err(_) => continue,
                    };
                    if !infectious[src_row] {
                        continue;
                    }
                    if !people.alive[dst_row] || !susceptible[dst_row] {
                        continue;
                    }
                    let p = (b * edges.beta[i] * rel_trans[src_row] * rel_sus[dst_row])
                        .max(0.)
                        .min(1.);
                    let entry = escape.entry(dst).or_insert(1.);
                    *entry *= 1. - p;
                }
            }
        }

        if escape.is_empty() {
            return Ok(Vec::new());
        }
        let (uids, probs): (Vec<Uid>, Vec<Float>) = escape
            .into_iter()
            .map(|(uid, esc)| (uid, 1. - esc))
            .unzip();
        let new_cases = state
            .streams
            .get_mut(self.rng_trans)?
            .filter_by_prob(&uids, &probs, &state.people)?;
        if !new_cases.is_empty() {
            debug!("{}: {} new cases", self.name, new_cases.len());
        }
        Ok(new_cases)
    }

    /// Marks the given agents infected as of the current timestep.
    pub fn mark_infected(&self, state: &mut SimState, uids: &[Uid]) -> Result<()> {
        let rows: Vec<usize> = uids
            .iter()
            .filter_map(|&uid| state.people.row_of(uid).ok())
            .collect();
        let ti = state.clock as Float;
        let storage = &mut state.people.storage;
        storage.set_bool_at(&self.idx("susceptible"), &rows, false)?;
        storage.set_bool_at(&self.idx("infected"), &rows, true)?;
        storage.set_float_at(&self.idx("ti_infected"), &rows, ti)?;
        Ok(())
    }

    /// Updates the shared result series at the current timestep.
    pub fn update_base_results(&self, state: &mut SimState) -> Result<()> {
        let ti = state.clock;
        let susceptible = state.people.storage.get_bool(&self.idx("susceptible"))?;
        let infected = state.people.storage.get_bool(&self.idx("infected"))?;
        let ti_infected = state.people.storage.get_float(&self.idx("ti_infected"))?;
        let people = &state.people;

        let mut n_sus = 0.;
        let mut n_inf = 0.;
        let mut n_alive = 0.;
        let mut new_inf = 0.;
        let t = ti as Float;
        for row in 0..people.len() {
            if !people.alive[row] {
                continue;
            }
            let w = people.scale[row];
            n_alive += w;
            if susceptible[row] {
                n_sus += w;
            }
            if infected[row] {
                n_inf += w;
            }
            if ti_infected[row] == t {
                new_inf += w;
            }
        }
        let name = self.name.as_str();
        state.results.set(name, "n_susceptible", ti, n_sus)?;
        state.results.set(name, "n_infected", ti, n_inf)?;
        let prevalence = if n_alive > 0. { n_inf / n_alive } else { 0. };
        state.results.set(name, "prevalence", ti, prevalence)?;
        state.results.set(name, "new_infections", ti, new_inf)?;
        let cum = state.results.cumulative_to(name, "new_infections", ti)?;
        state.results.set(name, "cum_infections", ti, cum)?;
        Ok(())
    }

    /// Clears infection flags for dead agents.
    pub fn clear_on_death(&self, state: &mut SimState, uids: &[Uid]) -> Result<()> {
        let rows: Vec<usize> = uids
            .iter()
            .filter_map(|&uid| state.people.row_of(uid).ok())
            .collect();
        let storage = &mut state.people.storage;
        storage.set_bool_at(&self.idx("susceptible"), &rows, false)?;
        storage.set_bool_at(&self.idx("infected"), &rows, false)?;
        Ok(())
    }
}
