//! Population state definitions.

mod storage;

pub use self::storage::{Column, StateVec, Storage, StorageIndex, Var};

use crate::data::AgeStructure;
use crate::error::{Error, Result};
use crate::{Float, Uid, INT_NAN};

/// The simulated population.
///
/// Base demographic states are dense parallel vectors indexed by row;
/// `uid_map` maps an agent uid to its current row (or [`INT_NAN`] if the
/// agent has been removed). Module-specific states live in [`Storage`],
/// keyed by `(module, state)`, and are grown and trimmed in lockstep with
/// the base states. Uids are never reused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct People {
    /// Uids of all agents currently present, by row
    pub uid: Vec<Uid>,
    /// Uid -> row lookup covering every uid ever created
    uid_map: Vec<u32>,

    /// Age in years; newborns conceived in-sim start below zero
    pub age: Vec<Float>,
    pub female: Vec<bool>,
    pub alive: Vec<bool>,
    /// Timestep index of death, NaN while alive
    pub ti_dead: Vec<Float>,
    /// Age of sexual debut
    pub debut: Vec<Float>,
    /// Statistical weight of the agent
    pub scale: Vec<Float>,
    /// Random-number slot used for per-agent draws
    pub slot: Vec<u32>,

    /// Module-registered states
    pub storage: Storage,

    initialized: bool,
}

impl People {
    /// Creates a population of `n` agents with default state.
    pub fn new(n: u32) -> Self {
        let n = n as usize;
        People {
            uid: (0..n as Uid).collect(),
            uid_map: (0..n as u32).collect(),
            age: vec![0.; n],
            female: vec![false; n],
            alive: vec![true; n],
            ti_dead: vec![Float::NAN; n],
            debut: vec![0.; n],
            scale: vec![1.; n],
            slot: (0..n as u32).collect(),
            storage: Storage::new(),
            initialized: false,
        }
    }

    /// Number of agents currently present (alive or not yet removed).
    pub fn len(&self) -> usize {
        self.uid.len()
    }

    /// Whether initial ages and sexes have been drawn.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_empty(&self) -> bool {
        self.uid.is_empty()
    }

    /// Total number of uids ever created.
    pub fn n_created(&self) -> usize {
        self.uid_map.len()
    }

    pub fn n_alive(&self) -> usize {
        self.alive.iter().filter(|&&a| a).count()
    }

    /// Applies initial ages and sexes from uniform draws, one per row.
    ///
    /// Ages come from the given age structure when provided, otherwise
    /// uniform over 0-100 years. Sex is an even coin flip.
    pub fn initialize(
        &mut self,
        age_draws: &[Float],
        sex_draws: &[Float],
        age_structure: Option<&AgeStructure>,
    ) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        if age_draws.len() != self.len() || sex_draws.len() != self.len() {
            return Err(Error::Other(format!(
                "initial draws ({}, {}) do not cover the population ({})",
                age_draws.len(),
                sex_draws.len(),
                self.len()
            )));
        }
        for (row, &u) in age_draws.iter().enumerate() {
            self.age[row] = match age_structure {
                Some(structure) => structure.age_at(u),
                None => u * 100.,
            };
        }
        for (row, &u) in sex_draws.iter().enumerate() {
            self.female[row] = u < 0.5;
        }
        self.initialized = true;
        Ok(())
    }
}

/// Lookups.
impl People {
    /// Current row of the given agent.
    pub fn row_of(&self, uid: Uid) -> Result<usize> {
        match self.uid_map.get(uid as usize) {
            Some(&row) if row != INT_NAN => Ok(row as usize),
            _ => Err(Error::NoAgent(uid)),
        }
    }

    /// Random-number slot of the given agent.
    pub fn slot_of(&self, uid: Uid) -> Result<u32> {
        let row = self.row_of(uid)?;
        let slot = self.slot[row];
        if slot == INT_NAN {
            return Err(Error::NoSlot(uid));
        }
        Ok(slot)
    }

    /// Uids of all living agents.
    pub fn alive_uids(&self) -> Vec<Uid> {
        self.uid
            .iter()
            .zip(&self.alive)
            .filter_map(|(&uid, &alive)| if alive { Some(uid) } else { None })
            .collect()
    }

    /// Uids of all dead agents still present in the state vectors.
    pub fn dead_uids(&self) -> Vec<Uid> {
        self.uid
            .iter()
            .zip(&self.alive)
            .filter_map(|(&uid, &alive)| if alive { None } else { Some(uid) })
            .collect()
    }

    /// Uids of everyone sexually active.
    pub fn active_uids(&self) -> Vec<Uid> {
        (0..self.len())
            .filter(|&row| self.alive[row] && self.age[row] >= self.debut[row])
            .map(|row| self.uid[row])
            .collect()
    }

    /// Uids of living agents passing the given row predicate.
    pub fn uids_where<F: Fn(usize) -> bool>(&self, pred: F) -> Vec<Uid> {
        (0..self.len())
            .filter(|&row| self.alive[row] && pred(row))
            .map(|row| self.uid[row])
            .collect()
    }

    /// Sum of statistical weights of the given agents, the scaled
    /// replacement for a plain head count.
    pub fn scale_flows(&self, uids: &[Uid]) -> Float {
        uids.iter()
            .filter_map(|&uid| self.row_of(uid).ok())
            .map(|row| self.scale[row])
            .sum()
    }
}

/// Growth and removal.
impl People {
    /// Adds `n` agents and returns their uids.
    ///
    /// New rows receive default fills everywhere (including a slot equal to
    /// the uid); callers overwrite age, sex and slot as appropriate.
    pub fn grow(&mut self, n: usize) -> Vec<Uid> {
        let start_uid = self.uid_map.len() as Uid;
        let start_row = self.uid.len() as u32;
        let new_uids: Vec<Uid> = (start_uid..start_uid + n as Uid).collect();

        for (offset, &uid) in new_uids.iter().enumerate() {
            self.uid.push(uid);
            self.uid_map.push(start_row + offset as u32);
            self.age.push(0.);
            self.female.push(false);
            self.alive.push(true);
            self.ti_dead.push(Float::NAN);
            self.debut.push(0.);
            self.scale.push(1.);
            self.slot.push(uid);
        }
        self.storage.grow(n);
        new_uids
    }

    /// Removes the given agents, compacting all state vectors.
    pub fn remove(&mut self, uids_to_remove: &[Uid]) {
        let keep: Vec<usize> = (0..self.len())
            .filter(|&row| !uids_to_remove.contains(&self.uid[row]))
            .collect();

        self.uid = keep.iter().map(|&row| self.uid[row]).collect();
        self.age = keep.iter().map(|&row| self.age[row]).collect();
        self.female = keep.iter().map(|&row| self.female[row]).collect();
        self.alive = keep.iter().map(|&row| self.alive[row]).collect();
        self.ti_dead = keep.iter().map(|&row| self.ti_dead[row]).collect();
        self.debut = keep.iter().map(|&row| self.debut[row]).collect();
        self.scale = keep.iter().map(|&row| self.scale[row]).collect();
        self.slot = keep.iter().map(|&row| self.slot[row]).collect();
        self.storage.trim(&keep);

        // clear out all previously used uids, then reassign rows
        for entry in self.uid_map.iter_mut() {
            *entry = INT_NAN;
        }
        for (row, &uid) in self.uid.iter().enumerate() {
            self.uid_map[uid as usize] = row as u32;
        }
    }
}

/// Vital dynamics.
impl People {
    /// Schedules the given agents to die at timestep `ti`.
    pub fn request_death(&mut self, uids: &[Uid], ti: usize) {
        for &uid in uids {
            if let Ok(row) = self.row_of(uid) {
                let t = ti as Float;
                if self.ti_dead[row].is_nan() || t < self.ti_dead[row] {
                    self.ti_dead[row] = t;
                }
            }
        }
    }

    /// Flips the alive flag for agents whose scheduled death has come due.
    /// Returns the uids of those who died.
    pub fn apply_deaths(&mut self, ti: usize) -> Vec<Uid> {
        let t = ti as Float;
        let mut died = Vec::new();
        for row in 0..self.len() {
            if self.alive[row] && self.ti_dead[row] <= t {
                self.alive[row] = false;
                died.push(self.uid[row]);
            }
        }
        died
    }

    /// Performs vital dynamic updates at the current timestep: the living
    /// age by `dt`, and scheduled deaths take effect. Returns the uids of
    /// the agents who died this step.
    pub fn update_demographics(&mut self, dt: Float, ti: usize) -> Vec<Uid> {
        for row in 0..self.len() {
            if self.alive[row] {
                self.age[row] += dt;
            }
        }
        self.apply_deaths(ti)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grow_assigns_fresh_uids() {
        let mut people = People::new(3);
        let new_uids = people.grow(2);
        assert_eq!(new_uids, vec![3, 4]);
        assert_eq!(people.len(), 5);
        assert_eq!(people.row_of(4).unwrap(), 4);
        assert_eq!(people.slot_of(4).unwrap(), 4);
    }

    #[test]
    fn remove_compacts_and_remaps() {
        let mut people = People::new(5);
        people.age = vec![10., 20., 30., 40., 50.];
        people.remove(&[1, 3]);

        assert_eq!(people.len(), 3);
        assert_eq!(people.uid, vec![0, 2, 4]);
        assert_eq!(people.age, vec![10., 30., 50.]);
        assert_eq!(people.row_of(2).unwrap(), 1);
        assert!(matches!(people.row_of(1), Err(Error::NoAgent(1))));

        // uids are not reused after removal
        let new_uids = people.grow(1);
        assert_eq!(new_uids, vec![5]);
    }

    #[test]
    fn storage_tracks_population_size() {
        let mut people = People::new(2);
        let idx = (
            crate::string::new_truncate("sir"),
            crate::string::new_truncate("infected"),
        );
        people.storage.register(idx, Var::Bool(false), people.len());
        people.grow(3);
        assert_eq!(people.storage.get_bool(&idx).unwrap().len(), 5);
        people.remove(&[0]);
        assert_eq!(people.storage.get_bool(&idx).unwrap().len(), 4);
    }

    #[test]
    fn deaths_take_effect_on_update() {
        let mut people = People::new(3);
        people.request_death(&[1], 2);
        assert!(people.update_demographics(1., 1).is_empty());
        assert!(people.alive[1]);
        let died = people.update_demographics(1., 2);
        assert_eq!(died, vec![1]);
        assert!(!people.alive[1]);
        assert_eq!(people.n_alive(), 2);
        // the dead no longer age
        let age = people.age[1];
        people.update_demographics(1., 3);
        assert_eq!(people.age[1], age);
    }

    #[test]
    fn earlier_death_request_wins() {
        let mut people = People::new(1);
        people.request_death(&[0], 5);
        people.request_death(&[0], 3);
        assert_eq!(people.ti_dead[0], 3.);
        people.request_death(&[0], 7);
        assert_eq!(people.ti_dead[0], 3.);
    }
}
