//! Top-level simulation parameters.

use crate::error::{Error, Result};
use crate::Float;

fn default_n_agents() -> u32 {
    1000
}
fn default_start() -> Float {
    2000.
}
fn default_end() -> Float {
    2030.
}
fn default_dt() -> Float {
    1.
}
fn default_slot_scale() -> u32 {
    5
}
fn default_multistream() -> bool {
    true
}

/// Parameters shared by every module of a simulation.
///
/// Typically read from the `[sim]` table of a scenario manifest, with every
/// field optional. Time is expressed in calendar years; `dt` is the timestep
/// length in years.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimParams {
    /// Number of agents created at initialization
    pub n_agents: u32,
    /// First simulated year
    pub start: Float,
    /// Last simulated year (inclusive)
    pub end: Float,
    /// Timestep length in years
    pub dt: Float,
    /// Base seed shared by all random number streams
    pub rand_seed: u64,
    /// Newborn slots are drawn from `[n_agents, slot_scale * n_agents)`
    pub slot_scale: u32,
    /// Use one slot-indexed stream per decision (common random numbers)
    pub multistream: bool,
    /// Progress reporting interval in steps, 0 for silent
    pub verbose: u32,
}

impl Default for SimParams {
    fn default() -> Self {
        SimParams {
            n_agents: default_n_agents(),
            start: default_start(),
            end: default_end(),
            dt: default_dt(),
            rand_seed: 0,
            slot_scale: default_slot_scale(),
            multistream: default_multistream(),
            verbose: 0,
        }
    }
}

impl SimParams {
    /// Checks basic consistency of the parameter set.
    pub fn validate(&self) -> Result<()> {
        if self.n_agents == 0 {
            return Err(Error::InvalidParam("n_agents must be positive".to_string()));
        }
        if self.dt <= 0. {
            return Err(Error::InvalidParam("dt must be positive".to_string()));
        }
        if self.end <= self.start {
            return Err(Error::InvalidParam(format!(
                "end ({}) must be later than start ({})",
                self.end, self.start
            )));
        }
        if self.slot_scale < 1 {
            return Err(Error::InvalidParam(
                "slot_scale must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of timepoints in the simulated period.
    pub fn npts(&self) -> usize {
        ((self.end - self.start) / self.dt).floor() as usize + 1
    }

    /// Calendar year corresponding to the given timestep index.
    pub fn year(&self, ti: usize) -> Float {
        self.start + ti as Float * self.dt
    }

    /// Vector of all simulated years, one per timepoint.
    pub fn yearvec(&self) -> Vec<Float> {
        (0..self.npts()).map(|ti| self.year(ti)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn npts_covers_inclusive_range() {
        let mut params = SimParams::default();
        params.start = 2000.;
        params.end = 2010.;
        params.dt = 1.;
        assert_eq!(params.npts(), 11);
        assert_eq!(params.year(0), 2000.);
        assert_eq!(params.year(10), 2010.);

        params.dt = 0.5;
        assert_eq!(params.npts(), 21);
    }

    #[test]
    fn validation_catches_bad_ranges() {
        let mut params = SimParams::default();
        params.end = params.start;
        assert!(params.validate().is_err());
        params = SimParams::default();
        params.dt = 0.;
        assert!(params.validate().is_err());
        assert!(SimParams::default().validate().is_ok());
    }
}
