//! Passive observers of simulation state.

use crate::error::Result;
use crate::sim::SimState;
use crate::ModName;

/// An analyzer records simulation state each step without modifying it.
/// Applied at the end of every step, after results are updated.
pub trait Analyzer {
    fn name(&self) -> ModName;

    fn init(&mut self, state: &mut SimState) -> Result<()>;

    fn apply(&mut self, state: &mut SimState) -> Result<()>;
}
