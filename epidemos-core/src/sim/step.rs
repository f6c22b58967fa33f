//! Step processing functions for the Sim struct.

use crate::error::{Error, Result};
use crate::sim::Sim;
use crate::Uid;

/// Single step processing functions.
impl Sim {
    /// Process a single timestep.
    ///
    /// The order of operations within a step: random number streams are
    /// advanced, vital dynamics modules run, the population ages and
    /// scheduled deaths take effect, networks evolve and their connectors
    /// reconcile, interventions apply, each disease progresses its cases
    /// and then transmits, disease connectors couple states, results are
    /// recorded and analyzers observe. The clock advances last.
    pub fn step(&mut self) -> Result<()> {
        if !self.initialized {
            self.initialize()?;
        }
        let ti = self.state.clock;
        if ti >= self.state.params.npts() {
            return Err(Error::Other(format!(
                "simulation already finished ({} steps)",
                ti
            )));
        }
        trace!("processing step {}", ti);
        self.state.streams.step(ti);

        let state = &mut self.state;
        for module in &mut self.demographics {
            module.update(state)?;
        }
        let mut died: Vec<Uid> = state.people.update_demographics(state.params.dt, ti);

        for module in &mut self.networks {
            module.update(state)?;
        }
        for module in &mut self.net_connectors {
            module.update(state)?;
        }
        for module in &mut self.interventions {
            module.apply(state)?;
        }
        for module in &mut self.diseases {
            module.update_states(state)?;
        }
        for module in &mut self.diseases {
            module.make_new_cases(state)?;
        }
        // deaths requested by the diseases this step take effect now
        died.extend(state.people.apply_deaths(ti));
        for module in &mut self.diseases {
            module.update_death(state, &died)?;
        }
        for module in &mut self.connectors {
            module.update(state)?;
        }
        for module in &mut self.diseases {
            module.update_results(state)?;
        }
        for module in &mut self.analyzers {
            module.apply(state)?;
        }

        self.state.clock += 1;
        Ok(())
    }
}
