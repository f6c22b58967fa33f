//! Templates for initializing new user files.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::Result;

/// Commented scenario manifest template written by `epidemos new`.
const SCENARIO_TEMPLATE: &str = r#"name = "{name}"

[sim]
# number of agents created at initialization
n_agents = 10000
# simulated period in calendar years
start = 2000.0
end = 2030.0
# timestep length in years
dt = 1.0
# base seed shared by all random number streams
rand_seed = 0
# one slot-indexed stream per decision (common random numbers)
multistream = true

# initial population age structure, two-column CSV (age, weight)
# age_structure_file = "age_structure.csv"

[[networks]]
type = "random"
# contacts per agent per timestep
n_contacts = { dist = "poisson", lam = 10.0 }

[[demographics]]
type = "births"
# crude birth rate per 1000 person-years; or point fertility_file at a
# two-column CSV of age-specific rates
birth_rate = 20.0

[[demographics]]
type = "deaths"
# crude death rate per 1000 person-years; or use death_rate_file
death_rate = 8.0

[[diseases]]
type = "sir"
initial = 10
dur_inf = { dist = "lognormal", mean = 6.0, std = 1.0 }
p_death = 0.01
# per-network transmissibility; scalars apply to both edge directions
beta = { random = 0.04 }

# routine vaccination with a leaky vaccine
# [[interventions]]
# type = "routine_vx"
# start = 2015.0
# prob = 0.8
# min_age = 0.0
# max_age = 1.0
# [interventions.product]
# disease = "sir"
# efficacy = 0.9
"#;

/// Writes a commented scenario manifest to the given path.
pub fn write_scenario_template(path: &Path, name: &str) -> Result<()> {
    let content = SCENARIO_TEMPLATE.replace("{name}", name);
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}
