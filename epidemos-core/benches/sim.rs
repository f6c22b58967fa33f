//! Measurements of the local `Sim` interface.

use criterion::{criterion_group, criterion_main, Criterion};
use epidemos_core::{Scenario, Sim};

criterion_group!(sim, step_outbreak);
criterion_main!(sim);

const SCENARIO: &str = r#"
    name = "bench"

    [sim]
    n_agents = 5000
    start = 2000.0
    end = 2100.0
    rand_seed = 1

    [[networks]]
    type = "random"

    [[demographics]]
    type = "births"

    [[demographics]]
    type = "deaths"

    [[diseases]]
    type = "sir"
    initial = 50
    beta = { random = 0.02 }
"#;

/// Measures how long a single step takes on a mid-size population.
fn step_outbreak(c: &mut Criterion) {
    let scenario = Scenario::from_toml(SCENARIO).expect("failed parsing scenario");
    let mut sim = Sim::from_scenario(scenario).expect("failed building sim");
    sim.initialize().expect("failed initializing sim");

    c.bench_function("step_5000_agents", |b| {
        b.iter(|| {
            if sim.get_clock() >= 100 {
                return;
            }
            sim.step().expect("failed stepping sim");
        })
    });
}
