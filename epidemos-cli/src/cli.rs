//! Application definition.

extern crate simplelog;

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};

use epidemos::sim::MultiSim;
use epidemos::{Scenario, Sim};

use self::simplelog::{ConfigBuilder, LevelFilter, TermLogger, TerminalMode};
use crate::init;

pub const VERSION: &'static str = env!("CARGO_PKG_VERSION");
pub const AUTHORS: &'static str = env!("CARGO_PKG_AUTHORS");

pub fn app<'a, 'b>() -> App<'a, 'b> {
    App::new("epidemos-cli")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .version(VERSION)
        .author(AUTHORS)
        .about("Create and run epidemos simulations from the command line.")
        .arg(Arg::with_name("verbosity")
            .long("verbosity")
            .short("v")
            .takes_value(true)
            .default_value("info")
            .value_name("verb")
            .global(true)
            .help("Set the verbosity of the log output"))

        // new subcommand
        .subcommand(SubCommand::with_name("new")
            .display_order(10)
            .about("Create a new scenario manifest")
            .arg(Arg::with_name("path")
                .required(true)
                .value_name("path")
                .help("Where to write the scenario manifest"))
            .arg(Arg::with_name("name")
                .help("Set the name for the new scenario (defaults to file stem)")
                .takes_value(true)
                .short("n")
                .long("name")))

        // run subcommand
        .subcommand(SubCommand::with_name("run")
            .display_order(20)
            .about("Run simulation from scenario manifest or snapshot")
            .arg(Arg::with_name("path")
                .required(true)
                .value_name("path")
                .help("Path to a scenario manifest (.toml) or a snapshot file"))
            .arg(Arg::with_name("out")
                .takes_value(true)
                .value_name("path")
                .short("o")
                .long("out")
                .help("Write result time series as CSV to this path"))
            .arg(Arg::with_name("snapshot")
                .takes_value(true)
                .value_name("path")
                .long("snapshot")
                .help("Write an end-state snapshot to this path"))
            .arg(Arg::with_name("compress")
                .long("compress")
                .help("Compress the written snapshot (and expect compressed input)"))
            .arg(Arg::with_name("seeds")
                .takes_value(true)
                .value_name("n")
                .long("seeds")
                .help("Run a sweep over this many random seeds instead of a single run")))
}

pub fn start(matches: ArgMatches) -> Result<()> {
    setup_log(matches.value_of("verbosity"))?;
    match matches.subcommand() {
        ("new", Some(sub_matches)) => new_scenario(sub_matches),
        ("run", Some(sub_matches)) => run(sub_matches),
        _ => Ok(()),
    }
}

fn setup_log(verbosity: Option<&str>) -> Result<()> {
    let level = match verbosity.unwrap_or("info") {
        "quiet" | "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        other => return Err(anyhow!("unknown verbosity level: {}", other)),
    };
    let config = ConfigBuilder::new()
        .set_time_level(LevelFilter::Error)
        .set_target_level(LevelFilter::Debug)
        .build();
    TermLogger::init(level, config, TerminalMode::Mixed)?;
    Ok(())
}

fn new_scenario(matches: &ArgMatches) -> Result<()> {
    let path = PathBuf::from(matches.value_of("path").expect("path is required"));
    let name = match matches.value_of("name") {
        Some(name) => name.to_string(),
        None => path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| "scenario".to_string()),
    };
    init::write_scenario_template(&path, &name)
        .with_context(|| format!("failed writing scenario to {}", path.display()))?;
    println!("Created new scenario manifest: {}", path.display());
    Ok(())
}

fn run(matches: &ArgMatches) -> Result<()> {
    let path = Path::new(matches.value_of("path").expect("path is required"));
    let compress = matches.is_present("compress");

    if let Some(seeds) = matches.value_of("seeds") {
        let n: u32 = seeds.parse().context("failed parsing seed count")?;
        return run_sweep(path, matches, n);
    }

    let is_manifest = path
        .extension()
        .map(|ext| ext == "toml")
        .unwrap_or(false);
    let mut sim = if is_manifest {
        Sim::from_scenario_at(
            path.to_str()
                .ok_or_else(|| anyhow!("path is not valid unicode"))?,
        )?
    } else {
        info!("treating {} as a snapshot", path.display());
        Sim::from_snapshot_at(path, compress)?
    };
    sim.run()?;

    if let Some(out) = matches.value_of("out") {
        write_results(&sim, Path::new(out))?;
    }
    if let Some(snapshot) = matches.value_of("snapshot") {
        sim.to_snapshot_at(Path::new(snapshot), compress)?;
    }
    Ok(())
}

fn run_sweep(path: &Path, matches: &ArgMatches, n: u32) -> Result<()> {
    let scenario = Scenario::from_path(path)?;
    let multi = MultiSim::seed_sweep(&scenario, n);
    let all_results = multi.run()?;
    info!("finished {} runs", all_results.len());

    if let Some(out) = matches.value_of("out") {
        let out = Path::new(out);
        let stem = out
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| "results".to_string());
        let years = scenario.sim.yearvec();
        for (seed, results) in all_results.iter().enumerate() {
            let seed_path = out.with_file_name(format!("{}_seed{}.csv", stem, seed));
            let file = File::create(&seed_path)
                .with_context(|| format!("failed creating {}", seed_path.display()))?;
            results.write_csv(file, &years)?;
            println!("Wrote results to {}", seed_path.display());
        }
    }
    Ok(())
}

fn write_results(sim: &Sim, out: &Path) -> Result<()> {
    let years = sim.state.params.yearvec();
    let file =
        File::create(out).with_context(|| format!("failed creating {}", out.display()))?;
    sim.results().write_csv(file, &years)?;
    println!("Wrote results to {}", out.display());
    Ok(())
}
