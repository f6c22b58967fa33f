//! This library implements core engine functionality.
//!
//! Programming interface is centered around the [`Sim`] structure, which
//! encapsulates a single agent-based simulation. [`Sim`] can be created
//! directly from parameters, from a scenario manifest on disk, or from a
//! snapshot of a previously running simulation. Once initialized it can be
//! stepped through and serialized to file. Simulation content is organized
//! into modules: contact networks, diseases, vital dynamics, interventions,
//! connectors and analyzers, all operating on a shared population state.
//!
//! # Reproducibility
//!
//! Every stochastic decision draws from a named random number stream. With
//! the `multistream` option enabled (the default), draws for individual
//! agents are indexed by per-agent slots, so two simulations that differ
//! only in one parameter produce identical draws for every agent that is
//! not mechanistically affected by the change. This enables low-noise
//! comparisons between scenario variants.
//!
//! # Using the library
//!
//! To use `epidemos-core` in your Rust project add the following to your
//! `Cargo.toml`:
//!
//! ```toml
//! epidemos-core = "0.1.0"
//! ```
//!
//! ## Example
//!
//! Here's a very simple example of how the library can be used inside your
//! program:
//!
//! ```ignore
//! extern crate epidemos_core as epidemos;
//! use epidemos::Sim;
//!
//! pub fn main() {
//!     let mut sim = Sim::from_scenario_at("./scenario.toml").unwrap();
//!     sim.run().unwrap();
//! }
//! ```

#[macro_use]
extern crate serde;
#[macro_use]
extern crate log;

// reexports
pub use dist::Dist;
pub use error::{Error, Result};
pub use params::SimParams;
pub use people::People;
pub use scenario::Scenario;
pub use sim::{Sim, SimState};

pub mod analyzer;
pub mod connector;
pub mod data;
pub mod demog;
pub mod disease;
pub mod dist;
pub mod error;
pub mod intervention;
pub mod net;
pub mod params;
pub mod people;
pub mod results;
pub mod rng;
pub mod scenario;
pub mod sim;
pub mod string;

mod util;

// features
pub const FEATURE_NAME_SMALL_NUMS: &str = "small_nums";
#[cfg(not(feature = "small_nums"))]
pub const FEATURE_SMALL_NUMS: bool = false;
#[cfg(feature = "small_nums")]
pub const FEATURE_SMALL_NUMS: bool = true;

pub const FEATURE_NAME_PARALLEL: &str = "parallel";
#[cfg(not(feature = "parallel"))]
pub const FEATURE_PARALLEL: bool = false;
#[cfg(feature = "parallel")]
pub const FEATURE_PARALLEL: bool = true;

pub const VERSION: &'static str = env!("CARGO_PKG_VERSION");

/// Scenario manifest file name used when pointing at a directory.
pub const SCENARIO_MANIFEST_FILE: &str = "scenario.toml";

/// Floating point number type used throughout the library.
#[cfg(feature = "small_nums")]
pub type Float = f32;
/// Floating point number type used throughout the library.
#[cfg(not(feature = "small_nums"))]
pub type Float = f64;
/// Integer number type used throughout the library.
#[cfg(feature = "small_nums")]
pub type Int = i32;
/// Integer number type used throughout the library.
#[cfg(not(feature = "small_nums"))]
pub type Int = i64;

/// Fixed-size string used internally for indexing objects.
///
/// # Length
///
/// Default length is 23 characters, but it can be restricted to just
/// 10 characters using the `short_stringid` feature.
#[cfg(not(feature = "short_stringid"))]
pub type StringId = arrayvec::ArrayString<[u8; 23]>;
/// Fixed-size string used internally for indexing objects.
#[cfg(feature = "short_stringid")]
pub type StringId = arrayvec::ArrayString<[u8; 10]>;

/// Module string identifier type.
pub type ModName = StringId;
/// State (population column) string identifier type.
pub type StateName = StringId;
/// Network string identifier type.
pub type NetName = StringId;
/// Result series string identifier type.
pub type RsltName = StringId;

/// Agent unique integer identifier type.
///
/// Uids are assigned sequentially and never reused, even after agents are
/// removed from the simulation.
pub type Uid = u32;

/// Sentinel for "no index" in uid lookup tables.
pub const INT_NAN: u32 = u32::MAX;
