//! Named random number streams.
//!
//! Every stochastic decision in a simulation draws from a named [`Rng`]
//! stream registered with the simulation-wide [`Streams`] registry. A
//! stream's seed is `base_seed + offset`, where the offset is derived by
//! hashing the stream name, so adding or removing streams never perturbs
//! the draws of the others. Modules keep [`StreamId`] handles and resolve
//! them through the registry at draw time.
//!
//! With the `multistream` option enabled, draws "for" a set of agents are
//! indexed by per-agent slots: `max(slot) + 1` variates are generated and
//! each agent receives the one at its slot. Two simulations that differ in
//! one mechanism therefore produce identical draws for every unaffected
//! agent (common random numbers). In this mode a stream represents one
//! decision and may be sampled at most once per timestep; the registry's
//! [`Streams::step`] resets that budget at the top of every sim step.
//!
//! Generator state is re-derived from `(seed, timestep)` at every step
//! rather than carried forward, which makes snapshot resume exact.

use std::hash::Hasher;

use fnv::{FnvHashMap, FnvHasher};
use rand::seq::SliceRandom;
use rand::{Rng as RandRng, SeedableRng};
use rand_pcg::Pcg64;

use crate::dist::Dist;
use crate::error::{Error, Result};
use crate::people::People;
use crate::{string, Float, StringId, Uid};

/// Seed offsets are reduced to 8 digits so they stay readable in logs.
const OFFSET_MODULUS: u64 = 100_000_000;

/// Derives a stable seed offset from a stream name.
fn name_offset(name: &str) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(name.as_bytes());
    hasher.finish() % OFFSET_MODULUS
}

/// Mixes a stream seed with a timestep (and a within-step counter for
/// repeatable-draw streams) into a generator seed.
fn mix(seed: u64, ti: u64, count: u64) -> u64 {
    let mut z = seed
        ^ ti.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ count.wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Handle to a registered stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamId(usize);

impl StreamId {
    /// Placeholder used by modules before registration.
    pub const INVALID: StreamId = StreamId(usize::MAX);

    pub fn is_valid(&self) -> bool {
        self.0 != usize::MAX
    }
}

impl Default for StreamId {
    fn default() -> Self {
        StreamId::INVALID
    }
}

/// Registry owning all random number streams of one simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Streams {
    base_seed: u64,
    multistream: bool,
    streams: Vec<Rng>,
    index: FnvHashMap<StringId, usize>,
    used_offsets: Vec<u64>,
}

impl Streams {
    pub fn new(base_seed: u64, multistream: bool) -> Self {
        Streams {
            base_seed,
            multistream,
            streams: Vec::new(),
            index: FnvHashMap::default(),
            used_offsets: Vec::new(),
        }
    }

    pub fn base_seed(&self) -> u64 {
        self.base_seed
    }

    pub fn multistream(&self) -> bool {
        self.multistream
    }

    /// Registers a slot-indexed stream under the given name.
    ///
    /// Duplicate stream names are always rejected. Duplicate seed offsets
    /// (a hash collision between two names) are rejected for slot-indexed
    /// streams, where they would silently correlate two decisions.
    pub fn register(&mut self, name: &str) -> Result<StreamId> {
        self.register_inner(name, false)
    }

    /// Registers a centralized stream exempt from slot indexing and the
    /// once-per-step rule. Used by algorithms that are inherently not
    /// common-random-number safe, such as pair-matching shuffles.
    pub fn register_single(&mut self, name: &str) -> Result<StreamId> {
        self.register_inner(name, true)
    }

    fn register_inner(&mut self, name: &str, single: bool) -> Result<StreamId> {
        let name_id = string::new_truncate(name);
        if self.index.contains_key(&name_id) {
            return Err(Error::StreamNameTaken(name_id));
        }
        let seed_offset = name_offset(name);
        let multistream = self.multistream && !single;
        if multistream {
            if self.used_offsets.contains(&seed_offset) {
                return Err(Error::StreamSeedTaken(name_id, seed_offset));
            }
            self.used_offsets.push(seed_offset);
        }
        let rng = Rng {
            name: name_id,
            seed: self.base_seed.wrapping_add(seed_offset),
            multistream,
            ti: 0,
            ready: true,
            draws_this_ti: 0,
        };
        let id = self.streams.len();
        self.streams.push(rng);
        self.index.insert(name_id, id);
        trace!("registered stream: {} (offset {})", name, seed_offset);
        Ok(StreamId(id))
    }

    /// Advances every stream to the given timestep, resetting per-step
    /// draw budgets.
    pub fn step(&mut self, ti: usize) {
        for rng in &mut self.streams {
            rng.step(ti);
        }
    }

    pub fn get_mut(&mut self, id: StreamId) -> Result<&mut Rng> {
        self.streams
            .get_mut(id.0)
            .ok_or(Error::StreamHandleInvalid)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

/// One named random number stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rng {
    name: StringId,
    seed: u64,
    multistream: bool,
    ti: usize,
    ready: bool,
    draws_this_ti: u64,
}

impl Rng {
    pub fn name(&self) -> StringId {
        self.name
    }

    /// Advances to the given timestep; the stream may be sampled again.
    fn step(&mut self, ti: usize) {
        self.ti = ti;
        self.ready = true;
        self.draws_this_ti = 0;
    }

    /// Validates stream state before a draw and accounts for it.
    ///
    /// Slot-indexed streams represent a single decision and may only be
    /// sampled once per timestep.
    fn pre_draw(&mut self) -> Result<()> {
        if self.multistream {
            if !self.ready {
                return Err(Error::StreamAlreadySampled(self.name));
            }
            self.ready = false;
        } else {
            self.draws_this_ti += 1;
        }
        Ok(())
    }

    fn generator(&self) -> Pcg64 {
        // centralized streams count draws so repeated calls within one
        // step keep producing fresh values
        let count = self.draws_this_ti.saturating_sub(1);
        Pcg64::seed_from_u64(mix(self.seed, self.ti as u64, count))
    }

    /// Number of variates needed to serve the given agents, and the
    /// per-agent indices into the drawn vector.
    fn draw_plan(&self, uids: &[Uid], people: &People) -> Result<(usize, Vec<usize>)> {
        if self.multistream {
            let mut indices = Vec::with_capacity(uids.len());
            let mut max_slot = 0usize;
            for &uid in uids {
                let slot = people.slot_of(uid)? as usize;
                if slot > max_slot {
                    max_slot = slot;
                }
                indices.push(slot);
            }
            Ok((max_slot + 1, indices))
        } else {
            Ok((uids.len(), (0..uids.len()).collect()))
        }
    }
}

/// Fixed-size draws.
impl Rng {
    /// Draws `n` uniform variates in `[0, 1)`.
    pub fn random(&mut self, n: usize) -> Result<Vec<Float>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        self.pre_draw()?;
        let mut gen = self.generator();
        Ok((0..n).map(|_| gen.gen::<f64>() as Float).collect())
    }

    /// Draws `n` integers in `[low, high)`.
    pub fn integers(&mut self, low: u64, high: u64, n: usize) -> Result<Vec<u64>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        if high <= low {
            return Err(Error::InvalidParam(format!(
                "integer range empty: [{}, {})",
                low, high
            )));
        }
        self.pre_draw()?;
        let mut gen = self.generator();
        Ok((0..n).map(|_| gen.gen_range(low, high)).collect())
    }

    /// Draws `n` samples from the given distribution.
    pub fn sample(&mut self, dist: &Dist, n: usize) -> Result<Vec<Float>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        self.pre_draw()?;
        let mut gen = self.generator();
        dist.sample_into(&mut gen, n)
    }

    /// Shuffles a slice in place.
    pub fn shuffle<T>(&mut self, items: &mut [T]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        self.pre_draw()?;
        let mut gen = self.generator();
        items.shuffle(&mut gen);
        Ok(())
    }

    /// Picks `k` distinct items from the pool by partial shuffle.
    pub fn choose_without_replacement(&mut self, pool: &[Uid], k: usize) -> Result<Vec<Uid>> {
        if k == 0 || pool.is_empty() {
            return Ok(Vec::new());
        }
        self.pre_draw()?;
        let mut gen = self.generator();
        let mut shuffled = pool.to_vec();
        shuffled.shuffle(&mut gen);
        shuffled.truncate(k.min(pool.len()));
        Ok(shuffled)
    }
}

/// Agent-indexed draws.
impl Rng {
    /// Draws one uniform variate in `[0, 1)` for each given agent.
    pub fn random_for(&mut self, uids: &[Uid], people: &People) -> Result<Vec<Float>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        self.pre_draw()?;
        let (n, indices) = self.draw_plan(uids, people)?;
        let mut gen = self.generator();
        let vals: Vec<Float> = (0..n).map(|_| gen.gen::<f64>() as Float).collect();
        Ok(indices.into_iter().map(|i| vals[i]).collect())
    }

    /// Draws one sample from the given distribution for each given agent.
    pub fn sample_for(&mut self, dist: &Dist, uids: &[Uid], people: &People) -> Result<Vec<Float>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        self.pre_draw()?;
        let (n, indices) = self.draw_plan(uids, people)?;
        let mut gen = self.generator();
        let vals = dist.sample_into(&mut gen, n)?;
        Ok(indices.into_iter().map(|i| vals[i]).collect())
    }

    /// Draws one integer in `[low, high)` for each given agent.
    pub fn integers_for(
        &mut self,
        low: u64,
        high: u64,
        uids: &[Uid],
        people: &People,
    ) -> Result<Vec<u64>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        if high <= low {
            return Err(Error::InvalidParam(format!(
                "integer range empty: [{}, {})",
                low, high
            )));
        }
        self.pre_draw()?;
        let (n, indices) = self.draw_plan(uids, people)?;
        let mut gen = self.generator();
        let vals: Vec<u64> = (0..n).map(|_| gen.gen_range(low, high)).collect();
        Ok(indices.into_iter().map(|i| vals[i]).collect())
    }

    /// Bernoulli trial per agent with a shared probability.
    pub fn bernoulli_for(&mut self, p: Float, uids: &[Uid], people: &People) -> Result<Vec<bool>> {
        let draws = self.random_for(uids, people)?;
        Ok(draws.into_iter().map(|u| u < p).collect())
    }

    /// Returns the subset of agents whose Bernoulli trial succeeded.
    pub fn bernoulli_filter(
        &mut self,
        p: Float,
        uids: &[Uid],
        people: &People,
    ) -> Result<Vec<Uid>> {
        let hits = self.bernoulli_for(p, uids, people)?;
        Ok(uids
            .iter()
            .zip(hits)
            .filter_map(|(&uid, hit)| if hit { Some(uid) } else { None })
            .collect())
    }

    /// Returns the subset of agents whose trial against a per-agent
    /// probability succeeded. `probs` is parallel to `uids`.
    pub fn filter_by_prob(
        &mut self,
        uids: &[Uid],
        probs: &[Float],
        people: &People,
    ) -> Result<Vec<Uid>> {
        debug_assert_eq!(uids.len(), probs.len());
        let draws = self.random_for(uids, people)?;
        Ok(uids
            .iter()
            .zip(draws.iter().zip(probs))
            .filter_map(|(&uid, (&u, &p))| if u < p { Some(uid) } else { None })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::people::People;

    #[test]
    fn duplicate_names_are_rejected() {
        let mut streams = Streams::new(0, true);
        streams.register("coin_flip").unwrap();
        assert!(matches!(
            streams.register("coin_flip"),
            Err(Error::StreamNameTaken(_))
        ));
    }

    #[test]
    fn once_per_step_enforced_for_multistream() {
        let mut streams = Streams::new(7, true);
        let id = streams.register("decision").unwrap();
        streams.step(0);
        streams.get_mut(id).unwrap().random(2).unwrap();
        assert!(matches!(
            streams.get_mut(id).unwrap().random(2),
            Err(Error::StreamAlreadySampled(_))
        ));
        // stepping resets the budget
        streams.step(1);
        streams.get_mut(id).unwrap().random(2).unwrap();
    }

    #[test]
    fn single_streams_redraw_with_fresh_values() {
        let mut streams = Streams::new(7, true);
        let id = streams.register_single("pairing").unwrap();
        streams.step(0);
        let a = streams.get_mut(id).unwrap().random(4).unwrap();
        let b = streams.get_mut(id).unwrap().random(4).unwrap();
        assert_ne!(a, b);
        // but the sequence itself replays after a re-step
        streams.step(0);
        let a2 = streams.get_mut(id).unwrap().random(4).unwrap();
        assert_eq!(a, a2);
    }

    #[test]
    fn draws_are_pure_function_of_seed_and_step() {
        let mut s1 = Streams::new(7, true);
        let mut s2 = Streams::new(7, true);
        let id1 = s1.register("repro").unwrap();
        let id2 = s2.register("repro").unwrap();
        s1.step(3);
        s2.step(3);
        let a = s1.get_mut(id1).unwrap().random(5).unwrap();
        let b = s2.get_mut(id2).unwrap().random(5).unwrap();
        assert_eq!(a, b);

        s2.step(4);
        let c = s2.get_mut(id2).unwrap().random(5).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn other_streams_do_not_perturb_draws() {
        let mut s1 = Streams::new(11, true);
        let id1 = s1.register("stable").unwrap();
        let mut s2 = Streams::new(11, true);
        s2.register("extra_one").unwrap();
        let id2 = s2.register("stable").unwrap();
        s1.step(2);
        s2.step(2);
        assert_eq!(
            s1.get_mut(id1).unwrap().random(4).unwrap(),
            s2.get_mut(id2).unwrap().random(4).unwrap()
        );
    }

    #[test]
    fn slot_indexed_draws_are_stable_under_growth() {
        let people_small = People::new(4);
        let mut people_big = People::new(4);
        people_big.grow(3);

        let uids = vec![1 as Uid, 3];
        let mut s1 = Streams::new(5, true);
        let mut s2 = Streams::new(5, true);
        let id1 = s1.register("crn").unwrap();
        let id2 = s2.register("crn").unwrap();
        s1.step(0);
        s2.step(0);
        let small = s1
            .get_mut(id1)
            .unwrap()
            .random_for(&uids, &people_small)
            .unwrap();
        let big = s2
            .get_mut(id2)
            .unwrap()
            .random_for(&uids, &people_big)
            .unwrap();
        assert_eq!(small, big);
    }

    #[test]
    fn centralized_mode_draws_per_agent() {
        let people = People::new(4);
        let mut streams = Streams::new(5, false);
        let id = streams.register("central").unwrap();
        streams.step(0);
        let vals = streams
            .get_mut(id)
            .unwrap()
            .random_for(&[0, 1, 2], &people)
            .unwrap();
        assert_eq!(vals.len(), 3);
        // no once-per-step restriction in centralized mode
        streams.get_mut(id).unwrap().random(2).unwrap();
    }

    #[test]
    fn bernoulli_filter_bounds() {
        let people = People::new(10);
        let uids: Vec<Uid> = (0..10).collect();
        let mut streams = Streams::new(1, true);
        let all_id = streams.register("take_all").unwrap();
        let none_id = streams.register("take_none").unwrap();
        streams.step(0);
        let all = streams
            .get_mut(all_id)
            .unwrap()
            .bernoulli_filter(1.0, &uids, &people)
            .unwrap();
        assert_eq!(all, uids);
        let none = streams
            .get_mut(none_id)
            .unwrap()
            .bernoulli_filter(0.0, &uids, &people)
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn empty_uid_draws_do_not_consume_the_step() {
        let people = People::new(2);
        let mut streams = Streams::new(1, true);
        let id = streams.register("empty").unwrap();
        streams.step(0);
        let out = streams
            .get_mut(id)
            .unwrap()
            .random_for(&[], &people)
            .unwrap();
        assert!(out.is_empty());
        // the step's draw is still available
        streams
            .get_mut(id)
            .unwrap()
            .random_for(&[0, 1], &people)
            .unwrap();
    }

    #[test]
    fn invalid_handle_is_an_error() {
        let mut streams = Streams::new(0, true);
        assert!(matches!(
            streams.get_mut(StreamId::INVALID),
            Err(Error::StreamHandleInvalid)
        ));
    }
}
