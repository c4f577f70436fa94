use common::{FlockError, FlockResult, Segment};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use segment_catalog::SegmentCatalog;
use std::sync::Arc;
use tracing::{debug, trace};

/// Random decisions the walk needs. Implemented for every [`rand::Rng`];
/// tests can script it to force a branch.
pub trait Randomness: Send {
    /// True with probability `probability`, which must lie in `[0, 1]`.
    fn chance(&mut self, probability: f64) -> bool;

    /// Uniform index in `0..len`; `len` is never zero.
    fn index(&mut self, len: usize) -> usize;
}

impl<R: Rng + Send> Randomness for R {
    fn chance(&mut self, probability: f64) -> bool {
        self.gen_bool(probability)
    }

    fn index(&mut self, len: usize) -> usize {
        self.gen_range(0..len)
    }
}

/// Branch weights of the walk. Both probabilities lie within `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalkPolicy {
    // rolled first
    jump_probability: f64,
    // only rolled when a following loop exists and no jump happened
    loop_probability: f64,
}

impl Default for WalkPolicy {
    fn default() -> Self {
        Self {
            jump_probability: 0.02,
            loop_probability: 0.90,
        }
    }
}

impl WalkPolicy {
    pub fn new(jump_probability: f64, loop_probability: f64) -> FlockResult<Self> {
        for (name, value) in [
            ("jump_probability", jump_probability),
            ("loop_probability", loop_probability),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(FlockError::invalid_config(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        Ok(Self {
            jump_probability,
            loop_probability,
        })
    }

    pub fn from_config(config: &common::FlockConfig) -> FlockResult<Self> {
        Self::new(config.jump_probability, config.loop_probability)
    }

    /// Chance of leaving the chain for a random loop.
    pub fn jump_probability(&self) -> f64 {
        self.jump_probability
    }

    /// Chance of taking a following loop when one exists.
    pub fn loop_probability(&self) -> f64 {
        self.loop_probability
    }
}

/// Why a segment was picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Choice {
    /// First segment of the walk, drawn from the whole catalog.
    Start,
    /// Random loop, regardless of what follows the current segment.
    Jump,
    /// A loop leaving the current end node.
    Loop,
    /// A non-loop segment leaving the current end node.
    Transition,
    /// Nothing leaves the current end node; restart on a random loop.
    DeadEnd,
}

#[derive(Debug, Clone)]
pub struct WalkStep {
    pub segment: Segment,
    pub choice: Choice,
}

/// Infinite random walk over the segment graph.
///
/// Each step prefers loops following the current segment, sometimes jumps to
/// a random loop, and otherwise follows a transition. The walk cannot be
/// rewound; it only moves forward from `current`.
pub struct RandomWalkScheduler<R = StdRng> {
    catalog: Arc<SegmentCatalog>,
    policy: WalkPolicy,
    rng: R,
    current: Option<Segment>,
}

impl RandomWalkScheduler<StdRng> {
    /// Scheduler seeded from operating system entropy.
    pub fn new(catalog: Arc<SegmentCatalog>, policy: WalkPolicy) -> Self {
        Self::with_rng(catalog, policy, StdRng::from_entropy())
    }
}

impl<R: Randomness> RandomWalkScheduler<R> {
    pub fn with_rng(catalog: Arc<SegmentCatalog>, policy: WalkPolicy, rng: R) -> Self {
        Self {
            catalog,
            policy,
            rng,
            current: None,
        }
    }

    pub fn catalog(&self) -> &Arc<SegmentCatalog> {
        &self.catalog
    }

    pub fn current(&self) -> Option<&Segment> {
        self.current.as_ref()
    }

    pub fn policy(&self) -> WalkPolicy {
        self.policy
    }

    /// Move to the next segment and report which branch chose it.
    ///
    /// Fails with `EmptyCatalog` when there is nothing to choose from; the
    /// walk keeps its position and may be stepped again once the catalog is
    /// repopulated.
    pub fn step(&mut self) -> FlockResult<WalkStep> {
        let (segment, choice) = match self.current.clone() {
            None => (self.pick(self.catalog.segments())?, Choice::Start),
            Some(current) => self.follow(&current)?,
        };

        trace!(segment = %segment.key(), ?choice, "walk step");
        self.current = Some(segment.clone());
        Ok(WalkStep { segment, choice })
    }

    fn follow(&mut self, current: &Segment) -> FlockResult<(Segment, Choice)> {
        if self.rng.chance(self.policy.jump_probability) {
            return Ok((self.fallback()?, Choice::Jump));
        }

        // A discard racing with this step only shrinks this set.
        let (loops, transitions): (Vec<Segment>, Vec<Segment>) = self
            .catalog
            .successors_of(current)
            .into_iter()
            .partition(Segment::is_loop);

        if !loops.is_empty() && self.rng.chance(self.policy.loop_probability) {
            return Ok((self.pick(loops)?, Choice::Loop));
        }
        if !transitions.is_empty() {
            return Ok((self.pick(transitions)?, Choice::Transition));
        }
        if !loops.is_empty() {
            return Ok((self.pick(loops)?, Choice::Loop));
        }

        debug!(segment = %current.key(), "dead end");
        Ok((self.fallback()?, Choice::DeadEnd))
    }

    /// Random loop, or any segment at all when the catalog has no loops.
    fn fallback(&mut self) -> FlockResult<Segment> {
        let loops = self.catalog.loops();
        if loops.is_empty() {
            return self.pick(self.catalog.segments());
        }
        self.pick(loops)
    }

    fn pick(&mut self, mut candidates: Vec<Segment>) -> FlockResult<Segment> {
        if candidates.is_empty() {
            return Err(FlockError::EmptyCatalog);
        }
        let index = self.rng.index(candidates.len());
        Ok(candidates.swap_remove(index))
    }
}

impl<R: Randomness> Iterator for RandomWalkScheduler<R> {
    type Item = FlockResult<Segment>;

    /// Never returns `None`.
    fn next(&mut self) -> Option<Self::Item> {
        Some(self.step().map(|step| step.segment))
    }
}
