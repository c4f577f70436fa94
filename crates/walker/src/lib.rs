//! Random walk over the segment graph and the window of what it produced.
//!
//! The [`Driver`] owns a [`RandomWalkScheduler`] and feeds a shared
//! [`PlaybackWindow`] in real time; readers only ever take snapshots.

pub mod driver;
pub mod scheduler;
pub mod window;

pub use driver::Driver;
pub use scheduler::{Choice, RandomWalkScheduler, Randomness, WalkPolicy, WalkStep};
pub use window::{PlaybackWindow, WindowSnapshot};
