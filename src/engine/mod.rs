// src/engine/mod.rs

//! Assessment session rules: status, timing, randomization, grading and scoring.
//!
//! Everything in here is pure. Callers load records, pass in `now` from a
//! [`clock::Clock`], and persist whatever comes back.

pub mod clock;
pub mod error;
pub mod ordering;
pub mod recorder;
pub mod scoring;
pub mod seed;
pub mod status;
pub mod timer;

pub use error::EngineError;
