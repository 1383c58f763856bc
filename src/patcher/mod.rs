// src/patcher/mod.rs

//! Building and running one patcher end to end.

pub mod build;
pub mod pipeline;

pub use build::{BuildOutcome, BuildStep, Builder};
pub use pipeline::{PatcherPipeline, RunReport};
