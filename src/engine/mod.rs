// src/engine/mod.rs

//! Work serialisation.
//!
//! Every build and run of a patcher goes through the [`WorkQueue`] of its
//! scope, so two builds of the same patcher (or two runs against the same
//! load order) never race on shared working-directory state. Checkout is
//! routed through the same scope by [`PatcherPipeline`](crate::patcher::PatcherPipeline).

pub mod queue;

pub use queue::{ScopedQueues, WorkQueue};
