//! Harvest orchestration and the agent pipeline driver for doccrew.
//!
//! This crate ties together the content sources, the tree walker and the
//! document store into end-to-end workflows ([`harvest::harvest`]), and hands
//! harvested documents to an external agent runtime ([`agents::run_pipeline`]).

pub mod agents;
pub mod harvest;

pub use agents::{
    AgentRunner, BridgeConfig, BridgeRunner, KickoffRequest, Payload, PayloadMode, Stage,
    run_pipeline,
};
pub use harvest::{
    HarvestResult, HarvestTarget, PREVIEW_CHARS, ProgressReporter, SilentProgress, harvest,
    preview,
};
