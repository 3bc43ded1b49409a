//! The post-edit delta, build and state subsystem.

pub mod builder;
pub mod changeset;
pub mod model;
pub mod pipeline;
pub mod planner;
pub mod preview;
pub mod render;
pub mod state_store;
