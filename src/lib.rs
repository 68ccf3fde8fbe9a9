//! Meshstream - priority-driven progressive streaming of 3D assets

pub mod core;
pub mod asset;
pub mod streaming;
pub mod services;
pub mod task;
pub mod scheduler;
pub mod orchestrator;

#[cfg(test)]
pub(crate) mod test_support;
