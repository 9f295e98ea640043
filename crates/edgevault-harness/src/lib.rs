//! Deterministic simulation harness for Edgevault testing.
//!
//! Virtual time and seeded randomness ([`SimEnv`]), turmoil-backed network
//! endpoints ([`SimServer`], [`SimClient`]), and a reference model for
//! model-based testing.
//!
//! # Model-Based Testing
//!
//! The `model` module provides a reference implementation. Operations are
//! applied to both the model and the real implementation, and their results
//! and stored state are compared after every step.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod model;
pub mod sim_env;
pub mod sim_server;

pub use model::{
    MODEL_USERS, ModelSession, ModelUser, ModelWorld, ObservableState, Operation, OperationError,
    OperationResult,
};
pub use sim_env::{SIM_EPOCH_MS, SimEnv};
pub use sim_server::{SimClient, SimServer};
