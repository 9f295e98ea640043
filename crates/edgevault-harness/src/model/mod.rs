//! Reference model for model-based testing.
//!
//! Operations are applied to both [`ModelWorld`] and the real gateway and
//! prekey manager; results and [`ObservableState`] must match after every
//! step.

mod operation;
mod world;

pub use operation::{
    MODEL_USERS, ModelSession, ModelUser, Operation, OperationError, OperationResult, identity,
};
pub use world::{ModelWorld, ObservableState};
