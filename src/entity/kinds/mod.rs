//! Built-in entity kinds.
//!
//! These are deliberately small: enough to wire real graphs end-to-end.
//! Heavier algorithms plug in through the same [`crate::entity::Entity`]
//! contract and registry.

pub mod constant;
pub mod discrete_random;
pub mod growing_neural_gas;
pub mod scalar_encoder;
