//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared primitives (ids, timestamps, errors, state machine trait)
//! - `payment` - Payment lifecycle, transition table, webhook event model

pub mod foundation;
pub mod payment;
