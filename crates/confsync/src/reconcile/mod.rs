//! Reconciliation of validated per-file item lists into item-level actions.

pub mod action;
pub mod engine;

pub use action::{Action, ConfigSet, Reassignment, Reconciliation};
pub use engine::Reconciler;
