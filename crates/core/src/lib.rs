//! Core library: series classification against ordered rule tables and
//! run disambiguation of the resulting keys.

pub mod builtin;
pub mod classifier;
pub mod config;
pub mod error;
pub mod merge;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod rules;
pub mod runs;

pub use error::{HeuristicError, Result};
