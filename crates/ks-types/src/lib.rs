//! # ks-types
//!
//! Core types shared by the KubeSweep crates: parameter spaces and points,
//! the Experiment and Result resource models, the job environment surface
//! and the error hierarchy.

pub mod env;
pub mod errors;
pub mod experiment;
pub mod parameters;
pub mod result;

pub use env::*;
pub use errors::*;
pub use experiment::*;
pub use parameters::*;
pub use result::*;
