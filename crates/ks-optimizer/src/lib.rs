//! # ks-optimizer
//!
//! Parameter grid expansion, sweep strategies and trial job launching for
//! KubeSweep experiments.

mod job;
mod launcher;
mod search;

pub use job::{generate_job_name, JobMaterializer};
pub use launcher::Launcher;
pub use search::{grid, select_points, GridSearch, RandomSearch, SearchStrategy, StrategyKind};
