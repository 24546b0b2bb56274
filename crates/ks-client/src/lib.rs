//! # ks-client
//!
//! Access to the experiment platform: a [`ResourceClient`] trait covering
//! experiments, results and jobs, a Kubernetes-backed implementation, an
//! in-process store for sandbox runs and tests, explicit connection
//! configuration, cluster bootstrap and trial metric reporting.

mod bootstrap;
mod client;
mod config;
mod kube_client;
mod memory;
mod reporter;

pub use bootstrap::crd_manifests;
pub use client::{CreateOutcome, ResourceClient};
pub use config::{ClientConfig, ClusterSource, ENV_KUBE_CONTEXT};
pub use kube_client::KubeClient;
pub use memory::MemoryClient;
pub use reporter::report_steps;
