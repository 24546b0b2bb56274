//! Launching experiment trial jobs against a resource client.

use k8s_openapi::api::batch::v1::Job;
use ks_client::ResourceClient;
use ks_types::{ExpResult, Experiment, ParameterPoint};
use tracing::{debug, info};

use crate::job::JobMaterializer;
use crate::search::grid;

/// Materializes jobs for parameter points and submits them.
pub struct Launcher<C> {
    client: C,
    materializer: JobMaterializer,
}

impl<C: ResourceClient> Launcher<C> {
    /// Jobs are materialized into the client's namespace.
    pub fn new(client: C) -> Self {
        let materializer = JobMaterializer::new(client.namespace());
        Self {
            client,
            materializer,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn materializer(&self) -> &JobMaterializer {
        &self.materializer
    }

    /// Create one job for `point`.
    pub async fn launch(&self, experiment: &Experiment, point: &ParameterPoint) -> ExpResult<Job> {
        let job = self.materializer.materialize(experiment, point)?;
        let created = self.client.create_job(&job).await?;
        info!(
            experiment = experiment.name(),
            job = created.metadata.name.as_deref().unwrap_or_default(),
            "created job"
        );
        Ok(created)
    }

    /// Create one job per point, in order. Stops at the first failure; jobs
    /// already created are left in place.
    pub async fn launch_all(
        &self,
        experiment: &Experiment,
        points: &[ParameterPoint],
    ) -> ExpResult<Vec<Job>> {
        let mut jobs = Vec::with_capacity(points.len());
        for point in points {
            let rendered =
                serde_json::to_string_pretty(point).unwrap_or_else(|_| format!("{point:?}"));
            info!(experiment = experiment.name(), "launching job with parameters:\n{rendered}");
            jobs.push(self.launch(experiment, point).await?);
        }
        Ok(jobs)
    }

    /// Launch the full grid of the experiment's parameter space.
    pub async fn run_grid(&self, experiment: &Experiment) -> ExpResult<Vec<Job>> {
        let points = grid(experiment.parameters())?;
        debug!(experiment = experiment.name(), points = points.len(), "running grid");
        self.launch_all(experiment, &points).await
    }
}
