//! Resource client abstraction over the experiment platform.

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use ks_types::{validation_error, ExpResult, Experiment, JobEnvironment, TrialResult};
use tracing::{debug, info};

/// Outcome of an idempotent create.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome<T> {
    /// The resource did not exist and was created.
    Created(T),
    /// A resource with the same identity already existed and was fetched.
    AlreadyExisted(T),
}

impl<T> CreateOutcome<T> {
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }

    pub fn get(&self) -> &T {
        match self {
            Self::Created(value) | Self::AlreadyExisted(value) => value,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Self::Created(value) | Self::AlreadyExisted(value) => value,
        }
    }
}

/// Create/get/list/update/delete of experiments and results, and
/// create/get/list of jobs, all scoped to one namespace.
///
/// Implementations map an existing name on create to
/// [`ks_types::StoreError::AlreadyExists`] and a missing name on get, update
/// or delete to the matching not-found error; anything else the store
/// reports surfaces as [`ks_types::StoreError::UpstreamFailure`].
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Namespace every call is scoped to.
    fn namespace(&self) -> &str;

    // -- Experiments --------------------------------------------------------

    async fn list_experiments(&self) -> ExpResult<Vec<Experiment>>;

    async fn get_experiment(&self, name: &str) -> ExpResult<Experiment>;

    async fn create_experiment(&self, experiment: &Experiment) -> ExpResult<Experiment>;

    /// Replace a stored experiment. The stored resource version must match.
    async fn update_experiment(&self, experiment: &Experiment) -> ExpResult<Experiment>;

    async fn delete_experiment(&self, name: &str) -> ExpResult<()>;

    // -- Results ------------------------------------------------------------

    async fn list_results(&self) -> ExpResult<Vec<TrialResult>>;

    async fn get_result(&self, name: &str) -> ExpResult<TrialResult>;

    async fn create_result(&self, result: &TrialResult) -> ExpResult<TrialResult>;

    /// Replace a stored result. The stored resource version must match.
    async fn update_result(&self, result: &TrialResult) -> ExpResult<TrialResult>;

    async fn delete_result(&self, name: &str) -> ExpResult<()>;

    // -- Jobs ---------------------------------------------------------------

    /// Jobs labelled with the experiment's uid.
    async fn list_jobs(&self, experiment: &Experiment) -> ExpResult<Vec<Job>>;

    async fn get_job(&self, name: &str) -> ExpResult<Job>;

    async fn create_job(&self, job: &Job) -> ExpResult<Job>;

    // -- Provided -----------------------------------------------------------

    /// Create `experiment`, or fetch the stored one if the name is taken.
    async fn ensure_experiment(
        &self,
        experiment: &Experiment,
    ) -> ExpResult<CreateOutcome<Experiment>> {
        match self.create_experiment(experiment).await {
            Ok(created) => {
                info!(experiment = created.name(), "created experiment");
                Ok(CreateOutcome::Created(created))
            }
            Err(e) if e.is_already_exists() => {
                debug!(experiment = experiment.name(), "experiment already exists");
                let existing = self.get_experiment(experiment.name()).await?;
                Ok(CreateOutcome::AlreadyExisted(existing))
            }
            Err(e) => Err(e),
        }
    }

    /// Create the result for `job` with empty values, or fetch the one that
    /// already exists under the job's name.
    async fn ensure_result(
        &self,
        experiment: &Experiment,
        job: &Job,
    ) -> ExpResult<CreateOutcome<TrialResult>> {
        let result = TrialResult::for_job(experiment, job)?;
        match self.create_result(&result).await {
            Ok(created) => {
                info!(result = created.name(), "created result");
                Ok(CreateOutcome::Created(created))
            }
            Err(e) if e.is_already_exists() => {
                debug!(result = result.name(), "result already exists");
                let existing = self.get_result(result.name()).await?;
                Ok(CreateOutcome::AlreadyExisted(existing))
            }
            Err(e) => Err(e),
        }
    }

    /// The experiment a running job belongs to.
    async fn current_experiment(&self, env: &JobEnvironment) -> ExpResult<Experiment> {
        let experiment = self.get_experiment(&env.experiment_name).await?;
        match (&env.experiment_uid, experiment.uid()) {
            (Some(expected), Some(actual)) if expected != actual => Err(validation_error!(
                "experiment {} has uid {actual}, job expects {expected}",
                env.experiment_name
            )),
            _ => Ok(experiment),
        }
    }
}
