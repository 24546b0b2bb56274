//! In-process resource store for sandbox runs and tests.
//!
//! Behaves like the cluster for the parts the rest of the system relies on:
//! names are unique per kind, uids and resource versions are assigned on
//! create, replacing with a stale resource version is a conflict, and jobs
//! are found by their `experiment_uid` label.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use ks_types::{
    ExpResult, Experiment, StoreError, TrialResult, EXPERIMENT_KIND, LABEL_EXPERIMENT_UID,
    RESULT_KIND,
};
use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::client::ResourceClient;

#[derive(Debug, Default)]
struct MemoryState {
    experiments: BTreeMap<String, Experiment>,
    results: BTreeMap<String, TrialResult>,
    jobs: BTreeMap<String, Job>,
    revision: u64,
}

impl MemoryState {
    /// Stamp `meta` as a freshly created object.
    fn admit(&mut self, meta: &mut ObjectMeta, namespace: &str) {
        self.revision += 1;
        meta.uid = Some(Uuid::new_v4().to_string());
        meta.resource_version = Some(self.revision.to_string());
        meta.namespace = Some(namespace.to_string());
    }

    /// Check `incoming` against `stored` and stamp a new resource version.
    fn bump(
        &mut self,
        incoming: &mut ObjectMeta,
        stored: &ObjectMeta,
        kind: &str,
    ) -> Result<(), StoreError> {
        if incoming.resource_version.is_some() && incoming.resource_version != stored.resource_version
        {
            return Err(StoreError::Conflict {
                kind: kind.to_string(),
                name: incoming.name.clone().unwrap_or_default(),
            });
        }
        self.revision += 1;
        incoming.uid = stored.uid.clone();
        incoming.namespace = stored.namespace.clone();
        incoming.resource_version = Some(self.revision.to_string());
        Ok(())
    }
}

/// A [`ResourceClient`] backed by process memory.
#[derive(Debug)]
pub struct MemoryClient {
    namespace: String,
    state: Mutex<MemoryState>,
}

impl MemoryClient {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            state: Mutex::new(MemoryState::default()),
        }
    }

    pub fn job_count(&self) -> usize {
        self.state.lock().jobs.len()
    }

    pub fn result_count(&self) -> usize {
        self.state.lock().results.len()
    }
}

fn object_name(meta: &ObjectMeta) -> Result<String, StoreError> {
    match meta.name.as_deref() {
        Some(name) if !name.is_empty() => Ok(name.to_string()),
        _ => Err(StoreError::UpstreamFailure {
            message: "metadata.name is required".to_string(),
        }),
    }
}

fn already_exists(kind: &str, name: &str) -> StoreError {
    StoreError::AlreadyExists {
        kind: kind.to_string(),
        name: name.to_string(),
    }
}

#[async_trait]
impl ResourceClient for MemoryClient {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn list_experiments(&self) -> ExpResult<Vec<Experiment>> {
        Ok(self.state.lock().experiments.values().cloned().collect())
    }

    async fn get_experiment(&self, name: &str) -> ExpResult<Experiment> {
        self.state
            .lock()
            .experiments
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::ExperimentNotFound { name: name.to_string() }.into())
    }

    async fn create_experiment(&self, experiment: &Experiment) -> ExpResult<Experiment> {
        let name = object_name(&experiment.metadata)?;
        let mut state = self.state.lock();
        if state.experiments.contains_key(&name) {
            return Err(already_exists(EXPERIMENT_KIND, &name).into());
        }
        let mut stored = experiment.clone();
        state.admit(&mut stored.metadata, &self.namespace);
        state.experiments.insert(name, stored.clone());
        Ok(stored)
    }

    async fn update_experiment(&self, experiment: &Experiment) -> ExpResult<Experiment> {
        let name = object_name(&experiment.metadata)?;
        let mut state = self.state.lock();
        let current = state
            .experiments
            .get(&name)
            .map(|e| e.metadata.clone())
            .ok_or_else(|| StoreError::ExperimentNotFound { name: name.clone() })?;
        let mut stored = experiment.clone();
        state.bump(&mut stored.metadata, &current, EXPERIMENT_KIND)?;
        state.experiments.insert(name, stored.clone());
        Ok(stored)
    }

    async fn delete_experiment(&self, name: &str) -> ExpResult<()> {
        let mut state = self.state.lock();
        match state.experiments.remove(name) {
            Some(_) => Ok(()),
            None => Err(StoreError::ExperimentNotFound { name: name.to_string() }.into()),
        }
    }

    async fn list_results(&self) -> ExpResult<Vec<TrialResult>> {
        Ok(self.state.lock().results.values().cloned().collect())
    }

    async fn get_result(&self, name: &str) -> ExpResult<TrialResult> {
        self.state
            .lock()
            .results
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::ResultNotFound { name: name.to_string() }.into())
    }

    async fn create_result(&self, result: &TrialResult) -> ExpResult<TrialResult> {
        let name = object_name(&result.metadata)?;
        let mut state = self.state.lock();
        if state.results.contains_key(&name) {
            return Err(already_exists(RESULT_KIND, &name).into());
        }
        let mut stored = result.clone();
        state.admit(&mut stored.metadata, &self.namespace);
        state.results.insert(name, stored.clone());
        Ok(stored)
    }

    async fn update_result(&self, result: &TrialResult) -> ExpResult<TrialResult> {
        let name = object_name(&result.metadata)?;
        let mut state = self.state.lock();
        let current = state
            .results
            .get(&name)
            .map(|r| r.metadata.clone())
            .ok_or_else(|| StoreError::ResultNotFound { name: name.clone() })?;
        let mut stored = result.clone();
        state.bump(&mut stored.metadata, &current, RESULT_KIND)?;
        state.results.insert(name, stored.clone());
        Ok(stored)
    }

    async fn delete_result(&self, name: &str) -> ExpResult<()> {
        let mut state = self.state.lock();
        match state.results.remove(name) {
            Some(_) => Ok(()),
            None => Err(StoreError::ResultNotFound { name: name.to_string() }.into()),
        }
    }

    async fn list_jobs(&self, experiment: &Experiment) -> ExpResult<Vec<Job>> {
        let Some(uid) = experiment.uid() else {
            return Ok(Vec::new());
        };
        let state = self.state.lock();
        Ok(state
            .jobs
            .values()
            .filter(|job| {
                job.metadata
                    .labels
                    .as_ref()
                    .and_then(|labels| labels.get(LABEL_EXPERIMENT_UID))
                    .is_some_and(|value| value == uid)
            })
            .cloned()
            .collect())
    }

    async fn get_job(&self, name: &str) -> ExpResult<Job> {
        self.state
            .lock()
            .jobs
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::JobNotFound { name: name.to_string() }.into())
    }

    async fn create_job(&self, job: &Job) -> ExpResult<Job> {
        let name = object_name(&job.metadata)?;
        let mut state = self.state.lock();
        if state.jobs.contains_key(&name) {
            return Err(already_exists("Job", &name).into());
        }
        let mut stored = job.clone();
        state.admit(&mut stored.metadata, &self.namespace);
        debug!(job = %name, "stored job");
        state.jobs.insert(name, stored.clone());
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::CreateOutcome;
    use ks_types::{
        ExpError, ExperimentRef, JobEnvironment, ParameterValue, ANNOTATION_JOB_PARAMETERS,
        LABEL_EXPERIMENT_NAME,
    };
    use serde_json::json;

    fn job_spec() -> serde_json::Value {
        json!({
            "template": {
                "spec": {
                    "containers": [{"name": "train", "image": "tensorflow", "command": ["train.py"]}],
                    "restartPolicy": "Never"
                }
            },
            "backoffLimit": 4
        })
    }

    fn job_for(experiment: &Experiment, name: &str) -> Job {
        let mut labels = BTreeMap::new();
        labels.insert(
            LABEL_EXPERIMENT_UID.to_string(),
            experiment.uid().unwrap().to_string(),
        );
        labels.insert(LABEL_EXPERIMENT_NAME.to_string(), experiment.name().to_string());
        let mut annotations = BTreeMap::new();
        annotations.insert(ANNOTATION_JOB_PARAMETERS.to_string(), r#"{"x":2}"#.to_string());
        Job {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(labels),
                annotations: Some(annotations),
                ..ObjectMeta::default()
            },
            ..Job::default()
        }
    }

    #[tokio::test]
    async fn test_experiment_crud() {
        let client = MemoryClient::new("demo");
        let exp = client
            .create_experiment(&Experiment::new("test", job_spec()))
            .await
            .unwrap();
        assert_eq!(exp.name(), "test");
        assert!(exp.uid().is_some());
        assert_eq!(exp.metadata.namespace.as_deref(), Some("demo"));

        let listed = client.list_experiments().await.unwrap();
        assert_eq!(listed, vec![exp.clone()]);

        let mut changed = exp.clone();
        changed.status.insert("phase".into(), json!("Running"));
        let updated = client.update_experiment(&changed).await.unwrap();
        assert_eq!(updated.uid(), exp.uid());
        assert_ne!(updated.metadata.resource_version, exp.metadata.resource_version);

        client.delete_experiment("test").await.unwrap();
        let err = client.get_experiment("test").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_duplicate_experiment_rejected() {
        let client = MemoryClient::new("demo");
        client
            .create_experiment(&Experiment::new("test", job_spec()))
            .await
            .unwrap();
        let err = client
            .create_experiment(&Experiment::new("test", job_spec()))
            .await
            .unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_ensure_experiment_fetches_existing() {
        let client = MemoryClient::new("demo");
        let first = client
            .ensure_experiment(&Experiment::new("test", job_spec()))
            .await
            .unwrap();
        assert!(first.is_created());

        let second = client
            .ensure_experiment(&Experiment::new("test", json!({})))
            .await
            .unwrap();
        assert!(!second.is_created());
        assert_eq!(second.get().uid(), first.get().uid());
        assert_eq!(second.get().job_template(), Some(&job_spec()));
    }

    #[tokio::test]
    async fn test_ensure_result_twice_is_idempotent() {
        let client = MemoryClient::new("demo");
        let exp = client
            .create_experiment(&Experiment::new("test", job_spec()))
            .await
            .unwrap();
        let job = client.create_job(&job_for(&exp, "test-0a1b2c3d")).await.unwrap();

        let first = client.ensure_result(&exp, &job).await.unwrap();
        assert!(matches!(first, CreateOutcome::Created(_)));

        let second = client.ensure_result(&exp, &job).await.unwrap();
        assert!(matches!(second, CreateOutcome::AlreadyExisted(_)));

        assert_eq!(first.get().name(), "test-0a1b2c3d");
        assert_eq!(first.get().metadata.uid, second.get().metadata.uid);
        assert_eq!(client.result_count(), 1);
        assert_eq!(
            second.get().job_parameters().unwrap().get("x"),
            Some(&ParameterValue::Int(2))
        );
        assert_eq!(
            second.get().owner(),
            Some(ExperimentRef::new("test", exp.uid().unwrap()))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_ensure_result_creates_once() {
        let client = std::sync::Arc::new(MemoryClient::new("demo"));
        let exp = client
            .create_experiment(&Experiment::new("test", job_spec()))
            .await
            .unwrap();
        let job = client.create_job(&job_for(&exp, "test-0a1b2c3d")).await.unwrap();

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let client = client.clone();
                let exp = exp.clone();
                let job = job.clone();
                tokio::spawn(async move { client.ensure_result(&exp, &job).await })
            })
            .collect();

        let mut created = 0;
        let mut uids = std::collections::HashSet::new();
        for task in tasks {
            let outcome = task.await.unwrap().unwrap();
            if outcome.is_created() {
                created += 1;
            }
            uids.insert(outcome.into_inner().metadata.uid);
        }
        assert_eq!(created, 1);
        assert_eq!(uids.len(), 1);
        assert_eq!(client.result_count(), 1);
    }

    #[tokio::test]
    async fn test_current_experiment_checks_uid() {
        let client = MemoryClient::new("demo");
        let exp = client
            .create_experiment(&Experiment::new("test", job_spec()))
            .await
            .unwrap();
        let uid = exp.uid().unwrap().to_string();
        let vars = |uid: &str| {
            vec![
                ("JOB_NAME", "test-0a1b2c3d".to_string()),
                ("EXPERIMENT_NAMESPACE", "demo".to_string()),
                ("EXPERIMENT_NAME", "test".to_string()),
                ("EXPERIMENT_UID", uid.to_string()),
            ]
        };

        let env = JobEnvironment::from_vars(vars(&uid)).unwrap();
        assert_eq!(client.current_experiment(&env).await.unwrap(), exp);

        let env = JobEnvironment::from_vars(vars("someone-else")).unwrap();
        let err = client.current_experiment(&env).await.unwrap_err();
        match err {
            ExpError::Validation(message) => assert!(message.contains("someone-else")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ensure_result_keeps_recorded_values() {
        let client = MemoryClient::new("demo");
        let exp = client
            .create_experiment(&Experiment::new("test", job_spec()))
            .await
            .unwrap();
        let job = client.create_job(&job_for(&exp, "test-1")).await.unwrap();

        let mut result = client.ensure_result(&exp, &job).await.unwrap().into_inner();
        result.record_values([("fitness", json!(0.86))]);
        client.update_result(&result).await.unwrap();

        let again = client.ensure_result(&exp, &job).await.unwrap().into_inner();
        assert_eq!(again.values()["fitness"], json!(0.86));
    }

    #[tokio::test]
    async fn test_record_and_update_cycle() {
        let client = MemoryClient::new("demo");
        let owner = ExperimentRef::new("test", "uid-1");
        let mut result = client
            .create_result(&TrialResult::new("test-1", &owner))
            .await
            .unwrap();

        result.record_values([("step-0", json!({"loss": 0.5, "accuracy": 0.9}))]);
        result = client.update_result(&result).await.unwrap();
        result.record_values([("step-10", json!({"loss": 0.4, "accuracy": 0.92}))]);
        result = client.update_result(&result).await.unwrap();

        let stored = client.get_result("test-1").await.unwrap();
        assert_eq!(stored, result);
        assert_eq!(stored.values()["step-0"]["loss"], json!(0.5));
        assert_eq!(stored.values()["step-10"]["accuracy"], json!(0.92));
    }

    #[tokio::test]
    async fn test_update_missing_result_is_not_found() {
        let client = MemoryClient::new("demo");
        let result = TrialResult::new("ghost", &ExperimentRef::new("test", "uid-1"));
        let err = client.update_result(&result).await.unwrap_err();
        assert!(matches!(
            err,
            ExpError::Store(StoreError::ResultNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_stale_update_conflicts() {
        let client = MemoryClient::new("demo");
        let owner = ExperimentRef::new("test", "uid-1");
        let created = client
            .create_result(&TrialResult::new("r", &owner))
            .await
            .unwrap();

        let mut first = created.clone();
        first.record_values([("a", json!(1))]);
        client.update_result(&first).await.unwrap();

        let mut stale = created;
        stale.record_values([("b", json!(2))]);
        let err = client.update_result(&stale).await.unwrap_err();
        assert!(matches!(err, ExpError::Store(StoreError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_list_jobs_by_experiment_uid() {
        let client = MemoryClient::new("demo");
        let a = client
            .create_experiment(&Experiment::new("a", job_spec()))
            .await
            .unwrap();
        let b = client
            .create_experiment(&Experiment::new("b", job_spec()))
            .await
            .unwrap();
        client.create_job(&job_for(&a, "a-1")).await.unwrap();
        client.create_job(&job_for(&a, "a-2")).await.unwrap();
        client.create_job(&job_for(&b, "b-1")).await.unwrap();

        let jobs = client.list_jobs(&a).await.unwrap();
        let names: Vec<_> = jobs.iter().filter_map(|j| j.metadata.name.clone()).collect();
        assert_eq!(names, ["a-1", "a-2"]);
        assert_eq!(client.job_count(), 3);

        let err = client.create_job(&job_for(&a, "a-1")).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_unnamed_objects_rejected() {
        let client = MemoryClient::new("demo");
        let err = client.create_job(&Job::default()).await.unwrap_err();
        assert!(matches!(
            err,
            ExpError::Store(StoreError::UpstreamFailure { .. })
        ));
    }
}
