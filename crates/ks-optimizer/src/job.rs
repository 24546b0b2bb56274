//! Materialization of experiment trial jobs.
//!
//! A job is the experiment's job template with the identity block and the
//! parameter point injected into every container's environment, plus the
//! metadata that ties it back to its experiment.

use std::collections::BTreeMap;

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use ks_types::{
    ExpResult, Experiment, ExperimentRef, ParameterPoint, TemplateError, ANNOTATION_JOB_PARAMETERS,
    ENV_EXPERIMENT_NAME, ENV_EXPERIMENT_UID, ENV_JOB_NAME, ENV_NAMESPACE, LABEL_EXPERIMENT_NAME,
    LABEL_EXPERIMENT_UID,
};
use serde_json::{json, Value};
use uuid::Uuid;

/// Length of the random suffix appended to the experiment name.
const JOB_SUFFIX_LEN: usize = 8;

/// Builds launch-ready jobs for one namespace.
#[derive(Debug, Clone)]
pub struct JobMaterializer {
    namespace: String,
}

impl JobMaterializer {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Materialize one job for `point` under a freshly generated name.
    pub fn materialize(&self, experiment: &Experiment, point: &ParameterPoint) -> ExpResult<Job> {
        let name = generate_job_name(experiment.name());
        self.materialize_named(experiment, point, name)
    }

    /// Materialize one job for `point` under `job_name`.
    pub fn materialize_named(
        &self,
        experiment: &Experiment,
        point: &ParameterPoint,
        job_name: String,
    ) -> ExpResult<Job> {
        let owner = experiment.identity()?;
        let mut template = experiment
            .job_template()
            .cloned()
            .ok_or_else(|| TemplateError::MissingJobTemplate {
                experiment: owner.name.clone(),
            })?;

        let env = self.environment(&owner, &job_name, point);
        inject_environment(&mut template, &env, &owner.name)?;

        let spec: JobSpec =
            serde_json::from_value(template).map_err(|e| TemplateError::InvalidJobSpec {
                experiment: owner.name.clone(),
                message: e.to_string(),
            })?;

        Ok(Job {
            metadata: job_metadata(&owner, &self.namespace, job_name, point)?,
            spec: Some(spec),
            status: None,
        })
    }

    /// Identity block followed by one variable per parameter, in point order.
    fn environment(
        &self,
        owner: &ExperimentRef,
        job_name: &str,
        point: &ParameterPoint,
    ) -> Vec<(String, String)> {
        let mut env = vec![
            (ENV_JOB_NAME.to_string(), job_name.to_string()),
            (ENV_NAMESPACE.to_string(), self.namespace.clone()),
            (ENV_EXPERIMENT_NAME.to_string(), owner.name.clone()),
            (ENV_EXPERIMENT_UID.to_string(), owner.uid.clone()),
        ];
        env.extend(point.env_vars());
        env
    }
}

/// `<experiment>-<8 hex chars>`, unique for all practical purposes.
pub fn generate_job_name(experiment_name: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{experiment_name}-{}", &id[..JOB_SUFFIX_LEN])
}

fn job_metadata(
    owner: &ExperimentRef,
    namespace: &str,
    job_name: String,
    point: &ParameterPoint,
) -> ExpResult<ObjectMeta> {
    let mut labels = BTreeMap::new();
    labels.insert(LABEL_EXPERIMENT_UID.to_string(), owner.uid.clone());
    labels.insert(LABEL_EXPERIMENT_NAME.to_string(), owner.name.clone());

    let mut annotations = BTreeMap::new();
    annotations.insert(ANNOTATION_JOB_PARAMETERS.to_string(), point.to_json_string()?);

    Ok(ObjectMeta {
        name: Some(job_name),
        namespace: Some(namespace.to_string()),
        labels: Some(labels),
        annotations: Some(annotations),
        owner_references: Some(vec![owner.owner_reference()]),
        ..ObjectMeta::default()
    })
}

/// Append `env` to every container under `template.spec.containers`,
/// after whatever the container already declares.
fn inject_environment(
    template: &mut Value,
    env: &[(String, String)],
    experiment: &str,
) -> Result<(), TemplateError> {
    let containers = template
        .pointer_mut("/template/spec/containers")
        .and_then(Value::as_array_mut)
        .filter(|containers| !containers.is_empty())
        .ok_or_else(|| TemplateError::MissingContainerSpec {
            experiment: experiment.to_string(),
        })?;

    for container in containers.iter_mut() {
        let container = container
            .as_object_mut()
            .ok_or_else(|| TemplateError::InvalidJobSpec {
                experiment: experiment.to_string(),
                message: "container entry is not an object".to_string(),
            })?;

        let slot = container
            .entry("env")
            .or_insert_with(|| Value::Array(Vec::new()));
        if slot.is_null() {
            *slot = Value::Array(Vec::new());
        }
        let entries = slot
            .as_array_mut()
            .ok_or_else(|| TemplateError::InvalidJobSpec {
                experiment: experiment.to_string(),
                message: "container env is not a list".to_string(),
            })?;

        entries.extend(
            env.iter()
                .map(|(name, value)| json!({"name": name, "value": value})),
        );
    }
    Ok(())
}
