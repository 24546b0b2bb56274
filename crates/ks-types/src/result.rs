//! Result custom resource: the metrics reported by one launched job.

use std::collections::BTreeMap;

use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

use crate::errors::{ExpResult, TemplateError};
use crate::experiment::{Experiment, ExperimentRef, ANNOTATION_JOB_PARAMETERS, LABEL_EXPERIMENT};
use crate::parameters::ParameterPoint;

/// Mutable state of a result.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResultStatus {
    /// Recorded metrics. Keys may name nested batches such as `step-10`.
    #[serde(default)]
    pub values: serde_json::Map<String, serde_json::Value>,

    /// The point that produced the job, when the job carried one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_parameters: Option<ParameterPoint>,
}

/// Metrics record for one job, named after the job and owned by its
/// experiment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrialResult {
    pub metadata: ObjectMeta,

    #[serde(default)]
    pub status: ResultStatus,
}

impl TrialResult {
    pub fn new(name: impl Into<String>, experiment: &ExperimentRef) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert(LABEL_EXPERIMENT.to_string(), experiment.name.clone());
        Self {
            metadata: ObjectMeta {
                name: Some(name.into()),
                labels: Some(labels),
                owner_references: Some(vec![experiment.owner_reference()]),
                ..ObjectMeta::default()
            },
            status: ResultStatus::default(),
        }
    }

    pub fn with_job_parameters(mut self, point: ParameterPoint) -> Self {
        self.status.job_parameters = Some(point);
        self
    }

    /// The canonical result for `job`: same name, owned by `experiment`,
    /// with the job's parameter annotation parsed back into a point.
    pub fn for_job(experiment: &Experiment, job: &Job) -> ExpResult<Self> {
        let owner = experiment.identity()?;
        let name = job.metadata.name.clone().ok_or_else(|| {
            TemplateError::InvalidJobSpec {
                experiment: owner.name.clone(),
                message: "job has no name".to_string(),
            }
        })?;

        let mut result = Self::new(name, &owner);
        let annotation = job
            .metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(ANNOTATION_JOB_PARAMETERS));
        if let Some(text) = annotation {
            result.status.job_parameters = Some(ParameterPoint::from_json_str(text)?);
        }
        Ok(result)
    }

    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    /// The experiment this result belongs to.
    pub fn owner(&self) -> Option<ExperimentRef> {
        self.metadata
            .owner_references
            .as_deref()
            .and_then(ExperimentRef::from_owner_references)
    }

    pub fn values(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.status.values
    }

    pub fn job_parameters(&self) -> Option<&ParameterPoint> {
        self.status.job_parameters.as_ref()
    }

    /// Merge `new_values` into the recorded values. Each key replaces any
    /// existing entry of the same key; other keys are left alone.
    pub fn record_values<I, K>(&mut self, new_values: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, serde_json::Value)>,
        K: Into<String>,
    {
        for (key, value) in new_values {
            self.status.values.insert(key.into(), value);
        }
        self
    }
}
